pub mod errors;
pub mod interval_utils;
pub mod quality_utils;
pub mod simple_interval;
