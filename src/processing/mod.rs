pub mod apply_bqsr_engine;
pub mod broadcast;
