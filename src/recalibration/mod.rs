pub mod apply_bqsr_arguments;
pub mod bqsr_read_transformer;
pub mod covariates;
pub mod quantization;
pub mod recalibration_report;
