pub mod bam_parsing;
pub mod cli;
pub mod processing;
pub mod reads;
pub mod recalibration;
pub mod test_utils;
pub mod utils;

// HTS files
extern crate rust_htslib;

// Utilities
extern crate clap;
extern crate crossbeam_channel;
extern crate env_logger;
extern crate itertools;
extern crate rayon;
extern crate serde;
extern crate serde_json;
extern crate tempfile;
extern crate thiserror;

#[macro_use]
extern crate log;
extern crate indicatif;
#[macro_use]
extern crate lazy_static;
