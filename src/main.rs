extern crate recal_genome;
use recal_genome::cli::*;
use recal_genome::processing::apply_bqsr_engine::{ApplyBqsrJob, ApplyBqsrPipeline};

use std::env;
use std::process;

extern crate clap;
use clap::*;

#[macro_use]
extern crate log;
use log::LevelFilter;
extern crate env_logger;
use env_logger::Builder;

fn main() {
    let mut app = build_cli();
    let matches = app.clone().get_matches();

    match matches.subcommand() {
        Some(("apply", m)) => {
            if m.get_flag("full-help") {
                println!("{}", apply_full_help());
                process::exit(1);
            }
            set_log_level(m, true);

            let job = match ApplyBqsrJob::generate_from_clap(m) {
                Ok(job) => job,
                Err(e) => {
                    error!("{}", e);
                    process::exit(e.exit_code());
                }
            };

            let mut pipeline = ApplyBqsrPipeline::new(job);
            match pipeline.run() {
                Ok(_) => info!("ApplyBQSR complete."),
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(e.exit_code());
                }
            }
        }
        _ => {
            app.print_help().unwrap();
            println!();
        }
    }
}

fn set_log_level(matches: &clap::ArgMatches, is_last: bool) {
    let mut log_level = LevelFilter::Info;
    let mut specified = false;
    if matches.get_flag("verbose") {
        specified = true;
        log_level = LevelFilter::Debug;
    }
    if matches.get_flag("quiet") {
        specified = true;
        log_level = LevelFilter::Error;
    }
    if specified || is_last {
        let mut builder = Builder::new();
        builder.filter_level(log_level);
        if let Ok(filters) = env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        if builder.try_init().is_err() {
            panic!("Failed to set log level - has it been specified multiple times?")
        }
    }
    if is_last {
        info!("recal version {}", crate_version!());
    }
}
