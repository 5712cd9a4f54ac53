use clap::*;

pub fn apply_full_help() -> &'static str {
    "recal apply: Apply a base quality recalibration table to a BAM/SAM file

Input and output (required):
   -i, --input <PATH>                    Coordinate sorted BAM or SAM file to
                                         recalibrate. Exactly one input is accepted.
                                         A BAI index is built in a temporary
                                         directory when none is found next to the
                                         input.
   -b, --bqsr-recal-file <PATH>          Recalibration table in JSON format
   -o, --output <PATH>                   Output BAM (or SAM if the name ends in
                                         .sam). With --sharded-output, a directory
                                         receiving one part-r-NNNNN.bam file per
                                         partition plus a _SUCCESS manifest.

Regions (optional):
   -L, --intervals <INTERVAL> ..         Only recalibrate reads overlapping these
                                         regions, given as contig, contig:start or
                                         contig:start-end (1-based, inclusive).
                                         Without intervals every read is written,
                                         including unplaced unmapped reads.

Recalibration:
   --preserve-qscores-less-than <INT>    Leave bases with quality below this value
                                         untouched [default: 6]
   --quantize-quals <INT>                Quantize recalibrated qualities to this
                                         many evenly spaced levels [default: 0]
   --static-quantized-quals <INT> ..     Quantize recalibrated qualities to the
                                         closest of these values. Overrides
                                         --quantize-quals
   --round-down-quantized                Round down to the nearest static bin
                                         instead of to the closest one
   --emit-original-quals                 Store the qualities before recalibration
                                         in the OQ tag
   --use-original-qualities              Recalibrate the qualities stored in the
                                         OQ tag rather than the current qualities

Execution:
   -t, --threads <INT>                   Number of worker threads [default: 1]
   --io-threads <INT>                    htslib compression threads per reader
                                         and writer [default: 1]
   --partition-span <INT>                Maximum reference span of a partition
                                         [default: 1000000]
   --sharded-output                      Write one file per partition into the
                                         --output directory

Other:
   -v, --verbose                         Print extra debugging information
   -q, --quiet                           Unless there is an error, do not print
                                         log messages

Exit status is 0 on success, 2 for input errors, 3 for malformed recalibration
tables, 4 if the table could not be distributed to workers, 5 for output errors
and 130 when the job was cancelled.

Example usage:

  recal apply -i sample.bam -b sample.recal.json -o sample.recal.bam -t 8

  recal apply -i sample.bam -b sample.recal.json -o recal_shards --sharded-output
    -L chr1 -L chr2:1-1000000"
}

pub fn build_cli() -> Command {
    lazy_static! {
        static ref APPLY_HELP: String = format!(
            "
                            recal apply
              Apply a base quality recalibration table

Example: Recalibrate a BAM file using 8 threads:

  recal apply -i sample.bam -b sample.recal.json -o sample.recal.bam -t 8

Example: Recalibrate two regions and write one BAM per partition:

  recal apply -i sample.bam -b sample.recal.json -o recal_shards
    --sharded-output -L chr1 -L chr2:1-1000000

See recal apply --full-help for further options and further detail.

recal-genome version {}
",
            crate_version!()
        );
    }

    Command::new("recal")
        .version(crate_version!())
        .about("Apply base quality score recalibration to alignment files")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("apply")
                .about("Apply a base quality recalibration table to a BAM/SAM file")
                .override_help(APPLY_HELP.as_str())
                .arg(
                    Arg::new("full-help")
                        .long("full-help")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .action(ArgAction::Append)
                        .required_unless_present("full-help"),
                )
                .arg(
                    Arg::new("bqsr-recal-file")
                        .short('b')
                        .long("bqsr-recal-file")
                        .required_unless_present("full-help"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required_unless_present("full-help"),
                )
                .arg(
                    Arg::new("intervals")
                        .short('L')
                        .long("intervals")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("sharded-output")
                        .long("sharded-output")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("threads")
                        .short('t')
                        .long("threads")
                        .value_parser(value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("io-threads")
                        .long("io-threads")
                        .value_parser(value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("partition-span")
                        .long("partition-span")
                        .value_parser(value_parser!(usize))
                        .default_value("1000000"),
                )
                .arg(
                    Arg::new("preserve-qscores-less-than")
                        .long("preserve-qscores-less-than")
                        .value_parser(value_parser!(u8))
                        .default_value("6"),
                )
                .arg(
                    Arg::new("quantize-quals")
                        .long("quantize-quals")
                        .value_parser(value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("static-quantized-quals")
                        .long("static-quantized-quals")
                        .value_parser(value_parser!(u8))
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("round-down-quantized")
                        .long("round-down-quantized")
                        .action(ArgAction::SetTrue)
                        .requires("static-quantized-quals"),
                )
                .arg(
                    Arg::new("emit-original-quals")
                        .long("emit-original-quals")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("use-original-qualities")
                        .long("use-original-qualities")
                        .action(ArgAction::SetTrue),
                ),
        )
}
