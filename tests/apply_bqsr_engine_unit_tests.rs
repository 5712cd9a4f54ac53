extern crate recal_genome;
extern crate rust_htslib;
extern crate serde_json;
extern crate tempfile;

use recal_genome::bam_parsing::collection_header::CollectionHeader;
use recal_genome::bam_parsing::reads_sink::{
    ReadsWriteFormat, ShardManifest, INCOMPLETE_MANIFEST, SUCCESS_MANIFEST,
};
use recal_genome::bam_parsing::reads_source::{ReadsSource, ReadsSourceSettings};
use recal_genome::processing::apply_bqsr_engine::{ApplyBqsrJob, ApplyBqsrPipeline, PipelineState};
use recal_genome::reads::bird_tool_reads::BirdToolRead;
use recal_genome::recalibration::recalibration_report::RecalibrationTables;
use recal_genome::test_utils::artificial_read_utils::*;
use recal_genome::utils::errors::{PipelineStage, RecalError};
use rust_htslib::bam::Record;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const READ_LENGTH: usize = 50;
const INPUT_QUAL: u8 = 30;

fn header() -> CollectionHeader {
    ArtificialReadUtils::create_header(&[("chr1", 10000), ("chr2", 10000)], &["rg1"])
}

/**
 * 300 reads on chr1:1-5000, 5 reads on chr1 beyond 8000, 205 reads on chr2:1-5000 and 3
 * unplaced unmapped reads, in coordinate order.
 */
fn input_reads() -> Vec<BirdToolRead> {
    let mut reads = Vec::new();
    for i in 0..300 {
        reads.push(ArtificialReadUtils::create_simple_read(
            &format!("chr1_{}", i),
            0,
            i as i64 * 10,
            READ_LENGTH,
            INPUT_QUAL,
            Some("rg1"),
        ));
    }
    for i in 0..5 {
        reads.push(ArtificialReadUtils::create_simple_read(
            &format!("chr1_far_{}", i),
            0,
            8000 + i as i64 * 10,
            READ_LENGTH,
            INPUT_QUAL,
            Some("rg1"),
        ));
    }
    for i in 0..205 {
        reads.push(ArtificialReadUtils::create_simple_read(
            &format!("chr2_{}", i),
            1,
            i as i64 * 20,
            READ_LENGTH,
            INPUT_QUAL,
            Some("rg1"),
        ));
    }
    for i in 0..3 {
        reads.push(ArtificialReadUtils::create_artificial_read(
            &format!("unplaced_{}", i),
            -1,
            -1,
            b"ACGTACGTAC",
            &[INPUT_QUAL; 10],
            FLAG_UNMAPPED,
            Some("rg1"),
        ));
    }
    reads
}

fn write_model(path: &Path, global_delta: f64) {
    let tables = RecalibrationTables {
        global_delta,
        ..Default::default()
    };
    fs::write(path, serde_json::to_string(&tables).unwrap()).unwrap();
}

struct Fixture {
    dir: tempfile::TempDir,
    input: PathBuf,
    model: PathBuf,
}

impl Fixture {
    fn new(indexed: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bam");
        if indexed {
            ArtificialReadUtils::write_indexed_bam(&input, &header(), &input_reads());
        } else {
            ArtificialReadUtils::write_reads(&input, &header(), &input_reads());
        }
        let model = dir.path().join("model.json");
        write_model(&model, -3.0);
        Fixture { dir, input, model }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn job(&self, output: &Path) -> ApplyBqsrJob {
        let mut job = ApplyBqsrJob::new(&self.input, &self.model, output);
        job.threads = 4;
        job.source_settings.partition_span = 1000;
        job
    }
}

fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|record| String::from_utf8_lossy(record.qname()).to_string())
        .collect()
}

#[test]
fn test_two_named_regions_with_global_default() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.bam");
    let mut job = fixture.job(&output);
    job.intervals = vec!["chr1:1-5000".to_string(), "chr2:1-5000".to_string()];

    let summary = ApplyBqsrPipeline::new(job).run().unwrap();
    assert_eq!(summary.records_written, 505);

    let (_, records) = ArtificialReadUtils::read_all(&output);
    assert_eq!(records.len(), 505);
    for record in records.iter() {
        assert!(record.qual().iter().all(|q| *q == INPUT_QUAL - 3));
    }
    assert!(names(&records).iter().all(|name| !name.starts_with("chr1_far")));
}

#[test]
fn test_consolidated_output_round_trips() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.bam");
    let mut pipeline = ApplyBqsrPipeline::new(fixture.job(&output));

    let summary = pipeline.run().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(summary.records_read, 513);
    assert_eq!(summary.records_passed_through, 3);

    let (output_header, records) = ArtificialReadUtils::read_all(&output);
    let (input_header, input_records) = ArtificialReadUtils::read_all(&fixture.input);
    assert!(output_header.same_schema(&input_header));
    assert_eq!(output_header.read_groups(), &["rg1".to_string()]);
    assert_eq!(names(&records), names(&input_records));

    // unplaced reads are passed through untouched
    for record in records.iter() {
        let expected = if record.is_unmapped() {
            INPUT_QUAL
        } else {
            INPUT_QUAL - 3
        };
        assert!(record.qual().iter().all(|q| *q == expected));
    }
}

#[test]
fn test_zero_model_output_matches_input() {
    let fixture = Fixture::new(true);
    write_model(&fixture.model, 0.0);
    let output = fixture.path("out.bam");

    ApplyBqsrPipeline::new(fixture.job(&output)).run().unwrap();

    let (_, records) = ArtificialReadUtils::read_all(&output);
    let (_, input_records) = ArtificialReadUtils::read_all(&fixture.input);
    assert_eq!(records.len(), input_records.len());
    for (output_record, input_record) in records.iter().zip(input_records.iter()) {
        assert_eq!(output_record.qname(), input_record.qname());
        assert_eq!(output_record.qual(), input_record.qual());
        assert_eq!(output_record.pos(), input_record.pos());
    }
}

#[test]
fn test_sam_output() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.sam");

    ApplyBqsrPipeline::new(fixture.job(&output)).run().unwrap();

    let text = fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("@HD"));
    let (_, records) = ArtificialReadUtils::read_all(&output);
    assert_eq!(records.len(), 513);
}

#[test]
fn test_unindexed_input_is_indexed() {
    let fixture = Fixture::new(false);
    let output = fixture.path("out.bam");

    let summary = ApplyBqsrPipeline::new(fixture.job(&output)).run().unwrap();
    assert_eq!(summary.records_written, 513);
    assert!(!fixture.path("input.bam.bai").exists());
}

#[test]
fn test_sharded_output() {
    let fixture = Fixture::new(true);
    let output = fixture.path("shards");
    let mut job = fixture.job(&output);
    job.write_format = ReadsWriteFormat::Sharded;

    let summary = ApplyBqsrPipeline::new(job).run().unwrap();

    let mut shards = fs::read_dir(&output)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("part-r-"))
        .collect::<Vec<String>>();
    shards.sort();

    // 10 partitions per contig and one for the unplaced reads
    assert_eq!(summary.partitions, 21);
    assert_eq!(shards.len(), summary.partitions);
    assert_eq!(summary.shards_written, summary.partitions);
    assert_eq!(shards[0], "part-r-00000.bam");

    let mut all_names = Vec::new();
    for shard in shards.iter() {
        let (shard_header, records) = ArtificialReadUtils::read_all(&output.join(shard));
        assert!(shard_header.same_schema(&header()));
        all_names.extend(names(&records));
    }
    let (_, input_records) = ArtificialReadUtils::read_all(&fixture.input);
    assert_eq!(all_names.len(), input_records.len());
    assert_eq!(
        all_names.iter().collect::<HashSet<_>>(),
        names(&input_records).iter().collect::<HashSet<_>>()
    );

    let manifest = ShardManifest::read_from(&output.join(SUCCESS_MANIFEST)).unwrap();
    assert!(manifest.complete);
    assert_eq!(manifest.shards.len(), 21);
    assert_eq!(manifest.shards[20].span, "unmapped");
    assert_eq!(manifest.shards[20].records, 3);
    assert!(!output.join(INCOMPLETE_MANIFEST).exists());
}

fn shard_names(output: &Path) -> Vec<String> {
    let mut shards = fs::read_dir(output)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.contains("part-r-"))
        .collect::<Vec<String>>();
    shards.sort();
    shards
}

#[test]
fn test_rerun_into_shard_directory_replaces_old_shards() {
    let fixture = Fixture::new(true);
    let output = fixture.path("shards");
    let mut job = fixture.job(&output);
    job.write_format = ReadsWriteFormat::Sharded;
    ApplyBqsrPipeline::new(job.clone()).run().unwrap();
    assert_eq!(shard_names(&output).len(), 21);

    // one partition per contig and one for the unplaced reads
    job.source_settings.partition_span = 50000;
    let summary = ApplyBqsrPipeline::new(job).run().unwrap();
    assert_eq!(summary.partitions, 3);

    let shards = shard_names(&output);
    assert_eq!(
        shards,
        vec![
            "part-r-00000.bam".to_string(),
            "part-r-00001.bam".to_string(),
            "part-r-00002.bam".to_string()
        ]
    );
    let mut all_names = Vec::new();
    for shard in shards.iter() {
        let (_, records) = ArtificialReadUtils::read_all(&output.join(shard));
        all_names.extend(names(&records));
    }
    let (_, input_records) = ArtificialReadUtils::read_all(&fixture.input);
    all_names.sort();
    let mut input_names = names(&input_records);
    input_names.sort();
    assert_eq!(all_names, input_names);

    let manifest = ShardManifest::read_from(&output.join(SUCCESS_MANIFEST)).unwrap();
    assert_eq!(manifest.expected_shards, 3);
    assert_eq!(manifest.shards.len(), 3);
}

#[test]
fn test_consolidated_output_holds_back_a_bounded_number_of_partitions() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.bam");
    let mut job = fixture.job(&output);
    job.source_settings.partition_span = 50;
    let threads = job.threads;

    let summary = ApplyBqsrPipeline::new(job).run().unwrap();
    assert_eq!(summary.partitions, 401);
    assert_eq!(summary.records_written, 513);
    assert!(summary.max_buffered_partitions >= 1);
    assert!(
        summary.max_buffered_partitions <= threads * 2,
        "{} partitions were held back",
        summary.max_buffered_partitions
    );

    let (_, records) = ArtificialReadUtils::read_all(&output);
    let (_, input_records) = ArtificialReadUtils::read_all(&fixture.input);
    assert_eq!(names(&records), names(&input_records));
}

#[test]
fn test_two_inputs_fail_while_validating() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.bam");
    let mut job = fixture.job(&output);
    job.inputs.push(fixture.input.clone());
    let mut pipeline = ApplyBqsrPipeline::new(job);

    let err = pipeline.run().unwrap_err();
    assert_eq!(err.stage, PipelineStage::Validating);
    assert!(matches!(err.source, RecalError::Input { .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(
        pipeline.state(),
        PipelineState::Failed(PipelineStage::Validating)
    );
    assert!(!output.exists());
}

#[test]
fn test_missing_model_fails_before_output() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.bam");
    let job = ApplyBqsrJob::new(&fixture.input, &fixture.path("missing.json"), &output);

    let err = ApplyBqsrPipeline::new(job).run().unwrap_err();
    assert_eq!(err.stage, PipelineStage::Validating);
    assert!(matches!(err.source, RecalError::Input { .. }));
    assert!(!output.exists());
}

#[test]
fn test_malformed_model_fails_while_distributing() {
    let fixture = Fixture::new(true);
    fs::write(&fixture.model, "{\"global_delta\": [1, 2]}").unwrap();
    let output = fixture.path("out.bam");

    let err = ApplyBqsrPipeline::new(fixture.job(&output))
        .run()
        .unwrap_err();
    assert_eq!(err.stage, PipelineStage::Distributing);
    assert!(matches!(err.source, RecalError::ModelFormat { .. }));
    assert_eq!(err.exit_code(), 3);
    assert!(!output.exists());
}

#[test]
fn test_unknown_contig_fails_while_reading() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.bam");
    let mut job = fixture.job(&output);
    job.intervals = vec!["chr9:1-100".to_string()];

    let err = ApplyBqsrPipeline::new(job).run().unwrap_err();
    assert_eq!(err.stage, PipelineStage::Reading);
    assert!(matches!(err.source, RecalError::Input { .. }));
    assert!(!output.exists());
}

#[test]
fn test_missing_output_directory() {
    let fixture = Fixture::new(true);
    let output = fixture.path("no/such/dir/out.bam");

    let err = ApplyBqsrPipeline::new(fixture.job(&output))
        .run()
        .unwrap_err();
    assert_eq!(err.stage, PipelineStage::Validating);
    assert!(matches!(err.source, RecalError::Output { .. }));
}

#[test]
fn test_cancelled_job_leaves_no_consolidated_output() {
    let fixture = Fixture::new(true);
    let output = fixture.path("out.bam");
    let mut pipeline = ApplyBqsrPipeline::new(fixture.job(&output));
    pipeline.cancellation_token().cancel();

    let err = pipeline.run().unwrap_err();
    assert_eq!(err.stage, PipelineStage::Transforming);
    assert!(err.source.is_cancelled());
    assert_eq!(err.exit_code(), 130);
    assert!(!output.exists());

    let leftovers = fs::read_dir(fixture.dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(".recal-"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_cancelled_sharded_job_is_flagged_incomplete() {
    let fixture = Fixture::new(true);
    let output = fixture.path("shards");
    let mut job = fixture.job(&output);
    job.write_format = ReadsWriteFormat::Sharded;
    let mut pipeline = ApplyBqsrPipeline::new(job);
    pipeline.cancellation_token().cancel();

    let err = pipeline.run().unwrap_err();
    assert!(err.source.is_cancelled());
    assert!(!output.join(SUCCESS_MANIFEST).exists());

    let manifest = ShardManifest::read_from(&output.join(INCOMPLETE_MANIFEST)).unwrap();
    assert!(!manifest.complete);
    assert_eq!(manifest.expected_shards, 21);
    assert!(manifest.shards.is_empty());
}

#[test]
fn test_partitions_claim_each_read_once() {
    let fixture = Fixture::new(true);
    let settings = ReadsSourceSettings {
        partition_span: 300,
        io_threads: 1,
    };
    let source = ReadsSource::open(&[fixture.input.clone()], settings).unwrap();

    // reads starting at 980 and 990 overlap both regions, reads at 1000 and 1010 start in the gap
    let plan = source
        .partitions(&["chr1:1-1000".to_string(), "chr1:1021-2000".to_string()])
        .unwrap();
    let mut seen = Vec::new();
    for partition in plan.iter() {
        for read in source.read_partition(partition).unwrap() {
            assert_eq!(read.partition_index, partition.index);
            seen.push(String::from_utf8_lossy(read.name()).to_string());
        }
    }

    let unique = seen.iter().collect::<HashSet<_>>();
    assert_eq!(unique.len(), seen.len());
    // chr1 reads start every 10 bases, the last one overlapping chr1:1021-2000 starts at 1990
    assert_eq!(seen.len(), 200);
    assert!(unique.contains(&"chr1_100".to_string()));
}

#[test]
fn test_no_regions_cover_whole_reference() {
    let fixture = Fixture::new(true);
    let source =
        ReadsSource::open(&[fixture.input.clone()], ReadsSourceSettings::default()).unwrap();

    let regions = source.resolve_regions(&[]).unwrap();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[0].size(), 10000);
    assert_eq!(regions[1].size(), 10000);

    let plan = source.partitions(&[]).unwrap();
    let total = plan
        .iter()
        .map(|partition| source.read_partition(partition).unwrap().len())
        .sum::<usize>();
    assert_eq!(total, input_reads().len());
}

#[test]
fn test_multiple_inputs_rejected_by_source() {
    let fixture = Fixture::new(true);
    let err = ReadsSource::open(
        &[fixture.input.clone(), fixture.input.clone()],
        ReadsSourceSettings::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RecalError::Input { .. }));

    let err = ReadsSource::open(&[], ReadsSourceSettings::default()).unwrap_err();
    assert!(matches!(err, RecalError::Input { .. }));
}
