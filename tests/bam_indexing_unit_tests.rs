extern crate recal_genome;
extern crate rust_htslib;
extern crate tempfile;

use recal_genome::bam_parsing::collection_header::{CollectionHeader, SortOrder};
use recal_genome::bam_parsing::reads_source::{ReadsSource, ReadsSourceSettings};
use recal_genome::reads::bird_tool_reads::BirdToolRead;
use recal_genome::test_utils::artificial_read_utils::*;
use recal_genome::utils::errors::RecalError;
use recal_genome::utils::simple_interval::Locatable;

fn reads() -> Vec<BirdToolRead> {
    (0..200)
        .map(|i| {
            ArtificialReadUtils::create_simple_read(
                &format!("read_{}", i),
                0,
                i as i64 * 25,
                100,
                30,
                None,
            )
        })
        .collect()
}

fn header() -> CollectionHeader {
    ArtificialReadUtils::create_header(&[("contig_1", 10000)], &[])
}

fn settings(partition_span: usize) -> ReadsSourceSettings {
    ReadsSourceSettings {
        partition_span,
        io_threads: 1,
    }
}

#[test]
fn test_fetch_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reads.bam");
    ArtificialReadUtils::write_indexed_bam(&path, &header(), &reads());

    let source = ReadsSource::open(&[path], settings(1000)).unwrap();
    let plan = source
        .partitions(&["contig_1:1001-2000".to_string()])
        .unwrap();
    assert_eq!(plan.len(), 1);

    let fetched = source.read_partition(plan.get(0).unwrap()).unwrap();
    // the first span of the first region claims reads reaching in from the left
    assert_eq!(fetched.first().unwrap().get_start(), 925);
    assert_eq!(fetched.last().unwrap().get_start(), 1975);
    assert!(fetched.iter().all(|read| read.get_start() < 2000));
    assert_eq!(fetched.len(), 43);
}

#[test]
fn test_sam_input_is_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reads.sam");
    ArtificialReadUtils::write_reads(&path, &header(), &reads());

    let source = ReadsSource::open(&[path], settings(1000)).unwrap();

    // the whole file is read once
    let plan = source.partitions(&[]).unwrap();
    assert_eq!(plan.len(), 1);
    let all_reads = source.read_partition(plan.get(0).unwrap()).unwrap();
    assert_eq!(all_reads.len(), 200);

    let plan = source
        .partitions(&["contig_1:1001-2000".to_string(), "contig_1:3001-3100".to_string()])
        .unwrap();
    assert_eq!(plan.len(), 1);
    let region_reads = source.read_partition(plan.get(0).unwrap()).unwrap();
    // 43 reads overlap the first region, reads starting at 2925..=3075 overlap the second
    assert_eq!(region_reads.len(), 43 + 7);
    assert!(region_reads
        .windows(2)
        .all(|pair| pair[0].get_start() < pair[1].get_start()));
}

#[test]
fn test_unindexed_queryname_sorted_bam_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reads.bam");
    let header =
        CollectionHeader::from_text(b"@HD\tVN:1.6\tSO:queryname\n@SQ\tSN:contig_1\tLN:10000\n")
            .unwrap();
    assert_eq!(header.sort_order(), SortOrder::Queryname);
    ArtificialReadUtils::write_reads(&path, &header, &reads());

    let err = ReadsSource::open(&[path], settings(1000)).unwrap_err();
    assert!(matches!(err, RecalError::Input { .. }));
}

#[test]
fn test_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReadsSource::open(&[dir.path().join("nothing.bam")], settings(1000)).unwrap_err();
    assert!(matches!(err, RecalError::Input { .. }));
}
