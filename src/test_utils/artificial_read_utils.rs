use rust_htslib::bam;
use rust_htslib::bam::record::{Aux, CigarString, Record};
use rust_htslib::bam::Read;
use std::convert::TryFrom;
use std::path::Path;

use crate::bam_parsing::collection_header::CollectionHeader;
use crate::reads::bird_tool_reads::BirdToolRead;

pub static DEFAULT_SAMPLE_NAME: &str = "SampleX";

/// SAM flags used when building artificial reads
pub const FLAG_PAIRED: u16 = 0x1;
pub const FLAG_UNMAPPED: u16 = 0x4;
pub const FLAG_REVERSE: u16 = 0x10;
pub const FLAG_FIRST_OF_PAIR: u16 = 0x40;
pub const FLAG_SECOND_OF_PAIR: u16 = 0x80;

/**
 * Builds reads, headers and small alignment files for tests.
 */
pub struct ArtificialReadUtils {}

impl ArtificialReadUtils {
    pub const DEFAULT_READ_LENGTH: usize = 50;

    /**
     * SAM header text with one @SQ line per contig and one @RG line per read group
     */
    pub fn header_text(contigs: &[(&str, usize)], read_groups: &[&str]) -> String {
        let mut text = String::from("@HD\tVN:1.6\tSO:coordinate\n");
        for (name, length) in contigs {
            text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", name, length));
        }
        for read_group in read_groups {
            text.push_str(&format!(
                "@RG\tID:{}\tSM:{}\tPL:ILLUMINA\n",
                read_group, DEFAULT_SAMPLE_NAME
            ));
        }
        text
    }

    pub fn create_header(contigs: &[(&str, usize)], read_groups: &[&str]) -> CollectionHeader {
        CollectionHeader::from_text(Self::header_text(contigs, read_groups).as_bytes())
            .expect("artificial header should parse")
    }

    /**
     * A mapped read with an all-match cigar.
     *
     * @param tid contig index, -1 for an unplaced read
     * @param pos 0-based alignment start, -1 for an unplaced read
     * @param flags SAM flags
     * @param read_group value of the RG tag, if any
     */
    pub fn create_artificial_read(
        name: &str,
        tid: i32,
        pos: i64,
        bases: &[u8],
        quals: &[u8],
        flags: u16,
        read_group: Option<&str>,
    ) -> BirdToolRead {
        let mut record = Record::new();
        let cigar = if flags & FLAG_UNMAPPED != 0 {
            None
        } else {
            Some(
                CigarString::try_from(format!("{}M", bases.len()).as_str())
                    .expect("valid cigar"),
            )
        };
        record.set(name.as_bytes(), cigar.as_ref(), bases, quals);
        record.set_tid(tid);
        record.set_pos(pos);
        record.set_mtid(-1);
        record.set_mpos(-1);
        record.set_mapq(if flags & FLAG_UNMAPPED != 0 { 0 } else { 60 });
        record.set_flags(flags);
        let end = match &cigar {
            Some(_) => pos + bases.len() as i64,
            None => pos + 1,
        };
        record.set_bin(Self::reg2bin(pos, end));
        if let Some(read_group) = read_group {
            record
                .push_aux(BirdToolRead::READ_GROUP_TAG, Aux::String(read_group))
                .expect("RG tag");
        }

        BirdToolRead::new(record, 0)
    }

    /// UCSC binning scheme bin of the half-open region [beg, end), as stored in BAM records
    pub fn reg2bin(beg: i64, end: i64) -> u16 {
        if beg < 0 {
            return 4680;
        }
        let end = end - 1;
        let bin = if beg >> 14 == end >> 14 {
            ((1 << 15) - 1) / 7 + (beg >> 14)
        } else if beg >> 17 == end >> 17 {
            ((1 << 12) - 1) / 7 + (beg >> 17)
        } else if beg >> 20 == end >> 20 {
            ((1 << 9) - 1) / 7 + (beg >> 20)
        } else if beg >> 23 == end >> 23 {
            ((1 << 6) - 1) / 7 + (beg >> 23)
        } else if beg >> 26 == end >> 26 {
            ((1 << 3) - 1) / 7 + (beg >> 26)
        } else {
            0
        };
        bin as u16
    }

    /// `length` bases cycling through ACGT, all with quality `qual`
    pub fn create_simple_read(
        name: &str,
        tid: i32,
        pos: i64,
        length: usize,
        qual: u8,
        read_group: Option<&str>,
    ) -> BirdToolRead {
        let bases = (0..length)
            .map(|i| b"ACGT"[i % 4])
            .collect::<Vec<u8>>();
        let quals = vec![qual; length];
        Self::create_artificial_read(name, tid, pos, &bases, &quals, 0, read_group)
    }

    /**
     * Write reads to an alignment file. Reads must already be in the order they should appear,
     * and coordinate sorted if the file is to be indexed.
     */
    pub fn write_reads(path: &Path, header: &CollectionHeader, reads: &[BirdToolRead]) {
        let format = match path.extension() {
            Some(ext) if ext == "sam" => bam::Format::Sam,
            _ => bam::Format::Bam,
        };
        let mut writer = bam::Writer::from_path(path, &header.to_htslib_header(), format)
            .expect("open artificial output");
        for read in reads {
            writer.write(&read.read).expect("write artificial read");
        }
    }

    /// Write reads to a BAM and index it
    pub fn write_indexed_bam(path: &Path, header: &CollectionHeader, reads: &[BirdToolRead]) {
        Self::write_reads(path, header, reads);
        bam::index::build(path, None, bam::index::Type::Bai, 1).expect("index artificial bam");
    }

    /// Every record of an alignment file, in file order
    pub fn read_all(path: &Path) -> (CollectionHeader, Vec<Record>) {
        let mut reader = bam::Reader::from_path(path).expect("open alignment file");
        let header =
            CollectionHeader::from_header_view(reader.header()).expect("readable header");
        let records = reader
            .records()
            .map(|record| record.expect("readable record"))
            .collect();
        (header, records)
    }
}
