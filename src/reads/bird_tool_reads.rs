use rust_htslib::bam::record::{Aux, Record};

use crate::utils::quality_utils::QualityUtils;
use crate::utils::simple_interval::Locatable;

/**
 * Unified read type used throughout the recalibration engine.
 *
 * Wraps rust_htslib's {@link Record} together with the index of the partition it was read from.
 * The partition index decides where the read is placed on output: its position in the
 * consolidated file, or the shard it is written to.
 *
 * A BirdToolRead is owned by exactly one worker while it is transformed and is moved into the
 * sink afterwards.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct BirdToolRead {
    pub read: Record,
    pub partition_index: usize,
}

impl BirdToolRead {
    pub const READ_GROUP_TAG: &'static [u8] = b"RG";
    pub const ORIGINAL_QUALITY_TAG: &'static [u8] = b"OQ";

    pub fn new(read: Record, partition_index: usize) -> BirdToolRead {
        BirdToolRead {
            read,
            partition_index,
        }
    }

    pub fn name(&self) -> &[u8] {
        self.read.qname()
    }

    pub fn len(&self) -> usize {
        self.read.seq_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_unmapped(&self) -> bool {
        self.read.is_unmapped()
    }

    pub fn is_reverse_strand(&self) -> bool {
        self.read.is_reverse()
    }

    /**
     * @return true if this read is the second read of a pair. Reads that are not paired are
     * treated as first of pair.
     */
    pub fn is_second_of_pair(&self) -> bool {
        self.read.is_paired() && self.read.is_last_in_template()
    }

    /// Read bases as ASCII, in reference orientation
    pub fn bases(&self) -> Vec<u8> {
        self.read.seq().as_bytes()
    }

    pub fn base_qualities(&self) -> &[u8] {
        self.read.qual()
    }

    pub fn has_base_qualities(&self) -> bool {
        !self.read.qual().is_empty() && !QualityUtils::quals_missing(self.read.qual())
    }

    /**
     * Overwrite the base qualities in place. The length must match the read length.
     */
    pub fn set_base_qualities(&mut self, quals: &[u8]) {
        self.read.qual_mut().copy_from_slice(quals);
    }

    /// The value of the RG tag, if present and a string
    pub fn get_read_group(&self) -> Option<String> {
        match self.read.aux(Self::READ_GROUP_TAG) {
            Ok(Aux::String(read_group)) => Some(read_group.to_string()),
            _ => None,
        }
    }

    /// Decoded qualities stored in the OQ tag, if present
    pub fn get_original_base_qualities(&self) -> Option<Vec<u8>> {
        match self.read.aux(Self::ORIGINAL_QUALITY_TAG) {
            Ok(Aux::String(encoded)) => Some(QualityUtils::fastq_string_to_phred(encoded)),
            _ => None,
        }
    }

    pub fn has_original_base_qualities(&self) -> bool {
        self.read.aux(Self::ORIGINAL_QUALITY_TAG).is_ok()
    }

    /**
     * Store quals in the OQ tag unless the read already carries one. Returns false if htslib
     * refused to append the tag.
     */
    pub fn set_original_base_qualities(&mut self, quals: &[u8]) -> bool {
        if self.has_original_base_qualities() {
            return true;
        }
        let encoded = QualityUtils::phred_to_fastq_string(quals);
        self.read
            .push_aux(Self::ORIGINAL_QUALITY_TAG, Aux::String(&encoded))
            .is_ok()
    }
}

impl Locatable for BirdToolRead {
    fn tid(&self) -> i32 {
        self.read.tid()
    }

    fn get_start(&self) -> usize {
        std::cmp::max(self.read.pos(), 0) as usize
    }

    fn get_end(&self) -> usize {
        let end = std::cmp::max(self.read.cigar().end_pos(), self.read.pos() + 1);
        std::cmp::max(end, 0) as usize
    }
}
