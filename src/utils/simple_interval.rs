use std::cmp::{max, min, Ordering};
use std::fmt::Debug;

use crate::utils::errors::RecalError;

/**
* Minimal immutable class representing a 0-based, half-open genomic interval [start, end)
* on the contig with index `tid` in the header's sequence dictionary.
*
* Zero length intervals are not produced by the interval utilities, but the type can hold one
* so that user input can be validated after construction.
*/
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SimpleInterval {
    pub(crate) tid: usize,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl SimpleInterval {
    pub const CONTIG_SEPARATOR: char = ':';
    pub const START_END_SEPARATOR: char = '-';

    /**
     * Create a new immutable 0-based interval of the form [start, end)
     * @param tid index of the contig in the sequence dictionary
     * @param start 0-based inclusive start position
     * @param end 0-based exclusive end position
     */
    pub fn new(tid: usize, start: usize, end: usize) -> SimpleInterval {
        SimpleInterval { tid, start, end }
    }

    pub fn get_contig(&self) -> usize {
        self.tid
    }

    /**
     * @return true iff this and other are on the same contig
     */
    pub fn contigs_match<L: Locatable>(&self, other: &L) -> bool {
        self.tid as i32 == other.tid()
    }

    /**
     * @return number of bases covered by this interval
     */
    pub fn size(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /**
     * Determines whether this interval contains the entire region represented by other
     */
    pub fn contains(&self, other: &SimpleInterval) -> bool {
        self.contigs_match(other)
            && CoordMath::encloses(self.start, self.end, other.start, other.end)
    }

    /**
     * Returns a new SimpleInterval that represents the region between the endpoints of this and other.
     * The two intervals do not need to be contiguous but must share a contig.
     */
    pub fn span_with(&self, other: &Self) -> Result<SimpleInterval, RecalError> {
        if !self.contigs_match(other) {
            return Err(RecalError::input(format!(
                "Cannot get span for intervals on different contigs {:?} {:?}",
                self, other
            )));
        }
        Ok(SimpleInterval::new(
            self.tid,
            min(self.start, other.start),
            max(self.end, other.end),
        ))
    }

    /**
     * Returns the intersection of the two intervals, None if they do not overlap.
     */
    pub fn intersect(&self, that: &Self) -> Option<SimpleInterval> {
        if !self.overlaps(that) {
            return None;
        }

        Some(SimpleInterval::new(
            self.tid,
            max(self.start, that.start),
            min(self.end, that.end),
        ))
    }

    /**
     * Returns a new SimpleInterval that represents the entire span of this and that.  Requires that
     * this and that SimpleInterval are contiguous (overlapping or abutting).
     */
    pub fn merge_with_contiguous(&self, that: &Self) -> Result<SimpleInterval, RecalError> {
        if !self.contiguous(that) {
            return Err(RecalError::input(format!(
                "The two intervals need to be contiguous: {:?} {:?}",
                self, that
            )));
        };

        self.span_with(that)
    }

    pub fn contiguous(&self, that: &Self) -> bool {
        self.tid == that.tid && self.start <= that.end && that.start <= self.end
    }
}

impl Ord for SimpleInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tid
            .cmp(&other.tid)
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for SimpleInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct CoordMath {}

impl CoordMath {
    pub fn get_length(start: usize, end: usize) -> usize {
        end.saturating_sub(start)
    }

    /**
     * Checks to see if the two half-open ranges have any overlap.
     */
    pub fn overlaps(start: usize, end: usize, start2: usize, end2: usize) -> bool {
        start < end2 && start2 < end
    }

    /** Returns true if the "inner" coords are totally enclosed by the "outer" coords. */
    pub fn encloses(
        outer_start: usize,
        outer_end: usize,
        inner_start: usize,
        inner_end: usize,
    ) -> bool {
        inner_start >= outer_start && inner_end <= outer_end
    }

    /**
     * Determines the read cycle number for the base
     *
     *  @param isNegativeStrand true if the read is negative strand
     *  @param readLength
     *  @param readBaseIndex the 0-based index of the read base in question
     */
    pub fn get_cycle(
        is_negative_strand: bool,
        read_length: usize,
        read_base_index: usize,
    ) -> usize {
        if is_negative_strand {
            read_length - read_base_index
        } else {
            read_base_index + 1
        }
    }
}

/// Anything with a half-open position on a contig of the sequence dictionary
pub trait Locatable: Clone + Debug {
    fn tid(&self) -> i32;

    fn get_start(&self) -> usize;

    /// Exclusive end
    fn get_end(&self) -> usize;

    fn overlaps<L: Locatable>(&self, other: &L) -> bool {
        self.tid() == other.tid()
            && CoordMath::overlaps(
                self.get_start(),
                self.get_end(),
                other.get_start(),
                other.get_end(),
            )
    }

    fn contains<L: Locatable>(&self, other: &L) -> bool {
        self.tid() == other.tid()
            && self.get_start() <= other.get_start()
            && self.get_end() >= other.get_end()
    }

    fn get_length_on_reference(&self) -> usize {
        CoordMath::get_length(self.get_start(), self.get_end())
    }
}

impl Locatable for SimpleInterval {
    fn tid(&self) -> i32 {
        self.tid as i32
    }

    fn get_start(&self) -> usize {
        self.start
    }

    fn get_end(&self) -> usize {
        self.end
    }
}
