use itertools::Itertools;

use crate::bam_parsing::collection_header::CollectionHeader;
use crate::utils::errors::RecalError;
use crate::utils::simple_interval::SimpleInterval;

pub struct IntervalUtils {}

impl IntervalUtils {
    /**
     * Create a new interval, bounding start and stop by the start and end of contig
     *
     * This function will return None if start and stop cannot be adjusted in any reasonable way
     * to be on the contig.  For example, if start and stop are both past the end of the contig,
     * there's no way to fix this, and None will be returned.
     *
     * @param tid our contig
     * @param start our start
     * @param stop our exclusive stop
     * @param contig_length length of the contig
     * @return a valid interval over contig, or None if a meaningful interval cannot be created
     */
    pub fn trim_interval_to_contig(
        tid: usize,
        start: usize,
        stop: usize,
        contig_length: usize,
    ) -> Option<SimpleInterval> {
        let bounded_stop = std::cmp::min(contig_length, stop);

        if start >= bounded_stop {
            None
        } else {
            Some(SimpleInterval::new(tid, start, bounded_stop))
        }
    }

    /**
     * Generates a list of intervals, one per contig, that together cover the entire reference
     * described by the header's sequence dictionary. Zero length contigs contribute nothing.
     */
    pub fn get_all_intervals_for_reference(header: &CollectionHeader) -> Vec<SimpleInterval> {
        header
            .contigs()
            .iter()
            .enumerate()
            .filter(|(_, contig)| contig.length > 0)
            .map(|(tid, contig)| SimpleInterval::new(tid, 0, contig.length))
            .collect()
    }

    /**
     * Sorts intervals by dictionary order and merges any that overlap or abut. The result is a
     * list of disjoint intervals in (contig, start) order.
     */
    pub fn sort_and_merge_intervals(intervals: Vec<SimpleInterval>) -> Vec<SimpleInterval> {
        intervals
            .into_iter()
            .filter(|interval| !interval.is_empty())
            .sorted()
            .coalesce(|previous, current| {
                if previous.contiguous(&current) {
                    Ok(SimpleInterval::new(
                        previous.tid,
                        previous.start,
                        std::cmp::max(previous.end, current.end),
                    ))
                } else {
                    Err((previous, current))
                }
            })
            .collect()
    }

    /**
     * Parse an interval string of the form `contig`, `contig:start` or `contig:start-end`.
     * Coordinates in the string are 1-based and inclusive, as printed by samtools, the returned
     * interval is 0-based and half-open. Intervals are clipped to the contig length.
     */
    pub fn parse_interval(
        interval_str: &str,
        header: &CollectionHeader,
    ) -> Result<SimpleInterval, RecalError> {
        let interval_str = interval_str.trim();
        if interval_str.is_empty() {
            return Err(RecalError::input("Empty interval string"));
        }

        // Whole contig names may themselves contain ':', so try the full string first
        if let Some(tid) = header.tid(interval_str) {
            let length = header.contigs()[tid].length;
            return Self::trim_interval_to_contig(tid, 0, length, length).ok_or_else(|| {
                RecalError::input(format!("Contig {} has zero length", interval_str))
            });
        }

        let (contig, range) = interval_str
            .rsplit_once(SimpleInterval::CONTIG_SEPARATOR)
            .ok_or_else(|| {
                RecalError::input(format!(
                    "Contig {} is not present in the sequence dictionary",
                    interval_str
                ))
            })?;
        let tid = header.tid(contig).ok_or_else(|| {
            RecalError::input(format!(
                "Contig {} is not present in the sequence dictionary",
                contig
            ))
        })?;
        let length = header.contigs()[tid].length;

        let parse_position = |value: &str| -> Result<usize, RecalError> {
            value
                .replace(',', "")
                .parse::<usize>()
                .map_err(|e| {
                    RecalError::input(format!(
                        "Invalid position '{}' in interval {}: {}",
                        value, interval_str, e
                    ))
                })
        };

        let (start, end) = match range.split_once(SimpleInterval::START_END_SEPARATOR) {
            Some((start, end)) => (parse_position(start)?, parse_position(end)?),
            None => (parse_position(range)?, length),
        };

        if start == 0 || end < start {
            return Err(RecalError::input(format!(
                "Invalid interval {}: positions are 1-based and start must not exceed end",
                interval_str
            )));
        }

        Self::trim_interval_to_contig(tid, start - 1, end, length).ok_or_else(|| {
            RecalError::input(format!(
                "Interval {} lies outside of contig {} (length {})",
                interval_str, contig, length
            ))
        })
    }
}
