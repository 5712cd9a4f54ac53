use crate::bam_parsing::collection_header::CollectionHeader;
use crate::reads::bird_tool_reads::BirdToolRead;
use crate::utils::simple_interval::{CoordMath, Locatable, SimpleInterval};

/**
 * The part of the input a partition is responsible for.
 *
 * An interval partition covers `interval` and claims the reads starting in
 * [claim_start, interval.end). `claim_start` only differs from the interval start for the first
 * span of a region, where it reaches back to the end of the previous region on the contig so
 * reads overlapping the region from the left are still yielded exactly once.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSpan {
    Interval {
        interval: SimpleInterval,
        claim_start: usize,
    },
    /// Reads with no reference position
    Unplaced,
    /// Every read of the merged regions in one pass over an input that cannot be fetched from
    Scan {
        regions: Vec<SimpleInterval>,
        include_unplaced: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPartition {
    pub index: usize,
    pub span: PartitionSpan,
}

impl ReadPartition {
    /**
     * @return true if the read belongs to this partition. Every read of the input is claimed by
     * at most one partition of a plan.
     */
    pub fn claims(&self, read: &BirdToolRead) -> bool {
        match &self.span {
            PartitionSpan::Unplaced => read.tid() < 0,
            PartitionSpan::Interval {
                interval,
                claim_start,
            } => {
                Self::overlaps_interval(read, interval)
                    && read.get_start() >= *claim_start
                    && read.get_start() < interval.get_end()
            }
            PartitionSpan::Scan {
                regions,
                include_unplaced,
            } => {
                if read.tid() < 0 {
                    *include_unplaced
                } else {
                    regions
                        .iter()
                        .any(|region| Self::overlaps_interval(read, region))
                }
            }
        }
    }

    fn overlaps_interval(read: &BirdToolRead, interval: &SimpleInterval) -> bool {
        read.tid() == interval.tid() as i32
            && read.read.pos() >= 0
            && CoordMath::overlaps(
                read.get_start(),
                read.get_end(),
                interval.get_start(),
                interval.get_end(),
            )
    }

    /// 1-based inclusive description of the span, e.g. `chr1:1-1000`
    pub fn describe(&self, header: &CollectionHeader) -> String {
        match &self.span {
            PartitionSpan::Unplaced => "unmapped".to_string(),
            PartitionSpan::Scan { .. } => "all".to_string(),
            PartitionSpan::Interval { interval, .. } => format!(
                "{}:{}-{}",
                header.contig_name(interval.tid).unwrap_or("?"),
                interval.start + 1,
                interval.end
            ),
        }
    }
}

/**
 * The ordered list of partitions of one job. Partition indices are positions in this list and
 * also decide shard numbering and the order of the consolidated output.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    partitions: Vec<ReadPartition>,
}

impl PartitionPlan {
    /**
     * Split every region into consecutive spans of at most `partition_span` bases.
     *
     * @param regions sorted, merged, non-empty regions
     * @param include_unplaced add a final partition for reads without a reference position
     * @param partition_span maximum span of a partition, zero is treated as one
     */
    pub fn from_regions(
        regions: &[SimpleInterval],
        include_unplaced: bool,
        partition_span: usize,
    ) -> PartitionPlan {
        let partition_span = std::cmp::max(partition_span, 1);
        let mut partitions = Vec::new();
        let mut previous: Option<&SimpleInterval> = None;

        for region in regions {
            let region_claim_start = match previous {
                Some(prev) if prev.tid == region.tid => prev.end,
                _ => 0,
            };

            let mut start = region.start;
            while start < region.end {
                let end = std::cmp::min(start.saturating_add(partition_span), region.end);
                let claim_start = if start == region.start {
                    region_claim_start
                } else {
                    start
                };
                partitions.push(ReadPartition {
                    index: partitions.len(),
                    span: PartitionSpan::Interval {
                        interval: SimpleInterval::new(region.tid, start, end),
                        claim_start,
                    },
                });
                start = end;
            }
            previous = Some(region);
        }

        if include_unplaced {
            partitions.push(ReadPartition {
                index: partitions.len(),
                span: PartitionSpan::Unplaced,
            });
        }

        PartitionPlan { partitions }
    }

    /**
     * A single partition covering all regions, for inputs that can only be read front to back.
     */
    pub fn single_scan(regions: &[SimpleInterval], include_unplaced: bool) -> PartitionPlan {
        PartitionPlan {
            partitions: vec![ReadPartition {
                index: 0,
                span: PartitionSpan::Scan {
                    regions: regions.to_vec(),
                    include_unplaced,
                },
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReadPartition> {
        self.partitions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadPartition> {
        self.partitions.iter()
    }

    pub fn partitions(&self) -> &[ReadPartition] {
        &self.partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_split_into_spans() {
        let regions = vec![
            SimpleInterval::new(0, 0, 250),
            SimpleInterval::new(0, 400, 500),
            SimpleInterval::new(1, 100, 200),
        ];
        let plan = PartitionPlan::from_regions(&regions, true, 100);

        assert_eq!(plan.len(), 3 + 1 + 1 + 1);
        assert_eq!(
            plan.get(2).unwrap().span,
            PartitionSpan::Interval {
                interval: SimpleInterval::new(0, 200, 250),
                claim_start: 200
            }
        );
        assert_eq!(
            plan.get(3).unwrap().span,
            PartitionSpan::Interval {
                interval: SimpleInterval::new(0, 400, 500),
                claim_start: 250
            }
        );
        assert_eq!(
            plan.get(4).unwrap().span,
            PartitionSpan::Interval {
                interval: SimpleInterval::new(1, 100, 200),
                claim_start: 0
            }
        );
        assert_eq!(plan.get(5).unwrap().span, PartitionSpan::Unplaced);
        assert!(plan.iter().enumerate().all(|(i, p)| p.index == i));
    }

    #[test]
    fn single_scan_claims_every_overlapping_read_once() {
        let regions = vec![SimpleInterval::new(0, 0, 100), SimpleInterval::new(0, 200, 300)];
        let plan = PartitionPlan::from_regions(&regions, false, 10);
        let scan = PartitionPlan::single_scan(&regions, false);
        assert_eq!(scan.len(), 1);

        let reads = (0..40)
            .map(|i| {
                crate::test_utils::artificial_read_utils::ArtificialReadUtils::create_simple_read(
                    "read", 0, i * 10, 20, 30, None,
                )
            })
            .collect::<Vec<_>>();
        for read in reads.iter() {
            let claimed_by_plan = plan.iter().filter(|p| p.claims(read)).count();
            assert!(claimed_by_plan <= 1);
            assert_eq!(scan.get(0).unwrap().claims(read), claimed_by_plan == 1);
        }
    }
}
