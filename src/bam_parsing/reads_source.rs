use rust_htslib::bam;
use rust_htslib::bam::{FetchDefinition, Read as BamRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::bam_parsing::collection_header::{CollectionHeader, SortOrder};
use crate::bam_parsing::partition::{PartitionPlan, PartitionSpan, ReadPartition};
use crate::reads::bird_tool_reads::BirdToolRead;
use crate::utils::errors::RecalError;
use crate::utils::interval_utils::IntervalUtils;
use crate::utils::simple_interval::SimpleInterval;

/// Default maximum number of reference bases covered by one partition
pub const DEFAULT_PARTITION_SPAN: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadsSourceSettings {
    pub partition_span: usize,
    /// htslib decompression threads per reader
    pub io_threads: usize,
}

impl Default for ReadsSourceSettings {
    fn default() -> Self {
        ReadsSourceSettings {
            partition_span: DEFAULT_PARTITION_SPAN,
            io_threads: 1,
        }
    }
}

#[derive(Debug)]
enum ReadAccess {
    /// Regions are fetched through the index at this path
    Indexed(PathBuf),
    /// The input cannot be indexed and is read front to back
    Sequential,
}

/**
 * A single alignment file opened for partitioned reading.
 *
 * The header is read once on open and shared with the rest of the job. Readers are not shared
 * between threads: every call to `read_partition` opens its own reader, so partitions can be
 * read concurrently from any worker.
 */
#[derive(Debug)]
pub struct ReadsSource {
    path: PathBuf,
    header: Arc<CollectionHeader>,
    access: ReadAccess,
    settings: ReadsSourceSettings,
    // Keeps a generated index alive for the lifetime of the source
    _index_dir: Option<TempDir>,
}

impl ReadsSource {
    /**
     * Open the one input of a job.
     *
     * Fails with an input error when zero or several inputs are given, when the file cannot be
     * opened as SAM/BAM, or when a BAM without index is not coordinate sorted.
     */
    pub fn open(
        inputs: &[PathBuf],
        settings: ReadsSourceSettings,
    ) -> Result<ReadsSource, RecalError> {
        let path = match inputs {
            [path] => path.clone(),
            [] => return Err(RecalError::input("No input file was given")),
            _ => {
                return Err(RecalError::input(format!(
                    "Exactly one input is supported, {} were given",
                    inputs.len()
                )))
            }
        };

        if !path.is_file() {
            return Err(RecalError::input(format!(
                "Input {} does not exist or is not a file",
                path.display()
            )));
        }

        let reader = bam::Reader::from_path(&path).map_err(|e| {
            RecalError::input(format!(
                "Unable to open {} as SAM/BAM: {}",
                path.display(),
                e
            ))
        })?;
        let header = Arc::new(CollectionHeader::from_header_view(reader.header())?);
        drop(reader);

        let (access, index_dir) = Self::locate_index(&path, &header, settings.io_threads)?;
        debug!(
            "Opened {} with {} contigs and {} read groups, access {:?}",
            path.display(),
            header.contigs().len(),
            header.read_groups().len(),
            access
        );

        Ok(ReadsSource {
            path,
            header,
            access,
            settings,
            _index_dir: index_dir,
        })
    }

    /**
     * Use an index next to the input if there is one, otherwise build a BAI in a temporary
     * directory. SAM input that cannot be indexed falls back to sequential scanning.
     */
    fn locate_index(
        path: &Path,
        header: &CollectionHeader,
        io_threads: usize,
    ) -> Result<(ReadAccess, Option<TempDir>), RecalError> {
        let path_str = path.to_string_lossy();
        let candidates = [
            PathBuf::from(format!("{}.bai", path_str)),
            PathBuf::from(format!("{}.csi", path_str)),
            path.with_extension("bai"),
        ];
        if let Some(index) = candidates.iter().find(|candidate| candidate.is_file()) {
            return Ok((ReadAccess::Indexed(index.clone()), None));
        }

        if Self::is_sam(path) {
            warn!(
                "{} is SAM and cannot be indexed, it will be read in a single partition",
                path.display()
            );
            return Ok((ReadAccess::Sequential, None));
        }

        match header.sort_order() {
            SortOrder::Queryname | SortOrder::Unsorted => {
                return Err(RecalError::input(format!(
                    "{} has no index and is not coordinate sorted",
                    path.display()
                )))
            }
            _ => {}
        }

        let index_dir = tempfile::Builder::new()
            .prefix("recal-index")
            .tempdir()
            .map_err(|e| {
                RecalError::input(format!("Unable to create index directory: {}", e))
            })?;
        let index_path = index_dir.path().join("input.bam.bai");

        info!("Building BAI index for {}", path.display());
        bam::index::build(
            path,
            Some(index_path.as_path()),
            bam::index::Type::Bai,
            std::cmp::max(io_threads, 1) as u32,
        )
        .map_err(|e| {
            RecalError::input(format!(
                "Unable to index {}, is it coordinate sorted? {}",
                path.display(),
                e
            ))
        })?;

        Ok((ReadAccess::Indexed(index_path), Some(index_dir)))
    }

    fn is_sam(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.eq_ignore_ascii_case("sam"))
            .unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Arc<CollectionHeader> {
        Arc::clone(&self.header)
    }

    /**
     * Parse, validate, sort and merge the requested intervals. With no intervals the whole
     * reference is returned.
     */
    pub fn resolve_regions(&self, intervals: &[String]) -> Result<Vec<SimpleInterval>, RecalError> {
        if intervals.is_empty() {
            return Ok(IntervalUtils::get_all_intervals_for_reference(&self.header));
        }

        let parsed = intervals
            .iter()
            .map(|interval| IntervalUtils::parse_interval(interval, &self.header))
            .collect::<Result<Vec<SimpleInterval>, RecalError>>()?;
        Ok(IntervalUtils::sort_and_merge_intervals(parsed))
    }

    /**
     * The partition plan for the given intervals. With no intervals every contig is covered and
     * one extra partition holds the unplaced unmapped reads. An input without index gets a
     * single partition so it is only read once.
     */
    pub fn partitions(&self, intervals: &[String]) -> Result<PartitionPlan, RecalError> {
        let regions = self.resolve_regions(intervals)?;
        let plan = match self.access {
            ReadAccess::Indexed(_) => PartitionPlan::from_regions(
                &regions,
                intervals.is_empty(),
                self.settings.partition_span,
            ),
            ReadAccess::Sequential => PartitionPlan::single_scan(&regions, intervals.is_empty()),
        };
        debug!(
            "Planned {} partitions over {} regions",
            plan.len(),
            regions.len()
        );
        Ok(plan)
    }

    /**
     * All reads claimed by the partition, in file order.
     */
    pub fn read_partition(
        &self,
        partition: &ReadPartition,
    ) -> Result<Vec<BirdToolRead>, RecalError> {
        match (&self.access, &partition.span) {
            (ReadAccess::Indexed(_), PartitionSpan::Scan { .. }) | (ReadAccess::Sequential, _) => {
                self.scan_partition(partition)
            }
            (ReadAccess::Indexed(index), _) => self.fetch_partition(index, partition),
        }
    }

    fn read_error(&self, e: rust_htslib::errors::Error) -> RecalError {
        RecalError::input(format!("Error reading {}: {}", self.path.display(), e))
    }

    fn fetch_partition(
        &self,
        index: &Path,
        partition: &ReadPartition,
    ) -> Result<Vec<BirdToolRead>, RecalError> {
        let mut reader = bam::IndexedReader::from_path_and_index(self.path.as_path(), index)
            .map_err(|e| self.read_error(e))?;
        if self.settings.io_threads > 1 {
            reader
                .set_threads(self.settings.io_threads)
                .map_err(|e| self.read_error(e))?;
        }

        match &partition.span {
            PartitionSpan::Interval { interval, .. } => reader.fetch(FetchDefinition::Region(
                interval.tid as i32,
                interval.start as i64,
                interval.end as i64,
            )),
            PartitionSpan::Unplaced => reader.fetch(FetchDefinition::Unmapped),
            PartitionSpan::Scan { .. } => reader.fetch(FetchDefinition::All),
        }
        .map_err(|e| self.read_error(e))?;

        Self::collect_claimed(reader.records(), partition)
            .map_err(|e| self.read_error(e))
    }

    fn scan_partition(&self, partition: &ReadPartition) -> Result<Vec<BirdToolRead>, RecalError> {
        let mut reader = bam::Reader::from_path(&self.path).map_err(|e| self.read_error(e))?;
        if self.settings.io_threads > 1 {
            reader
                .set_threads(self.settings.io_threads)
                .map_err(|e| self.read_error(e))?;
        }

        Self::collect_claimed(reader.records(), partition)
            .map_err(|e| self.read_error(e))
    }

    fn collect_claimed<I>(
        records: I,
        partition: &ReadPartition,
    ) -> Result<Vec<BirdToolRead>, rust_htslib::errors::Error>
    where
        I: Iterator<Item = Result<bam::Record, rust_htslib::errors::Error>>,
    {
        let mut reads = Vec::new();
        for record in records {
            let read = BirdToolRead::new(record?, partition.index);
            if partition.claims(&read) {
                reads.push(read);
            }
        }
        Ok(reads)
    }
}
