use crossbeam_channel::{bounded, Receiver, Sender};
use rust_htslib::bam;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tempfile::NamedTempFile;

use crate::bam_parsing::collection_header::CollectionHeader;
use crate::bam_parsing::partition::{PartitionPlan, ReadPartition};
use crate::reads::bird_tool_reads::BirdToolRead;
use crate::utils::errors::RecalError;

pub const SUCCESS_MANIFEST: &str = "_SUCCESS";
pub const INCOMPLETE_MANIFEST: &str = "_INCOMPLETE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadsWriteFormat {
    /// One file, reads in partition order
    Single,
    /// One file per partition in an output directory
    Sharded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    pub shard: String,
    pub partition: usize,
    pub span: String,
    pub records: u64,
}

/**
 * Written next to the shards of a sharded output. `complete` is only true in `_SUCCESS`.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub complete: bool,
    pub expected_shards: usize,
    pub shards: Vec<ShardEntry>,
}

impl ShardManifest {
    pub fn read_from(path: &Path) -> Result<ShardManifest, RecalError> {
        let file = File::open(path).map_err(|e| RecalError::input(e.to_string()))?;
        serde_json::from_reader(file).map_err(|e| RecalError::input(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    pub location: PathBuf,
    pub format: ReadsWriteFormat,
    pub records_written: u64,
    pub shards_written: usize,
    /// Most partitions the consolidated writer held at once while waiting for earlier ones
    pub max_buffered_partitions: usize,
}

const SHARD_PREFIX: &str = "part-r-";

pub fn shard_name(partition_index: usize) -> String {
    format!("{}{:05}.bam", SHARD_PREFIX, partition_index)
}

/// Shards and shard temp files, as left behind by an earlier run into the same directory
fn is_shard_file(name: &str) -> bool {
    let name = name.strip_prefix('.').unwrap_or(name);
    name.starts_with(SHARD_PREFIX)
}

/// SAM when the file name ends in `.sam`, BAM otherwise
pub fn output_format_for(path: &Path) -> bam::Format {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("sam") => bam::Format::Sam,
        _ => bam::Format::Bam,
    }
}

fn open_writer(
    path: &Path,
    header: &CollectionHeader,
    format: bam::Format,
    io_threads: usize,
    location: &Path,
) -> Result<bam::Writer, RecalError> {
    let mut writer = bam::Writer::from_path(path, &header.to_htslib_header(), format)
        .map_err(|e| RecalError::output(location, e.to_string()))?;
    if io_threads > 1 {
        writer
            .set_threads(io_threads)
            .map_err(|e| RecalError::output(location, e.to_string()))?;
    }
    Ok(writer)
}

#[derive(Debug, Default)]
struct WriteProgress {
    next_partition: usize,
    writer_stopped: bool,
    closed: bool,
}

/**
 * Limits how far workers may run ahead of the consolidated writer. A partition may only be
 * handed over once it is less than `size` partitions ahead of the next partition to be
 * written, so at most `size` transformed partitions are ever waiting in memory.
 */
#[derive(Debug)]
struct OrderWindow {
    size: usize,
    progress: Mutex<WriteProgress>,
    advanced: Condvar,
}

impl OrderWindow {
    fn new(size: usize) -> OrderWindow {
        OrderWindow {
            size: std::cmp::max(size, 1),
            progress: Mutex::new(WriteProgress::default()),
            advanced: Condvar::new(),
        }
    }

    fn poisoned(location: &Path) -> RecalError {
        RecalError::output(location, "Consolidated writer state is poisoned")
    }

    /// Block until the partition may be handed to the writer
    fn wait_for_turn(&self, index: usize, location: &Path) -> Result<(), RecalError> {
        let mut progress = self
            .progress
            .lock()
            .map_err(|_| Self::poisoned(location))?;
        loop {
            if progress.closed {
                return Err(RecalError::Cancelled {
                    completed: 0,
                    total: 0,
                });
            }
            if progress.writer_stopped {
                return Err(RecalError::output(
                    location,
                    "Consolidated writer stopped early",
                ));
            }
            if index < progress.next_partition + self.size {
                return Ok(());
            }
            progress = self
                .advanced
                .wait(progress)
                .map_err(|_| Self::poisoned(location))?;
        }
    }

    fn update<F: FnOnce(&mut WriteProgress)>(&self, f: F) {
        let mut progress = match self.progress.lock() {
            Ok(progress) => progress,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut progress);
        self.advanced.notify_all();
    }
}

#[derive(Debug, Default)]
struct WriterTotals {
    records_written: u64,
    partitions_written: usize,
    max_buffered_partitions: usize,
}

/// A partition waiting for its turn in the consolidated output
struct PendingPartition {
    index: usize,
    reads: Vec<BirdToolRead>,
}

impl PartialEq for PendingPartition {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for PendingPartition {}

impl PartialOrd for PendingPartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingPartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

struct ConsolidatedWriter {
    sender: Option<Sender<PendingPartition>>,
    handle: Option<JoinHandle<Result<WriterTotals, RecalError>>>,
    window: Arc<OrderWindow>,
    temp_file: NamedTempFile,
}

struct ShardedWriter {
    completed: Mutex<Vec<ShardEntry>>,
    expected_shards: usize,
}

enum SinkState {
    Single(ConsolidatedWriter),
    Sharded(ShardedWriter),
}

/**
 * Materializes transformed partitions.
 *
 * `Single` output streams partitions to a writer thread which restores partition order and
 * writes a temporary file in the output directory. The file only appears under its final name
 * once every partition was written. Workers handing over a partition too far ahead of the
 * writer block until it catches up, so partitions must be produced roughly in index order.
 * `Sharded` output writes one complete file per partition from the calling worker and records
 * it in a manifest.
 */
pub struct ReadsSink {
    location: PathBuf,
    header: Arc<CollectionHeader>,
    format: ReadsWriteFormat,
    io_threads: usize,
    expected_partitions: usize,
    state: SinkState,
}

impl ReadsSink {
    /**
     * @param location output file, or output directory for sharded output
     * @param header written at the top of every output file
     * @param format consolidated or sharded
     * @param plan partitions that will be written
     * @param io_threads htslib compression threads per writer
     * @param window number of partitions that may wait for the consolidated writer
     */
    pub fn create(
        location: &Path,
        header: Arc<CollectionHeader>,
        format: ReadsWriteFormat,
        plan: &PartitionPlan,
        io_threads: usize,
        window: usize,
    ) -> Result<ReadsSink, RecalError> {
        let state = match format {
            ReadsWriteFormat::Single => SinkState::Single(Self::start_consolidated(
                location,
                Arc::clone(&header),
                plan.len(),
                io_threads,
                window,
            )?),
            ReadsWriteFormat::Sharded => {
                fs::create_dir_all(location)
                    .map_err(|e| RecalError::output(location, e.to_string()))?;
                Self::remove_stale_output(location)?;
                SinkState::Sharded(ShardedWriter {
                    completed: Mutex::new(Vec::with_capacity(plan.len())),
                    expected_shards: plan.len(),
                })
            }
        };

        Ok(ReadsSink {
            location: location.to_path_buf(),
            header,
            format,
            io_threads,
            expected_partitions: plan.len(),
            state,
        })
    }

    /// Manifests and shards of an earlier run would mix with the shards of this one
    fn remove_stale_output(location: &Path) -> Result<(), RecalError> {
        let entries =
            fs::read_dir(location).map_err(|e| RecalError::output(location, e.to_string()))?;
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| RecalError::output(location, e.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == SUCCESS_MANIFEST || name == INCOMPLETE_MANIFEST || is_shard_file(&name) {
                fs::remove_file(entry.path())
                    .map_err(|e| RecalError::output(entry.path(), e.to_string()))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(
                "Removed {} files of an earlier run from {}",
                removed,
                location.display()
            );
        }
        Ok(())
    }

    fn start_consolidated(
        location: &Path,
        header: Arc<CollectionHeader>,
        expected_partitions: usize,
        io_threads: usize,
        window: usize,
    ) -> Result<ConsolidatedWriter, RecalError> {
        let directory = match location.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp_file = tempfile::Builder::new()
            .prefix(".recal-")
            .suffix(".tmp")
            .tempfile_in(&directory)
            .map_err(|e| RecalError::output(location, e.to_string()))?;

        let temp_path = temp_file.path().to_path_buf();
        let location = location.to_path_buf();
        let format = output_format_for(&location);
        let window = Arc::new(OrderWindow::new(window));
        let (sender, receiver) = bounded::<PendingPartition>(window.size);

        let writer_window = Arc::clone(&window);
        let handle = std::thread::spawn(move || -> Result<WriterTotals, RecalError> {
            let result = Self::write_in_order(
                receiver,
                &writer_window,
                &temp_path,
                &header,
                format,
                io_threads,
                &location,
            );
            writer_window.update(|progress| progress.writer_stopped = true);

            if let Ok(totals) = &result {
                if totals.partitions_written < expected_partitions {
                    debug!(
                        "Consolidated writer stopped after {} of {} partitions",
                        totals.partitions_written, expected_partitions
                    );
                }
            }
            result
        });

        Ok(ConsolidatedWriter {
            sender: Some(sender),
            handle: Some(handle),
            window,
            temp_file,
        })
    }

    fn write_in_order(
        receiver: Receiver<PendingPartition>,
        window: &OrderWindow,
        path: &Path,
        header: &CollectionHeader,
        format: bam::Format,
        io_threads: usize,
        location: &Path,
    ) -> Result<WriterTotals, RecalError> {
        let mut writer = open_writer(path, header, format, io_threads, location)?;
        let mut pending = BinaryHeap::new();
        let mut totals = WriterTotals::default();

        for partition in receiver.iter() {
            pending.push(Reverse(partition));
            totals.max_buffered_partitions =
                std::cmp::max(totals.max_buffered_partitions, pending.len());

            while pending
                .peek()
                .map(|waiting| waiting.0.index == totals.partitions_written)
                .unwrap_or(false)
            {
                if let Some(Reverse(partition)) = pending.pop() {
                    for read in partition.reads {
                        writer
                            .write(&read.read)
                            .map_err(|e| RecalError::output(location, e.to_string()))?;
                        totals.records_written += 1;
                    }
                    totals.partitions_written += 1;
                    let next_partition = totals.partitions_written;
                    window.update(|progress| progress.next_partition = next_partition);
                }
            }
        }
        Ok(totals)
    }

    /**
     * Hand the transformed reads of one partition to the sink. Safe to call from several
     * workers at once, each partition exactly once.
     */
    pub fn write_partition(
        &self,
        partition: &ReadPartition,
        reads: Vec<BirdToolRead>,
    ) -> Result<(), RecalError> {
        match &self.state {
            SinkState::Single(consolidated) => {
                let sender = consolidated.sender.as_ref().ok_or_else(|| {
                    RecalError::output(&self.location, "Output is already closed")
                })?;
                consolidated
                    .window
                    .wait_for_turn(partition.index, &self.location)?;
                sender
                    .send(PendingPartition {
                        index: partition.index,
                        reads,
                    })
                    .map_err(|_| {
                        RecalError::output(&self.location, "Consolidated writer stopped early")
                    })
            }
            SinkState::Sharded(sharded) => {
                let entry = self.write_shard(partition, reads)?;
                sharded
                    .completed
                    .lock()
                    .map_err(|_| RecalError::output(&self.location, "Shard list is poisoned"))?
                    .push(entry);
                Ok(())
            }
        }
    }

    /**
     * Stop accepting partitions. Workers waiting for the consolidated writer are released with
     * a cancellation, partitions already handed over are still written.
     */
    pub fn close(&self) {
        if let SinkState::Single(consolidated) = &self.state {
            consolidated.window.update(|progress| progress.closed = true);
        }
    }

    fn write_shard(
        &self,
        partition: &ReadPartition,
        reads: Vec<BirdToolRead>,
    ) -> Result<ShardEntry, RecalError> {
        let name = shard_name(partition.index);
        let final_path = self.location.join(&name);
        let temp_file = tempfile::Builder::new()
            .prefix(&format!(".{}", name))
            .suffix(".tmp")
            .tempfile_in(&self.location)
            .map_err(|e| RecalError::output(&final_path, e.to_string()))?;

        let mut records = 0;
        {
            let mut writer = open_writer(
                temp_file.path(),
                &self.header,
                bam::Format::Bam,
                self.io_threads,
                &final_path,
            )?;
            for read in reads {
                writer
                    .write(&read.read)
                    .map_err(|e| RecalError::output(&final_path, e.to_string()))?;
                records += 1;
            }
        }

        temp_file
            .persist(&final_path)
            .map_err(|e| RecalError::output(&final_path, e.to_string()))?;
        debug!("Wrote shard {} with {} reads", name, records);

        Ok(ShardEntry {
            shard: name,
            partition: partition.index,
            span: partition.describe(&self.header),
            records,
        })
    }

    fn write_manifest(&self, name: &str, manifest: &ShardManifest) -> Result<(), RecalError> {
        let path = self.location.join(name);
        let file = File::create(&path).map_err(|e| RecalError::output(&path, e.to_string()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), manifest)
            .map_err(|e| RecalError::output(&path, e.to_string()))
    }

    fn completed_shards(sharded: &ShardedWriter) -> Vec<ShardEntry> {
        let mut shards = match sharded.completed.lock() {
            Ok(shards) => shards.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        shards.sort_by_key(|entry| entry.partition);
        shards
    }

    /**
     * Complete the output after every partition was written. Consolidated output is moved to
     * its final name, sharded output gets its `_SUCCESS` manifest.
     */
    pub fn finish(self) -> Result<SinkSummary, RecalError> {
        match self.state {
            SinkState::Single(mut consolidated) => {
                drop(consolidated.sender.take());
                let totals = match consolidated.handle.take() {
                    Some(handle) => handle.join().map_err(|_| {
                        RecalError::output(&self.location, "Consolidated writer panicked")
                    })??,
                    None => WriterTotals::default(),
                };
                if totals.partitions_written != self.expected_partitions {
                    return Err(RecalError::output(
                        &self.location,
                        format!(
                            "Only {} of {} partitions reached the output",
                            totals.partitions_written, self.expected_partitions
                        ),
                    ));
                }
                consolidated
                    .temp_file
                    .persist(&self.location)
                    .map_err(|e| RecalError::output(&self.location, e.to_string()))?;

                Ok(SinkSummary {
                    location: self.location,
                    format: self.format,
                    records_written: totals.records_written,
                    shards_written: 0,
                    max_buffered_partitions: totals.max_buffered_partitions,
                })
            }
            SinkState::Sharded(ref sharded) => {
                let shards = Self::completed_shards(sharded);
                if shards.len() != sharded.expected_shards {
                    let manifest = ShardManifest {
                        complete: false,
                        expected_shards: sharded.expected_shards,
                        shards: shards.clone(),
                    };
                    self.write_manifest(INCOMPLETE_MANIFEST, &manifest)?;
                    return Err(RecalError::output(
                        &self.location,
                        format!(
                            "Only {} of {} shards were written",
                            shards.len(),
                            sharded.expected_shards
                        ),
                    ));
                }

                let records_written = shards.iter().map(|entry| entry.records).sum();
                let shards_written = shards.len();
                let manifest = ShardManifest {
                    complete: true,
                    expected_shards: sharded.expected_shards,
                    shards,
                };
                self.write_manifest(SUCCESS_MANIFEST, &manifest)?;

                Ok(SinkSummary {
                    location: self.location.clone(),
                    format: self.format,
                    records_written,
                    shards_written,
                    max_buffered_partitions: 0,
                })
            }
        }
    }

    /**
     * Give up on the output. The consolidated temporary file is removed, sharded output keeps
     * its completed shards and gets an `_INCOMPLETE` manifest listing them.
     *
     * @return the error the consolidated writer stopped with, if it failed
     */
    pub fn abort(self) -> Result<Option<RecalError>, RecalError> {
        match self.state {
            SinkState::Single(mut consolidated) => {
                consolidated
                    .window
                    .update(|progress| progress.closed = true);
                drop(consolidated.sender.take());
                let writer_error = match consolidated.handle.take().map(|handle| handle.join()) {
                    Some(Ok(Err(e))) => Some(e),
                    Some(Err(_)) => Some(RecalError::output(
                        &self.location,
                        "Consolidated writer panicked",
                    )),
                    _ => None,
                };
                if let Err(e) = consolidated.temp_file.close() {
                    warn!(
                        "Unable to remove temporary output for {}: {}",
                        self.location.display(),
                        e
                    );
                }
                Ok(writer_error)
            }
            SinkState::Sharded(ref sharded) => {
                let manifest = ShardManifest {
                    complete: false,
                    expected_shards: sharded.expected_shards,
                    shards: Self::completed_shards(sharded),
                };
                warn!(
                    "Output {} is incomplete, {} of {} shards were written",
                    self.location.display(),
                    manifest.shards.len(),
                    manifest.expected_shards
                );
                self.write_manifest(INCOMPLETE_MANIFEST, &manifest)?;
                Ok(None)
            }
        }
    }
}
