use crossbeam_channel::unbounded;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bam_parsing::collection_header::CollectionHeader;
use crate::bam_parsing::partition::{PartitionPlan, ReadPartition};
use crate::bam_parsing::reads_sink::{ReadsSink, ReadsWriteFormat, SinkSummary};
use crate::bam_parsing::reads_source::{ReadsSource, ReadsSourceSettings, DEFAULT_PARTITION_SPAN};
use crate::processing::broadcast::{BroadcastHandle, Broadcaster};
use crate::recalibration::apply_bqsr_arguments::ApplyBqsrArguments;
use crate::recalibration::bqsr_read_transformer::{BqsrReadTransformer, TransformOutcome};
use crate::recalibration::recalibration_report::{
    JsonModelLoader, ModelLoader, RecalibrationReport,
};
use crate::utils::errors::{PipelineError, PipelineStage, RecalError};

/**
 * Everything needed to run one ApplyBQSR job, converted once from the command line.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyBqsrJob {
    pub inputs: Vec<PathBuf>,
    pub recal_file: PathBuf,
    pub output: PathBuf,
    pub intervals: Vec<String>,
    pub write_format: ReadsWriteFormat,
    pub threads: usize,
    pub source_settings: ReadsSourceSettings,
    pub bqsr_args: ApplyBqsrArguments,
    pub show_progress: bool,
}

impl ApplyBqsrJob {
    pub fn new(input: &Path, recal_file: &Path, output: &Path) -> ApplyBqsrJob {
        ApplyBqsrJob {
            inputs: vec![input.to_path_buf()],
            recal_file: recal_file.to_path_buf(),
            output: output.to_path_buf(),
            intervals: Vec::new(),
            write_format: ReadsWriteFormat::Single,
            threads: 1,
            source_settings: ReadsSourceSettings::default(),
            bqsr_args: ApplyBqsrArguments::default(),
            show_progress: false,
        }
    }

    pub fn generate_from_clap(m: &clap::ArgMatches) -> Result<ApplyBqsrJob, RecalError> {
        let inputs = m
            .get_many::<String>("input")
            .map(|inputs| inputs.map(PathBuf::from).collect())
            .unwrap_or_default();
        let recal_file = m
            .get_one::<String>("bqsr-recal-file")
            .map(PathBuf::from)
            .ok_or_else(|| RecalError::input("--bqsr-recal-file is required"))?;
        let output = m
            .get_one::<String>("output")
            .map(PathBuf::from)
            .ok_or_else(|| RecalError::input("--output is required"))?;
        let intervals = m
            .get_many::<String>("intervals")
            .map(|intervals| intervals.cloned().collect())
            .unwrap_or_default();

        Ok(ApplyBqsrJob {
            inputs,
            recal_file,
            output,
            intervals,
            write_format: if m.get_flag("sharded-output") {
                ReadsWriteFormat::Sharded
            } else {
                ReadsWriteFormat::Single
            },
            threads: m.get_one::<usize>("threads").copied().unwrap_or(1),
            source_settings: ReadsSourceSettings {
                partition_span: m
                    .get_one::<usize>("partition-span")
                    .copied()
                    .unwrap_or(DEFAULT_PARTITION_SPAN),
                io_threads: m.get_one::<usize>("io-threads").copied().unwrap_or(1),
            },
            bqsr_args: ApplyBqsrArguments::generate_from_clap(m)?,
            show_progress: !m.get_flag("quiet"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    Reading,
    Distributing,
    Transforming,
    Writing,
    Done,
    Failed(PipelineStage),
}

/**
 * Shared stop flag for a running job. Workers check it before each partition, so a job stops
 * after the partitions already in flight.
 */
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub partitions: usize,
    pub records_read: u64,
    pub records_recalibrated: u64,
    pub records_passed_through: u64,
    pub records_written: u64,
    pub shards_written: usize,
    /// Most partitions held back at once to restore order in a single output
    pub max_buffered_partitions: usize,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PartitionCounts {
    records_read: u64,
    recalibrated: u64,
    passed_through: u64,
}

impl std::ops::Add for PartitionCounts {
    type Output = PartitionCounts;

    fn add(self, other: PartitionCounts) -> PartitionCounts {
        PartitionCounts {
            records_read: self.records_read + other.records_read,
            recalibrated: self.recalibrated + other.recalibrated,
            passed_through: self.passed_through + other.passed_through,
        }
    }
}

/// What the Reading stage hands on
struct OpenedInput {
    source: ReadsSource,
    header: Arc<CollectionHeader>,
    plan: PartitionPlan,
}

/**
 * Runs an ApplyBQSR job: opens the input, broadcasts the recalibration report to a pool of
 * workers, recalibrates every partition and writes the result.
 *
 * The engine moves through Validating, Reading, Distributing, Transforming and Writing to Done.
 * Any error moves it to Failed, recording the stage that was active. There are no retries.
 */
pub struct ApplyBqsrPipeline<L: ModelLoader = JsonModelLoader> {
    job: ApplyBqsrJob,
    loader: L,
    state: PipelineState,
    cancellation: CancellationToken,
}

impl ApplyBqsrPipeline<JsonModelLoader> {
    pub fn new(job: ApplyBqsrJob) -> ApplyBqsrPipeline<JsonModelLoader> {
        Self::with_loader(job, JsonModelLoader::default())
    }
}

impl<L: ModelLoader> ApplyBqsrPipeline<L> {
    pub fn with_loader(job: ApplyBqsrJob, loader: L) -> ApplyBqsrPipeline<L> {
        ApplyBqsrPipeline {
            job,
            loader,
            state: PipelineState::Validating,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// A token that stops this job when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn enter(&mut self, state: PipelineState) {
        debug!("ApplyBQSR state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn fail(&mut self, stage: PipelineStage, error: RecalError) -> PipelineError {
        error!("ApplyBQSR failed while {}: {}", stage, error);
        self.state = PipelineState::Failed(stage);
        PipelineError::new(stage, error)
    }

    pub fn run(&mut self) -> Result<JobSummary, PipelineError> {
        self.enter(PipelineState::Validating);
        self.validate()
            .map_err(|e| self.fail(PipelineStage::Validating, e))?;

        self.enter(PipelineState::Reading);
        let input = self
            .open_input()
            .map_err(|e| self.fail(PipelineStage::Reading, e))?;

        self.enter(PipelineState::Distributing);
        let (handle, pool) = self
            .distribute(&input.header)
            .map_err(|e| self.fail(PipelineStage::Distributing, e))?;

        self.enter(PipelineState::Transforming);
        let (sink, counts) = match self.transform(&input, &handle, &pool) {
            Ok(result) => result,
            Err(e) => return Err(self.fail(transform_failure_stage(&e), e)),
        };

        self.enter(PipelineState::Writing);
        let sink_summary = sink
            .finish()
            .map_err(|e| self.fail(PipelineStage::Writing, e))?;

        self.enter(PipelineState::Done);
        let summary = Self::summarize(input.plan.len(), counts, sink_summary);
        info!(
            "ApplyBQSR done: {} partitions, {} reads read, {} recalibrated, {} passed through, {} written to {}{}",
            summary.partitions,
            summary.records_read,
            summary.records_recalibrated,
            summary.records_passed_through,
            summary.records_written,
            summary.output.display(),
            if summary.shards_written > 0 {
                format!(" in {} shards", summary.shards_written)
            } else {
                String::new()
            }
        );
        Ok(summary)
    }

    fn validate(&self) -> Result<(), RecalError> {
        match self.job.inputs.len() {
            1 => {}
            0 => return Err(RecalError::input("No input file was given")),
            n => {
                return Err(RecalError::input(format!(
                    "Exactly one input is supported, {} were given",
                    n
                )))
            }
        }

        if !self.job.recal_file.is_file() {
            return Err(RecalError::input(format!(
                "Recalibration table {} does not exist",
                self.job.recal_file.display()
            )));
        }

        if self.job.threads == 0 {
            return Err(RecalError::input("--threads must be at least 1"));
        }

        self.job.bqsr_args.validate()?;

        let parent = match self.job.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Err(RecalError::output(
                &self.job.output,
                format!("Output directory {} does not exist", parent.display()),
            ));
        }
        if self.job.write_format == ReadsWriteFormat::Single && self.job.output.is_dir() {
            return Err(RecalError::output(
                &self.job.output,
                "Output is a directory, use --sharded-output to write shards into it",
            ));
        }

        Ok(())
    }

    fn open_input(&self) -> Result<OpenedInput, RecalError> {
        let source = ReadsSource::open(&self.job.inputs, self.job.source_settings.clone())?;
        let header = source.header();
        let plan = source.partitions(&self.job.intervals)?;
        info!(
            "Reading {} in {} partitions",
            source.path().display(),
            plan.len()
        );

        Ok(OpenedInput {
            source,
            header,
            plan,
        })
    }

    fn distribute(
        &self,
        header: &CollectionHeader,
    ) -> Result<(BroadcastHandle<RecalibrationReport>, rayon::ThreadPool), RecalError> {
        let report = self.loader.load_from_path(&self.job.recal_file)?;
        let unknown = report
            .read_groups()
            .iter()
            .filter(|read_group| !header.has_read_group(read_group))
            .count();
        if unknown > 0 {
            warn!(
                "{} read groups in the recalibration table are not declared in the input header",
                unknown
            );
        }
        debug!(
            "Loaded recalibration table with {} entries",
            report.number_of_entries()
        );

        let broadcaster = Broadcaster::new();
        let handle = broadcaster.publish(report)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.job.threads)
            .thread_name(|index| format!("recal-worker-{}", index))
            .build()
            .map_err(|e| RecalError::distribution(format!("Unable to start workers: {}", e)))?;

        Ok((handle, pool))
    }

    fn progress_bar(&self, partitions: usize) -> ProgressBar {
        if !self.job.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(partitions as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg} ETA: [{eta}]")
        {
            progress_bar.set_style(style);
        }
        progress_bar.set_message("partitions recalibrated");
        progress_bar.enable_steady_tick(Duration::from_millis(200));
        progress_bar
    }

    fn transform(
        &self,
        input: &OpenedInput,
        handle: &BroadcastHandle<RecalibrationReport>,
        pool: &rayon::ThreadPool,
    ) -> Result<(ReadsSink, PartitionCounts), RecalError> {
        let sink = ReadsSink::create(
            &self.job.output,
            Arc::clone(&input.header),
            self.job.write_format,
            &input.plan,
            self.job.source_settings.io_threads,
            self.job.threads * 2,
        )?;

        let progress_bar = self.progress_bar(input.plan.len());
        let cancellation = &self.cancellation;
        let header = &input.header;
        let args = &self.job.bqsr_args;
        let source = &input.source;
        let sink_ref = &sink;
        let progress = &progress_bar;
        let partitions = input.plan.partitions();
        let next_partition = AtomicUsize::new(0);
        let next_partition = &next_partition;
        let (results_tx, results_rx) = unbounded::<Result<PartitionCounts, RecalError>>();

        // Partitions are handed out in index order, so the consolidated writer only ever
        // waits for partitions that are already being worked on
        pool.scope(|scope| {
            for _ in 0..pool.current_num_threads() {
                let results = results_tx.clone();
                scope.spawn(move |_| {
                    let transformer = match handle.resolve() {
                        Ok(report) => BqsrReadTransformer::new(report, header, args),
                        Err(e) => {
                            cancellation.cancel();
                            sink_ref.close();
                            let _ = results.send(Err(e));
                            return;
                        }
                    };

                    while let Some(partition) =
                        partitions.get(next_partition.fetch_add(1, Ordering::SeqCst))
                    {
                        let result = Self::process_partition(
                            source,
                            sink_ref,
                            &transformer,
                            partition,
                            cancellation,
                        );
                        let stop = match &result {
                            Ok(_) => {
                                progress.inc(1);
                                false
                            }
                            Err(e) => {
                                if !e.is_cancelled() {
                                    cancellation.cancel();
                                }
                                sink_ref.close();
                                true
                            }
                        };
                        if results.send(result).is_err() || stop {
                            break;
                        }
                    }
                });
            }
        });
        drop(results_tx);
        progress_bar.finish_and_clear();

        let results = results_rx.iter().collect::<Vec<_>>();
        let total = partitions.len();
        let completed = results.iter().filter(|result| result.is_ok()).count();
        let mut counts = PartitionCounts::default();
        let mut failure = None;
        let mut cancelled = false;
        for result in results {
            match result {
                Ok(partition_counts) => counts = counts + partition_counts,
                Err(e) if e.is_cancelled() => cancelled = true,
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        let failure = match failure {
            Some(e) => Some(e),
            None if cancelled || completed < total => {
                Some(RecalError::Cancelled { completed, total })
            }
            None => None,
        };

        match failure {
            Some(e) => match sink.abort() {
                // workers only see that the writer went away, the writer knows why
                Ok(Some(writer_error)) => Err(writer_error),
                Ok(None) => Err(e),
                Err(abort_error) => {
                    warn!("Unable to clean up output: {}", abort_error);
                    Err(e)
                }
            },
            None => Ok((sink, counts)),
        }
    }

    fn process_partition(
        source: &ReadsSource,
        sink: &ReadsSink,
        transformer: &BqsrReadTransformer,
        partition: &ReadPartition,
        cancellation: &CancellationToken,
    ) -> Result<PartitionCounts, RecalError> {
        if cancellation.is_cancelled() {
            return Err(RecalError::Cancelled {
                completed: 0,
                total: 0,
            });
        }

        let reads = source.read_partition(partition)?;
        let mut counts = PartitionCounts {
            records_read: reads.len() as u64,
            ..Default::default()
        };

        let transformed = reads
            .into_iter()
            .map(|read| {
                let (read, outcome) = transformer.apply(read);
                match outcome {
                    TransformOutcome::Recalibrated => counts.recalibrated += 1,
                    TransformOutcome::PassedThrough => counts.passed_through += 1,
                }
                read
            })
            .collect::<Vec<_>>();

        debug!(
            "Partition {} recalibrated {} of {} reads",
            partition.index, counts.recalibrated, counts.records_read
        );
        sink.write_partition(partition, transformed)?;
        Ok(counts)
    }

    fn summarize(
        partitions: usize,
        counts: PartitionCounts,
        sink_summary: SinkSummary,
    ) -> JobSummary {
        JobSummary {
            partitions,
            records_read: counts.records_read,
            records_recalibrated: counts.recalibrated,
            records_passed_through: counts.passed_through,
            records_written: sink_summary.records_written,
            shards_written: sink_summary.shards_written,
            max_buffered_partitions: sink_summary.max_buffered_partitions,
            output: sink_summary.location,
        }
    }
}

/**
 * The stage a failure of the Transforming stage is reported under. Workers resolve the
 * broadcast report, read their partitions lazily and write them, so their errors can belong to
 * any of these stages.
 */
fn transform_failure_stage(error: &RecalError) -> PipelineStage {
    match error {
        RecalError::Output { .. } => PipelineStage::Writing,
        RecalError::Input { .. } => PipelineStage::Reading,
        RecalError::Distribution { .. } => PipelineStage::Distributing,
        _ => PipelineStage::Transforming,
    }
}
