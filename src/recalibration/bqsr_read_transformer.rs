use std::collections::HashMap;
use std::sync::Arc;

use crate::bam_parsing::collection_header::CollectionHeader;
use crate::reads::bird_tool_reads::BirdToolRead;
use crate::recalibration::apply_bqsr_arguments::ApplyBqsrArguments;
use crate::recalibration::covariates::ReadCovariates;
use crate::recalibration::quantization::QuantizationInfo;
use crate::recalibration::recalibration_report::RecalibrationReport;
use crate::utils::quality_utils::QualityUtils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Recalibrated,
    PassedThrough,
}

/**
 * Applies a recalibration report to reads.
 *
 * A transformer holds only immutable state, so a single instance can be shared by every worker
 * and called concurrently. Given the same report, header and arguments it always produces the
 * same qualities for the same read.
 */
#[derive(Debug, Clone)]
pub struct BqsrReadTransformer {
    report: Arc<RecalibrationReport>,
    read_group_keys: HashMap<String, usize>,
    preserve_qscores_less_than: u8,
    emit_original_quals: bool,
    use_original_qualities: bool,
    quantization_info: Option<QuantizationInfo>,
}

impl BqsrReadTransformer {
    /**
     * @param report the recalibration model, usually resolved from a broadcast handle
     * @param header header of the reads being recalibrated. Only read groups declared here are
     *               looked up in the report
     * @param args ApplyBQSR arguments
     */
    pub fn new(
        report: Arc<RecalibrationReport>,
        header: &CollectionHeader,
        args: &ApplyBqsrArguments,
    ) -> BqsrReadTransformer {
        let read_group_keys = header
            .read_groups()
            .iter()
            .filter_map(|read_group| {
                report
                    .read_group_key(read_group)
                    .map(|key| (read_group.clone(), key))
            })
            .collect::<HashMap<String, usize>>();

        BqsrReadTransformer {
            report,
            read_group_keys,
            preserve_qscores_less_than: args.preserve_qscores_less_than,
            emit_original_quals: args.emit_original_quals,
            use_original_qualities: args.use_original_qualities,
            quantization_info: QuantizationInfo::from_arguments(args),
        }
    }

    fn read_group_key(&self, read: &BirdToolRead) -> Option<usize> {
        read.get_read_group()
            .and_then(|read_group| self.read_group_keys.get(&read_group).copied())
    }

    /**
     * Qualities the recalibration starts from. The OQ tag is only used when asked for and when
     * it matches the read length.
     */
    fn input_qualities(&self, read: &BirdToolRead) -> Vec<u8> {
        if self.use_original_qualities {
            if let Some(original) = read.get_original_base_qualities() {
                if original.len() == read.len() {
                    return original;
                }
            }
        }
        read.base_qualities().to_vec()
    }

    /**
     * Recalibrate the base qualities of a single read.
     *
     * Unmapped reads, reads without bases and reads without qualities are returned unchanged.
     * No read is ever dropped.
     */
    pub fn apply(&self, mut read: BirdToolRead) -> (BirdToolRead, TransformOutcome) {
        if read.is_unmapped() || read.is_empty() || !read.has_base_qualities() {
            return (read, TransformOutcome::PassedThrough);
        }

        let quals = self.input_qualities(&read);

        if self.emit_original_quals
            && !read.has_original_base_qualities()
            && !read.set_original_base_qualities(&quals)
        {
            warn!(
                "Unable to store original qualities for read {}, leaving it unchanged",
                String::from_utf8_lossy(read.name())
            );
            return (read, TransformOutcome::PassedThrough);
        }

        let covariates = ReadCovariates::compute(&read, &quals, self.read_group_key(&read));
        let recalibrated = self.recalibrate_qualities(&covariates);
        read.set_base_qualities(&recalibrated);

        (read, TransformOutcome::Recalibrated)
    }

    fn recalibrate_qualities(&self, covariates: &ReadCovariates) -> Vec<u8> {
        (0..covariates.len())
            .map(|offset| {
                let qual = covariates.qualities[offset];
                if qual < self.preserve_qscores_less_than {
                    return qual;
                }

                let delta = self.report.combined_delta(
                    covariates.read_group,
                    qual,
                    covariates.cycles[offset],
                    covariates.contexts[offset],
                );

                let recalibrated = if delta == 0.0 {
                    qual
                } else {
                    QualityUtils::bound_recalibrated_qual(qual as f64 + delta)
                };

                match &self.quantization_info {
                    Some(info) => info.quantize(recalibrated),
                    None => recalibrated,
                }
            })
            .collect()
    }
}
