use clap::ArgMatches;

use crate::utils::errors::RecalError;
use crate::utils::quality_utils::QualityUtils;

/**
 * The collection of all arguments needed for ApplyBQSR. Read once when the job starts and
 * shared read-only by every transformer.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyBqsrArguments {
    /// Quantize quality scores to this many levels, 0 disables level based quantization
    pub quantize_quals: usize,
    /// Explicit quantization bins. Takes precedence over `quantize_quals`
    pub static_quantized_quals: Vec<u8>,
    /// Round quals down to the nearest static bin instead of to the closest one
    pub round_down_quantized: bool,
    /// Bases with quality below this value are neither recalibrated nor quantized
    pub preserve_qscores_less_than: u8,
    /// Store the pre-recalibration qualities in the OQ tag
    pub emit_original_quals: bool,
    /// Recalibrate the qualities stored in the OQ tag instead of the current ones
    pub use_original_qualities: bool,
}

impl Default for ApplyBqsrArguments {
    fn default() -> Self {
        ApplyBqsrArguments {
            quantize_quals: 0,
            static_quantized_quals: Vec::new(),
            round_down_quantized: false,
            preserve_qscores_less_than: QualityUtils::MIN_USABLE_Q_SCORE,
            emit_original_quals: false,
            use_original_qualities: false,
        }
    }
}

impl ApplyBqsrArguments {
    pub fn generate_from_clap(m: &ArgMatches) -> Result<ApplyBqsrArguments, RecalError> {
        let args = ApplyBqsrArguments {
            quantize_quals: m.get_one::<usize>("quantize-quals").copied().unwrap_or(0),
            static_quantized_quals: m
                .get_many::<u8>("static-quantized-quals")
                .map(|quals| quals.copied().collect())
                .unwrap_or_default(),
            round_down_quantized: m.get_flag("round-down-quantized"),
            preserve_qscores_less_than: m
                .get_one::<u8>("preserve-qscores-less-than")
                .copied()
                .unwrap_or(QualityUtils::MIN_USABLE_Q_SCORE),
            emit_original_quals: m.get_flag("emit-original-quals"),
            use_original_qualities: m.get_flag("use-original-qualities"),
        };
        args.validate()?;
        Ok(args)
    }

    pub fn validate(&self) -> Result<(), RecalError> {
        if self.quantize_quals > QualityUtils::MAX_RECALIBRATED_Q_SCORE as usize {
            return Err(RecalError::input(format!(
                "--quantize-quals must be at most {} but was {}",
                QualityUtils::MAX_RECALIBRATED_Q_SCORE,
                self.quantize_quals
            )));
        }
        if let Some(qual) = self
            .static_quantized_quals
            .iter()
            .find(|q| **q > QualityUtils::MAX_RECALIBRATED_Q_SCORE)
        {
            return Err(RecalError::input(format!(
                "Static quantized qual {} is above the maximum of {}",
                qual,
                QualityUtils::MAX_RECALIBRATED_Q_SCORE
            )));
        }
        if self.round_down_quantized && self.static_quantized_quals.is_empty() {
            return Err(RecalError::input(
                "--round-down-quantized requires --static-quantized-quals",
            ));
        }
        Ok(())
    }
}
