use itertools::Itertools;

use crate::recalibration::apply_bqsr_arguments::ApplyBqsrArguments;
use crate::utils::quality_utils::QualityUtils;

const TABLE_SIZE: usize = QualityUtils::MAX_SAM_QUAL_SCORE as usize + 1;

/**
 * Maps every possible quality score to its quantized value. Built once per job from the
 * ApplyBQSR arguments.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationInfo {
    quantized: [u8; TABLE_SIZE],
}

impl QuantizationInfo {
    /**
     * @return the quantization requested by the arguments, or None when quantization is disabled.
     * Static bins take precedence over a level count.
     */
    pub fn from_arguments(args: &ApplyBqsrArguments) -> Option<QuantizationInfo> {
        if !args.static_quantized_quals.is_empty() {
            Some(Self::static_bins(
                &args.static_quantized_quals,
                args.round_down_quantized,
            ))
        } else if args.quantize_quals > 0 {
            Some(Self::evenly_spaced(args.quantize_quals))
        } else {
            None
        }
    }

    /**
     * Map every quality to one of the given bins. With round_down the largest bin not above the
     * quality is chosen, otherwise the closest bin, ties going to the higher bin. Qualities below
     * every bin map to the lowest bin.
     */
    pub fn static_bins(bins: &[u8], round_down: bool) -> QuantizationInfo {
        let bins = bins.iter().copied().sorted().dedup().collect::<Vec<u8>>();
        let mut quantized = [0u8; TABLE_SIZE];
        if bins.is_empty() {
            return Self::identity();
        }

        for (qual, slot) in quantized.iter_mut().enumerate() {
            let qual = qual as u8;
            let below = bins.iter().rev().find(|bin| **bin <= qual).copied();
            let above = bins.iter().find(|bin| **bin >= qual).copied();
            *slot = match (below, above) {
                (Some(below), _) if round_down => below,
                (None, Some(above)) => above,
                (Some(below), None) => below,
                (Some(below), Some(above)) => {
                    if qual - below < above - qual {
                        below
                    } else {
                        above
                    }
                }
                (None, None) => qual,
            };
        }

        QuantizationInfo { quantized }
    }

    /**
     * Split [MIN_RECALIBRATED_Q_SCORE, MAX_RECALIBRATED_Q_SCORE] into `levels` equal width bins and
     * map each quality to the middle of its bin.
     */
    pub fn evenly_spaced(levels: usize) -> QuantizationInfo {
        let min_qual = QualityUtils::MIN_RECALIBRATED_Q_SCORE as usize;
        let max_qual = QualityUtils::MAX_RECALIBRATED_Q_SCORE as usize;
        let span = max_qual - min_qual + 1;
        let levels = levels.clamp(1, span);
        let width = (span + levels - 1) / levels;

        let mut quantized = [0u8; TABLE_SIZE];
        for (qual, slot) in quantized.iter_mut().enumerate() {
            let bounded = qual.clamp(min_qual, max_qual);
            let bin = (bounded - min_qual) / width;
            let bin_start = min_qual + bin * width;
            let bin_end = std::cmp::min(bin_start + width - 1, max_qual);
            *slot = ((bin_start + bin_end) / 2) as u8;
        }

        QuantizationInfo { quantized }
    }

    pub fn identity() -> QuantizationInfo {
        let mut quantized = [0u8; TABLE_SIZE];
        for (qual, slot) in quantized.iter_mut().enumerate() {
            *slot = qual as u8;
        }
        QuantizationInfo { quantized }
    }

    pub fn quantize(&self, qual: u8) -> u8 {
        self.quantized[std::cmp::min(qual as usize, TABLE_SIZE - 1)]
    }

    pub fn number_of_levels(&self) -> usize {
        self.quantized.iter().unique().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_bins_round_to_nearest() {
        let info = QuantizationInfo::static_bins(&[10, 20, 30], false);
        assert_eq!(info.quantize(2), 10);
        assert_eq!(info.quantize(14), 10);
        assert_eq!(info.quantize(15), 20);
        assert_eq!(info.quantize(26), 30);
        assert_eq!(info.quantize(60), 30);
    }

    #[test]
    fn static_bins_round_down() {
        let info = QuantizationInfo::static_bins(&[30, 10, 20], true);
        assert_eq!(info.quantize(2), 10);
        assert_eq!(info.quantize(19), 10);
        assert_eq!(info.quantize(29), 20);
        assert_eq!(info.quantize(45), 30);
    }

    #[test]
    fn evenly_spaced_levels() {
        let info = QuantizationInfo::evenly_spaced(3);
        assert_eq!(info.number_of_levels(), 3);
        assert_eq!(info.quantize(1), info.quantize(31));
        assert_ne!(info.quantize(31), info.quantize(32));
    }
}
