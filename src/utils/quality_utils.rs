pub struct QualityUtils {}

impl QualityUtils {
    /**
     * Maximum quality score that can be encoded in a SAM/BAM file
     */
    pub const MAX_SAM_QUAL_SCORE: u8 = 93;

    /// Largest quality a recalibrated base may be given
    pub const MAX_RECALIBRATED_Q_SCORE: u8 = Self::MAX_SAM_QUAL_SCORE;

    /// Smallest quality a recalibrated base may be given
    pub const MIN_RECALIBRATED_Q_SCORE: u8 = 1;

    /// Bases below this quality are left untouched by default
    pub const MIN_USABLE_Q_SCORE: u8 = 6;

    /// htslib fills the quality array with this value when the record has no qualities
    pub const MISSING_QUALITY: u8 = 0xff;

    pub const ASCII_OFFSET: u8 = 33;

    /**
     * Rounds a phred-scaled quality to the nearest integer and bounds it to
     * [MIN_RECALIBRATED_Q_SCORE, MAX_RECALIBRATED_Q_SCORE]. Non-finite input is bounded too,
     * NaN maps to the minimum.
     */
    pub fn bound_recalibrated_qual(qual: f64) -> u8 {
        if qual.is_nan() {
            return Self::MIN_RECALIBRATED_Q_SCORE;
        }
        let rounded = qual.round();
        if rounded <= Self::MIN_RECALIBRATED_Q_SCORE as f64 {
            Self::MIN_RECALIBRATED_Q_SCORE
        } else if rounded >= Self::MAX_RECALIBRATED_Q_SCORE as f64 {
            Self::MAX_RECALIBRATED_Q_SCORE
        } else {
            rounded as u8
        }
    }

    /**
     * Convert raw phred qualities to the printable phred+33 string used by SAM tags such as OQ
     */
    pub fn phred_to_fastq_string(quals: &[u8]) -> String {
        quals
            .iter()
            .map(|q| (q.saturating_add(Self::ASCII_OFFSET)) as char)
            .collect()
    }

    /**
     * Decode a phred+33 string back into raw phred qualities. Characters below the offset
     * decode to zero.
     */
    pub fn fastq_string_to_phred(encoded: &str) -> Vec<u8> {
        encoded
            .bytes()
            .map(|b| b.saturating_sub(Self::ASCII_OFFSET))
            .collect()
    }

    /// True when the record carries no base qualities, i.e. htslib reported `*`
    pub fn quals_missing(quals: &[u8]) -> bool {
        quals.first() == Some(&Self::MISSING_QUALITY)
    }
}
