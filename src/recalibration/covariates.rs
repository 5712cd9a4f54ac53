use crate::reads::bird_tool_reads::BirdToolRead;
use crate::utils::simple_interval::CoordMath;

/**
 * Dinucleotide context of a base: the previous base and the base itself, in the direction the
 * read was sequenced. Encoded as `4 * previous + current` with A=0, C=1, G=2, T=3.
 */
pub struct ContextCovariate {}

impl ContextCovariate {
    pub const CONTEXT_SIZE: usize = 2;

    fn base_index(base: u8) -> Option<u8> {
        match base {
            b'A' | b'a' => Some(0),
            b'C' | b'c' => Some(1),
            b'G' | b'g' => Some(2),
            b'T' | b't' => Some(3),
            _ => None,
        }
    }

    fn complement(base: u8) -> u8 {
        match base {
            b'A' | b'a' => b'T',
            b'C' | b'c' => b'G',
            b'G' | b'g' => b'C',
            b'T' | b't' => b'A',
            other => other,
        }
    }

    pub fn encode(previous: u8, current: u8) -> Option<u8> {
        Some(Self::base_index(previous)? * 4 + Self::base_index(current)?)
    }

    /// Parse a context string such as "AC" as found in a recalibration table
    pub fn from_str(context: &str) -> Option<u8> {
        let bytes = context.as_bytes();
        if bytes.len() != Self::CONTEXT_SIZE {
            return None;
        }
        Self::encode(bytes[0], bytes[1])
    }

    pub fn decode(key: u8) -> String {
        const BASES: [char; 4] = ['A', 'C', 'G', 'T'];
        let mut context = String::with_capacity(Self::CONTEXT_SIZE);
        context.push(BASES[((key / 4) % 4) as usize]);
        context.push(BASES[(key % 4) as usize]);
        context
    }

    /**
     * Context of every base of the read, indexed in reference orientation. Reverse strand reads
     * are complemented and read backwards. The first sequenced base has no context.
     */
    pub fn contexts(bases: &[u8], is_reverse_strand: bool) -> Vec<Option<u8>> {
        let length = bases.len();
        (0..length)
            .map(|offset| {
                if is_reverse_strand {
                    if offset + 1 >= length {
                        None
                    } else {
                        Self::encode(
                            Self::complement(bases[offset + 1]),
                            Self::complement(bases[offset]),
                        )
                    }
                } else if offset == 0 {
                    None
                } else {
                    Self::encode(bases[offset - 1], bases[offset])
                }
            })
            .collect()
    }
}

pub struct CycleCovariate {}

impl CycleCovariate {
    /**
     * Machine cycle of every base, indexed in reference orientation. Cycles are 1-based in the
     * direction of sequencing and negative for the second read of a pair.
     */
    pub fn cycles(length: usize, is_reverse_strand: bool, is_second_of_pair: bool) -> Vec<i32> {
        (0..length)
            .map(|offset| {
                let cycle = CoordMath::get_cycle(is_reverse_strand, length, offset) as i32;
                if is_second_of_pair {
                    -cycle
                } else {
                    cycle
                }
            })
            .collect()
    }
}

/**
 * The covariate keys of every base of one read. The read group is resolved once per read, the
 * remaining covariates per base.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCovariates {
    pub read_group: Option<usize>,
    pub qualities: Vec<u8>,
    pub cycles: Vec<i32>,
    pub contexts: Vec<Option<u8>>,
}

impl ReadCovariates {
    /**
     * @param read the read being recalibrated
     * @param qualities the qualities to key on, either the current or the original qualities
     * @param read_group the read group's key in the recalibration table, if it has one
     */
    pub fn compute(
        read: &BirdToolRead,
        qualities: &[u8],
        read_group: Option<usize>,
    ) -> ReadCovariates {
        let bases = read.bases();
        let is_reverse_strand = read.is_reverse_strand();

        ReadCovariates {
            read_group,
            qualities: qualities.to_vec(),
            cycles: CycleCovariate::cycles(
                bases.len(),
                is_reverse_strand,
                read.is_second_of_pair(),
            ),
            contexts: ContextCovariate::contexts(&bases, is_reverse_strand),
        }
    }

    pub fn len(&self) -> usize {
        self.qualities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qualities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_contexts() {
        let contexts = ContextCovariate::contexts(b"ACGN", false);
        assert_eq!(contexts[0], None);
        assert_eq!(contexts[1], ContextCovariate::from_str("AC"));
        assert_eq!(contexts[2], ContextCovariate::from_str("CG"));
        assert_eq!(contexts[3], None);
    }

    #[test]
    fn reverse_contexts_are_complemented() {
        // sequenced as the reverse complement "CGT"
        let contexts = ContextCovariate::contexts(b"ACG", true);
        assert_eq!(contexts[2], None);
        assert_eq!(contexts[1], ContextCovariate::from_str("CG"));
        assert_eq!(contexts[0], ContextCovariate::from_str("GT"));
    }

    #[test]
    fn context_round_trips_through_key() {
        assert_eq!(ContextCovariate::decode(ContextCovariate::from_str("GT").unwrap()), "GT");
        assert_eq!(ContextCovariate::from_str("A"), None);
        assert_eq!(ContextCovariate::from_str("AN"), None);
    }

    #[test]
    fn cycles_follow_sequencing_direction() {
        assert_eq!(CycleCovariate::cycles(3, false, false), vec![1, 2, 3]);
        assert_eq!(CycleCovariate::cycles(3, true, false), vec![3, 2, 1]);
        assert_eq!(CycleCovariate::cycles(3, false, true), vec![-1, -2, -3]);
    }
}
