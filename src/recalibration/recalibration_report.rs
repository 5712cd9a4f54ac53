use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::recalibration::covariates::ContextCovariate;
use crate::utils::errors::RecalError;
use crate::utils::quality_utils::QualityUtils;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadGroupDelta {
    pub read_group: String,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScoreDelta {
    pub read_group: String,
    pub quality: u8,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleDelta {
    pub read_group: String,
    pub quality: u8,
    pub cycle: i32,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDelta {
    pub read_group: String,
    pub quality: u8,
    pub context: String,
    pub delta: f64,
}

/**
 * On-disk layout of a recalibration table. Each table is a list of deltas, in phred units,
 * keyed by progressively finer covariates. Every table may be omitted.
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecalibrationTables {
    #[serde(default)]
    pub global_delta: f64,
    #[serde(default)]
    pub read_groups: Vec<ReadGroupDelta>,
    #[serde(default)]
    pub quality_scores: Vec<QualityScoreDelta>,
    #[serde(default)]
    pub cycles: Vec<CycleDelta>,
    #[serde(default)]
    pub contexts: Vec<ContextDelta>,
}

/**
 * The immutable correction model used by every transformer of a job. Read groups are
 * interned to dense keys so the per-base lookups never hash strings.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct RecalibrationReport {
    global_delta: f64,
    read_group_index: HashMap<String, usize>,
    read_group_names: Vec<String>,
    read_group_deltas: Vec<f64>,
    quality_deltas: HashMap<(usize, u8), f64>,
    cycle_deltas: HashMap<(usize, u8, i32), f64>,
    context_deltas: HashMap<(usize, u8, u8), f64>,
}

impl RecalibrationReport {
    /**
     * A model with no read group tables. Every read is shifted by `global_delta`.
     */
    pub fn with_global_delta(global_delta: f64) -> RecalibrationReport {
        RecalibrationReport {
            global_delta,
            read_group_index: HashMap::new(),
            read_group_names: Vec::new(),
            read_group_deltas: Vec::new(),
            quality_deltas: HashMap::new(),
            cycle_deltas: HashMap::new(),
            context_deltas: HashMap::new(),
        }
    }

    /**
     * Validate and index the deserialized tables.
     *
     * Fails with ModelFormat if a delta is not finite, a quality is above the SAM maximum, a
     * context is not two of A/C/G/T, a table refers to an undeclared read group or a key
     * appears twice.
     */
    pub fn from_tables(tables: RecalibrationTables) -> Result<RecalibrationReport, RecalError> {
        check_delta(tables.global_delta, "global_delta")?;
        let mut report = Self::with_global_delta(tables.global_delta);

        for entry in tables.read_groups {
            check_delta(entry.delta, &entry.read_group)?;
            if report.read_group_index.contains_key(&entry.read_group) {
                return Err(RecalError::model_format(format!(
                    "Read group {} is declared more than once",
                    entry.read_group
                )));
            }
            report
                .read_group_index
                .insert(entry.read_group.clone(), report.read_group_deltas.len());
            report.read_group_names.push(entry.read_group);
            report.read_group_deltas.push(entry.delta);
        }

        for entry in tables.quality_scores {
            check_delta(entry.delta, &entry.read_group)?;
            let key = (
                report.table_key(&entry.read_group)?,
                check_quality(entry.quality)?,
            );
            insert_unique(&mut report.quality_deltas, key, entry.delta, "quality_scores")?;
        }

        for entry in tables.cycles {
            check_delta(entry.delta, &entry.read_group)?;
            if entry.cycle == 0 {
                return Err(RecalError::model_format(format!(
                    "Cycle 0 is not a valid cycle for read group {}",
                    entry.read_group
                )));
            }
            let key = (
                report.table_key(&entry.read_group)?,
                check_quality(entry.quality)?,
                entry.cycle,
            );
            insert_unique(&mut report.cycle_deltas, key, entry.delta, "cycles")?;
        }

        for entry in tables.contexts {
            check_delta(entry.delta, &entry.read_group)?;
            let context = ContextCovariate::from_str(&entry.context).ok_or_else(|| {
                RecalError::model_format(format!(
                    "Malformed context '{}' for read group {}",
                    entry.context, entry.read_group
                ))
            })?;
            let key = (
                report.table_key(&entry.read_group)?,
                check_quality(entry.quality)?,
                context,
            );
            insert_unique(&mut report.context_deltas, key, entry.delta, "contexts")?;
        }

        Ok(report)
    }

    fn table_key(&self, read_group: &str) -> Result<usize, RecalError> {
        self.read_group_key(read_group).ok_or_else(|| {
            RecalError::model_format(format!(
                "Table entry refers to read group {} which is not in read_groups",
                read_group
            ))
        })
    }

    pub fn read_group_key(&self, read_group: &str) -> Option<usize> {
        self.read_group_index.get(read_group).copied()
    }

    /// Read groups in the order they were declared
    pub fn read_groups(&self) -> &[String] {
        &self.read_group_names
    }

    pub fn global_delta(&self) -> f64 {
        self.global_delta
    }

    /**
     * Total correction for one base.
     *
     * A base whose read group is unknown to the model is only shifted by the global delta.
     * Otherwise the read group delta and the quality, cycle and context deltas are summed,
     * entries missing from a table contributing nothing.
     */
    pub fn combined_delta(
        &self,
        read_group: Option<usize>,
        quality: u8,
        cycle: i32,
        context: Option<u8>,
    ) -> f64 {
        let read_group = match read_group {
            Some(read_group) if read_group < self.read_group_deltas.len() => read_group,
            _ => return self.global_delta,
        };

        let mut delta = self.read_group_deltas[read_group];
        delta += self
            .quality_deltas
            .get(&(read_group, quality))
            .copied()
            .unwrap_or(0.0);
        delta += self
            .cycle_deltas
            .get(&(read_group, quality, cycle))
            .copied()
            .unwrap_or(0.0);
        if let Some(context) = context {
            delta += self
                .context_deltas
                .get(&(read_group, quality, context))
                .copied()
                .unwrap_or(0.0);
        }
        delta
    }

    pub fn number_of_entries(&self) -> usize {
        self.read_group_deltas.len()
            + self.quality_deltas.len()
            + self.cycle_deltas.len()
            + self.context_deltas.len()
    }
}

fn check_delta(delta: f64, owner: &str) -> Result<(), RecalError> {
    if delta.is_finite() {
        Ok(())
    } else {
        Err(RecalError::model_format(format!(
            "Non-finite delta {} for {}",
            delta, owner
        )))
    }
}

fn check_quality(quality: u8) -> Result<u8, RecalError> {
    if quality > QualityUtils::MAX_SAM_QUAL_SCORE {
        Err(RecalError::model_format(format!(
            "Quality {} is above the maximum of {}",
            quality,
            QualityUtils::MAX_SAM_QUAL_SCORE
        )))
    } else {
        Ok(quality)
    }
}

fn insert_unique<K: std::hash::Hash + Eq + std::fmt::Debug>(
    table: &mut HashMap<K, f64>,
    key: K,
    delta: f64,
    table_name: &str,
) -> Result<(), RecalError> {
    if table.contains_key(&key) {
        return Err(RecalError::model_format(format!(
            "Duplicate key {:?} in {}",
            key, table_name
        )));
    }
    table.insert(key, delta);
    Ok(())
}

/**
 * Deserializes a correction model. The pipeline only sees this trait, so other table formats
 * can be plugged in without touching the engine.
 */
pub trait ModelLoader: Send + Sync {
    fn load(&self, reader: &mut dyn Read) -> Result<RecalibrationReport, RecalError>;

    fn load_from_path(&self, path: &Path) -> Result<RecalibrationReport, RecalError> {
        let file = File::open(path).map_err(|e| {
            RecalError::input(format!(
                "Unable to open recalibration table {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut reader = BufReader::new(file);
        self.load(&mut reader)
    }
}

/// Reads recalibration tables stored as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModelLoader {}

impl ModelLoader for JsonModelLoader {
    fn load(&self, reader: &mut dyn Read) -> Result<RecalibrationReport, RecalError> {
        let tables: RecalibrationTables = serde_json::from_reader(reader)
            .map_err(|e| RecalError::model_format(e.to_string()))?;
        RecalibrationReport::from_tables(tables)
    }
}
