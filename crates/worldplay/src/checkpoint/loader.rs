use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use thiserror::Error;
use tracing::info;

use super::container::{read_checkpoint, Checkpoint, CheckpointEntry, CheckpointError};
use super::tensor::ParamSet;

/// Variant tag whose group supersedes the raw weights when present.
pub const EMA_VARIANT: &str = "ema";

/// Live model parameters that a checkpoint can be merged into.
pub trait ParameterStore {
    fn parameter_names(&self) -> BTreeSet<String>;

    /// Overwrites the named parameters; names absent from `params` keep their values.
    fn apply_parameters(&mut self, params: ParamSet) -> Result<(), ParameterApplyError>;
}

#[derive(Debug, Error)]
#[error("failed to apply parameter '{name}': {message}")]
pub struct ParameterApplyError {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub used_ema: bool,
}

impl LoadReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn total_count(&self) -> usize {
        self.applied.len() + self.skipped.len()
    }

    /// `applied / total`. An empty checkpoint reports `0.0`.
    pub fn fraction_applied(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            return 0.0;
        }
        self.applied.len() as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub applied: ParamSet,
    pub report: LoadReport,
}

#[derive(Debug, Error)]
pub enum CheckpointLoadError {
    #[error(transparent)]
    Read(#[from] CheckpointError),
    #[error(transparent)]
    Apply(#[from] ParameterApplyError),
}

/// Keeps the checkpoint entries whose names exist in `model_params`.
///
/// An `ema` group replaces the whole checkpoint before filtering. Unmatched
/// names, including non-ema groups, are reported as skipped.
pub fn reconcile(checkpoint: Checkpoint, model_params: &BTreeSet<String>) -> LoadOutcome {
    let mut entries = checkpoint.into_entries();
    let (candidates, used_ema): (BTreeMap<String, CheckpointEntry>, bool) =
        match entries.remove(EMA_VARIANT) {
            Some(CheckpointEntry::Group(ema)) => (
                ema.into_iter()
                    .map(|(name, tensor)| (name, CheckpointEntry::Tensor(tensor)))
                    .collect(),
                true,
            ),
            Some(other) => {
                entries.insert(EMA_VARIANT.to_string(), other);
                (entries, false)
            }
            None => (entries, false),
        };

    let mut applied = ParamSet::new();
    let mut skipped = Vec::new();
    for (name, entry) in candidates {
        match entry {
            CheckpointEntry::Tensor(tensor) if model_params.contains(&name) => {
                applied.insert(name, tensor);
            }
            _ => skipped.push(name),
        }
    }

    let report = LoadReport {
        applied: applied.keys().cloned().collect(),
        skipped,
        used_ema,
    };
    LoadOutcome { applied, report }
}

/// Reads `path`, reconciles it against `model`, and applies the matching parameters.
pub fn load_checkpoint_into<M: ParameterStore + ?Sized>(
    path: &Path,
    model: &mut M,
) -> Result<LoadReport, CheckpointLoadError> {
    info!(path = %path.display(), "checkpoint_loading");
    let checkpoint = read_checkpoint(path)?;
    let outcome = reconcile(checkpoint, &model.parameter_names());
    if outcome.report.used_ema {
        info!("checkpoint_using_ema");
    }
    for name in &outcome.report.skipped {
        info!(name = %name, "checkpoint_param_ignored");
    }

    let report = outcome.report;
    model.apply_parameters(outcome.applied)?;
    info!(
        path = %path.display(),
        applied = report.applied_count(),
        skipped = report.skipped_count(),
        applied_percent = report.fraction_applied() * 100.0,
        "checkpoint_loaded"
    );
    Ok(report)
}
