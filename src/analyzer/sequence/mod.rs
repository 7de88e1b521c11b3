//! Sequence analysis
//!
//! A sequence is a run of one user's operations close together in time.
//! Three metrics are computed over it and folded into one weighted score:
//!
//! - size: deleted originals replaced by files of about the same total size
//! - file type funnelling: many input types collapsing into few result extensions
//! - entropy funnelling: ordinary inputs turning into uniformly high entropy output
//!
//! Each metric is a [`SequenceMetric`] in `[0, 1]` and can be swapped out.

mod entropy_funnelling;
mod file_type_funnelling;
mod size;

pub use entropy_funnelling::EntropyFunnellingAnalyzer;
pub use file_type_funnelling::FileTypeFunnellingAnalyzer;
pub use size::SequenceSizeAnalyzer;

use super::EntropyClass;
use crate::config::SequenceConfig;
use crate::monitor::{Command, FileOperation};
use serde::{Deserialize, Serialize};

/// Scores an ordered sequence of operations
pub trait SequenceMetric: Send + Sync {
    /// Score in `[0, 1]`; 0 for sequences too short to carry a signal
    fn score(&self, sequence: &[FileOperation]) -> f64;
}

/// Condensed view of one member of a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub id: Option<u64>,
    pub command: Command,
    pub name: String,
    pub size: u64,
    pub timestamp: i64,
    pub file_class: Option<EntropyClass>,
}

impl From<&FileOperation> for OperationSummary {
    fn from(op: &FileOperation) -> Self {
        Self {
            id: op.id,
            command: op.command,
            name: op.relevant_name().to_string(),
            size: op.size,
            timestamp: op.timestamp,
            file_class: op.file_class,
        }
    }
}

/// Result of analyzing one sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceResult {
    pub sequence_id: u64,
    pub size_ratio: f64,
    pub file_type_funnelling: f64,
    pub entropy_funnelling: f64,
    /// Weighted combination of the three metrics
    pub score: f64,
    pub operations: Vec<OperationSummary>,
}

impl SequenceResult {
    pub fn new(
        sequence_id: u64,
        size_ratio: f64,
        file_type_funnelling: f64,
        entropy_funnelling: f64,
        score: f64,
        operations: Vec<OperationSummary>,
    ) -> Self {
        Self {
            sequence_id,
            size_ratio,
            file_type_funnelling,
            entropy_funnelling,
            score,
            operations,
        }
    }

    /// Baseline result carrying no sequence-level signal
    pub fn neutral(sequence_id: u64) -> Self {
        Self::new(sequence_id, 0.0, 0.0, 0.0, 0.0, Vec::new())
    }
}

/// Weights of the three metrics in the combined score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceWeights {
    pub size: f64,
    pub file_type: f64,
    pub entropy: f64,
}

impl From<&SequenceConfig> for SequenceWeights {
    fn from(config: &SequenceConfig) -> Self {
        Self {
            size: config.size_weight,
            file_type: config.file_type_weight,
            entropy: config.entropy_weight,
        }
    }
}

pub struct SequenceAnalyzer {
    size: Box<dyn SequenceMetric>,
    file_type: Box<dyn SequenceMetric>,
    entropy: Box<dyn SequenceMetric>,
    weights: SequenceWeights,
}

impl SequenceAnalyzer {
    /// Analyzer with the default metrics
    pub fn new(config: &SequenceConfig) -> Self {
        Self::with_metrics(
            Box::new(SequenceSizeAnalyzer),
            Box::new(FileTypeFunnellingAnalyzer),
            Box::new(EntropyFunnellingAnalyzer),
            config.into(),
        )
    }

    pub fn with_metrics(
        size: Box<dyn SequenceMetric>,
        file_type: Box<dyn SequenceMetric>,
        entropy: Box<dyn SequenceMetric>,
        weights: SequenceWeights,
    ) -> Self {
        Self {
            size,
            file_type,
            entropy,
            weights,
        }
    }

    /// Score a sequence; an empty one yields the neutral result
    pub fn analyze(&self, sequence_id: u64, sequence: &[FileOperation]) -> SequenceResult {
        if sequence.is_empty() {
            return SequenceResult::neutral(sequence_id);
        }

        let size_ratio = bounded(self.size.score(sequence));
        let file_type_funnelling = bounded(self.file_type.score(sequence));
        let entropy_funnelling = bounded(self.entropy.score(sequence));
        let score = self.weights.size * size_ratio
            + self.weights.file_type * file_type_funnelling
            + self.weights.entropy * entropy_funnelling;

        SequenceResult::new(
            sequence_id,
            size_ratio,
            file_type_funnelling,
            entropy_funnelling,
            score,
            sequence.iter().map(OperationSummary::from).collect(),
        )
    }
}

fn bounded(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
