//! Per-file and per-sequence analyzers
//!
//! The per-file analyzers wrap the raw detectors and turn their scores into
//! discrete classes. The sequence analyzer scores a whole group of
//! operations at once.

pub mod corruption;
pub mod entropy;
pub mod file_name;
pub mod sequence;

pub use corruption::FileCorruptionAnalyzer;
pub use entropy::{EntropyAnalyzer, EntropyResult};
pub use file_name::{FileNameAnalyzer, FileNameResult};
pub use sequence::{SequenceAnalyzer, SequenceMetric, SequenceResult};

use serde::{Deserialize, Serialize};

/// Content entropy class, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntropyClass {
    /// Ordinary content
    Normal,
    /// High entropy with uneven blocks, typical of compressed formats
    Suspicious,
    /// Uniformly high entropy across the file, typical of encrypted output
    High,
}

/// File name class, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileNameClass {
    /// Ordinary name
    Normal,
    /// Random-looking name or known ransomware extension
    Suspicious,
    /// Random-looking name with a known ransomware extension
    High,
}
