//! Sequence size analyzer

use super::SequenceMetric;
use crate::monitor::{Command, FileKind, FileOperation};

/// Compares bytes deleted with bytes written across a sequence
///
/// Ransomware that writes encrypted copies and deletes the originals leaves
/// behind about as many bytes as it removed. The score is the ratio of the
/// smaller to the larger total, 0 when either side is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceSizeAnalyzer;

impl SequenceMetric for SequenceSizeAnalyzer {
    fn score(&self, sequence: &[FileOperation]) -> f64 {
        if sequence.len() < 2 {
            return 0.0;
        }

        let mut written = 0u64;
        let mut deleted = 0u64;
        for op in sequence.iter().filter(|op| op.kind == FileKind::File) {
            match op.command {
                Command::Create | Command::Write => written = written.saturating_add(op.size),
                Command::Delete => deleted = deleted.saturating_add(op.size),
                Command::Rename => {}
            }
        }

        if written == 0 || deleted == 0 {
            return 0.0;
        }
        written.min(deleted) as f64 / written.max(deleted) as f64
    }
}
