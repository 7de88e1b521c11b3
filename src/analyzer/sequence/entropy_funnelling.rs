//! Entropy funnelling analyzer

use super::SequenceMetric;
use crate::analyzer::EntropyClass;
use crate::monitor::{Command, FileOperation};
use tracing::trace;

/// Measures ordinary content turning into uniformly high entropy output
///
/// The score is the share of written or created files classed as high
/// entropy, scaled by the share of deleted files that were not. Without any
/// deletions the inputs are taken to have been ordinary. Operations that
/// could not be analyzed are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntropyFunnellingAnalyzer;

fn share(classes: &[EntropyClass], predicate: impl Fn(EntropyClass) -> bool) -> f64 {
    classes.iter().filter(|c| predicate(**c)).count() as f64 / classes.len() as f64
}

impl SequenceMetric for EntropyFunnellingAnalyzer {
    fn score(&self, sequence: &[FileOperation]) -> f64 {
        if sequence.len() < 2 {
            return 0.0;
        }

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for op in sequence {
            let Some(class) = op.file_class else {
                continue;
            };
            match op.command {
                Command::Delete => inputs.push(class),
                Command::Create | Command::Write => outputs.push(class),
                Command::Rename => {}
            }
        }

        if outputs.is_empty() {
            return 0.0;
        }

        let high_output = share(&outputs, |c| c == EntropyClass::High);
        let ordinary_input = if inputs.is_empty() {
            1.0
        } else {
            share(&inputs, |c| c != EntropyClass::High)
        };
        trace!(
            "entropy funnelling: {} inputs, {} outputs, {:.2} high output, {:.2} ordinary input",
            inputs.len(),
            outputs.len(),
            high_output,
            ordinary_input
        );

        high_output * ordinary_input
    }
}
