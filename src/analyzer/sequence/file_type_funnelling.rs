//! File type funnelling analyzer

use super::SequenceMetric;
use crate::detector::header::OPAQUE_MIME;
use crate::monitor::{extension, Command, FileOperation};
use std::collections::HashSet;

/// Measures many input types collapsing into few resulting extensions
///
/// Inputs are the types of the items a sequence consumed: the declared mime
/// type of deleted or overwritten files and the former name of renamed ones.
/// Outputs are the extensions of everything the sequence produced. Encrypting
/// a folder of mixed documents into `*.locked` files funnels every input
/// type into a single output extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTypeFunnellingAnalyzer;

impl FileTypeFunnellingAnalyzer {
    fn input_type(op: &FileOperation) -> Option<String> {
        let declared = match op.command {
            Command::Delete | Command::Write => op.mime_type.as_str(),
            Command::Rename => crate::detector::header::mime_for_name(&op.original_name),
            Command::Create => return None,
        };
        if !declared.is_empty() && declared != OPAQUE_MIME {
            return Some(declared.to_string());
        }
        Some(format!("ext:{}", extension(&op.original_name).unwrap_or_default()))
    }

    fn output_type(op: &FileOperation) -> Option<String> {
        op.command
            .produces_output()
            .then(|| op.result_extension().unwrap_or_default())
    }
}

impl SequenceMetric for FileTypeFunnellingAnalyzer {
    fn score(&self, sequence: &[FileOperation]) -> f64 {
        if sequence.len() < 2 {
            return 0.0;
        }

        let inputs: HashSet<String> = sequence.iter().filter_map(Self::input_type).collect();
        let outputs: HashSet<String> = sequence.iter().filter_map(Self::output_type).collect();

        if inputs.len() < 2 || outputs.is_empty() {
            return 0.0;
        }
        (1.0 - outputs.len() as f64 / inputs.len() as f64).max(0.0)
    }
}
