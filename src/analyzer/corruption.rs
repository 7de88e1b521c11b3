//! File corruption analyzer
//!
//! Reads the head of a file and checks it against the declared type.

use crate::detector::header;
use crate::error::{Error, Result};
use crate::monitor::FileOperation;
use crate::storage::{FileStorage, UserContext};
use std::io::Read;
use std::path::PathBuf;

/// Bytes read from the start of a file; covers every offset signature
const HEAD_LEN: u64 = 512;

#[derive(Debug, Clone, Default)]
pub struct FileCorruptionAnalyzer;

impl FileCorruptionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Whether the content an operation refers to contradicts its mime type
    pub fn analyze(
        &self,
        storage: &dyn FileStorage,
        ctx: &UserContext,
        op: &FileOperation,
    ) -> Result<bool> {
        let mut head = Vec::with_capacity(HEAD_LEN as usize);
        storage
            .open(ctx, op)
            .and_then(|reader| reader.take(HEAD_LEN).read_to_end(&mut head))
            .map_err(|source| Error::Unanalyzable {
                path: PathBuf::from(&op.path),
                source,
            })?;

        Ok(self.analyze_bytes(&op.mime_type, op.relevant_name(), &head))
    }

    pub fn analyze_bytes(&self, mime_type: &str, name: &str, head: &[u8]) -> bool {
        header::is_corrupted(mime_type, name, head)
    }
}
