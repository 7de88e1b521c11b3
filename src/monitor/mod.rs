//! Observed file operations
//!
//! The capture layer reports every create/write/delete/rename as a
//! [`RawOperation`]. The scan pipeline turns each one into a
//! [`FileOperation`] and enriches it in place as it passes through the
//! analyzers and the classifier.

use crate::analyzer::{EntropyClass, FileNameClass};
use crate::classifier::SuspicionLevel;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of file system action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// File or folder was created
    Create,
    /// File content was overwritten
    Write,
    /// File or folder was deleted (moved to trash)
    Delete,
    /// File or folder was renamed or moved
    Rename,
}

impl Command {
    /// Whether the operation leaves a resulting item behind in storage
    pub fn produces_output(self) -> bool {
        !matches!(self, Command::Delete)
    }
}

/// Whether the operation touched a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    File,
    Folder,
}

/// Operation descriptor as delivered by the capture layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    pub command: Command,
    /// Path relative to the user's files root; for renames the new location
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub new_name: String,
    /// Event time in seconds since the epoch
    pub timestamp: i64,
}

impl RawOperation {
    pub fn new(command: Command, path: impl Into<String>, timestamp: i64) -> Self {
        let path = path.into();
        let name = file_name(&path).to_string();
        Self {
            command,
            path,
            original_name: name.clone(),
            new_name: name,
            timestamp,
        }
    }

    /// Name of the item before the operation
    pub fn source_name(&self) -> &str {
        if self.original_name.is_empty() {
            file_name(&self.path)
        } else {
            &self.original_name
        }
    }

    /// Name of the item after the operation
    pub fn target_name(&self) -> &str {
        if self.new_name.is_empty() {
            self.source_name()
        } else {
            &self.new_name
        }
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::MalformedSequence(format!(
                "{:?} at {} has no path",
                self.command, self.timestamp
            )));
        }
        if self.timestamp < 0 {
            return Err(Error::MalformedSequence(format!(
                "{} has negative timestamp {}",
                self.path, self.timestamp
            )));
        }
        if self.command == Command::Rename
            && (self.original_name.is_empty() || self.new_name.is_empty())
        {
            return Err(Error::MalformedSequence(format!(
                "rename of {} is missing its original or new name",
                self.path
            )));
        }
        Ok(())
    }
}

/// One observed file system action, enriched as it flows through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperation {
    /// Assigned by the operation store on append
    pub id: Option<u64>,
    pub user_id: String,
    pub command: Command,
    pub original_name: String,
    pub new_name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub mime_type: String,
    pub size: u64,
    pub timestamp: i64,
    pub sequence: u64,

    pub corrupted: Option<bool>,
    pub entropy: Option<f64>,
    pub standard_deviation: Option<f64>,
    pub file_name_entropy: Option<f64>,
    pub file_class: Option<EntropyClass>,
    pub file_name_class: Option<FileNameClass>,
    pub suspicion_class: Option<SuspicionLevel>,

    /// Set instead of content scores when the file could not be read
    pub unanalyzable: Option<String>,
}

impl FileOperation {
    /// Start a new, not yet analyzed operation from a raw descriptor
    pub fn from_raw(user_id: &str, sequence: u64, raw: &RawOperation) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            command: raw.command,
            original_name: raw.source_name().to_string(),
            new_name: raw.target_name().to_string(),
            path: raw.path.clone(),
            kind: FileKind::File,
            mime_type: String::new(),
            size: 0,
            timestamp: raw.timestamp,
            sequence,
            corrupted: None,
            entropy: None,
            standard_deviation: None,
            file_name_entropy: None,
            file_class: None,
            file_name_class: None,
            suspicion_class: None,
            unanalyzable: None,
        }
    }

    /// Name whose shape matters for this command: the result for
    /// create/write/rename, the removed item for delete
    pub fn relevant_name(&self) -> &str {
        match self.command {
            Command::Delete => &self.original_name,
            _ => &self.new_name,
        }
    }

    /// Lowercased extension of the resulting name
    pub fn result_extension(&self) -> Option<String> {
        extension(&self.new_name)
    }

    /// Whether the file-level signals needed for classification are present
    pub fn has_signals(&self) -> bool {
        self.corrupted.is_some() && self.file_class.is_some() && self.file_name_class.is_some()
    }
}

/// Final path component of a slash separated path
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Lowercased extension of a name, if any
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_default_from_path() {
        let raw = RawOperation::new(Command::Write, "docs/report.pdf", 100);
        assert_eq!(raw.source_name(), "report.pdf");
        assert_eq!(raw.target_name(), "report.pdf");

        let raw = RawOperation {
            command: Command::Delete,
            path: "a/b.txt".to_string(),
            original_name: String::new(),
            new_name: String::new(),
            timestamp: 1,
        };
        assert_eq!(raw.target_name(), "b.txt");
    }

    #[test]
    fn test_validate() {
        assert!(RawOperation::new(Command::Create, "x.txt", 1).validate().is_ok());
        assert!(RawOperation::new(Command::Create, "", 1).validate().is_err());
        assert!(RawOperation::new(Command::Create, "x.txt", -5).validate().is_err());

        let mut rename = RawOperation::new(Command::Rename, "x.locked", 1);
        rename.original_name.clear();
        assert!(matches!(rename.validate(), Err(Error::MalformedSequence(_))));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{"command":"RENAME","path":"a/b.locky","originalName":"b.txt","newName":"b.locky","timestamp":42}"#;
        let raw: RawOperation = serde_json::from_str(json).unwrap();
        assert_eq!(raw.command, Command::Rename);
        assert_eq!(raw.source_name(), "b.txt");
        assert_eq!(raw.target_name(), "b.locky");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("Photo.JPG"), Some("jpg".to_string()));
        assert_eq!(extension("README"), None);
        assert_eq!(file_name("dir/sub/"), "sub");
    }
}
