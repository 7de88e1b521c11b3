//! Configuration management for the scanner
//!
//! Every threshold and weight used by the analyzers and the classifier is a
//! named value here so it can be calibrated without touching code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory backend layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Operation log location
    #[serde(default)]
    pub store: StoreConfig,

    /// Paths/patterns never scanned
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Per-file detection thresholds
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Sequence grouping and metric weights
    #[serde(default)]
    pub sequence: SequenceConfig,

    /// Signal fusion weights and bands
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            store: StoreConfig::default(),
            exclude: vec![
                "*.part".to_string(),
                "*.tmp".to_string(),
                "**/.cache/**".to_string(),
            ],
            detection: DetectionConfig::default(),
            sequence: SequenceConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |msg: &str| Err(crate::error::Error::Config(msg.to_string()));

        if self.sequence.gap_secs < 0 {
            return invalid("sequence.gap_secs must not be negative");
        }
        let weights = [
            self.sequence.size_weight,
            self.sequence.file_type_weight,
            self.sequence.entropy_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("sequence weights must be finite and non-negative");
        }
        let c = &self.classifier;
        if !(c.low_band <= c.middle_band && c.middle_band <= c.high_band) {
            return invalid("classifier bands must be ordered low <= middle <= high");
        }
        if c.sequence_medium > c.sequence_high {
            return invalid("classifier.sequence_medium must not exceed sequence_high");
        }
        let d = &self.detection;
        if d.entropy_suspicious > d.entropy_high {
            return invalid("detection.entropy_suspicious must not exceed entropy_high");
        }
        Ok(())
    }

    /// Check if a storage-relative path should be excluded
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|pattern| match globset::Glob::new(pattern) {
            Ok(glob) => glob.compile_matcher().is_match(path),
            Err(e) => {
                tracing::warn!("Ignoring invalid exclude pattern {:?}: {}", pattern, e);
                false
            }
        })
    }
}

/// Directory backend layout, relative to `root/<user>/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding every user's tree
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Live files
    #[serde(default = "default_files_dir")]
    pub files_dir: String,

    /// Deleted items, stored as `<path>.d<timestamp>`
    #[serde(default = "default_trash_dir")]
    pub trash_dir: String,

    /// Largest gap between a delete event and the trash stamp it matches
    #[serde(default = "default_trash_skew_secs")]
    pub trash_skew_secs: u64,

    /// Prior versions, stored as `<path>.v<timestamp>`
    #[serde(default = "default_versions_dir")]
    pub versions_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            files_dir: default_files_dir(),
            trash_dir: default_trash_dir(),
            trash_skew_secs: default_trash_skew_secs(),
            versions_dir: default_versions_dir(),
        }
    }
}

/// Operation log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of per-user append-only logs
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Per-file detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Size of one sampled block in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Maximum number of blocks sampled per file
    #[serde(default = "default_max_blocks")]
    pub max_blocks: usize,

    /// Entropy (bits/byte) above which content looks encrypted or compressed
    #[serde(default = "default_entropy_high")]
    pub entropy_high: f64,

    /// Block-to-block deviation below which high entropy is uniform (encrypted)
    #[serde(default = "default_max_block_deviation")]
    pub max_block_deviation: f64,

    /// Entropy above which content is worth a closer look
    #[serde(default = "default_entropy_suspicious")]
    pub entropy_suspicious: f64,

    /// Character entropy above which a long file name looks random
    #[serde(default = "default_file_name_entropy_high")]
    pub file_name_entropy_high: f64,

    /// Shortest name stem checked with the length-relative rule
    #[serde(default = "default_file_name_min_random_len")]
    pub file_name_min_random_len: usize,

    /// Entropy relative to the stem length above which a short stem looks random
    #[serde(default = "default_file_name_normalized_entropy")]
    pub file_name_normalized_entropy: f64,

    /// Share of character class switches above which a short stem looks generated
    #[serde(default = "default_file_name_class_switches")]
    pub file_name_class_switches: f64,

    /// Extensions appended by known ransomware families
    #[serde(default = "default_suspicious_extensions")]
    pub suspicious_extensions: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            max_blocks: default_max_blocks(),
            entropy_high: default_entropy_high(),
            max_block_deviation: default_max_block_deviation(),
            entropy_suspicious: default_entropy_suspicious(),
            file_name_entropy_high: default_file_name_entropy_high(),
            file_name_min_random_len: default_file_name_min_random_len(),
            file_name_normalized_entropy: default_file_name_normalized_entropy(),
            file_name_class_switches: default_file_name_class_switches(),
            suspicious_extensions: default_suspicious_extensions(),
        }
    }
}

/// Sequence grouping and metric weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Maximum gap in seconds between operations of one sequence
    #[serde(default = "default_gap_secs")]
    pub gap_secs: i64,

    #[serde(default = "default_size_weight")]
    pub size_weight: f64,

    #[serde(default = "default_file_type_weight")]
    pub file_type_weight: f64,

    #[serde(default = "default_entropy_weight")]
    pub entropy_weight: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            gap_secs: default_gap_secs(),
            size_weight: default_size_weight(),
            file_type_weight: default_file_type_weight(),
            entropy_weight: default_entropy_weight(),
        }
    }
}

/// Signal fusion weights and bands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_corrupted_weight")]
    pub corrupted_weight: u32,

    #[serde(default = "default_entropy_suspicious_weight")]
    pub entropy_suspicious_weight: u32,

    #[serde(default = "default_entropy_high_weight")]
    pub entropy_high_weight: u32,

    #[serde(default = "default_name_suspicious_weight")]
    pub name_suspicious_weight: u32,

    #[serde(default = "default_name_high_weight")]
    pub name_high_weight: u32,

    #[serde(default = "default_sequence_medium_weight")]
    pub sequence_medium_weight: u32,

    #[serde(default = "default_sequence_high_weight")]
    pub sequence_high_weight: u32,

    /// Combined sequence score from which the medium weight applies
    #[serde(default = "default_sequence_medium")]
    pub sequence_medium: f64,

    /// Combined sequence score from which the high weight applies
    #[serde(default = "default_sequence_high")]
    pub sequence_high: f64,

    /// Minimum fused score per level
    #[serde(default = "default_low_band")]
    pub low_band: u32,

    #[serde(default = "default_middle_band")]
    pub middle_band: u32,

    #[serde(default = "default_high_band")]
    pub high_band: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            corrupted_weight: default_corrupted_weight(),
            entropy_suspicious_weight: default_entropy_suspicious_weight(),
            entropy_high_weight: default_entropy_high_weight(),
            name_suspicious_weight: default_name_suspicious_weight(),
            name_high_weight: default_name_high_weight(),
            sequence_medium_weight: default_sequence_medium_weight(),
            sequence_high_weight: default_sequence_high_weight(),
            sequence_medium: default_sequence_medium(),
            sequence_high: default_sequence_high(),
            low_band: default_low_band(),
            middle_band: default_middle_band(),
            high_band: default_high_band(),
        }
    }
}

// Default value functions for serde
fn default_storage_root() -> PathBuf {
    PathBuf::from("/var/lib/sentinel-scan/data")
}

fn default_files_dir() -> String {
    "files".to_string()
}

fn default_trash_dir() -> String {
    "files_trashbin/files".to_string()
}

fn default_trash_skew_secs() -> u64 {
    5
}

fn default_versions_dir() -> String {
    "files_versions".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/sentinel-scan/operations")
}

fn default_block_size() -> usize {
    4096
}

fn default_max_blocks() -> usize {
    16
}

fn default_entropy_high() -> f64 {
    7.7
}

fn default_max_block_deviation() -> f64 {
    0.05
}

fn default_entropy_suspicious() -> f64 {
    7.0
}

fn default_file_name_entropy_high() -> f64 {
    4.0
}

fn default_file_name_min_random_len() -> usize {
    6
}

fn default_file_name_normalized_entropy() -> f64 {
    0.9
}

fn default_file_name_class_switches() -> f64 {
    0.5
}

fn default_suspicious_extensions() -> Vec<String> {
    [
        "locky", "zepto", "odin", "thor", "aesir", "crypt", "crypted", "cryptolocker",
        "encrypted", "enc", "locked", "cerber", "cerber3", "wncry", "wnry", "wcry", "zzzzz",
        "micro", "vvv", "ecc", "ezz", "exx", "xyz", "aaa", "abc", "ccc", "ttt", "r5a",
        "crinf", "xxx", "ryk", "conti", "lockbit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_gap_secs() -> i64 {
    10
}

fn default_size_weight() -> f64 {
    0.2
}

fn default_file_type_weight() -> f64 {
    0.4
}

fn default_entropy_weight() -> f64 {
    0.4
}

fn default_corrupted_weight() -> u32 {
    2
}

fn default_entropy_suspicious_weight() -> u32 {
    1
}

fn default_entropy_high_weight() -> u32 {
    3
}

fn default_name_suspicious_weight() -> u32 {
    1
}

fn default_name_high_weight() -> u32 {
    2
}

fn default_sequence_medium_weight() -> u32 {
    2
}

fn default_sequence_high_weight() -> u32 {
    4
}

fn default_sequence_medium() -> f64 {
    0.3
}

fn default_sequence_high() -> f64 {
    0.6
}

fn default_low_band() -> u32 {
    2
}

fn default_middle_band() -> u32 {
    4
}

fn default_high_band() -> u32 {
    6
}
