//! Entropy analyzer
//!
//! Classifies file content by its sampled entropy. Uniformly high entropy
//! with little block-to-block variance is the signature of encrypted output;
//! high entropy with uneven blocks is more typical of compressed formats.

use super::EntropyClass;
use crate::config::DetectionConfig;
use crate::detector::entropy::{self, Estimate, SamplingPolicy};
use crate::error::{Error, Result};
use crate::monitor::FileOperation;
use crate::storage::{FileStorage, UserContext};
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek};
use std::path::PathBuf;

/// Entropy score of one file and its class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntropyResult {
    pub entropy: f64,
    pub standard_deviation: f64,
    pub class: EntropyClass,
}

#[derive(Debug, Clone)]
pub struct EntropyAnalyzer {
    policy: SamplingPolicy,
    entropy_high: f64,
    entropy_suspicious: f64,
    max_block_deviation: f64,
}

impl EntropyAnalyzer {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            policy: SamplingPolicy::new(config.block_size, config.max_blocks),
            entropy_high: config.entropy_high,
            entropy_suspicious: config.entropy_suspicious,
            max_block_deviation: config.max_block_deviation,
        }
    }

    /// Analyze the content an operation refers to
    pub fn analyze(
        &self,
        storage: &dyn FileStorage,
        ctx: &UserContext,
        op: &FileOperation,
    ) -> Result<EntropyResult> {
        let unanalyzable = |source| Error::Unanalyzable {
            path: PathBuf::from(&op.path),
            source,
        };
        let len = storage.stat(ctx, op).map_err(unanalyzable)?.size;
        let mut reader = storage.open(ctx, op).map_err(unanalyzable)?;
        self.analyze_reader(&mut reader, len).map_err(unanalyzable)
    }

    /// Analyze a seekable stream of `len` bytes
    pub fn analyze_reader<R: Read + Seek>(
        &self,
        reader: &mut R,
        len: u64,
    ) -> std::io::Result<EntropyResult> {
        let estimate = entropy::estimate_reader(reader, len, self.policy)?;
        Ok(self.result(estimate))
    }

    /// Analyze in-memory content
    pub fn analyze_bytes(&self, data: &[u8]) -> EntropyResult {
        self.result(entropy::estimate(data, self.policy))
    }

    fn result(&self, estimate: Estimate) -> EntropyResult {
        EntropyResult {
            entropy: estimate.entropy,
            standard_deviation: estimate.standard_deviation,
            class: self.classify(estimate.entropy, estimate.standard_deviation),
        }
    }

    /// Classify an entropy score and its block dispersion
    pub fn classify(&self, entropy: f64, standard_deviation: f64) -> EntropyClass {
        match entropy {
            e if e >= self.entropy_high && standard_deviation <= self.max_block_deviation => {
                EntropyClass::High
            }
            e if e >= self.entropy_suspicious => EntropyClass::Suspicious,
            _ => EntropyClass::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> EntropyAnalyzer {
        EntropyAnalyzer::new(&DetectionConfig::default())
    }

    fn pseudo_random(len: usize) -> Vec<u8> {
        let mut state = 0x9E3779B97F4A7C15u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 32) as u8
            })
            .collect()
    }

    #[test]
    fn test_classify_bands() {
        let analyzer = analyzer();
        assert_eq!(analyzer.classify(4.5, 0.3), EntropyClass::Normal);
        assert_eq!(analyzer.classify(7.2, 0.3), EntropyClass::Suspicious);
        assert_eq!(analyzer.classify(7.95, 0.5), EntropyClass::Suspicious);
        assert_eq!(analyzer.classify(7.95, 0.01), EntropyClass::High);
    }

    #[test]
    fn test_text_is_normal() {
        let text = b"The quick brown fox jumps over the lazy dog. ".repeat(500);
        let result = analyzer().analyze_bytes(&text);
        assert_eq!(result.class, EntropyClass::Normal);
        assert!(result.entropy < 5.0);
    }

    #[test]
    fn test_random_is_high() {
        let result = analyzer().analyze_bytes(&pseudo_random(128 * 1024));
        assert_eq!(result.class, EntropyClass::High);
    }

    #[test]
    fn test_mixed_random_and_text_is_not_high() {
        let mut data = pseudo_random(8192);
        data.extend(b"plain text section ".repeat(431));
        data.extend(pseudo_random(8192));
        let result = analyzer().analyze_bytes(&data);
        assert_ne!(result.class, EntropyClass::High);
    }

    #[test]
    fn test_empty_is_normal() {
        let result = analyzer().analyze_bytes(&[]);
        assert_eq!(result.entropy, 0.0);
        assert_eq!(result.standard_deviation, 0.0);
        assert_eq!(result.class, EntropyClass::Normal);
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = pseudo_random(50_000);
        let analyzer = analyzer();
        let mut cursor = std::io::Cursor::new(data.clone());
        let from_reader = analyzer.analyze_reader(&mut cursor, data.len() as u64).unwrap();
        assert_eq!(from_reader, analyzer.analyze_bytes(&data));
    }
}
