//! File name analyzer

use super::FileNameClass;
use crate::config::DetectionConfig;
use crate::detector::filename;
use crate::monitor::extension;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name entropy and its class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameResult {
    pub entropy: f64,
    pub class: FileNameClass,
}

#[derive(Debug, Clone)]
pub struct FileNameAnalyzer {
    entropy_high: f64,
    min_random_len: usize,
    normalized_entropy: f64,
    class_switches: f64,
    suspicious_extensions: HashSet<String>,
}

impl FileNameAnalyzer {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            entropy_high: config.file_name_entropy_high,
            min_random_len: config.file_name_min_random_len,
            normalized_entropy: config.file_name_normalized_entropy,
            class_switches: config.file_name_class_switches,
            suspicious_extensions: config
                .suspicious_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Score and classify a file name. Never fails; an empty name scores 0.
    pub fn analyze(&self, name: &str) -> FileNameResult {
        let entropy = filename::calculate(name);
        let random = self.looks_random(filename::stem(name));
        let known_extension = self.has_suspicious_extension(name);

        let class = match (random, known_extension) {
            (true, true) => FileNameClass::High,
            (true, false) | (false, true) => FileNameClass::Suspicious,
            (false, false) => FileNameClass::Normal,
        };

        FileNameResult { entropy, class }
    }

    /// Long stems need high absolute entropy. Shorter ones are judged by
    /// entropy relative to their length, plus how often neighbouring
    /// characters jump between letter case and digits.
    pub fn looks_random(&self, stem: &str) -> bool {
        if filename::calculate(stem) >= self.entropy_high {
            return true;
        }
        stem.chars().count() >= self.min_random_len
            && filename::normalized(stem) >= self.normalized_entropy
            && filename::class_switches(stem) >= self.class_switches
    }

    /// Whether the name ends in an extension used by known ransomware
    pub fn has_suspicious_extension(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| self.suspicious_extensions.contains(&ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> FileNameAnalyzer {
        FileNameAnalyzer::new(&DetectionConfig::default())
    }

    #[test]
    fn test_empty_name() {
        let result = analyzer().analyze("");
        assert_eq!(result.entropy, 0.0);
        assert_eq!(result.class, FileNameClass::Normal);
    }

    #[test]
    fn test_plain_names() {
        for name in [
            "report.pdf",
            "holiday-2023.jpg",
            "notes.txt",
            "test.csv",
            "IMG_20230512.jpg",
            "QuarterlyReport.xlsx",
            "a.docx",
            "budget_v2.ods",
        ] {
            let result = analyzer().analyze(name);
            assert_eq!(result.class, FileNameClass::Normal, "{}", name);
            assert!(result.entropy >= 0.0);
        }
    }

    #[test]
    fn test_known_extension() {
        let analyzer = analyzer();
        assert_eq!(analyzer.analyze("report.pdf.locky").class, FileNameClass::Suspicious);
        assert!(analyzer.has_suspicious_extension("a.WNCRY"));
        assert!(!analyzer.has_suspicious_extension("a.docx"));
    }

    #[test]
    fn test_random_name() {
        let analyzer = analyzer();
        // 20 distinct characters in the stem: log2(20) > 4
        assert_eq!(
            analyzer.analyze("k3J9xQ2mZ7bW5nR8tY1v.dat").class,
            FileNameClass::Suspicious
        );
        assert_eq!(
            analyzer.analyze("k3J9xQ2mZ7bW5nR8tY1v.zepto").class,
            FileNameClass::High
        );
    }

    #[test]
    fn test_short_random_names() {
        let analyzer = analyzer();
        for name in ["x7Qk2LpZ.docx", "a9F3kQz1W.pdf", "Zq8Lm2Xw4Tb.jpg", "3f9a1c7e.txt"] {
            assert_eq!(analyzer.analyze(name).class, FileNameClass::Suspicious, "{}", name);
        }
        assert_eq!(analyzer.analyze("x7Qk2LpZ.locky").class, FileNameClass::High);
        // Appended extension leaves the original name as the stem
        assert_eq!(analyzer.analyze("a.docx.locky").class, FileNameClass::Suspicious);
    }

    #[test]
    fn test_custom_extensions() {
        let config = DetectionConfig {
            suspicious_extensions: vec![".Pwned".to_string()],
            ..DetectionConfig::default()
        };
        let analyzer = FileNameAnalyzer::new(&config);
        assert!(analyzer.has_suspicious_extension("x.pwned"));
        assert!(!analyzer.has_suspicious_extension("x.locky"));
    }
}
