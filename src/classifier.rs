//! Suspicion classification
//!
//! Fuses the per-file signals of an operation with the score of its sequence.
//! Each signal contributes a configured weight; the sum is mapped onto an
//! ordered set of bands. The result depends only on the four inputs.

use crate::analyzer::{EntropyClass, FileNameClass, SequenceResult};
use crate::config::ClassifierConfig;
use crate::error::Result;
use crate::monitor::FileOperation;
use crate::storage::{OperationStore, UserContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Final verdict for one operation, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspicionLevel {
    NoSuspicion,
    LowLevelOfSuspicion,
    MiddleLevelOfSuspicion,
    HighLevelOfSuspicion,
}

/// File-level signals an operation must carry before it can be classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    pub corrupted: bool,
    pub file_class: EntropyClass,
    pub file_name_class: FileNameClass,
}

impl Signals {
    /// Signals of an enriched operation; `None` until all are populated
    pub fn of(op: &FileOperation) -> Option<Self> {
        Some(Self {
            corrupted: op.corrupted?,
            file_class: op.file_class?,
            file_name_class: op.file_name_class?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Fused score of the signals
    pub fn score(&self, signals: Signals, sequence: &SequenceResult) -> u32 {
        let c = &self.config;

        let corrupted = if signals.corrupted { c.corrupted_weight } else { 0 };
        let content = match signals.file_class {
            EntropyClass::Normal => 0,
            EntropyClass::Suspicious => c.entropy_suspicious_weight,
            EntropyClass::High => c.entropy_high_weight,
        };
        let name = match signals.file_name_class {
            FileNameClass::Normal => 0,
            FileNameClass::Suspicious => c.name_suspicious_weight,
            FileNameClass::High => c.name_high_weight,
        };
        let sequence = match sequence.score {
            s if s >= c.sequence_high => c.sequence_high_weight,
            s if s >= c.sequence_medium => c.sequence_medium_weight,
            _ => 0,
        };

        corrupted + content + name + sequence
    }

    /// Map the signals onto a suspicion level
    pub fn level(&self, signals: Signals, sequence: &SequenceResult) -> SuspicionLevel {
        let c = &self.config;
        match self.score(signals, sequence) {
            s if s >= c.high_band => SuspicionLevel::HighLevelOfSuspicion,
            s if s >= c.middle_band => SuspicionLevel::MiddleLevelOfSuspicion,
            s if s >= c.low_band => SuspicionLevel::LowLevelOfSuspicion,
            _ => SuspicionLevel::NoSuspicion,
        }
    }

    /// Set the suspicion level of an enriched operation
    ///
    /// Operations missing any file-level signal (unanalyzable content) are
    /// left unclassified.
    pub fn classify(&self, op: &mut FileOperation, sequence: &SequenceResult) -> Option<SuspicionLevel> {
        let level = Signals::of(op).map(|signals| self.level(signals, sequence));
        op.suspicion_class = level;
        debug!(
            "Classified {:?} {} in sequence {}: {:?}",
            op.command, op.path, sequence.sequence_id, level
        );
        level
    }

    /// Classify an operation and append it to the operation log
    pub fn classify_and_record(
        &self,
        store: &dyn OperationStore,
        ctx: &UserContext,
        mut op: FileOperation,
        sequence: &SequenceResult,
    ) -> Result<FileOperation> {
        self.classify(&mut op, sequence);
        store.append(ctx, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{Command, RawOperation};
    use crate::storage::MemoryStore;

    fn classifier() -> Classifier {
        Classifier::new(&ClassifierConfig::default())
    }

    fn signals(corrupted: bool, file_class: EntropyClass, file_name_class: FileNameClass) -> Signals {
        Signals {
            corrupted,
            file_class,
            file_name_class,
        }
    }

    fn sequence(score: f64) -> SequenceResult {
        SequenceResult::new(1, 0.0, 0.0, 0.0, score, Vec::new())
    }

    #[test]
    fn test_clean_operation() {
        let level = classifier().level(
            signals(false, EntropyClass::Normal, FileNameClass::Normal),
            &SequenceResult::neutral(1),
        );
        assert_eq!(level, SuspicionLevel::NoSuspicion);
    }

    #[test]
    fn test_bands() {
        let classifier = classifier();
        let neutral = SequenceResult::neutral(1);
        assert_eq!(
            classifier.level(signals(true, EntropyClass::Normal, FileNameClass::Normal), &neutral),
            SuspicionLevel::LowLevelOfSuspicion
        );
        assert_eq!(
            classifier.level(signals(false, EntropyClass::High, FileNameClass::Suspicious), &neutral),
            SuspicionLevel::MiddleLevelOfSuspicion
        );
        assert_eq!(
            classifier.level(signals(true, EntropyClass::High, FileNameClass::Suspicious), &neutral),
            SuspicionLevel::HighLevelOfSuspicion
        );
    }

    #[test]
    fn test_sequence_lifts_corrupted_file_to_high() {
        // Corrupted write with ordinary entropy and name inside a strongly
        // funnelling sequence
        let level = classifier().level(
            signals(true, EntropyClass::Normal, FileNameClass::Normal),
            &SequenceResult::new(1, 0.0, 1.1, 2.2, 4.5, Vec::new()),
        );
        assert_eq!(level, SuspicionLevel::HighLevelOfSuspicion);
    }

    #[test]
    fn test_sequence_bands() {
        let classifier = classifier();
        let clean = signals(false, EntropyClass::Normal, FileNameClass::Normal);
        assert_eq!(classifier.score(clean, &sequence(0.29)), 0);
        assert_eq!(classifier.score(clean, &sequence(0.3)), 2);
        assert_eq!(classifier.score(clean, &sequence(0.6)), 4);
    }

    #[test]
    fn test_deterministic() {
        let classifier = classifier();
        let seq = sequence(0.45);
        for corrupted in [false, true] {
            for file_class in [EntropyClass::Normal, EntropyClass::Suspicious, EntropyClass::High] {
                for name_class in [FileNameClass::Normal, FileNameClass::Suspicious, FileNameClass::High] {
                    let s = signals(corrupted, file_class, name_class);
                    assert_eq!(classifier.level(s, &seq), classifier.level(s, &seq.clone()));
                }
            }
        }
    }

    #[test]
    fn test_monotonic_in_signals() {
        let classifier = classifier();
        let seq = sequence(0.0);
        let base = classifier.level(signals(false, EntropyClass::Suspicious, FileNameClass::Normal), &seq);
        let worse = classifier.level(signals(true, EntropyClass::Suspicious, FileNameClass::Normal), &seq);
        assert!(worse >= base);
    }

    #[test]
    fn test_classify_requires_all_signals() {
        let classifier = classifier();
        let raw = RawOperation::new(Command::Write, "a.txt", 1);
        let mut op = FileOperation::from_raw("alice", 1, &raw);
        op.corrupted = Some(true);
        op.file_class = Some(EntropyClass::High);
        assert_eq!(classifier.classify(&mut op, &sequence(1.0)), None);
        assert_eq!(op.suspicion_class, None);

        op.file_name_class = Some(FileNameClass::Normal);
        assert_eq!(
            classifier.classify(&mut op, &sequence(1.0)),
            Some(SuspicionLevel::HighLevelOfSuspicion)
        );
    }

    #[test]
    fn test_classify_and_record_appends() {
        let classifier = classifier();
        let store = MemoryStore::new();
        let ctx = UserContext::new("alice");
        let raw = RawOperation::new(Command::Write, "a.txt", 1);
        let mut op = FileOperation::from_raw("alice", 1, &raw);
        op.corrupted = Some(false);
        op.file_class = Some(EntropyClass::Normal);
        op.file_name_class = Some(FileNameClass::Normal);

        let recorded = classifier
            .classify_and_record(&store, &ctx, op.clone(), &sequence(0.0))
            .unwrap();
        assert_eq!(recorded.id, Some(1));
        assert_eq!(recorded.suspicion_class, Some(SuspicionLevel::NoSuspicion));

        // A second record of the same event gets its own id
        let again = classifier
            .classify_and_record(&store, &ctx, op, &sequence(0.0))
            .unwrap();
        assert_eq!(again.id, Some(2));
        assert_eq!(store.operations(&ctx).unwrap().len(), 2);
    }
}
