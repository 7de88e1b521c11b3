//! Scan orchestration
//!
//! Drives raw operation descriptors through the pipeline:
//! enrichment (entropy, file name, corruption) -> sequence analysis ->
//! classification -> append to the operation log. Also answers recovery
//! requests and produces the verdicts handed back to the caller.

use crate::analyzer::{
    EntropyAnalyzer, EntropyClass, FileCorruptionAnalyzer, FileNameAnalyzer, SequenceAnalyzer,
    SequenceResult,
};
use crate::classifier::{Classifier, SuspicionLevel};
use crate::config::Config;
use crate::detector::header;
use crate::error::{Error, Result};
use crate::monitor::{Command, FileKind, FileOperation, RawOperation};
use crate::recovery::{Recovery, RecoveryOutcome};
use crate::storage::{
    FileStorage, JsonlStore, LocalStorage, OperationStore, RecoveryClaim, Restorer, UserContext,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of scanning one or more sequences for a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub user_id: String,
    pub scanned_at: DateTime<Utc>,
    /// Number of operations classified and recorded
    pub operation_count: usize,
    /// Operations classified above `NO_SUSPICION`
    pub findings: usize,
    pub unanalyzable: usize,
    pub highest_suspicion: Option<SuspicionLevel>,
    pub sequences: Vec<SequenceResult>,
    pub operations: Vec<FileOperation>,
}

impl ScanSummary {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            scanned_at: Utc::now(),
            operation_count: 0,
            findings: 0,
            unanalyzable: 0,
            highest_suspicion: None,
            sequences: Vec::new(),
            operations: Vec::new(),
        }
    }

    fn record(&mut self, op: FileOperation) {
        self.operation_count += 1;
        if op.unanalyzable.is_some() {
            self.unanalyzable += 1;
        }
        if op
            .suspicion_class
            .is_some_and(|level| level > SuspicionLevel::NoSuspicion)
        {
            self.findings += 1;
        }
        self.highest_suspicion = self.highest_suspicion.max(op.suspicion_class);
        self.operations.push(op);
    }

    fn merge(&mut self, other: ScanSummary) {
        self.sequences.extend(other.sequences);
        for op in other.operations {
            self.record(op);
        }
    }
}

/// Caller-facing result of a request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Scan(ScanSummary),
    Recovery { id: u64, outcome: RecoveryOutcome },
    /// Request refused before any processing
    Rejected { reason: String },
}

impl Verdict {
    /// HTTP-style status: scans always succeed, recoveries only when restored
    pub fn status(&self) -> u16 {
        match self {
            Verdict::Scan(_) => 200,
            Verdict::Recovery { outcome, .. } if outcome.is_success() => 200,
            Verdict::Recovery { .. } | Verdict::Rejected { .. } => 400,
        }
    }

    /// Turn a request result into a verdict; errors that are not the
    /// caller's fault are handed back
    pub fn from_result(result: Result<Verdict>) -> Result<Verdict> {
        match result {
            Err(e) if e.is_client_error() => Ok(Verdict::Rejected {
                reason: e.to_string(),
            }),
            other => other,
        }
    }

    pub fn response(&self) -> Response<'_> {
        Response {
            status: self.status(),
            verdict: self,
        }
    }
}

/// Verdict with its status, as written to the transport
#[derive(Debug, Serialize)]
pub struct Response<'a> {
    pub status: u16,
    pub verdict: &'a Verdict,
}

/// Split a time-ordered list wherever consecutive events are more than
/// `gap_secs` apart
pub fn group_sequences(raw: &[RawOperation], gap_secs: i64) -> Vec<&[RawOperation]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..raw.len() {
        if raw[i].timestamp - raw[i - 1].timestamp > gap_secs {
            groups.push(&raw[start..i]);
            start = i;
        }
    }
    if start < raw.len() {
        groups.push(&raw[start..]);
    }
    groups
}

fn check_order(raw: &[RawOperation]) -> Result<()> {
    match raw.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
        Some(w) => Err(Error::MalformedSequence(format!(
            "{} at {} arrives after {} at {}",
            w[1].path, w[1].timestamp, w[0].path, w[0].timestamp
        ))),
        None => Ok(()),
    }
}

/// Main scanning engine
pub struct Scanner {
    config: Config,
    storage: Arc<dyn FileStorage>,
    restorer: Arc<dyn Restorer>,
    store: Arc<dyn OperationStore>,
    entropy: EntropyAnalyzer,
    file_name: FileNameAnalyzer,
    corruption: FileCorruptionAnalyzer,
    sequence: SequenceAnalyzer,
    classifier: Classifier,
}

impl Scanner {
    pub fn new(
        config: Config,
        storage: Arc<dyn FileStorage>,
        restorer: Arc<dyn Restorer>,
        store: Arc<dyn OperationStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            entropy: EntropyAnalyzer::new(&config.detection),
            file_name: FileNameAnalyzer::new(&config.detection),
            corruption: FileCorruptionAnalyzer::new(),
            sequence: SequenceAnalyzer::new(&config.sequence),
            classifier: Classifier::new(&config.classifier),
            config,
            storage,
            restorer,
            store,
        })
    }

    /// Scanner over the configured directory tree and operation log
    pub fn from_config(config: Config) -> Result<Self> {
        let local = Arc::new(LocalStorage::new(config.storage.clone()));
        let store = Arc::new(JsonlStore::new(config.store.path.clone()));
        Self::new(config, local.clone(), local, store)
    }

    /// Replace the sequence analyzer, e.g. with custom metrics
    pub fn with_sequence_analyzer(mut self, sequence: SequenceAnalyzer) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scan one sequence of time-ordered descriptors
    ///
    /// The whole batch is rejected if any descriptor is malformed or out of
    /// order. A file that cannot be read only degrades its own operation.
    pub fn scan_sequence(
        &self,
        ctx: &UserContext,
        sequence_id: u64,
        raw: &[RawOperation],
    ) -> Result<ScanSummary> {
        for r in raw {
            r.validate()?;
        }
        check_order(raw)?;

        let mut summary = ScanSummary::new(&ctx.user_id);
        if raw.is_empty() {
            return Ok(summary);
        }

        let mut ops: Vec<FileOperation> = raw
            .iter()
            .filter(|r| {
                let excluded = self.config.is_excluded(&r.path);
                if excluded {
                    debug!("Skipping excluded path: {}", r.path);
                }
                !excluded
            })
            .map(|r| FileOperation::from_raw(&ctx.user_id, sequence_id, r))
            .collect();

        for op in &mut ops {
            self.enrich(ctx, op);
        }

        let result = self.sequence.analyze(sequence_id, &ops);
        info!(
            "Sequence {} of {}: {} operations, score {:.2}",
            sequence_id,
            ctx.user_id,
            ops.len(),
            result.score
        );

        for op in ops {
            let recorded = self
                .classifier
                .classify_and_record(self.store.as_ref(), ctx, op, &result)?;
            if recorded.suspicion_class >= Some(SuspicionLevel::MiddleLevelOfSuspicion) {
                warn!(
                    "{:?} {} classified {:?} (id {:?})",
                    recorded.command, recorded.path, recorded.suspicion_class, recorded.id
                );
            }
            summary.record(recorded);
        }
        summary.sequences.push(result);

        Ok(summary)
    }

    /// Group a user's events into sequences and scan each of them
    ///
    /// Events are put into timestamp order first; ids continue from the
    /// highest sequence already recorded.
    pub fn scan_events(&self, ctx: &UserContext, raw: &[RawOperation]) -> Result<ScanSummary> {
        for r in raw {
            r.validate()?;
        }

        let mut events = raw.to_vec();
        events.sort_by_key(|r| r.timestamp);

        let mut summary = ScanSummary::new(&ctx.user_id);
        let mut sequence_id = self.store.last_sequence(ctx)?.map_or(1, |last| last + 1);
        for group in group_sequences(&events, self.config.sequence.gap_secs) {
            summary.merge(self.scan_sequence(ctx, sequence_id, group)?);
            sequence_id += 1;
        }

        info!(
            "Scanned {} operations for {}, highest suspicion {:?}",
            summary.operation_count, ctx.user_id, summary.highest_suspicion
        );
        Ok(summary)
    }

    /// Descriptors for everything changed since the last recorded activity
    ///
    /// Live files modified since then become writes, items trashed since then
    /// become deletions.
    pub fn files_to_scan(&self, ctx: &UserContext) -> Result<Vec<RawOperation>> {
        let since = self.store.last_activity(ctx)?.unwrap_or(i64::MIN);

        let live = self.storage.structure(ctx)?;
        let trash = self.storage.trash_structure(ctx)?;

        let mut raw: Vec<RawOperation> = live
            .changed_since(since)
            .map(|e| RawOperation::new(Command::Write, e.path.as_str(), e.timestamp))
            .chain(
                trash
                    .changed_since(since)
                    .map(|e| RawOperation::new(Command::Delete, e.path.as_str(), e.timestamp)),
            )
            .filter(|r| !self.config.is_excluded(&r.path))
            .collect();
        raw.sort_by(|a, b| (a.timestamp, &a.path).cmp(&(b.timestamp, &b.path)));

        debug!(
            "{} changes for {} since {}",
            raw.len(),
            ctx.user_id,
            since
        );
        Ok(raw)
    }

    /// Scan everything changed since the last recorded activity
    pub fn scan_changes(&self, ctx: &UserContext) -> Result<ScanSummary> {
        let raw = self.files_to_scan(ctx)?;
        self.scan_events(ctx, &raw)
    }

    /// Try to undo a recorded operation
    ///
    /// A restore is issued at most once per operation; later requests get
    /// the recorded outcome back. The operation is claimed in the store
    /// before the restore runs, so a recovery whose outcome could not be
    /// recorded is never issued again.
    pub fn recover(&self, ctx: &UserContext, id: u64) -> Result<RecoveryOutcome> {
        let Some(op) = self.store.find(ctx, id)? else {
            warn!("No operation {} recorded for {}", id, ctx.user_id);
            return Ok(RecoveryOutcome::NotRestorable);
        };

        match self.store.begin_recovery(ctx, id)? {
            RecoveryClaim::Claimed => {}
            RecoveryClaim::Recorded(outcome) => {
                info!("Operation {} of {} already recovered: {:?}", id, ctx.user_id, outcome);
                return Ok(outcome);
            }
            RecoveryClaim::Pending => {
                warn!("Recovery of operation {} of {} has no recorded outcome", id, ctx.user_id);
                return Err(Error::NotRestorable(format!(
                    "recovery of operation {} was already started",
                    id
                )));
            }
        }

        let outcome = Recovery::new(&op).run(ctx, self.restorer.as_ref());
        if let Err(e) = self.store.record_recovery(ctx, id, outcome) {
            error!(
                "Recovery of operation {} of {} ended {:?} but was not recorded: {}",
                id, ctx.user_id, outcome, e
            );
            return Err(e);
        }
        Ok(outcome)
    }

    /// Attach content and name signals to an operation
    fn enrich(&self, ctx: &UserContext, op: &mut FileOperation) {
        op.mime_type = header::mime_for_name(op.relevant_name()).to_string();

        let name = self.file_name.analyze(op.relevant_name());
        op.file_name_entropy = Some(name.entropy);
        op.file_name_class = Some(name.class);

        match self.storage.stat(ctx, op) {
            Ok(stat) => {
                op.kind = stat.kind;
                op.size = stat.size;
            }
            Err(e) => {
                mark_unanalyzable(op, &e.to_string());
                return;
            }
        }

        if op.kind == FileKind::Folder {
            op.entropy = Some(0.0);
            op.standard_deviation = Some(0.0);
            op.file_class = Some(EntropyClass::Normal);
            op.corrupted = Some(false);
            return;
        }

        let content = self
            .entropy
            .analyze(self.storage.as_ref(), ctx, op)
            .and_then(|entropy| {
                let corrupted = self.corruption.analyze(self.storage.as_ref(), ctx, op)?;
                Ok((entropy, corrupted))
            });
        match content {
            Ok((entropy, corrupted)) => {
                op.entropy = Some(entropy.entropy);
                op.standard_deviation = Some(entropy.standard_deviation);
                op.file_class = Some(entropy.class);
                op.corrupted = Some(corrupted);
            }
            Err(e) => mark_unanalyzable(op, &e.to_string()),
        }
    }
}

fn mark_unanalyzable(op: &mut FileOperation, reason: &str) {
    warn!("Cannot analyze {:?} {}: {}", op.command, op.path, reason);
    op.unanalyzable = Some(reason.to_string());
}
