//! Operation logs
//!
//! Both stores are append-only: an operation is written once with a fresh id
//! and never rewritten. Appends for the same user are serialized behind a
//! lock so ids stay unique and in order. A recovery is claimed before it runs
//! and its outcome recorded after, so an interrupted recovery is never
//! issued twice.

use super::{OperationStore, RecoveryClaim, UserContext};
use crate::error::{Error, Result};
use crate::monitor::FileOperation;
use crate::recovery::RecoveryOutcome;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// One line of a user's log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "lowercase")]
enum Record {
    Operation(FileOperation),
    Claim { id: u64 },
    Recovery { id: u64, outcome: RecoveryOutcome },
}

#[derive(Debug, Default)]
struct UserLog {
    operations: Vec<FileOperation>,
    claims: HashSet<u64>,
    recoveries: HashMap<u64, RecoveryOutcome>,
}

impl UserLog {
    fn from_records(records: Vec<Record>) -> Self {
        let mut log = UserLog::default();
        for record in records {
            match record {
                Record::Operation(op) => log.operations.push(op),
                Record::Claim { id } => {
                    log.claims.insert(id);
                }
                Record::Recovery { id, outcome } => {
                    log.recoveries.entry(id).or_insert(outcome);
                }
            }
        }
        log
    }

    fn next_id(&self) -> u64 {
        self.operations.iter().filter_map(|op| op.id).max().unwrap_or(0) + 1
    }

    /// State of a recovery, or `None` when nobody has claimed it yet
    fn existing_claim(&self, id: u64) -> Option<RecoveryClaim> {
        match self.recoveries.get(&id) {
            Some(outcome) => Some(RecoveryClaim::Recorded(*outcome)),
            None if self.claims.contains(&id) => Some(RecoveryClaim::Pending),
            None => None,
        }
    }
}

fn already_recorded(id: u64) -> Error {
    Error::Persistence(format!("recovery of operation {} is already recorded", id))
}

fn check_new(op: &FileOperation) -> Result<()> {
    match op.id {
        Some(id) => Err(Error::Persistence(format!(
            "operation {} is already recorded",
            id
        ))),
        None => Ok(()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Persistence("operation store lock poisoned".to_string()))
}

/// In-process operation log
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationStore for MemoryStore {
    fn append(&self, ctx: &UserContext, mut op: FileOperation) -> Result<FileOperation> {
        check_new(&op)?;
        let mut users = lock(&self.users)?;
        let log = users.entry(ctx.user_id.clone()).or_default();
        op.id = Some(log.next_id());
        log.operations.push(op.clone());
        Ok(op)
    }

    fn find(&self, ctx: &UserContext, id: u64) -> Result<Option<FileOperation>> {
        let users = lock(&self.users)?;
        Ok(users
            .get(&ctx.user_id)
            .and_then(|log| log.operations.iter().find(|op| op.id == Some(id)))
            .cloned())
    }

    fn operations(&self, ctx: &UserContext) -> Result<Vec<FileOperation>> {
        let users = lock(&self.users)?;
        Ok(users
            .get(&ctx.user_id)
            .map(|log| log.operations.clone())
            .unwrap_or_default())
    }

    fn recovery_outcome(&self, ctx: &UserContext, id: u64) -> Result<Option<RecoveryOutcome>> {
        let users = lock(&self.users)?;
        Ok(users
            .get(&ctx.user_id)
            .and_then(|log| log.recoveries.get(&id).copied()))
    }

    fn begin_recovery(&self, ctx: &UserContext, id: u64) -> Result<RecoveryClaim> {
        let mut users = lock(&self.users)?;
        let log = users.entry(ctx.user_id.clone()).or_default();
        if let Some(existing) = log.existing_claim(id) {
            return Ok(existing);
        }
        log.claims.insert(id);
        Ok(RecoveryClaim::Claimed)
    }

    fn record_recovery(&self, ctx: &UserContext, id: u64, outcome: RecoveryOutcome) -> Result<()> {
        let mut users = lock(&self.users)?;
        let log = users.entry(ctx.user_id.clone()).or_default();
        if log.recoveries.contains_key(&id) {
            return Err(already_recorded(id));
        }
        log.recoveries.insert(id, outcome);
        Ok(())
    }
}

/// Operation log persisted as one JSON-lines file per user
///
/// The next free id of each user is read from the log once and then kept
/// in memory. The store assumes it is the only writer of its directory.
#[derive(Debug)]
pub struct JsonlStore {
    dir: PathBuf,
    /// Next free id per user; held for every write
    next_ids: Mutex<HashMap<String, u64>>,
}

impl JsonlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_ids: Mutex::new(HashMap::new()),
        }
    }

    fn log_path(&self, ctx: &UserContext) -> Result<PathBuf> {
        let valid = !ctx.user_id.is_empty()
            && ctx
                .user_id
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
            && !ctx.user_id.starts_with('.');
        if !valid {
            return Err(Error::Persistence(format!(
                "invalid user id {:?}",
                ctx.user_id
            )));
        }
        Ok(self.dir.join(format!("{}.jsonl", ctx.user_id)))
    }

    fn load(&self, ctx: &UserContext) -> Result<UserLog> {
        let path = self.log_path(ctx)?;
        if !path.exists() {
            return Ok(UserLog::default());
        }
        Ok(UserLog::from_records(read_records(&path)?))
    }

    fn write(&self, ctx: &UserContext, record: &Record) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(persistence)?;
        let mut line = serde_json::to_string(record).map_err(persistence)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(ctx)?)
            .map_err(persistence)?;
        file.write_all(line.as_bytes()).map_err(persistence)?;
        file.sync_data().map_err(persistence)?;
        Ok(())
    }
}

impl OperationStore for JsonlStore {
    fn append(&self, ctx: &UserContext, mut op: FileOperation) -> Result<FileOperation> {
        check_new(&op)?;
        let mut next_ids = lock(&self.next_ids)?;
        let id = match next_ids.get(&ctx.user_id) {
            Some(&id) => id,
            None => self.load(ctx)?.next_id(),
        };
        op.id = Some(id);
        self.write(ctx, &Record::Operation(op.clone()))?;
        next_ids.insert(ctx.user_id.clone(), id + 1);
        Ok(op)
    }

    fn find(&self, ctx: &UserContext, id: u64) -> Result<Option<FileOperation>> {
        Ok(self
            .load(ctx)?
            .operations
            .into_iter()
            .find(|op| op.id == Some(id)))
    }

    fn operations(&self, ctx: &UserContext) -> Result<Vec<FileOperation>> {
        Ok(self.load(ctx)?.operations)
    }

    fn recovery_outcome(&self, ctx: &UserContext, id: u64) -> Result<Option<RecoveryOutcome>> {
        Ok(self.load(ctx)?.recoveries.get(&id).copied())
    }

    fn begin_recovery(&self, ctx: &UserContext, id: u64) -> Result<RecoveryClaim> {
        let _guard = lock(&self.next_ids)?;
        if let Some(existing) = self.load(ctx)?.existing_claim(id) {
            return Ok(existing);
        }
        self.write(ctx, &Record::Claim { id })?;
        Ok(RecoveryClaim::Claimed)
    }

    fn record_recovery(&self, ctx: &UserContext, id: u64, outcome: RecoveryOutcome) -> Result<()> {
        let _guard = lock(&self.next_ids)?;
        if self.load(ctx)?.recoveries.contains_key(&id) {
            return Err(already_recorded(id));
        }
        self.write(ctx, &Record::Recovery { id, outcome })
    }
}

fn read_records(path: &Path) -> Result<Vec<Record>> {
    let file = fs::File::open(path).map_err(persistence)?;
    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(persistence)?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            Error::Persistence(format!("{}:{}: {}", path.display(), number + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

fn persistence<E: std::fmt::Display>(e: E) -> Error {
    Error::Persistence(e.to_string())
}
