//! End to end scans over a directory tree

use sentinel_scan::config::StorageConfig;
use sentinel_scan::storage::{JsonlStore, LocalStorage, MemoryStore, OperationStore};
use sentinel_scan::{
    Command, Config, RawOperation, RecoveryOutcome, Scanner, SuspicionLevel, UserContext, Verdict,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const USER: &str = "alice";

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut state = 0x9E3779B97F4A7C15 ^ seed.wrapping_mul(0xBF58476D1CE4E5B9);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 32) as u8
        })
        .collect()
}

fn padded(head: &[u8], len: usize) -> Vec<u8> {
    let mut content = head.to_vec();
    let filler = b"Quarterly figures and meeting notes. ";
    while content.len() < len {
        content.extend_from_slice(filler);
    }
    content.truncate(len);
    content
}

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config(root: &Path) -> Config {
    Config {
        storage: StorageConfig {
            root: root.join("data"),
            ..StorageConfig::default()
        },
        store: sentinel_scan::config::StoreConfig {
            path: root.join("log"),
        },
        ..Config::default()
    }
}

fn scanner(dir: &TempDir) -> Scanner {
    Scanner::from_config(config(dir.path())).unwrap()
}

/// Four documents deleted and replaced by encrypted copies
fn ransomware_tree(dir: &TempDir) -> Vec<RawOperation> {
    let user = dir.path().join("data").join(USER);
    let originals: [(&str, &[u8]); 4] = [
        ("a.docx", b"PK\x03\x04"),
        ("b.pdf", b"%PDF-1.4\n"),
        ("c.jpg", b"\xFF\xD8\xFF\xE0"),
        ("d.txt", b""),
    ];

    let mut events = Vec::new();
    let mut ts = 1000;
    for (i, (name, head)) in originals.iter().enumerate() {
        write(
            &user.join("files_trashbin/files").join(format!("{}.d{}", name, ts)),
            &padded(head, 8000),
        );
        events.push(RawOperation::new(Command::Delete, *name, ts));

        let encrypted = format!("{}.locky", name);
        write(&user.join("files").join(&encrypted), &random_bytes(i as u64 + 7, 8192));
        events.push(RawOperation::new(Command::Create, encrypted, ts + 1));
        ts += 2;
    }
    events
}

#[test]
fn test_ransomware_sequence_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let events = ransomware_tree(&dir);
    let scanner = scanner(&dir);
    let ctx = UserContext::new(USER);

    let summary = scanner.scan_events(&ctx, &events).unwrap();
    assert_eq!(summary.operation_count, 8);
    assert_eq!(summary.sequences.len(), 1);
    assert_eq!(summary.unanalyzable, 0);
    assert!(summary.sequences[0].score >= 0.6, "score {}", summary.sequences[0].score);
    assert_eq!(summary.highest_suspicion, Some(SuspicionLevel::HighLevelOfSuspicion));

    for op in summary.operations.iter().filter(|op| op.command == Command::Create) {
        assert_eq!(op.suspicion_class, Some(SuspicionLevel::HighLevelOfSuspicion), "{}", op.path);
    }
    for op in summary.operations.iter().filter(|op| op.command == Command::Delete) {
        assert_eq!(op.corrupted, Some(false), "{}", op.path);
        assert_eq!(op.size, 8000);
    }

    // A scan succeeds whatever it finds
    assert_eq!(Verdict::Scan(summary).status(), 200);
}

#[test]
fn test_ordinary_edits_are_not_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let files = dir.path().join("data").join(USER).join("files");
    write(&files.join("notes.txt"), &padded(b"", 3000));
    write(&files.join("docs/plan.md"), &padded(b"# Plan\n", 1200));

    let scanner = scanner(&dir);
    let ctx = UserContext::new(USER);
    let events = [
        RawOperation::new(Command::Write, "notes.txt", 50),
        RawOperation::new(Command::Create, "docs/plan.md", 52),
    ];
    let summary = scanner.scan_events(&ctx, &events).unwrap();
    assert_eq!(summary.findings, 0);
    assert_eq!(summary.highest_suspicion, Some(SuspicionLevel::NoSuspicion));
}

#[test]
fn test_recover_deleted_and_created() {
    let dir = tempfile::tempdir().unwrap();
    let events = ransomware_tree(&dir);
    let ctx = UserContext::new(USER);
    let summary = scanner(&dir).scan_events(&ctx, &events).unwrap();

    let deleted = summary
        .operations
        .iter()
        .find(|op| op.command == Command::Delete && op.path == "a.docx")
        .and_then(|op| op.id)
        .unwrap();
    let created = summary
        .operations
        .iter()
        .find(|op| op.command == Command::Create)
        .and_then(|op| op.id)
        .unwrap();

    // Recovery runs against the persisted log, from a fresh scanner
    let scanner = scanner(&dir);
    assert_eq!(scanner.recover(&ctx, deleted).unwrap(), RecoveryOutcome::Restored);
    let restored = dir.path().join("data").join(USER).join("files/a.docx");
    assert!(fs::read(&restored).unwrap().starts_with(b"PK\x03\x04"));

    // Asking again reports the recorded outcome without touching the trash
    assert_eq!(scanner.recover(&ctx, deleted).unwrap(), RecoveryOutcome::Restored);

    let outcome = scanner.recover(&ctx, created).unwrap();
    assert_eq!(outcome, RecoveryOutcome::NotRestorable);
    assert_eq!(Verdict::Recovery { id: created, outcome }.status(), 400);
}

#[test]
fn test_revert_overwritten_file() {
    let dir = tempfile::tempdir().unwrap();
    let user = dir.path().join("data").join(USER);
    write(&user.join("files/report.csv"), &random_bytes(3, 4000));
    write(&user.join("files_versions/report.csv.v90"), b"year,revenue\n2023,100\n");

    let scanner = scanner(&dir);
    let ctx = UserContext::new(USER);
    let summary = scanner
        .scan_events(&ctx, &[RawOperation::new(Command::Write, "report.csv", 100)])
        .unwrap();
    let op = &summary.operations[0];
    assert_eq!(op.corrupted, Some(true));

    let outcome = scanner.recover(&ctx, op.id.unwrap()).unwrap();
    assert_eq!(outcome, RecoveryOutcome::Restored);
    assert_eq!(
        fs::read_to_string(user.join("files/report.csv")).unwrap(),
        "year,revenue\n2023,100\n"
    );
}

#[test]
fn test_malformed_batch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = scanner(&dir);
    let ctx = UserContext::new(USER);

    let mut rename = RawOperation::new(Command::Rename, "x.locky", 5);
    rename.original_name.clear();
    let result = scanner.scan_events(&ctx, &[RawOperation::new(Command::Write, "a.txt", 1), rename]);

    let verdict = Verdict::from_result(result.map(Verdict::Scan)).unwrap();
    assert_eq!(verdict.status(), 400);
    assert!(JsonlStore::new(dir.path().join("log"))
        .operations(&ctx)
        .unwrap()
        .is_empty());
}

#[test]
fn test_changes_since_last_activity() {
    let dir = tempfile::tempdir().unwrap();
    let user = dir.path().join("data").join(USER);
    write(&user.join("files/a.txt"), &padded(b"", 500));
    write(&user.join("files/sub/b.md"), &padded(b"", 500));
    write(&user.join("files/tmp.part"), b"partial upload");
    write(&user.join("files_trashbin/files/old.txt.d100"), &padded(b"", 500));

    let scanner = scanner(&dir);
    let ctx = UserContext::new(USER);

    let pending = scanner.files_to_scan(&ctx).unwrap();
    let listed: Vec<_> = pending.iter().map(|r| (r.command, r.path.as_str())).collect();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0], (Command::Delete, "old.txt"));
    assert!(listed.contains(&(Command::Write, "a.txt")));
    assert!(listed.contains(&(Command::Write, "sub/b.md")));

    let summary = scanner.scan_changes(&ctx).unwrap();
    assert_eq!(summary.operation_count, 3);
    assert!(scanner.files_to_scan(&ctx).unwrap().is_empty());
}

#[test]
fn test_works_with_any_store() {
    let dir = tempfile::tempdir().unwrap();
    let events = ransomware_tree(&dir);
    let config = config(dir.path());
    let local = Arc::new(LocalStorage::new(config.storage.clone()));
    let store = Arc::new(MemoryStore::new());
    let scanner = Scanner::new(config, local.clone(), local, store.clone()).unwrap();
    let ctx = UserContext::new(USER);

    scanner.scan_events(&ctx, &events[..4]).unwrap();
    scanner.scan_events(&ctx, &events[4..]).unwrap();

    let recorded = store.operations(&ctx).unwrap();
    assert_eq!(recorded.len(), 8);
    let ids: Vec<_> = recorded.iter().filter_map(|op| op.id).collect();
    assert_eq!(ids, (1..=8).collect::<Vec<_>>());
    assert_eq!(store.last_sequence(&ctx).unwrap(), Some(2));
}

#[test]
fn test_nested_delete_restores_into_its_folder() {
    let dir = tempfile::tempdir().unwrap();
    let user = dir.path().join("data").join(USER);
    write(&user.join("files_trashbin/files/docs/a.docx.d100"), &padded(b"PK\x03\x04", 2000));

    let scanner = scanner(&dir);
    let ctx = UserContext::new(USER);
    let pending = scanner.files_to_scan(&ctx).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!((pending[0].command, pending[0].path.as_str()), (Command::Delete, "docs/a.docx"));

    let summary = scanner.scan_changes(&ctx).unwrap();
    let op = &summary.operations[0];
    assert_eq!(op.size, 2000);
    assert!(op.unanalyzable.is_none());

    assert_eq!(scanner.recover(&ctx, op.id.unwrap()).unwrap(), RecoveryOutcome::Restored);
    assert!(fs::read(user.join("files/docs/a.docx")).unwrap().starts_with(b"PK\x03\x04"));
    assert!(!user.join("files/a.docx").exists());
}
