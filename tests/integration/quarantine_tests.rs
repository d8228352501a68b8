use super::common::Workspace;
use duplicatizer::actions::{QuarantineError, QuarantineManager};
use duplicatizer::index::DuplicateFilter;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_quarantine_then_restore_round_trip() {
    let ws = Workspace::new();
    let a = ws.write("a/1.txt", b"duplicate");
    let b = ws.write("b/1.txt", b"duplicate");
    ws.scan();

    let groups = ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap();
    let victim = groups[0].files.iter().find(|f| f.path == b).unwrap().id;

    let quarantine = TempDir::new().unwrap();
    let manager = QuarantineManager::new(Arc::clone(&ws.index), quarantine.path());
    let moved = manager.quarantine(&[victim]);
    assert!(moved.all_succeeded());
    assert!(!b.exists());
    assert!(a.exists());
    assert!(!ws.indexed(&b));
    assert!(ws
        .index
        .duplicate_groups(&DuplicateFilter::default())
        .unwrap()
        .is_empty());

    let history = ws.index.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].original_path, b);
    assert_eq!(history[0].moved_path, moved.successes[0].to);

    let restored = manager.restore(&[history[0].id]);
    assert!(restored.all_succeeded());
    assert_eq!(fs::read(&b).unwrap(), b"duplicate");
    assert!(ws.index.history().unwrap().is_empty());
    // Not indexed again until the next scan.
    assert!(!ws.indexed(&b));

    ws.scan();
    assert!(ws.indexed(&b));
    assert_eq!(
        ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap().len(),
        1
    );
}

#[test]
fn test_quarantine_inside_scanned_root_is_never_indexed() {
    let ws = Workspace::new();
    ws.write("a/1.txt", b"duplicate");
    let b = ws.write("b/1.txt", b"duplicate");
    let quarantine_root = ws.path("Duplicatizer");
    let options = ws.options().with_quarantine_dir(Some(quarantine_root.clone()));
    ws.crawl_with(&options);
    ws.process();

    let id = ws.index.file_by_path(&b).unwrap().unwrap().id;
    let manager = QuarantineManager::new(Arc::clone(&ws.index), &quarantine_root);
    let moved = manager.quarantine(&[id]);
    let target = moved.successes[0].to.clone();
    assert!(target.starts_with(&quarantine_root));

    ws.crawl_with(&options);
    assert!(!ws.indexed(&target));
    assert_eq!(ws.index.file_count().unwrap(), 1);
}

#[test]
fn test_batch_continues_after_failure() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"one");
    let b = ws.write("b.txt", b"two");
    ws.crawl();
    let id_a = ws.index.file_by_path(&a).unwrap().unwrap().id;
    let id_b = ws.index.file_by_path(&b).unwrap().unwrap().id;
    fs::remove_file(&a).unwrap();

    let manager = QuarantineManager::new(Arc::clone(&ws.index), ws.path("q"));
    let result = manager.quarantine(&[id_a, id_b]);
    assert_eq!(result.success_count(), 1);
    assert_eq!(result.failure_count(), 1);
    assert_eq!(result.failures[0].0, id_a);
    assert!(matches!(result.failures[0].1, QuarantineError::NotFound(_)));

    // History only records the move that happened.
    let history = ws.index.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].original_path, b);
}

#[test]
fn test_history_newest_first() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"one");
    let b = ws.write("b.txt", b"two");
    ws.crawl();
    let manager = QuarantineManager::new(Arc::clone(&ws.index), ws.path("q"));

    manager.quarantine(&[ws.index.file_by_path(&a).unwrap().unwrap().id]);
    manager.quarantine(&[ws.index.file_by_path(&b).unwrap().unwrap().id]);

    let history = ws.index.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].original_path, b);
    assert_eq!(history[1].original_path, a);
}
