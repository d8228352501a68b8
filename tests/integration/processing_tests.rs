use super::common::Workspace;
use duplicatizer::duplicates::GroupingEngine;
use duplicatizer::index::DuplicateFilter;
use duplicatizer::progress::{ChannelSink, ProgressEvent};
use duplicatizer::scanner::hasher::{LARGE_FILE_THRESHOLD, PARTIAL_THRESHOLD, SAMPLE_CHUNK};
use duplicatizer::signal::CancellationToken;
use std::sync::Arc;

#[test]
fn test_example_scenario() {
    let ws = Workspace::new();
    let a = ws.write("a/1.txt", &[b'X'; 10]);
    let b = ws.write("b/1.txt", &[b'X'; 10]);
    let c = ws.write("c/2.txt", &[b'Y'; 20]);
    ws.scan();

    for path in [&a, &b] {
        let record = ws.index.file_by_path(path).unwrap().unwrap();
        assert!(record.partial_hash.is_some());
        assert!(record.full_hash.is_some());
    }
    let record = ws.index.file_by_path(&c).unwrap().unwrap();
    assert!(record.partial_hash.is_none());
    assert!(record.full_hash.is_none());

    let groups = ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap();
    assert_eq!(groups.len(), 1);
    let paths: Vec<_> = groups[0].files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, vec![a, b]);

    let stats = ws.index.stats().unwrap();
    assert_eq!(stats.duplicate_sets, 1);
    assert_eq!(stats.duplicate_files, 2);
    assert_eq!(stats.reclaimable_bytes, 10);
}

#[test]
fn test_same_size_different_content_gets_no_full_hash() {
    let ws = Workspace::new();
    let a = ws.write("a.bin", &[1u8; 100]);
    let b = ws.write("b.bin", &[2u8; 100]);
    ws.scan();

    for path in [&a, &b] {
        let record = ws.index.file_by_path(path).unwrap().unwrap();
        assert!(record.partial_hash.is_some());
        assert!(record.full_hash.is_none());
    }
}

#[test]
fn test_difference_outside_partial_window_is_detected() {
    let ws = Workspace::new();
    let size = (PARTIAL_THRESHOLD * 2) as usize;
    let mut other = vec![7u8; size];
    other[size - 1] = 8;
    let a = ws.write("a.bin", &vec![7u8; size]);
    let b = ws.write("b.bin", &other);
    ws.scan();

    let ra = ws.index.file_by_path(&a).unwrap().unwrap();
    let rb = ws.index.file_by_path(&b).unwrap().unwrap();
    assert_eq!(ra.partial_hash, rb.partial_hash);
    assert_ne!(ra.full_hash, rb.full_hash);
    assert!(ws
        .index
        .duplicate_groups(&DuplicateFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_large_files_use_sampled_hash() {
    // Bytes outside the three sample windows are not compared.
    let ws = Workspace::new();
    let size = (LARGE_FILE_THRESHOLD + SAMPLE_CHUNK) as usize;
    let mut other = vec![0u8; size];
    other[(SAMPLE_CHUNK + 10) as usize] = 1;
    ws.write("a.bin", &vec![0u8; size]);
    ws.write("b.bin", &other);
    ws.scan();

    let groups = ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap();
    assert_eq!(groups.len(), 1);
}

#[test]
fn test_sampled_and_streamed_files_of_different_sizes_never_grouped() {
    let ws = Workspace::new();
    let streamed = vec![0u8; LARGE_FILE_THRESHOLD as usize];
    let sampled = vec![0u8; (LARGE_FILE_THRESHOLD + SAMPLE_CHUNK) as usize];
    ws.write("a1.bin", &streamed);
    ws.write("a2.bin", &streamed);
    ws.write("b1.bin", &sampled);
    ws.write("b2.bin", &sampled);
    ws.scan();

    let groups = ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap();
    assert_eq!(groups.len(), 2);
    for group in &groups {
        assert_eq!(group.files.len(), 2);
        assert!(group.files.iter().all(|f| f.size == group.size));
    }

    let stats = ws.index.stats().unwrap();
    assert_eq!(
        stats.reclaimable_bytes,
        LARGE_FILE_THRESHOLD + LARGE_FILE_THRESHOLD + SAMPLE_CHUNK
    );
}

#[test]
fn test_empty_files_are_grouped() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"");
    let b = ws.write("b.txt", b"");
    let (_, processing) = ws.scan();
    assert_eq!(processing.partial.candidates, 2);
    assert!(ws.index.file_by_path(&a).unwrap().unwrap().full_hash.is_some());

    let groups = ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 0);
    let paths: Vec<_> = groups[0].files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, vec![a, b]);
}

#[test]
fn test_three_way_group_and_search() {
    let ws = Workspace::new();
    ws.write("photos/x.jpg", b"picture");
    ws.write("backup/x.jpg", b"picture");
    ws.write("photos/old/x.jpg", b"picture");
    ws.write("docs/a.txt", b"words");
    ws.write("docs/b.txt", b"words");
    ws.scan();

    let all = ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap();
    assert_eq!(all.len(), 2);

    let photos = ws
        .index
        .duplicate_groups(&DuplicateFilter::default().with_search("photos"))
        .unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].len(), 3);

    let large = ws
        .index
        .duplicate_groups(&DuplicateFilter::default().with_min_size(6))
        .unwrap();
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].size, 7);

    let page = ws
        .index
        .duplicate_groups(&DuplicateFilter::default().with_page(1, 1))
        .unwrap();
    assert_eq!(page.len(), 1);
}

#[test]
fn test_cancelled_processing_emits_cancelled() {
    let ws = Workspace::new();
    ws.write("a.txt", b"same");
    ws.write("b.txt", b"same");
    ws.crawl();

    let token = CancellationToken::new();
    token.cancel();
    let (sink, rx) = ChannelSink::new();
    let report = GroupingEngine::new(Arc::clone(&ws.index))
        .run(&token, &sink)
        .unwrap();
    assert!(report.cancelled);
    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.last(), Some(&ProgressEvent::ProcessingCancelled));

    // A later uncancelled run completes the work.
    let report = ws.process();
    assert!(!report.cancelled);
    assert_eq!(
        ws.index.duplicate_groups(&DuplicateFilter::default()).unwrap().len(),
        1
    );
}
