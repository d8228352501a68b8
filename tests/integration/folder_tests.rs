use super::common::Workspace;

#[test]
fn test_example_folders_are_duplicates() {
    let ws = Workspace::new();
    ws.write("a/1.txt", &[b'X'; 10]);
    ws.write("b/1.txt", &[b'X'; 10]);
    ws.write("c/2.txt", &[b'Y'; 20]);
    ws.scan();

    let groups = ws.index.duplicate_folder_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].folders, vec![ws.path("a"), ws.path("b")]);
    assert_eq!(groups[0].file_count, 1);
    assert_eq!(groups[0].total_size, 10);
    assert_eq!(ws.index.stats().unwrap().duplicate_folder_groups, 1);
}

#[test]
fn test_renamed_file_breaks_folder_match() {
    let ws = Workspace::new();
    ws.write("a/1.txt", b"same");
    ws.write("b/2.txt", b"same");
    ws.scan();

    // The files are duplicates, the folders are not.
    assert_eq!(ws.index.stats().unwrap().duplicate_sets, 1);
    assert!(ws.index.duplicate_folder_groups().unwrap().is_empty());
}

#[test]
fn test_multi_file_folders_match_regardless_of_creation_order() {
    let ws = Workspace::new();
    ws.write("left/x.txt", b"xx");
    ws.write("left/y.txt", b"yyy");
    ws.write("right/y.txt", b"yyy");
    ws.write("right/x.txt", b"xx");
    ws.scan();

    let groups = ws.index.duplicate_folder_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].file_count, 2);
    assert_eq!(groups[0].total_size, 5);
}

#[test]
fn test_extra_file_breaks_folder_match() {
    let ws = Workspace::new();
    ws.write("a/1.txt", b"same");
    ws.write("b/1.txt", b"same");
    ws.write("b/extra.txt", b"shared content");
    ws.write("c/extra.txt", b"shared content");
    ws.scan();

    assert!(ws.index.duplicate_folder_groups().unwrap().is_empty());
}

#[test]
fn test_files_without_full_hash_do_not_count() {
    // A file with a unique size is never fully hashed, so it does not
    // contribute to its folder's fingerprint.
    let ws = Workspace::new();
    ws.write("a/1.txt", b"same");
    ws.write("b/1.txt", b"same");
    ws.write("b/unique.txt", b"a unique size here");
    ws.scan();

    let groups = ws.index.duplicate_folder_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].folders, vec![ws.path("a"), ws.path("b")]);
}
