use super::common::Workspace;

#[test]
fn test_exclusion_cascade() {
    let ws = Workspace::new();
    let inside = ws.write("a/b/inside.txt", b"x");
    let deep = ws.write("a/b/c/deep.txt", b"y");
    let sibling = ws.write("a/bc/sibling.txt", b"z");
    let outside = ws.write("a/outside.txt", b"w");
    ws.crawl();
    assert_eq!(ws.index.file_count().unwrap(), 4);

    let removed = ws.index.add_excluded_folder(&ws.path("a/b")).unwrap();
    assert_eq!(removed, 2);
    assert!(!ws.indexed(&inside));
    assert!(!ws.indexed(&deep));
    assert!(ws.indexed(&sibling));
    assert!(ws.indexed(&outside));

    // Rescanning the parent never re-adds excluded files.
    ws.crawl();
    assert!(!ws.indexed(&inside));
    assert!(!ws.indexed(&deep));
    assert_eq!(ws.index.file_count().unwrap(), 2);
}

#[test]
fn test_removing_exclusion_allows_reindexing() {
    let ws = Workspace::new();
    let inside = ws.write("a/b/inside.txt", b"x");
    let folder = ws.path("a/b");
    ws.index.add_excluded_folder(&folder).unwrap();
    ws.crawl();
    assert!(!ws.indexed(&inside));

    assert!(ws.index.remove_excluded_folder(&folder).unwrap());
    assert!(!ws.index.remove_excluded_folder(&folder).unwrap());
    ws.crawl();
    assert!(ws.indexed(&inside));
}

#[test]
fn test_excluded_root_is_not_scanned() {
    let ws = Workspace::new();
    let file = ws.write("a.txt", b"x");
    ws.index.add_excluded_folder(&ws.root()).unwrap();
    let report = ws.crawl();
    assert_eq!(report.files_seen, 0);
    assert!(!ws.indexed(&file));
}

#[test]
fn test_excluded_folders_listed_once() {
    let ws = Workspace::new();
    let folder = ws.path("x");
    ws.index.add_excluded_folder(&folder).unwrap();
    ws.index.add_excluded_folder(&folder).unwrap();
    assert_eq!(ws.index.excluded_folders().unwrap(), vec![folder]);
}
