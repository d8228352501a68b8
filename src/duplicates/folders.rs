//! Duplicate-folder detection from file-level full hashes.
//!
//! A folder's fingerprint summarizes its direct files: each file contributes
//! `name NAME_SEP full_hash`, entries are sorted by file name in byte order
//! and joined with `ENTRY_SEP`, and the result is hashed with BLAKE3. Neither
//! separator can occur in a file name or a hex hash, so two folders share a
//! fingerprint exactly when they hold the same (name, content) pairs,
//! whatever order the crawler found them in.
//!
//! Only files that already have a full hash take part. A folder without any
//! such file is never part of a group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::index::{FolderGroup, HashedFile};

const NAME_SEP: u8 = 0;
const ENTRY_SEP: u8 = b'/';

/// Fingerprint one folder's files.
///
/// `files` are the folder's direct members in any order.
#[must_use]
pub fn folder_fingerprint(files: &[&HashedFile]) -> String {
    let mut entries: Vec<(String, &str)> = files
        .iter()
        .map(|f| (file_name(&f.path), f.full_hash.as_str()))
        .collect();
    entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()).then(a.1.cmp(b.1)));

    let mut hasher = blake3::Hasher::new();
    for (i, (name, hash)) in entries.iter().enumerate() {
        if i > 0 {
            hasher.update(&[ENTRY_SEP]);
        }
        hasher.update(name.as_bytes());
        hasher.update(&[NAME_SEP]);
        hasher.update(hash.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Group folders with identical fingerprints.
///
/// Groups have at least two folders, listed in sorted order. Groups are
/// ordered by size (largest first), then by their first folder.
#[must_use]
pub fn find_duplicate_folders(files: &[HashedFile]) -> Vec<FolderGroup> {
    let mut by_parent: HashMap<&Path, Vec<&HashedFile>> = HashMap::new();
    for file in files {
        if let Some(parent) = file.path.parent() {
            by_parent.entry(parent).or_default().push(file);
        }
    }

    let fingerprints: Vec<(String, PathBuf, usize, u64)> = by_parent
        .into_par_iter()
        .map(|(dir, members)| {
            let size: u64 = members.iter().map(|f| f.size).sum();
            (
                folder_fingerprint(&members),
                dir.to_path_buf(),
                members.len(),
                size,
            )
        })
        .collect();

    let mut by_fingerprint: HashMap<String, FolderGroup> = HashMap::new();
    for (fingerprint, dir, file_count, total_size) in fingerprints {
        by_fingerprint
            .entry(fingerprint)
            .or_insert_with_key(|fp| FolderGroup {
                fingerprint: fp.clone(),
                folders: Vec::new(),
                file_count,
                total_size,
            })
            .folders
            .push(dir);
    }

    let mut groups: Vec<FolderGroup> = by_fingerprint
        .into_values()
        .filter(|g| g.folders.len() >= 2)
        .map(|mut g| {
            g.folders.sort();
            g
        })
        .collect();
    groups.sort_by(|a, b| {
        b.total_size
            .cmp(&a.total_size)
            .then_with(|| a.folders.cmp(&b.folders))
    });

    log::debug!("Found {} duplicate folder groups", groups.len());
    groups
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
