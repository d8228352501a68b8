#![allow(dead_code)]

use duplicatizer::duplicates::{GroupingEngine, ProcessingReport};
use duplicatizer::index::Index;
use duplicatizer::progress::NullSink;
use duplicatizer::scanner::{CrawlReport, Crawler, ScanOptions};
use duplicatizer::signal::CancellationToken;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary tree plus an in-memory index.
pub struct Workspace {
    pub dir: TempDir,
    pub index: Arc<Index>,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            index: Arc::new(Index::open_in_memory().unwrap()),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn options(&self) -> ScanOptions {
        ScanOptions::new(vec![self.root()]).with_workers(4)
    }

    pub fn crawl(&self) -> CrawlReport {
        self.crawl_with(&self.options())
    }

    pub fn crawl_with(&self, options: &ScanOptions) -> CrawlReport {
        Crawler::new(Arc::clone(&self.index))
            .crawl(options, &CancellationToken::new(), &NullSink)
            .unwrap()
    }

    pub fn process(&self) -> ProcessingReport {
        GroupingEngine::new(Arc::clone(&self.index))
            .run(&CancellationToken::new(), &NullSink)
            .unwrap()
    }

    /// Crawl then process, like a full pipeline run.
    pub fn scan(&self) -> (CrawlReport, ProcessingReport) {
        let crawl = self.crawl();
        (crawl, self.process())
    }

    pub fn indexed(&self, path: &Path) -> bool {
        self.index.file_by_path(path).unwrap().is_some()
    }
}
