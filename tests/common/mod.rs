#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use sheet_master::{
    AsyncFuture, CancelToken, Promise, SheetError,
    csv_table::Row,
    source::SheetFetcher,
};
use tempfile::{TempDir, tempdir};

pub const CHARACTER_CSV: &str = "id,name,age\n1,Amy,30\n2,Bob,25\n";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn rows(lines: &[&[&str]]) -> Vec<Row> {
    lines
        .iter()
        .map(|cells| cells.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// How a scripted fetch resolves.
#[derive(Clone)]
pub enum Reply {
    Body(String),
    Fail(SheetError),
    /// Leaves the future pending; the test resolves it through `pending`.
    Hold,
}

/// Fetcher that answers from a URL-keyed script and records every request.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    requests: Arc<Mutex<Vec<String>>>,
    pending: Arc<Mutex<Vec<Promise<String>>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, url: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .expect("replies lock")
            .insert(url.to_string(), reply);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Takes the promises of held fetches so the test can resolve them.
    pub fn take_pending(&self) -> Vec<Promise<String>> {
        std::mem::take(&mut *self.pending.lock().expect("pending lock"))
    }
}

impl SheetFetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, _cancel: &CancelToken) -> AsyncFuture<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(url.to_string());
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .get(url)
            .cloned()
            .unwrap_or_else(|| Reply::Fail(SheetError::Transport(format!("404 for {url}"))));
        match reply {
            Reply::Body(body) => AsyncFuture::ready(body),
            Reply::Fail(err) => AsyncFuture::canceled(err),
            Reply::Hold => {
                let promise = Promise::new();
                let handle = promise.handle();
                self.pending.lock().expect("pending lock").push(promise);
                handle
            }
        }
    }
}
