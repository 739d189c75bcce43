//! Line-delimited JSON files guarded by advisory file locks.
//!
//! Appends take an exclusive `fd-lock` for the duration of one write so that
//! several processes (the long-running daemon and one-shot admin commands)
//! can share a log without interleaving partial lines. Reads take a shared
//! lock and tolerate a torn trailing line by skipping it.

use fd_lock::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::StoreError;

pub(crate) async fn append_entry<T: Serialize>(path: &Path, entry: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || append_blocking(&path, line.as_bytes())).await?
}

pub(crate) async fn read_entries<T>(path: &Path) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned + Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_blocking(&path)).await?
}

fn append_blocking(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut lock = RwLock::new(file);
    let mut guard = lock.write().map_err(|source| lock_error(path, source))?;

    guard.write_all(bytes)?;
    guard.sync_data()?;
    Ok(())
}

fn read_blocking<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        // Nothing written yet
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let lock = RwLock::new(file);
    let guard = lock.read().map_err(|source| lock_error(path, source))?;
    let reader = BufReader::new(&*guard);

    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unparseable log line"
                );
            }
        }
    }

    Ok(entries)
}

fn lock_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Lock {
        path: PathBuf::from(path),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        n: u32,
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let entries: Vec<Entry> = read_entries(&dir.path().join("absent.jsonl")).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");

        append_entry(&path, &Entry { n: 1 }).await.unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{\"n\": 2")
            .unwrap();

        let entries: Vec<Entry> = read_entries(&path).await.unwrap();
        assert_eq!(entries, vec![Entry { n: 1 }]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");

        let mut tasks = Vec::new();
        for n in 0..32 {
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                append_entry(&path, &Entry { n }).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut seen: Vec<u32> = read_entries::<Entry>(&path)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.n)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }
}
