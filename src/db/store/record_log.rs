//! Append-only JSON-lines log with a single writer task.
//!
//! Every line holds the full state of one record. Replaying the file keeps the
//! last line seen for each id. All reads and writes go through one `mpsc`
//! queue, so read-modify-write cycles never interleave.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

const QUEUE_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record log {path} at line {line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record {0} not found")]
    NotFound(Uuid),

    #[error("Record {0} already exists")]
    Duplicate(Uuid),

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Store writer has shut down")]
    Closed,
}

/// Anything kept in a [`RecordLog`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send>;
type Mutation<T> = Box<dyn FnOnce(&[T]) -> Result<T, StoreError> + Send>;

enum Command<T> {
    List {
        predicate: Predicate<T>,
        reply: oneshot::Sender<Vec<T>>,
    },
    Write {
        mutation: Mutation<T>,
        reply: oneshot::Sender<Result<T, StoreError>>,
    },
}

/// Cloneable handle to the writer task.
pub struct RecordLog<T: Record> {
    tx: mpsc::Sender<Command<T>>,
}

impl<T: Record> Clone for RecordLog<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Record> RecordLog<T> {
    /// Replays `path` (creating it if needed) and spawns the writer.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let (records, lines) = replay::<T>(&path).await?;
        if lines > records.len() {
            compact(&path, &records).await?;
            info!(
                "Compacted {} ({} lines -> {} records)",
                path.display(),
                lines,
                records.len()
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_writer(path, file, records, rx));

        Ok(Self { tx })
    }

    pub async fn list(&self) -> Result<Vec<T>, StoreError> {
        self.list_by(|_| true).await
    }

    /// Records matching `predicate`, in insertion order.
    pub async fn list_by<P>(&self, predicate: P) -> Result<Vec<T>, StoreError>
    where
        P: Fn(&T) -> bool + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::List {
                predicate: Box::new(predicate),
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        Ok(self.list_by(move |r| r.id() == id).await?.into_iter().next())
    }

    pub async fn append(&self, record: T) -> Result<T, StoreError> {
        self.write(move |records| {
            let id = record.id();
            if records.iter().any(|r| r.id() == id) {
                return Err(StoreError::Duplicate(id));
            }
            Ok(record)
        })
        .await
    }

    /// Applies `change` to the current state of record `id` and persists it.
    pub async fn update<F>(&self, id: Uuid, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T) -> Result<(), StoreError> + Send + 'static,
    {
        self.write(move |records| {
            let mut record = records
                .iter()
                .find(|r| r.id() == id)
                .cloned()
                .ok_or(StoreError::NotFound(id))?;
            change(&mut record)?;
            Ok(record)
        })
        .await
    }

    /// Replaces the first record matching `matches`, or inserts a new one.
    /// `build` sees the existing record, if any.
    pub async fn upsert_by<P, B>(&self, matches: P, build: B) -> Result<T, StoreError>
    where
        P: Fn(&T) -> bool + Send + 'static,
        B: FnOnce(Option<&T>) -> T + Send + 'static,
    {
        self.write(move |records| Ok(build(records.iter().find(|r| matches(r)))))
            .await
    }

    async fn write<M>(&self, mutation: M) -> Result<T, StoreError>
    where
        M: FnOnce(&[T]) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Write {
                mutation: Box::new(mutation),
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }
}

async fn run_writer<T: Record>(
    path: PathBuf,
    mut file: File,
    mut records: Vec<T>,
    mut rx: mpsc::Receiver<Command<T>>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::List { predicate, reply } => {
                let matched = records.iter().filter(|r| predicate(r)).cloned().collect();
                let _ = reply.send(matched);
            }
            Command::Write { mutation, reply } => {
                let result = match mutation(&records) {
                    Ok(record) => persist(&mut file, &record).await.map(|_| {
                        upsert(&mut records, record.clone());
                        record
                    }),
                    Err(e) => Err(e),
                };
                if let Err(e) = &result {
                    debug!("Write to {} refused: {}", path.display(), e);
                }
                let _ = reply.send(result);
            }
        }
    }
    debug!("Record log writer for {} stopped", path.display());
}

/// Appends one line. On failure the file is cut back to its previous length,
/// so a torn line never precedes later records.
async fn persist<T: Record>(file: &mut File, record: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let len = file.metadata().await?.len();
    if let Err(e) = write_synced(file, &line).await {
        roll_back(file, len).await;
        return Err(e.into());
    }
    Ok(())
}

async fn write_synced(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.sync_data().await
}

async fn roll_back(file: &mut File, len: u64) {
    if let Err(e) = file.set_len(len).await {
        warn!("Failed to truncate record log back to {} bytes: {}", len, e);
    }
}

fn upsert<T: Record>(records: &mut Vec<T>, record: T) {
    match records.iter_mut().find(|r| r.id() == record.id()) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Returns the live records and the number of lines read.
async fn replay<T: Record>(path: &Path) -> Result<(Vec<T>, usize), StoreError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e.into()),
    };

    let mut records: Vec<T> = Vec::new();
    let mut positions: HashMap<Uuid, usize> = HashMap::new();
    let mut lines = 0;

    for (index, raw) in contents.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        lines += 1;
        let record: T = serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        match positions.get(&record.id()) {
            Some(&pos) => records[pos] = record,
            None => {
                positions.insert(record.id(), records.len());
                records.push(record);
            }
        }
    }

    if lines > 0 {
        info!("Replayed {} records from {}", records.len(), path.display());
    }
    Ok((records, lines))
}

/// Rewrites the log with one line per record, swapping it in with a rename.
async fn compact<T: Record>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let tmp = path.with_extension("compact");
    let mut buf = Vec::new();
    for record in records {
        buf.extend(serde_json::to_vec(record)?);
        buf.push(b'\n');
    }
    if let Err(e) = fs::write(&tmp, &buf).await {
        warn!("Failed to write compacted log {}: {}", tmp.display(), e);
        return Err(e.into());
    }
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: Uuid,
        body: String,
    }

    impl Record for Note {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn note(body: &str) -> Note {
        Note {
            id: Uuid::new_v4(),
            body: body.to_string(),
        }
    }

    /// Fresh path under the system temp dir; the directory is created by `open`.
    pub(crate) fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("record-log-{}", Uuid::new_v4()))
            .join(name)
    }

    #[tokio::test]
    async fn appended_records_survive_reopen() {
        let path = scratch_path("notes.jsonl");
        let log = RecordLog::<Note>::open(&path).await.unwrap();
        let first = log.append(note("first")).await.unwrap();
        let second = log.append(note("second")).await.unwrap();
        drop(log);

        let reopened = RecordLog::<Note>::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn updates_replay_to_latest_state_and_compact() {
        let path = scratch_path("notes.jsonl");
        let log = RecordLog::<Note>::open(&path).await.unwrap();
        let original = log.append(note("draft")).await.unwrap();
        log.update(original.id, |n| {
            n.body = "final".to_string();
            Ok(())
        })
        .await
        .unwrap();
        drop(log);

        let raw = fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw.lines().count(), 2);

        let reopened = RecordLog::<Note>::open(&path).await.unwrap();
        let notes = reopened.list().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].body, "final");

        let compacted = fs::read_to_string(&path).await.unwrap();
        assert_eq!(compacted.lines().count(), 1);
    }

    #[tokio::test]
    async fn duplicate_ids_and_missing_records_are_errors() {
        let log = RecordLog::<Note>::open(scratch_path("notes.jsonl")).await.unwrap();
        let n = log.append(note("once")).await.unwrap();

        tokio_test::assert_err!(log.append(n.clone()).await);
        let missing = log.update(Uuid::new_v4(), |_| Ok(())).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn refused_mutation_leaves_state_untouched() {
        let log = RecordLog::<Note>::open(scratch_path("notes.jsonl")).await.unwrap();
        let n = log.append(note("keep me")).await.unwrap();

        let refused = log
            .update(n.id, |n| {
                n.body = "changed".to_string();
                Err(StoreError::InvalidTransition { from: "a", to: "b" })
            })
            .await;
        assert!(refused.is_err());
        assert_eq!(log.get(n.id).await.unwrap().unwrap().body, "keep me");
    }

    #[tokio::test]
    async fn corrupt_line_is_reported_with_its_position() {
        let path = scratch_path("notes.jsonl");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        let good = serde_json::to_string(&note("ok")).unwrap();
        fs::write(&path, format!("{good}\n{{not json\n")).await.unwrap();

        match RecordLog::<Note>::open(&path).await {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("corrupt log opened"),
        }
    }

    #[tokio::test]
    async fn rolled_back_tail_does_not_corrupt_later_appends() {
        let path = scratch_path("notes.jsonl");
        let log = RecordLog::<Note>::open(&path).await.unwrap();
        let kept = log.append(note("kept")).await.unwrap();
        drop(log);

        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        let len = file.metadata().await.unwrap().len();
        // half a record, as left by an interrupted write
        file.write_all(br#"{"id":"3f1c"#).await.unwrap();
        file.flush().await.unwrap();
        roll_back(&mut file, len).await;
        let later = note("later");
        persist(&mut file, &later).await.unwrap();
        drop(file);

        let reopened = RecordLog::<Note>::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), vec![kept, later]);
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let path = scratch_path("notes.jsonl");
        let log = RecordLog::<Note>::open(&path).await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move { log.append(note(&format!("note {i}"))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(log.list().await.unwrap().len(), 32);
        drop(log);
        let reopened = RecordLog::<Note>::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap().len(), 32);
    }
}
