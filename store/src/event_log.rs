//! Append-only, newline-delimited JSON event log.
//!
//! One [`Event`] per line. The log is written before the factor batch it
//! describes, so after a crash it may hold events whose factor rows never
//! landed, never the other way around.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use dualsub_types::Event;

use crate::secure_fs::open_private_append;

#[derive(Debug)]
enum Sink {
    File { path: PathBuf, file: Mutex<File> },
    Memory(Mutex<Vec<u8>>),
}

#[derive(Debug)]
pub struct EventLog {
    sink: Sink,
}

impl EventLog {
    /// Open (or create) the log file at `path`.
    ///
    /// A trailing partial line left by an interrupted append is terminated so
    /// the next event starts on its own line; the fragment itself is skipped
    /// on read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = open_private_append(path)?;

        if ends_mid_line(&mut file)
            .with_context(|| format!("Failed to inspect event log {}", path.display()))?
        {
            tracing::warn!(path = %path.display(), "Event log ends mid-line; terminating fragment");
            file.write_all(b"\n")
                .and_then(|()| file.sync_data())
                .with_context(|| format!("Failed to repair event log {}", path.display()))?;
        }

        tracing::debug!(path = %path.display(), "Opened event log");
        Ok(Self {
            sink: Sink::File {
                path: path.to_path_buf(),
                file: Mutex::new(file),
            },
        })
    }

    /// A log that lives only as long as this value.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Mutex::new(Vec::new())),
        }
    }

    /// File backing this log, `None` for in-memory logs.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.sink {
            Sink::File { path, .. } => Some(path),
            Sink::Memory(_) => None,
        }
    }

    /// Append `events` as one write, then flush to stable storage.
    pub fn append(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(events.len() * 128);
        for event in events {
            serde_json::to_writer(&mut buf, event).context("Failed to encode event")?;
            buf.push(b'\n');
        }

        match &self.sink {
            Sink::File { path, file } => {
                let mut file = lock(file);
                file.write_all(&buf)
                    .and_then(|()| file.sync_data())
                    .with_context(|| format!("Failed to append to event log {}", path.display()))?;
            }
            Sink::Memory(bytes) => lock(bytes).extend_from_slice(&buf),
        }
        Ok(())
    }

    /// Every well-formed event in append order. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        match &self.sink {
            Sink::File { path, file } => {
                // Hold the append lock so a concurrent append is never half-read.
                let _guard = lock(file);
                let reader = File::open(path)
                    .with_context(|| format!("Failed to read event log {}", path.display()))?;
                parse_lines(BufReader::new(reader))
            }
            Sink::Memory(bytes) => parse_lines(lock(bytes).as_slice()),
        }
    }

    /// Events for one entity, in append order.
    pub fn events_for(&self, entity: &str) -> Result<Vec<Event>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|event| event.entity == entity)
            .collect())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn parse_lines(reader: impl BufRead) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read event log line")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(line = index + 1, "Skipping malformed event: {e}"),
        }
    }
    Ok(events)
}
