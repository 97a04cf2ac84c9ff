//! In-memory registry of in-flight uploads.
//!
//! The registry is the only coordination point between the upload pipeline
//! (producer) and status feed observers (consumers). Every mutation happens
//! under one mutex and bumps a strictly increasing change timestamp that
//! observers compare against to decide whether anything is new.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Suffix of the temporary file (and registry id) while bytes are arriving.
pub const UPLOADING_SUFFIX: &str = ".uploading";
/// Suffix of a fully received file awaiting its final rename.
pub const DONE_SUFFIX: &str = ".done";
/// Suffix of a file (and registry id) whose upload failed.
pub const ERROR_SUFFIX: &str = ".error";

/// Lifecycle state of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Uploading,
    Done,
    Error,
}

/// Progress record for a single upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    /// Size declared by the client, if any.
    #[serde(rename = "size")]
    pub total_size: Option<u64>,
    /// Bytes written so far.
    #[serde(rename = "currentSize")]
    pub received_size: u64,
    /// Current state.
    pub state: UploadState,
}

impl UploadEntry {
    /// A fresh entry for an upload that has not received anything yet.
    pub fn new(total_size: Option<u64>) -> Self {
        Self {
            total_size,
            received_size: 0,
            state: UploadState::Uploading,
        }
    }

    /// Fraction received in percent, when the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_size {
            Some(0) => Some(100.0),
            Some(total) => Some((self.received_size as f64 / total as f64) * 100.0),
            None => None,
        }
    }
}

/// Owned copy of the registry at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    /// Change timestamp the copy was taken at.
    #[serde(skip)]
    pub timestamp: u64,
    /// Entries keyed by upload id.
    pub files: BTreeMap<String, UploadEntry>,
}

/// Registry id used while an upload of `relative` is receiving.
pub fn uploading_id(relative: &str) -> String {
    format!("{relative}{UPLOADING_SUFFIX}")
}

/// Registry id an upload id moves to when it fails.
pub fn error_id(id: &str) -> String {
    let base = id.strip_suffix(UPLOADING_SUFFIX).unwrap_or(id);
    format!("{base}{ERROR_SUFFIX}")
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<String, UploadEntry>,
    last_change: u64,
}

impl RegistryState {
    fn touch(&mut self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.last_change = now.max(self.last_change + 1);
        self.last_change
    }
}

/// Process-wide table of in-flight uploads.
#[derive(Debug, Default)]
pub struct UploadRegistry {
    inner: Mutex<RegistryState>,
}

impl UploadRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace an entry. Returns the new change timestamp.
    pub fn put(&self, id: impl Into<String>, entry: UploadEntry) -> u64 {
        let mut state = self.lock();
        state.entries.insert(id.into(), entry);
        state.touch()
    }

    /// Insert an entry unless the id is already taken.
    ///
    /// Returns `false` and leaves the registry untouched when another upload
    /// owns `id`.
    pub fn try_put(&self, id: impl Into<String>, entry: UploadEntry) -> bool {
        let id = id.into();
        let mut state = self.lock();
        if state.entries.contains_key(&id) {
            return false;
        }
        state.entries.insert(id, entry);
        state.touch();
        true
    }

    /// Add `delta` received bytes to an entry.
    ///
    /// Returns the new received size, or `None` if the id is unknown.
    pub fn update(&self, id: &str, delta: u64) -> Option<u64> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(id)?;
        entry.received_size = entry.received_size.saturating_add(delta);
        let received = entry.received_size;
        state.touch();
        Some(received)
    }

    /// Flag an entry as fully received.
    pub fn mark_done(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.entries.get_mut(id) {
            Some(entry) => {
                entry.state = UploadState::Done;
                state.touch();
                true
            }
            None => false,
        }
    }

    /// Remove an entry. Unknown ids leave the timestamp untouched.
    pub fn remove(&self, id: &str) -> Option<UploadEntry> {
        let mut state = self.lock();
        let removed = state.entries.remove(id)?;
        state.touch();
        Some(removed)
    }

    /// Move an entry to its error id, keeping the recorded sizes.
    ///
    /// Returns the error id, or `None` if the id is unknown.
    pub fn mark_error(&self, id: &str) -> Option<String> {
        let mut state = self.lock();
        let mut entry = state.entries.remove(id)?;
        entry.state = UploadState::Error;
        let failed = error_id(id);
        state.entries.insert(failed.clone(), entry);
        state.touch();
        Some(failed)
    }

    /// Look up a single entry.
    pub fn get(&self, id: &str) -> Option<UploadEntry> {
        self.lock().entries.get(id).cloned()
    }

    /// Copy of all entries together with the current change timestamp.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.lock();
        RegistrySnapshot {
            timestamp: state.last_change,
            files: state.entries.clone(),
        }
    }

    /// The timestamp of the most recent mutation (0 if none yet).
    pub fn last_change(&self) -> u64 {
        self.lock().last_change
    }

    /// Whether anything changed after `timestamp`.
    pub fn changed_since(&self, timestamp: u64) -> bool {
        self.lock().last_change > timestamp
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if no uploads are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}
