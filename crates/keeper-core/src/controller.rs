//! Owner of the in-memory collection.
//!
//! Every finalized mutation bumps the revision, enqueues exactly one
//! snapshot write and broadcasts a [`CollectionEvent::Changed`]. Writes are
//! drained by a single background worker in enqueue order, so the last
//! mutation applied is always the last one written.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info};

use crate::auth::{AuthGate, AuthInput, AuthState, UnlockOutcome, Unlocked};
use crate::editor::EditorSession;
use crate::entry::{is_sorted_newest_first, sort_newest_first, Entry};
use crate::error::{AccessError, AuthError, PersistError, SetSecretError};
use crate::prompt::Prompter;
use crate::store::Store;

pub const REDACTED_LABEL: &str = "*****";
const EVENT_CAPACITY: usize = 64;

pub type Snapshot = Arc<[Entry]>;

/// Maps pre-mutation positions to post-mutation positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRemap(Vec<Option<usize>>);

impl IndexRemap {
    pub fn identity(len: usize) -> Self {
        Self((0..len).map(Some).collect())
    }

    /// From a sort permutation where `order[new] == old`.
    pub fn from_order(order: &[usize]) -> Self {
        let mut map = vec![None; order.len()];
        for (new, &old) in order.iter().enumerate() {
            map[old] = Some(new);
        }
        Self(map)
    }

    pub fn removing(len: usize, removed: &BTreeSet<usize>) -> Self {
        let mut next = 0;
        let map = (0..len)
            .map(|old| {
                if removed.contains(&old) {
                    None
                } else {
                    next += 1;
                    Some(next - 1)
                }
            })
            .collect();
        Self(map)
    }

    pub fn cleared(len: usize) -> Self {
        Self(vec![None; len])
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &IndexRemap) -> Self {
        Self(
            self.0
                .iter()
                .map(|step| step.and_then(|mid| next.get(mid)))
                .collect(),
        )
    }

    pub fn get(&self, old: usize) -> Option<usize> {
        self.0.get(old).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Loaded,
    Added,
    Removed,
    Cleared,
    Reordered,
    External,
}

#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Changed {
        revision: u64,
        cause: ChangeCause,
        len: usize,
        /// Withheld while the gate is locked.
        snapshot: Option<Snapshot>,
        /// `None` when positions cannot be tracked (full replacements).
        remap: Option<IndexRemap>,
    },
    AccessChanged(AuthState),
    PersistFailed {
        revision: u64,
        error: PersistError,
    },
}

/// One line of the overview list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRow {
    pub label: String,
    /// Hidden while locked.
    pub modified_at: Option<DateTime<Utc>>,
}

enum PersistJob {
    Write { revision: u64, snapshot: Snapshot },
    Flush(oneshot::Sender<Result<(), PersistError>>),
}

struct PersistQueue {
    tx: mpsc::UnboundedSender<PersistJob>,
}

impl PersistQueue {
    fn spawn(store: Store, events: broadcast::Sender<CollectionEvent>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();
        tokio::spawn(async move {
            let mut last: Result<(), PersistError> = Ok(());
            while let Some(job) = rx.recv().await {
                match job {
                    PersistJob::Write { revision, snapshot } => {
                        let store = store.clone();
                        let result = tokio::task::spawn_blocking(move || store.save(&snapshot))
                            .await
                            .unwrap_or_else(|e| Err(PersistError::Write(format!("save task: {e}"))));
                        if let Err(e) = &result {
                            error!(revision, error = %e, "failed to persist collection");
                            let _ = events.send(CollectionEvent::PersistFailed {
                                revision,
                                error: e.clone(),
                            });
                        }
                        last = result;
                    }
                    PersistJob::Flush(reply) => {
                        let _ = reply.send(last.clone());
                    }
                }
            }
        });
        Self { tx }
    }

    fn enqueue(&self, revision: u64, snapshot: Snapshot) {
        debug!(revision, count = snapshot.len(), "queueing collection write");
        if self.tx.send(PersistJob::Write { revision, snapshot }).is_err() {
            error!(revision, "persistence worker gone; write dropped");
        }
    }

    async fn flush(&self) -> Result<(), PersistError> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(PersistJob::Flush(reply))
            .map_err(|_| PersistError::WorkerGone)?;
        done.await.map_err(|_| PersistError::WorkerGone)?
    }
}

pub struct CollectionController {
    entries: Vec<Entry>,
    auth: AuthGate,
    store: Store,
    queue: PersistQueue,
    events: broadcast::Sender<CollectionEvent>,
    revision: u64,
}

impl CollectionController {
    /// Must be called from within a Tokio runtime; spawns the write worker.
    pub fn new(store: Store, auth: AuthGate) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let queue = PersistQueue::spawn(store.clone(), events.clone());
        Self {
            entries: Vec::new(),
            auth,
            store,
            queue,
            events,
            revision: 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    pub fn is_unlocked(&self) -> bool {
        self.auth.is_unlocked()
    }

    pub async fn load_initial(&mut self) -> usize {
        let store = self.store.clone();
        let mut loaded = tokio::task::spawn_blocking(move || store.load())
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "load task failed; starting empty");
                Vec::new()
            });
        sort_newest_first(&mut loaded);
        self.entries = loaded;
        self.revision += 1;
        info!(count = self.entries.len(), "collection loaded");
        self.notify(ChangeCause::Loaded, None);
        self.entries.len()
    }

    pub async fn authenticate(&mut self, input: AuthInput) -> Result<Unlocked, AuthError> {
        let unlocked = self.auth.authenticate(input).await?;
        let _ = self
            .events
            .send(CollectionEvent::AccessChanged(AuthState::Unlocked));
        Ok(unlocked)
    }

    pub async fn unlock_with(&mut self, prompter: &dyn Prompter) -> Result<UnlockOutcome, AuthError> {
        let outcome = self.auth.unlock_with(prompter).await?;
        if matches!(outcome, UnlockOutcome::Unlocked(_)) {
            let _ = self
                .events
                .send(CollectionEvent::AccessChanged(AuthState::Unlocked));
        }
        Ok(outcome)
    }

    pub fn set_secret(&mut self, candidate: &str, confirm: &str) -> Result<(), SetSecretError> {
        self.auth.set_secret(candidate, confirm)
    }

    /// Locks the gate and issues one final write of the current collection.
    pub fn lock(&mut self) {
        self.auth.lock();
        self.queue
            .enqueue(self.revision, Arc::from(self.entries.clone()));
        let _ = self
            .events
            .send(CollectionEvent::AccessChanged(AuthState::Locked));
    }

    fn ensure_unlocked(&self) -> Result<(), AccessError> {
        if self.auth.is_unlocked() {
            Ok(())
        } else {
            Err(AccessError::Locked)
        }
    }

    fn stale(&self, index: usize) -> AccessError {
        AccessError::StaleTarget {
            index,
            len: self.entries.len(),
        }
    }

    /// Overview rows; labels are masked and timestamps hidden while locked.
    pub fn rows(&self) -> Vec<EntryRow> {
        let unlocked = self.auth.is_unlocked();
        self.entries
            .iter()
            .map(|entry| {
                if unlocked {
                    EntryRow {
                        label: entry.source.clone(),
                        modified_at: Some(entry.modified_at),
                    }
                } else {
                    EntryRow {
                        label: REDACTED_LABEL.to_string(),
                        modified_at: None,
                    }
                }
            })
            .collect()
    }

    pub fn entry(&self, index: usize) -> Result<&Entry, AccessError> {
        self.ensure_unlocked()?;
        self.entries.get(index).ok_or_else(|| self.stale(index))
    }

    pub fn snapshot(&self) -> Result<Vec<Entry>, AccessError> {
        self.ensure_unlocked()?;
        Ok(self.entries.clone())
    }

    /// Opens a detail editor on the entry currently at `index`.
    pub fn open_session(&self, index: usize) -> Result<EditorSession, AccessError> {
        EditorSession::open(self, index)
    }

    /// Returns the entry's position after re-sorting.
    pub fn add(&mut self, entry: Entry) -> Result<usize, AccessError> {
        self.ensure_unlocked()?;
        let appended = self.entries.len();
        self.entries.push(entry);
        let order = sort_newest_first(&mut self.entries);
        let remap = IndexRemap::from_order(&order);
        let index = remap.get(appended).unwrap_or(appended);
        let before = IndexRemap::identity(appended);
        self.finalize(ChangeCause::Added, Some(before.then(&remap)));
        Ok(index)
    }

    /// Removes every listed position; the batch is rejected as a whole when
    /// any index is out of range.
    pub fn delete_at(&mut self, indices: &BTreeSet<usize>) -> Result<usize, AccessError> {
        self.ensure_unlocked()?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.entries.len()) {
            return Err(self.stale(bad));
        }
        if indices.is_empty() {
            return Ok(0);
        }
        let remap = IndexRemap::removing(self.entries.len(), indices);
        // Highest first so earlier removals never shift later targets.
        for &index in indices.iter().rev() {
            self.entries.remove(index);
        }
        self.finalize(ChangeCause::Removed, Some(remap));
        Ok(indices.len())
    }

    pub fn delete_all(&mut self) -> Result<(), AccessError> {
        self.ensure_unlocked()?;
        let remap = IndexRemap::cleared(self.entries.len());
        self.entries.clear();
        self.finalize(ChangeCause::Cleared, Some(remap));
        Ok(())
    }

    /// Restores newest-first order. Nothing is written: order is not part of
    /// the persisted contract since loading sorts anyway.
    pub fn reorder_by_sort(&mut self) -> bool {
        if is_sorted_newest_first(&self.entries) {
            return false;
        }
        let order = sort_newest_first(&mut self.entries);
        self.revision += 1;
        self.notify(ChangeCause::Reordered, Some(IndexRemap::from_order(&order)));
        true
    }

    /// Replaces the collection with a snapshot pushed by an editor session.
    /// The snapshot is kept in the session's order until the session closes.
    pub fn apply_external_update(&mut self, collection: Vec<Entry>) -> Result<u64, AccessError> {
        self.ensure_unlocked()?;
        self.entries = collection;
        self.finalize(ChangeCause::External, None);
        Ok(self.revision)
    }

    /// Waits until every queued write has been attempted and reports the
    /// outcome of the most recent one.
    pub async fn flush(&self) -> Result<(), PersistError> {
        self.queue.flush().await
    }

    fn finalize(&mut self, cause: ChangeCause, remap: Option<IndexRemap>) {
        self.revision += 1;
        self.queue
            .enqueue(self.revision, Arc::from(self.entries.clone()));
        self.notify(cause, remap);
    }

    fn notify(&self, cause: ChangeCause, remap: Option<IndexRemap>) {
        let snapshot = self
            .auth
            .is_unlocked()
            .then(|| Snapshot::from(self.entries.clone()));
        let _ = self.events.send(CollectionEvent::Changed {
            revision: self.revision,
            cause,
            len: self.entries.len(),
            snapshot,
            remap,
        });
    }
}
