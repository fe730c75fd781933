// crates/network/src/upload/mod.rs
//! Chunked, resumable uploads
//!
//! An [`UploadManager`] owns a table of tasks and processes them one at a
//! time from a FIFO. Each task runs through:
//!
//! 1. fingerprinting a bounded prefix of the file,
//! 2. asking the server which chunks it already has,
//! 3. uploading the rest in batches of `concurrent_chunks`, and
//! 4. asking the server to merge.
//!
//! Every server call goes through the [`HttpClient`], so chunks get the
//! same retry, timeout and error classification as any other request.
//! Pausing cancels the in-flight calls but keeps accepted chunks; a later
//! resume (or a fresh task for the same file after a restart) skips them.

mod chunk;
mod fingerprint;
mod protocol;
mod task;

pub use chunk::{split_ranges, ChunkInfo, UploadFile};
pub use fingerprint::fingerprint;
pub use task::{TaskId, TaskSnapshot, TaskStatus};

use crate::client::HttpClient;
use crate::error::{UploadError, UploadResult};
use courier_resilience::CancellationToken;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use task::UploadTask;
use tokio::sync::broadcast;

/// Upload manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Default chunk size in bytes
    pub chunk_size: u64,
    /// Default number of chunks uploaded at once
    pub concurrent_chunks: usize,
    /// Bytes of the file hashed into the fingerprint
    pub fingerprint_prefix_bytes: u64,
    pub check_path: String,
    pub chunk_path: String,
    pub merge_path: String,
    /// Buffered events per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2 * 1024 * 1024,
            concurrent_chunks: 3,
            fingerprint_prefix_bytes: 1024 * 1024,
            check_path: "/upload/check".to_string(),
            chunk_path: "/upload/chunk".to_string(),
            merge_path: "/upload/merge".to_string(),
            event_capacity: 256,
        }
    }
}

/// Per-task overrides of [`UploadConfig`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AddTaskOptions {
    pub chunk_size: Option<u64>,
    pub concurrent_chunks: Option<usize>,
}

/// Task lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    StatusChanged { id: TaskId, status: TaskStatus },
    ChunkUploaded { id: TaskId, index: usize, progress: f64 },
    Completed { id: TaskId },
    Failed { id: TaskId, error: String },
}

impl UploadEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            UploadEvent::StatusChanged { id, .. }
            | UploadEvent::ChunkUploaded { id, .. }
            | UploadEvent::Completed { id }
            | UploadEvent::Failed { id, .. } => *id,
        }
    }
}

#[derive(Default)]
struct ManagerState {
    tasks: HashMap<TaskId, UploadTask>,
    /// Insertion order for listing
    order: Vec<TaskId>,
    queue: VecDeque<TaskId>,
}

struct Inner {
    client: HttpClient,
    config: UploadConfig,
    state: Mutex<ManagerState>,
    processing: AtomicBool,
    events: broadcast::Sender<UploadEvent>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: UploadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Applies `update` unless the run owning `token` has been paused,
    /// cancelled or removed in the meantime
    fn update_if_current<F>(&self, id: TaskId, token: &CancellationToken, update: F) -> bool
    where
        F: FnOnce(&mut UploadTask),
    {
        let mut state = self.state();
        match state.tasks.get_mut(&id) {
            Some(task) if !token.is_cancelled() => {
                update(task);
                true
            }
            _ => false,
        }
    }

    fn set_status(&self, id: TaskId, token: &CancellationToken, status: TaskStatus) -> bool {
        let changed = self.update_if_current(id, token, |task| task.set_status(status));
        if changed {
            self.emit(UploadEvent::StatusChanged { id, status });
        }
        changed
    }
}

/// What a run needs from the task, copied out under the lock
struct RunPlan {
    file: UploadFile,
    chunk_size: u64,
    concurrent_chunks: usize,
    fingerprint: Option<String>,
    total_chunks: usize,
    token: CancellationToken,
}

/// Drives chunked uploads
///
/// Cloning is cheap and clones share the task table. Adding or resuming a
/// task spawns the processing loop, so those calls must be made from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct UploadManager {
    inner: Arc<Inner>,
}

impl UploadManager {
    pub fn new(client: HttpClient, config: UploadConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                state: Mutex::new(ManagerState::default()),
                processing: AtomicBool::new(false),
                events,
            }),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.inner.config
    }

    /// Receives task lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.inner.events.subscribe()
    }

    /// Splits `file` into chunks, queues the task and returns its id
    ///
    /// Splitting only looks at the file size; nothing is read here.
    pub fn add_task(&self, file: UploadFile, options: AddTaskOptions) -> UploadResult<TaskId> {
        let chunk_size = options.chunk_size.unwrap_or(self.inner.config.chunk_size);
        let concurrent_chunks = options
            .concurrent_chunks
            .unwrap_or(self.inner.config.concurrent_chunks);

        if chunk_size == 0 {
            return Err(UploadError::InvalidOption(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if concurrent_chunks == 0 {
            return Err(UploadError::InvalidOption(
                "concurrent_chunks must be greater than 0".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| UploadError::NoRuntime)?;

        let task = UploadTask::new(file, chunk_size, concurrent_chunks);
        let id = task.id;
        log::info!(
            "Queued upload {} ({}, {} bytes, {} chunks)",
            id,
            task.file.name(),
            task.file.size(),
            task.chunks.len()
        );

        {
            let mut state = self.inner.state();
            state.tasks.insert(id, task);
            state.order.push(id);
            state.queue.push_back(id);
        }
        self.inner.emit(UploadEvent::StatusChanged {
            id,
            status: TaskStatus::Pending,
        });

        Self::kick(&self.inner, &runtime);
        Ok(id)
    }

    /// Starts the drain loop unless one is already running
    fn kick(inner: &Arc<Inner>, runtime: &tokio::runtime::Handle) {
        if inner
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            runtime.spawn(Self::drain(Arc::clone(inner)));
        }
    }

    async fn drain(inner: Arc<Inner>) {
        loop {
            let next = inner.state().queue.pop_front();
            match next {
                Some(id) => Self::upload_task(&inner, id).await,
                None => {
                    inner.processing.store(false, Ordering::SeqCst);
                    // A task queued between the pop and the store would be stranded
                    let queued = !inner.state().queue.is_empty();
                    if queued
                        && inner
                            .processing
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                    {
                        continue;
                    }
                    return;
                }
            }
        }
    }

    async fn upload_task(inner: &Arc<Inner>, id: TaskId) {
        let plan = {
            let mut state = inner.state();
            let Some(task) = state.tasks.get_mut(&id) else {
                return;
            };
            if task.status != TaskStatus::Pending || task.cancel.is_cancelled() {
                log::debug!("Skipping upload {} in state {}", id, task.status);
                return;
            }
            task.set_status(TaskStatus::Uploading);
            task.error = None;
            RunPlan {
                file: task.file.clone(),
                chunk_size: task.chunk_size,
                concurrent_chunks: task.concurrent_chunks,
                fingerprint: task.fingerprint.clone(),
                total_chunks: task.chunks.len(),
                token: task.cancel.clone(),
            }
        };
        inner.emit(UploadEvent::StatusChanged {
            id,
            status: TaskStatus::Uploading,
        });
        log::info!("Uploading {} ({})", id, plan.file.name());

        let token = plan.token.clone();
        match Self::run(inner, id, plan).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() || token.is_cancelled() => {
                log::info!("Upload {} stopped", id);
            }
            Err(e) => {
                let message = e.to_string();
                let failed = inner.update_if_current(id, &token, |task| {
                    task.error = Some(message.clone());
                    task.set_status(TaskStatus::Failed);
                });
                if failed {
                    log::error!("Upload {} failed: {}", id, message);
                    inner.emit(UploadEvent::Failed { id, error: message });
                }
            }
        }
    }

    async fn run(inner: &Arc<Inner>, id: TaskId, plan: RunPlan) -> UploadResult<()> {
        let config = &inner.config;
        let client = &inner.client;
        let token = &plan.token;

        let file_hash = match plan.fingerprint {
            Some(existing) => existing,
            None => {
                let computed = fingerprint(&plan.file, config.fingerprint_prefix_bytes).await?;
                inner.update_if_current(id, token, |task| task.set_fingerprint(computed.clone()));
                computed
            }
        };

        match protocol::check_uploaded_chunks(
            client,
            config,
            &file_hash,
            plan.file.name(),
            plan.total_chunks,
            token,
        )
        .await
        {
            Ok(indices) => {
                log::debug!("Server already has {} chunk(s) of {}", indices.len(), id);
                inner.update_if_current(id, token, |task| task.seed_uploaded(indices));
            }
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => log::warn!("Chunk check for {} failed, uploading all: {}", id, e),
        }

        let pending: Vec<ChunkInfo> = {
            let state = inner.state();
            let Some(task) = state.tasks.get(&id) else {
                return Ok(());
            };
            task.pending_chunks()
                .into_iter()
                .map(|index| task.chunks[index].clone())
                .collect()
        };

        let file = &plan.file;
        let chunk_size = plan.chunk_size;
        for batch in pending.chunks(plan.concurrent_chunks) {
            if token.is_cancelled() {
                return Ok(());
            }

            let uploads = batch.iter().map(|chunk| async move {
                let result = Self::upload_one(inner, file, chunk, chunk_size, token).await;
                (chunk.index, result)
            });

            let mut failure = None;
            for (index, result) in join_all(uploads).await {
                match result {
                    Ok(()) => Self::record_uploaded(inner, id, index),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        log::warn!("Chunk {} of {} failed: {}", index, id, e);
                        {
                            let mut state = inner.state();
                            if let Some(task) = state.tasks.get_mut(&id) {
                                task.mark_chunk_failed(index);
                            }
                        }
                        failure.get_or_insert(e);
                    }
                }
            }

            if let Some(e) = failure {
                return Err(e);
            }
        }

        if token.is_cancelled() {
            return Ok(());
        }

        if !inner.set_status(id, token, TaskStatus::Merging) {
            return Ok(());
        }
        protocol::merge(
            client,
            config,
            &id.to_string(),
            plan.file.name(),
            &file_hash,
            plan.total_chunks,
            token,
        )
        .await?;

        let completed = inner.update_if_current(id, token, |task| {
            task.progress = 100.0;
            task.set_status(TaskStatus::Completed);
        });
        if completed {
            log::info!("Upload {} completed", id);
            inner.emit(UploadEvent::StatusChanged {
                id,
                status: TaskStatus::Completed,
            });
            inner.emit(UploadEvent::Completed { id });
        }
        Ok(())
    }

    async fn upload_one(
        inner: &Inner,
        file: &UploadFile,
        chunk: &ChunkInfo,
        chunk_size: u64,
        token: &CancellationToken,
    ) -> UploadResult<()> {
        let data = file.read_range(chunk.start, chunk.end).await?;
        protocol::upload_chunk(&inner.client, &inner.config, chunk, data, chunk_size, token).await?;
        log::debug!(
            "Uploaded chunk {}/{} of {}",
            chunk.index + 1,
            chunk.total_chunks,
            chunk.task_id
        );
        Ok(())
    }

    /// Accepted chunks count even if the run was paused meanwhile
    fn record_uploaded(inner: &Inner, id: TaskId, index: usize) {
        let progress = {
            let mut state = inner.state();
            match state.tasks.get_mut(&id) {
                Some(task) => {
                    task.mark_chunk_uploaded(index);
                    task.progress
                }
                None => return,
            }
        };
        inner.emit(UploadEvent::ChunkUploaded {
            id,
            index,
            progress,
        });
    }

    /// Stops a pending or uploading task, keeping its uploaded chunks
    pub fn pause_task(&self, id: TaskId) -> UploadResult<()> {
        {
            let mut state = self.inner.state();
            let task = state.tasks.get_mut(&id).ok_or(UploadError::TaskNotFound(id))?;
            if !task.status.can_pause() {
                return Err(UploadError::InvalidState {
                    id,
                    status: task.status,
                    action: "pause",
                });
            }
            task.cancel.cancel();
            task.paused = true;
            task.set_status(TaskStatus::Pending);
            state.queue.retain(|queued| *queued != id);
        }

        log::info!("Paused upload {}", id);
        self.inner.emit(UploadEvent::StatusChanged {
            id,
            status: TaskStatus::Pending,
        });
        Ok(())
    }

    /// Re-queues a pending task
    pub fn resume_task(&self, id: TaskId) -> UploadResult<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| UploadError::NoRuntime)?;
        {
            let mut state = self.inner.state();
            let task = state.tasks.get_mut(&id).ok_or(UploadError::TaskNotFound(id))?;
            if task.status != TaskStatus::Pending {
                return Err(UploadError::InvalidState {
                    id,
                    status: task.status,
                    action: "resume",
                });
            }
            if task.cancel.is_cancelled() {
                task.cancel = CancellationToken::new();
            }
            task.paused = false;
            if !state.queue.contains(&id) {
                state.queue.push_back(id);
            }
        }

        log::info!("Resumed upload {}", id);
        Self::kick(&self.inner, &runtime);
        Ok(())
    }

    /// Stops a task for good
    pub fn cancel_task(&self, id: TaskId) -> UploadResult<()> {
        {
            let mut state = self.inner.state();
            let task = state.tasks.get_mut(&id).ok_or(UploadError::TaskNotFound(id))?;
            if task.status.is_terminal() {
                return Err(UploadError::InvalidState {
                    id,
                    status: task.status,
                    action: "cancel",
                });
            }
            task.cancel.cancel();
            task.paused = false;
            task.set_status(TaskStatus::Cancelled);
            state.queue.retain(|queued| *queued != id);
        }

        log::info!("Cancelled upload {}", id);
        self.inner.emit(UploadEvent::StatusChanged {
            id,
            status: TaskStatus::Cancelled,
        });
        Ok(())
    }

    /// Forgets a task, cancelling it first if it is still running
    pub fn remove_task(&self, id: TaskId) -> UploadResult<TaskSnapshot> {
        let mut state = self.inner.state();
        let task = state.tasks.remove(&id).ok_or(UploadError::TaskNotFound(id))?;
        task.cancel.cancel();
        state.queue.retain(|queued| *queued != id);
        state.order.retain(|known| *known != id);
        Ok(task.snapshot())
    }

    pub fn get_task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.inner.state().tasks.get(&id).map(UploadTask::snapshot)
    }

    /// Snapshots of every task, oldest first
    pub fn get_all_tasks(&self) -> Vec<TaskSnapshot> {
        let state = self.inner.state();
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .map(UploadTask::snapshot)
            .collect()
    }

    /// Drops completed tasks, returning how many were removed
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.state();
        let before = state.tasks.len();
        state
            .tasks
            .retain(|_, task| task.status != TaskStatus::Completed);
        let ManagerState { tasks, order, .. } = &mut *state;
        order.retain(|id| tasks.contains_key(id));
        before - tasks.len()
    }

    /// Waits until the task reaches a terminal state
    ///
    /// A paused task is not terminal, so this keeps waiting across pauses.
    pub async fn wait_for_terminal(&self, id: TaskId) -> UploadResult<TaskSnapshot> {
        let mut events = self.subscribe();
        loop {
            let snapshot = self.get_task(id).ok_or(UploadError::TaskNotFound(id))?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Ok(snapshot),
            }
        }
    }
}
