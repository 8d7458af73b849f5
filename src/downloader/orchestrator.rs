// Orchestrator - primary slot, batch chains, progress and cancellation
//
// Every task has exactly one writer: the executor that runs it. The registry
// lock is held only for short snapshot/update sections, never across awaits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::models::{DownloadRequest, DownloadStatus, DownloadTask, TaskId, TaskSlot};
use super::traits::{DownloadEvent, JobUpdate, MediaService, ProgressEmitter};
use super::utils;

/// Final state of one task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub status: DownloadStatus,
    pub filename: Option<String>,
    pub error: Option<DownloadError>,
}

impl TaskOutcome {
    fn from_task(task: &DownloadTask) -> Self {
        Self {
            id: task.id,
            status: task.status,
            filename: task.filename.clone(),
            error: task.error.clone(),
        }
    }

    fn dropped(id: TaskId) -> Self {
        Self {
            id,
            status: DownloadStatus::Failed,
            filename: None,
            error: Some(DownloadError::Cancelled),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DownloadStatus::Completed
    }
}

/// Per-task outcomes of a batch chain, in submission order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch: u64,
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }
}

/// Handle to a running batch chain
pub struct BatchHandle {
    pub batch: u64,
    pub task_ids: Vec<TaskId>,
    handle: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// Wait for every member to finish
    pub async fn wait(self) -> Result<BatchReport, JoinError> {
        self.handle.await
    }
}

struct Entry {
    task: DownloadTask,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    next_batch: u64,
    order: Vec<TaskId>,
    entries: HashMap<TaskId, Entry>,
    primary: Option<TaskId>,
}

impl Registry {
    fn allocate(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    fn insert(&mut self, task: DownloadTask) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.order.push(task.id);
        self.entries.insert(
            task.id,
            Entry {
                task,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Drop finished tasks whose slot matches
    fn remove_finished(&mut self, matches_slot: impl Fn(&TaskSlot) -> bool) -> Vec<TaskId> {
        let removed: Vec<TaskId> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .map_or(false, |e| e.task.status.is_finished() && matches_slot(&e.task.slot))
            })
            .copied()
            .collect();

        for id in &removed {
            self.entries.remove(id);
        }
        self.order.retain(|id| !removed.contains(id));
        removed
    }

    fn active_primary(&self) -> Option<TaskId> {
        self.primary
            .filter(|id| self.entries.get(id).map_or(false, |e| e.task.status.is_active()))
    }
}

/// Drives download tasks against a `MediaService`
pub struct DownloadOrchestrator {
    runner: TaskRunner,
}

impl DownloadOrchestrator {
    pub fn new(
        service: Arc<dyn MediaService>,
        output_dir: PathBuf,
        events: mpsc::UnboundedSender<DownloadEvent>,
    ) -> Self {
        Self {
            runner: TaskRunner {
                service,
                registry: Arc::new(Mutex::new(Registry::default())),
                emitter: ProgressEmitter::new(events),
                output_dir,
            },
        }
    }

    /// Orchestrator plus the receiving end of its events
    pub fn with_channel(
        service: Arc<dyn MediaService>,
        output_dir: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(service, output_dir, tx), rx)
    }

    /// Start a download in the primary slot. Must be called inside a Tokio runtime.
    ///
    /// Rejected while another primary task is pending or running; the active
    /// task is left untouched.
    pub fn start_download(&self, request: DownloadRequest) -> Result<TaskId, DownloadError> {
        let (id, cancel) = {
            let mut reg = self.runner.registry.lock();

            if let Some(active) = reg.active_primary() {
                warn!("[Orchestrator] Rejected download: {} is still running", active);
                return Err(DownloadError::ConcurrentDownloadRejected { active });
            }

            let replaced = reg.remove_finished(|slot| *slot == TaskSlot::Primary);
            let id = reg.allocate();
            info!(
                "[Orchestrator] {} queued: {} @ {}",
                id, request.format.id, request.quality
            );
            let task = DownloadTask::new(id, TaskSlot::Primary, request);
            let cancel = reg.insert(task.clone());
            reg.primary = Some(id);
            self.runner.emitter.emit(DownloadEvent::TaskCreated { task, replaced });
            (id, cancel)
        };

        let runner = self.runner.clone();
        tokio::spawn(async move {
            runner.run(id, cancel).await;
        });

        Ok(id)
    }

    /// Run `requests` strictly one after another. Must be called inside a Tokio runtime.
    ///
    /// A failed member never stops the chain.
    pub fn start_batch(&self, requests: Vec<DownloadRequest>) -> BatchHandle {
        let (batch, members) = {
            let mut reg = self.runner.registry.lock();
            reg.next_batch += 1;
            let batch = reg.next_batch;

            let mut replaced = reg.remove_finished(|slot| matches!(slot, TaskSlot::Batch { .. }));
            let mut members = Vec::with_capacity(requests.len());

            for (index, request) in requests.into_iter().enumerate() {
                let id = reg.allocate();
                let task = DownloadTask::new(id, TaskSlot::Batch { batch, index }, request);
                let cancel = reg.insert(task.clone());
                members.push((id, cancel));
                self.runner.emitter.emit(DownloadEvent::TaskCreated {
                    task,
                    replaced: std::mem::take(&mut replaced),
                });
            }
            (batch, members)
        };

        info!("[Orchestrator] Batch {} queued with {} tasks", batch, members.len());

        let task_ids = members.iter().map(|(id, _)| *id).collect();
        let runner = self.runner.clone();
        let handle = tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(members.len());
            for (id, cancel) in members {
                outcomes.push(runner.run(id, cancel).await);
            }
            let report = BatchReport { batch, outcomes };
            info!(
                "[Orchestrator] Batch {} finished: {} completed, {} failed",
                batch,
                report.completed(),
                report.failed()
            );
            report
        });

        BatchHandle {
            batch,
            task_ids,
            handle,
        }
    }

    /// Request cooperative cancellation. Returns false for unknown or finished tasks.
    pub fn cancel(&self, id: TaskId) -> bool {
        let reg = self.runner.registry.lock();
        match reg.entries.get(&id) {
            Some(entry) if entry.task.status.is_active() => {
                info!("[Orchestrator] Cancelling {}", id);
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel everything and forget all tasks
    pub fn reset(&self) {
        let mut reg = self.runner.registry.lock();
        for entry in reg.entries.values() {
            entry.cancel.cancel();
        }
        reg.entries.clear();
        reg.order.clear();
        reg.primary = None;

        debug!("[Orchestrator] Registry reset");
        self.runner.emitter.emit(DownloadEvent::Reset);
    }

    pub fn task(&self, id: TaskId) -> Option<DownloadTask> {
        self.runner.registry.lock().entries.get(&id).map(|e| e.task.clone())
    }

    /// Snapshots of all known tasks, oldest first
    pub fn tasks(&self) -> Vec<DownloadTask> {
        let reg = self.runner.registry.lock();
        reg.order
            .iter()
            .filter_map(|id| reg.entries.get(id))
            .map(|e| e.task.clone())
            .collect()
    }

    pub fn active_primary(&self) -> Option<TaskId> {
        self.runner.registry.lock().active_primary()
    }

    pub fn has_active(&self) -> bool {
        self.runner
            .registry
            .lock()
            .entries
            .values()
            .any(|e| e.task.status.is_active())
    }
}

#[derive(Clone)]
struct TaskRunner {
    service: Arc<dyn MediaService>,
    registry: Arc<Mutex<Registry>>,
    emitter: ProgressEmitter,
    output_dir: PathBuf,
}

impl TaskRunner {
    async fn run(&self, id: TaskId, cancel: CancellationToken) -> TaskOutcome {
        let request = match self.registry.lock().entries.get(&id) {
            Some(entry) => entry.task.request.clone(),
            None => return TaskOutcome::dropped(id),
        };

        if cancel.is_cancelled() {
            return self.fail(id, DownloadError::Cancelled);
        }

        if !self.mark_running(id) {
            return TaskOutcome::dropped(id);
        }

        debug!("[Orchestrator] {} starting with {}", id, self.service.name());
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.fail(id, DownloadError::Cancelled),
            started = self.service.start_download(&request) => started,
        };

        let mut job = match started {
            Ok(job) => job,
            Err(e) => return self.fail(id, e),
        };

        loop {
            // Each update is one progress tick; cancellation is checked here
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.fail(id, DownloadError::Cancelled),
                update = job.next() => update,
            };

            match update {
                Some(JobUpdate::Progress(percent)) => {
                    if self.advance(id, percent) >= 100.0 {
                        return self.complete(id, &request);
                    }
                }
                Some(JobUpdate::Completed) => return self.complete(id, &request),
                Some(JobUpdate::Failed(e)) => return self.fail(id, e),
                None => {
                    return self.fail(
                        id,
                        DownloadError::Network("job ended before completion".to_string()),
                    )
                }
            }
        }
    }

    // Events are emitted while the registry lock is held, so a finished
    // status is never observable before its event is queued.

    fn mark_running(&self, id: TaskId) -> bool {
        let mut reg = self.registry.lock();
        match reg.entries.get_mut(&id) {
            Some(entry) => entry.task.status = DownloadStatus::Running,
            None => return false,
        }
        self.emitter.emit(DownloadEvent::TaskStarted { id });
        true
    }

    /// Apply a progress tick; returns the task's progress afterwards
    fn advance(&self, id: TaskId, percent: f32) -> f32 {
        let mut reg = self.registry.lock();
        let Some(entry) = reg.entries.get_mut(&id) else {
            return 0.0;
        };
        let current = entry.task.progress;
        if !percent.is_finite() {
            return current;
        }

        let progress = percent.clamp(0.0, 100.0).max(current);
        if progress > current {
            entry.task.progress = progress;
            debug!("[Orchestrator] {} at {:.1}%", id, progress);
            self.emitter.emit(DownloadEvent::TaskProgress { id, progress });
        }
        progress
    }

    fn complete(&self, id: TaskId, request: &DownloadRequest) -> TaskOutcome {
        let filename = request.target_filename();
        let output_path = self.output_dir.join(utils::path_safe(&filename));

        let mut reg = self.registry.lock();
        let Some(entry) = reg.entries.get_mut(&id) else {
            return TaskOutcome::dropped(id);
        };

        if entry.task.progress < 100.0 {
            entry.task.progress = 100.0;
            self.emitter.emit(DownloadEvent::TaskProgress {
                id,
                progress: 100.0,
            });
        }
        info!("[Orchestrator] ✓ {} completed: {}", id, filename);
        entry.task.status = DownloadStatus::Completed;
        entry.task.filename = Some(filename);
        entry.task.output_path = Some(output_path);

        let task = entry.task.clone();
        let outcome = TaskOutcome::from_task(&task);
        self.emitter.emit(DownloadEvent::TaskCompleted { task });
        outcome
    }

    fn fail(&self, id: TaskId, error: DownloadError) -> TaskOutcome {
        let mut reg = self.registry.lock();
        let Some(entry) = reg.entries.get_mut(&id) else {
            return TaskOutcome::dropped(id);
        };

        warn!("[Orchestrator] ✗ {} failed: {}", id, error);
        entry.task.status = DownloadStatus::Failed;
        entry.task.error = Some(error);

        let task = entry.task.clone();
        let outcome = TaskOutcome::from_task(&task);
        self.emitter.emit(DownloadEvent::TaskFailed { task });
        outcome
    }
}
