// Remote service trait and progress plumbing

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use super::errors::{DownloadError, FetchError};
use super::models::{DownloadRequest, DownloadTask, MediaMetadata, SourceUrl, TaskId};

/// The media-retrieval service the workflow talks to
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// "get info" request
    async fn fetch_info(&self, url: &SourceUrl) -> Result<MediaMetadata, FetchError>;

    /// Submit a download job; progress arrives on the returned job
    async fn start_download(&self, request: &DownloadRequest) -> Result<DownloadJob, DownloadError>;
}

/// One update from a running remote job
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// Percentage reported by the service
    Progress(f32),
    Completed,
    Failed(DownloadError),
}

/// Receiving end of a remote job's updates, fed by polling or push
pub struct DownloadJob {
    updates: mpsc::Receiver<JobUpdate>,
}

impl DownloadJob {
    /// Channel pair for backends; the sender side feeds the job
    pub fn channel(buffer: usize) -> (mpsc::Sender<JobUpdate>, DownloadJob) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, DownloadJob { updates: rx })
    }

    /// Next update, `None` once the backend dropped its sender
    pub async fn next(&mut self) -> Option<JobUpdate> {
        self.updates.recv().await
    }
}

/// State changes published by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    /// A task was registered; `replaced` tasks were dropped from its slot
    TaskCreated {
        task: DownloadTask,
        replaced: Vec<TaskId>,
    },
    TaskStarted { id: TaskId },
    TaskProgress { id: TaskId, progress: f32 },
    TaskCompleted { task: DownloadTask },
    TaskFailed { task: DownloadTask },
    /// Registry cleared
    Reset,
}

/// Progress emitter helper
#[derive(Clone)]
pub struct ProgressEmitter {
    sender: mpsc::UnboundedSender<DownloadEvent>,
}

impl ProgressEmitter {
    pub fn new(sender: mpsc::UnboundedSender<DownloadEvent>) -> Self {
        Self { sender }
    }

    pub fn emit(&self, event: DownloadEvent) {
        // Nobody listening is fine
        let _ = self.sender.send(event);
    }
}
