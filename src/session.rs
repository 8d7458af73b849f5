// Session - the workflow state machine and its driver
//
// `SessionState::apply` is a pure reducer: it never performs I/O, it only
// returns the effects to run. `Session` owns the state, runs the effects and
// feeds async results back in as events, all on the owner's task.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::downloader::backends::HttpMediaService;
use crate::downloader::{
    BatchHandle, BatchPreset, CatalogError, Clipboard, DownloadError, DownloadEvent, DownloadOrchestrator,
    DownloadRequest, DownloadStatus, DownloadTask, FetchError, FetchTicket, FormatCatalog,
    MediaMetadata, MediaService, MetadataFetcher, Preset, SourceUrl, TaskId, UrlValidator,
    ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Fetching,
    Ready,
    Downloading,
    Error,
}

/// The single most recent error shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(ValidationError),

    #[error(transparent)]
    Fetch(FetchError),

    /// `task` is `None` when the download was rejected before a task existed
    #[error("{error}")]
    Download {
        task: Option<TaskId>,
        error: DownloadError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    UrlEdited(String),
    SubmitUrl(String),
    Validated {
        generation: u64,
        result: Result<SourceUrl, ValidationError>,
    },
    FetchResolved {
        generation: u64,
        result: Result<MediaMetadata, FetchError>,
    },
    SelectDownload(DownloadRequest),
    SelectBatch(Vec<DownloadRequest>),
    DownloadRejected(DownloadError),
    CancelTask(TaskId),
    Task(DownloadEvent),
    ToggleAdvanced,
    DismissError,
    ClipboardFailed(String),
    Reset,
}

/// Side effects requested by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Validate { generation: u64, input: String },
    Fetch { generation: u64, source: SourceUrl },
    StartDownload(DownloadRequest),
    StartBatch(Vec<DownloadRequest>),
    Cancel(TaskId),
    CancelAll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    pub url_input: String,
    /// Validated form of the last submitted URL
    pub source: Option<SourceUrl>,
    pub metadata: Option<MediaMetadata>,
    pub error: Option<SessionError>,
    /// Soft failure (clipboard); never blocks the workflow
    pub warning: Option<String>,
    /// Mirror of the orchestrator's tasks, oldest first
    pub tasks: Vec<DownloadTask>,
    pub advanced: bool,
    /// Bumped by every submit and reset; older fetch results are dropped
    pub fetch_generation: u64,
}

impl SessionState {
    pub fn apply(mut self, event: SessionEvent) -> Transition {
        let mut effects = Vec::new();

        match event {
            SessionEvent::UrlEdited(text) => {
                self.url_input = text;
                self.warning = None;
            }

            SessionEvent::SubmitUrl(text) => {
                // Metadata and errors belong to the running downloads until they finish
                if self.phase == Phase::Downloading || self.has_active_tasks() {
                    debug!("[Session] Submit ignored while downloads are active");
                    return Transition {
                        state: self,
                        effects,
                    };
                }
                self.url_input = text.clone();
                self.fetch_generation += 1;
                self.phase = Phase::Validating;
                effects.push(Effect::Validate {
                    generation: self.fetch_generation,
                    input: text,
                });
            }

            SessionEvent::Validated { generation, result } => {
                if generation != self.fetch_generation || self.phase != Phase::Validating {
                    debug!("[Session] Ignoring stale validation {}", generation);
                } else {
                    self.metadata = None;
                    match result {
                        Ok(source) => {
                            self.phase = Phase::Fetching;
                            self.error = None;
                            self.source = Some(source.clone());
                            effects.push(Effect::Fetch { generation, source });
                        }
                        Err(e) => {
                            self.phase = Phase::Error;
                            self.source = None;
                            self.error = Some(SessionError::Validation(e));
                        }
                    }
                }
            }

            SessionEvent::FetchResolved { generation, result } => {
                if generation != self.fetch_generation || self.phase != Phase::Fetching {
                    debug!("[Session] Ignoring stale fetch result {}", generation);
                } else {
                    match result {
                        Ok(metadata) => {
                            self.phase = Phase::Ready;
                            self.metadata = Some(metadata);
                            self.error = None;
                        }
                        Err(e) => {
                            self.phase = Phase::Error;
                            self.metadata = None;
                            self.error = Some(SessionError::Fetch(e));
                        }
                    }
                }
            }

            SessionEvent::SelectDownload(request) => {
                if self.can_download() {
                    self.begin_download();
                    effects.push(Effect::StartDownload(request));
                } else {
                    debug!("[Session] Download selected in {:?} without metadata", self.phase);
                }
            }

            SessionEvent::SelectBatch(requests) => {
                if requests.is_empty() {
                    debug!("[Session] Empty batch ignored");
                } else if self.can_download() {
                    self.begin_download();
                    effects.push(Effect::StartBatch(requests));
                } else {
                    debug!("[Session] Batch selected in {:?} without metadata", self.phase);
                }
            }

            SessionEvent::DownloadRejected(error) => {
                if self.metadata.is_some() {
                    self.error = Some(SessionError::Download { task: None, error });
                    self.settle_download_phase();
                }
            }

            SessionEvent::CancelTask(id) => {
                if self.task(id).map_or(false, |t| t.status.is_active()) {
                    effects.push(Effect::Cancel(id));
                }
            }

            SessionEvent::Task(event) => self.mirror(event),

            SessionEvent::ToggleAdvanced => self.advanced = !self.advanced,

            SessionEvent::DismissError => {
                self.error = None;
                if self.phase == Phase::Error {
                    self.phase = if self.metadata.is_some() {
                        Phase::Ready
                    } else {
                        Phase::Idle
                    };
                }
            }

            SessionEvent::ClipboardFailed(message) => self.warning = Some(message),

            SessionEvent::Reset => {
                self = SessionState {
                    advanced: self.advanced,
                    fetch_generation: self.fetch_generation + 1,
                    ..Default::default()
                };
                effects.push(Effect::CancelAll);
            }
        }

        Transition {
            state: self,
            effects,
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&DownloadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn active_tasks(&self) -> impl Iterator<Item = &DownloadTask> {
        self.tasks.iter().filter(|t| t.status.is_active())
    }

    pub fn has_active_tasks(&self) -> bool {
        self.active_tasks().next().is_some()
    }

    /// Loading flag of the "get info" button
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Validating | Phase::Fetching)
    }

    fn can_download(&self) -> bool {
        self.metadata.is_some()
            && self.source.is_some()
            && matches!(self.phase, Phase::Ready | Phase::Downloading | Phase::Error)
    }

    fn begin_download(&mut self) {
        if matches!(self.error, Some(SessionError::Download { .. })) {
            self.error = None;
        }
        self.phase = Phase::Downloading;
    }

    fn tracks_downloads(&self) -> bool {
        self.metadata.is_some()
            && matches!(self.phase, Phase::Ready | Phase::Downloading | Phase::Error)
    }

    fn settle_download_phase(&mut self) {
        if !self.tracks_downloads() {
            return;
        }
        self.phase = if self.has_active_tasks() {
            Phase::Downloading
        } else if matches!(self.error, Some(SessionError::Download { .. })) {
            Phase::Error
        } else {
            Phase::Ready
        };
    }

    /// A rejection only describes the run it collided with
    fn finish_download_step(&mut self) {
        if !self.has_active_tasks()
            && matches!(self.error, Some(SessionError::Download { task: None, .. }))
        {
            self.error = None;
        }
        self.settle_download_phase();
    }

    fn mirror(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::TaskCreated { task, replaced } => {
                self.tasks.retain(|t| !replaced.contains(&t.id));
                if self.task(task.id).is_none() {
                    self.tasks.push(task);
                }
            }
            DownloadEvent::TaskStarted { id } => {
                if let Some(task) = self.task_mut(id) {
                    task.status = DownloadStatus::Running;
                }
            }
            DownloadEvent::TaskProgress { id, progress } => {
                if let Some(task) = self.task_mut(id) {
                    task.progress = task.progress.max(progress);
                }
            }
            DownloadEvent::TaskCompleted { task } => {
                if self.replace(task) {
                    self.finish_download_step();
                }
            }
            DownloadEvent::TaskFailed { task } => {
                let id = task.id;
                let error = task.error.clone();
                if !self.replace(task) {
                    return;
                }
                // A user cancel is not an error
                if let Some(error) = error.filter(|e| *e != DownloadError::Cancelled) {
                    if self.tracks_downloads() {
                        self.error = Some(SessionError::Download {
                            task: Some(id),
                            error,
                        });
                    }
                }
                self.finish_download_step();
            }
            DownloadEvent::Reset => self.tasks.clear(),
        }
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut DownloadTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Replace a known task's snapshot
    fn replace(&mut self, task: DownloadTask) -> bool {
        match self.task_mut(task.id) {
            Some(slot) => {
                *slot = task;
                true
            }
            None => false,
        }
    }
}

struct FetchOutcome {
    generation: u64,
    ticket: FetchTicket,
    result: Result<MediaMetadata, FetchError>,
}

/// Owns a `SessionState` and runs its effects
///
/// Methods that start work spawn Tokio tasks and must be called inside a runtime.
pub struct Session {
    state: SessionState,
    catalog: FormatCatalog,
    validator: UrlValidator,
    fetcher: MetadataFetcher,
    orchestrator: DownloadOrchestrator,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    download_rx: mpsc::UnboundedReceiver<DownloadEvent>,
    fetches_in_flight: usize,
    last_batch: Option<BatchHandle>,
}

impl Session {
    pub fn new(service: Arc<dyn MediaService>, config: &AppConfig) -> Self {
        let (orchestrator, download_rx) =
            DownloadOrchestrator::with_channel(service.clone(), config.output_dir.clone());
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

        Self {
            state: SessionState::default(),
            catalog: FormatCatalog::builtin().clone(),
            validator: UrlValidator::new(config.default_platform),
            fetcher: MetadataFetcher::with_timeout(service, config.service.fetch_timeout),
            orchestrator,
            fetch_tx,
            fetch_rx,
            download_rx,
            fetches_in_flight: 0,
            last_batch: None,
        }
    }

    /// Session talking to the HTTP service described by `config`
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let service = HttpMediaService::new(&config.service)?;
        info!("[Session] Using service at {}", config.service.base_url);
        Ok(Self::new(Arc::new(service), config))
    }

    pub fn with_catalog(mut self, catalog: FormatCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    pub fn orchestrator(&self) -> &DownloadOrchestrator {
        &self.orchestrator
    }

    pub fn edit_url(&mut self, text: impl Into<String>) {
        self.dispatch(SessionEvent::UrlEdited(text.into()));
    }

    /// Validate `text` and fetch its metadata; supersedes any pending fetch
    pub fn submit_url(&mut self, text: impl Into<String>) {
        self.dispatch(SessionEvent::SubmitUrl(text.into()));
    }

    pub fn select_download(&mut self, request: DownloadRequest) {
        self.dispatch(SessionEvent::SelectDownload(request));
    }

    /// Download the current media as `format_id`; `quality` may be a tier or an alias
    pub fn select_format(&mut self, format_id: &str, quality: Option<&str>) -> Result<(), CatalogError> {
        match self.build_request(format_id, quality)? {
            Some(request) => self.select_download(request),
            None => debug!("[Session] No metadata yet, ignoring {}", format_id),
        }
        Ok(())
    }

    pub fn select_preset(&mut self, preset: Preset) -> Result<(), CatalogError> {
        let (format_id, quality) = preset.selection();
        self.select_format(format_id, Some(quality))
    }

    /// Run several (format, quality) pairs as one sequential chain
    pub fn select_batch(&mut self, selections: &[(&str, &str)]) -> Result<(), CatalogError> {
        let mut requests = Vec::with_capacity(selections.len());
        for (format_id, quality) in selections {
            match self.build_request(format_id, Some(quality))? {
                Some(request) => requests.push(request),
                None => {
                    debug!("[Session] No metadata yet, ignoring batch");
                    return Ok(());
                }
            }
        }
        self.dispatch(SessionEvent::SelectBatch(requests));
        Ok(())
    }

    pub fn select_batch_preset(&mut self, preset: BatchPreset) -> Result<(), CatalogError> {
        self.select_batch(preset.selections())
    }

    /// Handle of the most recently started batch, for callers that want its report
    pub fn take_batch(&mut self) -> Option<BatchHandle> {
        self.last_batch.take()
    }

    pub fn cancel_download(&mut self, id: TaskId) {
        self.dispatch(SessionEvent::CancelTask(id));
    }

    pub fn toggle_advanced(&mut self) {
        self.dispatch(SessionEvent::ToggleAdvanced);
    }

    pub fn dismiss_error(&mut self) {
        self.dispatch(SessionEvent::DismissError);
    }

    /// Cancel everything and go back to `Idle`
    pub fn reset(&mut self) {
        self.dispatch(SessionEvent::Reset);
    }

    /// Replace the URL input with the clipboard text
    pub async fn paste_from_clipboard(&mut self, clipboard: &dyn Clipboard) {
        match clipboard.read_text().await {
            Ok(text) => self.dispatch(SessionEvent::UrlEdited(text)),
            Err(e) => {
                warn!("[Session] Failed to paste from clipboard: {}", e);
                self.dispatch(SessionEvent::ClipboardFailed(e.to_string()));
            }
        }
    }

    /// Copy the URL input; the result drives the "copied" indicator
    pub async fn copy_to_clipboard(&mut self, clipboard: &dyn Clipboard) -> bool {
        match clipboard.write_text(&self.state.url_input).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[Session] Failed to copy to clipboard: {}", e);
                self.dispatch(SessionEvent::ClipboardFailed(e.to_string()));
                false
            }
        }
    }

    /// Wait for and apply one async result. Returns false when nothing is in flight.
    pub async fn next_event(&mut self) -> bool {
        if self.pump_one() {
            return true;
        }
        if self.fetches_in_flight == 0 && !self.orchestrator.has_active() {
            return self.pump_one();
        }

        tokio::select! {
            Some(outcome) = self.fetch_rx.recv() => self.on_fetch(outcome),
            Some(event) = self.download_rx.recv() => self.dispatch(SessionEvent::Task(event)),
            else => return false,
        }
        true
    }

    /// Apply every result that is already available
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while self.pump_one() {
            applied += 1;
        }
        applied
    }

    /// Drive the session until no fetch or download is in flight
    pub async fn settle(&mut self) {
        while self.next_event().await {}
    }

    fn pump_one(&mut self) -> bool {
        if let Ok(outcome) = self.fetch_rx.try_recv() {
            self.on_fetch(outcome);
            return true;
        }
        if let Ok(event) = self.download_rx.try_recv() {
            self.dispatch(SessionEvent::Task(event));
            return true;
        }
        false
    }

    fn on_fetch(&mut self, outcome: FetchOutcome) {
        self.fetches_in_flight = self.fetches_in_flight.saturating_sub(1);
        if !outcome.ticket.is_current() {
            warn!(
                "[Session] Dropping superseded fetch result (generation {})",
                outcome.generation
            );
            return;
        }
        self.dispatch(SessionEvent::FetchResolved {
            generation: outcome.generation,
            result: outcome.result,
        });
    }

    fn build_request(
        &self,
        format_id: &str,
        quality: Option<&str>,
    ) -> Result<Option<DownloadRequest>, CatalogError> {
        let format = self.catalog.resolve(format_id)?;
        let quality = format.resolve_quality(quality)?;

        Ok(match (&self.state.source, &self.state.metadata) {
            (Some(source), Some(metadata)) => Some(DownloadRequest::new(
                source.clone(),
                format,
                quality,
                metadata.clone(),
            )),
            _ => None,
        })
    }

    fn dispatch(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let Transition { state, effects } = std::mem::take(&mut self.state).apply(event);
            self.state = state;

            for effect in effects {
                queue.extend(self.run_effect(effect));
            }
        }
    }

    /// Run one effect, returning the events it produced synchronously
    fn run_effect(&mut self, effect: Effect) -> Vec<SessionEvent> {
        let mut follow_up = Vec::new();

        match effect {
            Effect::Validate { generation, input } => {
                let result = self.validator.validate(&input);
                follow_up.push(SessionEvent::Validated { generation, result });
            }
            Effect::Fetch { generation, source } => {
                let ticket = self.fetcher.begin();
                let fetcher = self.fetcher.clone();
                let tx = self.fetch_tx.clone();
                self.fetches_in_flight += 1;

                tokio::spawn(async move {
                    let result = fetcher.fetch_info(&source).await;
                    let _ = tx.send(FetchOutcome {
                        generation,
                        ticket,
                        result,
                    });
                });
            }
            Effect::StartDownload(request) => {
                if let Err(e) = self.orchestrator.start_download(request) {
                    follow_up.push(SessionEvent::DownloadRejected(e));
                }
            }
            Effect::StartBatch(requests) => {
                self.last_batch = Some(self.orchestrator.start_batch(requests));
            }
            Effect::Cancel(id) => {
                self.orchestrator.cancel(id);
            }
            Effect::CancelAll => {
                self.last_batch = None;
                self.orchestrator.reset();
            }
        }

        // Keep the task mirror current before the next transition
        while let Ok(event) = self.download_rx.try_recv() {
            follow_up.push(SessionEvent::Task(event));
        }
        follow_up
    }
}
