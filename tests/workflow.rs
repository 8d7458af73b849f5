use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use social_downloader::downloader::backends::SimulatedService;
use social_downloader::downloader::{
    BatchPreset, CatalogError, DownloadError, DownloadJob, DownloadRequest, DownloadStatus,
    FetchError, JobUpdate, MediaMetadata, MediaService, MemoryClipboard, Platform, Preset,
    SourceUrl, TaskId, ValidationError,
};
use social_downloader::{AppConfig, Phase, Session, SessionError};

#[derive(Clone)]
enum FetchPlan {
    Respond(MediaMetadata),
    Gated(Arc<Notify>, MediaMetadata),
}

#[derive(Clone)]
enum DownloadPlan {
    Progress(Vec<f32>),
    Gated(Arc<Notify>),
    Fail(DownloadError),
    GatedFail(Arc<Notify>, DownloadError),
}

/// Service whose answers are fixed per URL marker and per format id
#[derive(Default)]
struct ScriptedService {
    fetches: Vec<(String, FetchPlan)>,
    downloads: HashMap<String, DownloadPlan>,
    fetch_calls: AtomicUsize,
}

impl ScriptedService {
    fn fetch(mut self, marker: &str, plan: FetchPlan) -> Self {
        self.fetches.push((marker.to_string(), plan));
        self
    }

    fn download(mut self, format_id: &str, plan: DownloadPlan) -> Self {
        self.downloads.insert(format_id.to_string(), plan);
        self
    }
}

#[async_trait]
impl MediaService for ScriptedService {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_info(&self, url: &SourceUrl) -> Result<MediaMetadata, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let plan = self
            .fetches
            .iter()
            .find(|(marker, _)| url.as_str().contains(marker.as_str()))
            .map(|(_, plan)| plan.clone());

        match plan {
            Some(FetchPlan::Respond(metadata)) => Ok(metadata),
            Some(FetchPlan::Gated(gate, metadata)) => {
                gate.notified().await;
                Ok(metadata)
            }
            None => Err(FetchError::Service {
                status: Some(404),
                message: "not scripted".to_string(),
            }),
        }
    }

    async fn start_download(&self, request: &DownloadRequest) -> Result<DownloadJob, DownloadError> {
        let plan = self
            .downloads
            .get(&request.format.id)
            .cloned()
            .unwrap_or(DownloadPlan::Progress(vec![50.0]));
        let (tx, job) = DownloadJob::channel(16);

        tokio::spawn(async move {
            match plan {
                DownloadPlan::Progress(steps) => {
                    for step in steps {
                        if tx.send(JobUpdate::Progress(step)).await.is_err() {
                            return;
                        }
                        tokio::task::yield_now().await;
                    }
                    let _ = tx.send(JobUpdate::Completed).await;
                }
                DownloadPlan::Gated(gate) => {
                    gate.notified().await;
                    let _ = tx.send(JobUpdate::Progress(50.0)).await;
                    let _ = tx.send(JobUpdate::Completed).await;
                }
                DownloadPlan::Fail(error) => {
                    let _ = tx.send(JobUpdate::Progress(20.0)).await;
                    let _ = tx.send(JobUpdate::Failed(error)).await;
                }
                DownloadPlan::GatedFail(gate, error) => {
                    gate.notified().await;
                    let _ = tx.send(JobUpdate::Failed(error)).await;
                }
            }
        });

        Ok(job)
    }
}

fn meta(title: &str) -> MediaMetadata {
    MediaMetadata {
        title: Some(title.to_string()),
        duration: Some(245),
        uploader: "Content Creator".to_string(),
        ..Default::default()
    }
}

fn config() -> AppConfig {
    AppConfig {
        output_dir: PathBuf::from("/downloads"),
        ..Default::default()
    }
}

async fn ready_session(service: ScriptedService) -> (Session, Arc<ScriptedService>) {
    let service = Arc::new(service.fetch("youtube", FetchPlan::Respond(meta("clip"))));
    let mut session = Session::new(service.clone(), &config());
    session.submit_url("https://www.youtube.com/watch?v=1");
    session.settle().await;
    assert_eq!(session.state().phase, Phase::Ready);
    (session, service)
}

#[tokio::test]
async fn empty_url_never_fetches() {
    let service = Arc::new(ScriptedService::default());
    let mut session = Session::new(service.clone(), &config());

    for input in ["", "   ", "\n\t"] {
        session.submit_url(input);
        session.settle().await;

        let state = session.state();
        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.error, Some(SessionError::Validation(ValidationError::EmptyUrl)));
        assert!(state.metadata.is_none());
    }
    assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn last_submitted_url_wins() {
    let gate = Arc::new(Notify::new());
    let service = Arc::new(
        ScriptedService::default()
            .fetch("vimeo", FetchPlan::Gated(gate.clone(), meta("first")))
            .fetch("tiktok", FetchPlan::Respond(meta("second"))),
    );
    let mut session = Session::new(service.clone(), &config());

    session.submit_url("https://vimeo.com/1");
    session.submit_url("https://www.tiktok.com/@a/video/2");
    assert!(session.next_event().await);

    let state = session.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.metadata.as_ref().unwrap().title.as_deref(), Some("second"));
    assert_eq!(state.metadata.as_ref().unwrap().platform, Platform::TikTok);

    // The slow first answer arrives late and is dropped
    gate.notify_one();
    session.settle().await;

    let state = session.state();
    assert_eq!(state.metadata.as_ref().unwrap().title.as_deref(), Some("second"));
    assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_download_rejected_while_first_runs() {
    let gate = Arc::new(Notify::new());
    let (mut session, _) =
        ready_session(ScriptedService::default().download("mp4", DownloadPlan::Gated(gate.clone()))).await;

    session.select_format("mp4", None).unwrap();
    let first = session.state().tasks[0].id;
    assert_eq!(session.state().phase, Phase::Downloading);

    session.select_preset(Preset::Audio).unwrap();
    let state = session.state();
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(
        state.error,
        Some(SessionError::Download {
            task: None,
            error: DownloadError::ConcurrentDownloadRejected { active: first },
        })
    );
    assert!(state.metadata.is_some());

    gate.notify_one();
    session.settle().await;

    let task = session.state().task(first).unwrap();
    assert_eq!(task.status, DownloadStatus::Completed);
    assert_eq!(task.request.format.id, "mp4");

    // The rejection does not outlive the download it collided with
    let state = session.state();
    assert_eq!(state.phase, Phase::Ready);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn submit_ignored_while_download_runs() {
    let gate = Arc::new(Notify::new());
    let service = ScriptedService::default()
        .fetch("vimeo", FetchPlan::Respond(meta("other")))
        .download("mp4", DownloadPlan::Gated(gate.clone()));
    let (mut session, service) = ready_session(service).await;

    session.select_format("mp4", None).unwrap();
    session.submit_url("https://vimeo.com/9");
    session.pump();

    let state = session.state();
    assert_eq!(state.phase, Phase::Downloading);
    assert_eq!(state.metadata.as_ref().unwrap().title.as_deref(), Some("clip"));
    assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    session.settle().await;

    let state = session.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.tasks[0].status, DownloadStatus::Completed);
    assert_eq!(state.tasks[0].filename.as_deref(), Some("clip.mp4"));
    assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_after_resubmit_attempt_is_reported() {
    let gate = Arc::new(Notify::new());
    let service = ScriptedService::default()
        .fetch("vimeo", FetchPlan::Respond(meta("other")))
        .download(
            "mp4",
            DownloadPlan::GatedFail(gate.clone(), DownloadError::from("job cancelled by admin".to_string())),
        );
    let (mut session, _) = ready_session(service).await;

    session.select_format("mp4", None).unwrap();
    let id = session.state().tasks[0].id;
    session.submit_url("https://vimeo.com/9");

    gate.notify_one();
    session.settle().await;

    // A remote cancel is a failure, unlike a user cancel
    let state = session.state();
    assert_eq!(state.phase, Phase::Error);
    assert_eq!(state.metadata.as_ref().unwrap().title.as_deref(), Some("clip"));
    assert_eq!(
        state.error,
        Some(SessionError::Download {
            task: Some(id),
            error: DownloadError::Service {
                status: None,
                message: "job cancelled by admin".to_string(),
            },
        })
    );

    // Once the download is over a new URL goes through
    session.submit_url("https://vimeo.com/9");
    session.settle().await;
    assert_eq!(session.state().phase, Phase::Ready);
    assert_eq!(
        session.state().metadata.as_ref().unwrap().title.as_deref(),
        Some("other")
    );
}

#[tokio::test]
async fn batch_member_failure_does_not_stop_chain() {
    let service = ScriptedService::default()
        .download(
            "mp4",
            DownloadPlan::Fail(DownloadError::Service {
                status: Some(500),
                message: "transcoder crashed".to_string(),
            }),
        )
        .download("webm", DownloadPlan::Progress(vec![40.0, 90.0]));
    let (mut session, _) = ready_session(service).await;

    session.select_batch_preset(BatchPreset::Mp4PlusWebm).unwrap();
    session.settle().await;

    let state = session.state();
    let statuses: Vec<_> = state.tasks.iter().map(|t| t.status).collect();
    assert_eq!(statuses, [DownloadStatus::Failed, DownloadStatus::Completed]);
    assert_eq!(state.tasks[1].filename.as_deref(), Some("clip.webm"));

    // Failure is reported but the metadata stays
    assert_eq!(state.phase, Phase::Error);
    assert!(state.metadata.is_some());
    assert!(matches!(
        state.error,
        Some(SessionError::Download { task: Some(id), .. }) if id == state.tasks[0].id
    ));
}

#[tokio::test]
async fn batch_report_available_from_session() {
    let service = ScriptedService::default().download(
        "mp4",
        DownloadPlan::Fail(DownloadError::Network("connection reset".to_string())),
    );
    let (mut session, _) = ready_session(service).await;

    assert!(session.take_batch().is_none());
    session.select_batch_preset(BatchPreset::Mp4PlusWebm).unwrap();

    let handle = session.take_batch().unwrap();
    assert_eq!(handle.task_ids.len(), 2);
    assert!(session.take_batch().is_none());

    let report = handle.wait().await.unwrap();
    assert_eq!(report.completed(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcomes[1].filename.as_deref(), Some("clip.webm"));

    session.settle().await;
    assert_eq!(session.state().tasks.len(), 2);
}

#[tokio::test]
async fn progress_never_decreases_and_ends_at_100() {
    let service = ScriptedService::default().download("mp4", DownloadPlan::Progress(vec![30.0, 10.0, 70.0, 150.0]));
    let (mut session, _) = ready_session(service).await;

    session.select_preset(Preset::BestVideo).unwrap();
    let id = session.state().tasks[0].id;

    let mut seen = vec![session.state().task(id).unwrap().progress];
    while session.next_event().await {
        seen.push(session.state().task(id).unwrap().progress);
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    let task = session.state().task(id).unwrap();
    assert_eq!(task.progress, 100.0);
    assert_eq!(task.status, DownloadStatus::Completed);
    assert_eq!(task.request.quality, "2160p");
    assert_eq!(task.output_path, Some(PathBuf::from("/downloads/clip.mp4")));
    assert_eq!(session.state().phase, Phase::Ready);
}

#[tokio::test]
async fn default_qualities_by_family() {
    let (mut session, _) = ready_session(ScriptedService::default()).await;

    session.select_format("mp4", None).unwrap();
    session.settle().await;
    session.select_format("mp3", None).unwrap();
    session.settle().await;

    let qualities: Vec<_> = session
        .state()
        .tasks
        .iter()
        .map(|t| t.request.quality.clone())
        .collect();
    // The finished mp4 task was replaced in the primary slot
    assert_eq!(qualities, ["320kbps"]);
    assert_eq!(session.state().tasks[0].filename.as_deref(), Some("clip.mp3"));

    assert_eq!(
        session.select_format("mkv", None),
        Err(CatalogError::UnknownFormat("mkv".to_string()))
    );
}

#[tokio::test]
async fn reset_cancels_running_download() {
    let gate = Arc::new(Notify::new());
    let (mut session, _) =
        ready_session(ScriptedService::default().download("mp4", DownloadPlan::Gated(gate))).await;

    session.select_format("mp4", Some("720p")).unwrap();
    session.toggle_advanced();
    session.reset();
    session.settle().await;

    let state = session.state();
    assert_eq!(state.phase, Phase::Idle);
    assert!(state.advanced);
    assert!(state.tasks.is_empty());
    assert!(session.orchestrator().tasks().is_empty());
    assert!(!session.orchestrator().has_active());
}

#[tokio::test]
async fn cancel_download_is_not_reported_as_error() {
    let gate = Arc::new(Notify::new());
    let (mut session, _) =
        ready_session(ScriptedService::default().download("mp4", DownloadPlan::Gated(gate))).await;

    session.select_format("mp4", None).unwrap();
    let id = session.state().tasks[0].id;
    session.cancel_download(id);
    session.settle().await;

    let state = session.state();
    assert_eq!(state.task(id).unwrap().status, DownloadStatus::Failed);
    assert_eq!(state.task(id).unwrap().error, Some(DownloadError::Cancelled));
    assert_eq!(state.phase, Phase::Ready);
    assert!(state.error.is_none());

    // Unknown ids are ignored
    session.cancel_download(TaskId(999));
    assert_eq!(session.state().phase, Phase::Ready);
}

#[tokio::test]
async fn clipboard_paste_and_copy() {
    let service = Arc::new(ScriptedService::default());
    let mut session = Session::new(service, &config());

    let clipboard = MemoryClipboard::with_text("https://vimeo.com/42");
    session.paste_from_clipboard(&clipboard).await;
    assert_eq!(session.state().url_input, "https://vimeo.com/42");

    session.edit_url("https://x.com/a/status/1");
    assert!(session.copy_to_clipboard(&clipboard).await);
    assert_eq!(clipboard.contents(), "https://x.com/a/status/1");

    let denied = MemoryClipboard::denied();
    session.paste_from_clipboard(&denied).await;
    assert!(!session.copy_to_clipboard(&denied).await);

    let state = session.state();
    assert_eq!(state.url_input, "https://x.com/a/status/1");
    assert!(state.warning.is_some());
    assert!(state.error.is_none());
    assert_eq!(state.phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn simulated_service_end_to_end() {
    let service = Arc::new(SimulatedService::new().with_tick(Duration::from_millis(200)));
    let mut session = Session::new(service, &config());

    session.submit_url("instagram.com/p/abc");
    session.settle().await;

    let metadata = session.state().metadata.clone().unwrap();
    assert_eq!(metadata.platform, Platform::Instagram);
    assert_eq!(metadata.formatted_duration(), "4:05");
    assert_eq!(metadata.formatted_views(), "1.3M");

    session.select_batch_preset(BatchPreset::VideoPlusAudio).unwrap();
    session.settle().await;

    let filenames: Vec<_> = session
        .state()
        .tasks
        .iter()
        .map(|t| t.filename.clone().unwrap_or_default())
        .collect();
    assert_eq!(
        filenames,
        ["Amazing Video Content - Best M.mp4", "Amazing Video Content - Best M.mp3"]
    );
    assert_eq!(session.state().phase, Phase::Ready);
}
