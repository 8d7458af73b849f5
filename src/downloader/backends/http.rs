use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::downloader::errors::{DownloadError, FetchError};
use crate::downloader::models::{DownloadRequest, MediaMetadata, Platform, SourceUrl};
use crate::downloader::traits::{DownloadJob, JobUpdate, MediaService};
use crate::downloader::utils;

/// Talks to the downloader service's JSON API
///
/// - `POST /api/info` returns metadata
/// - `POST /api/download` returns `{"job_id"}`
/// - `GET /api/progress/{job_id}` returns `{"status", "progress", "error"}`
pub struct HttpMediaService {
    client: reqwest::Client,
    base_url: String,
    fetch_timeout: Duration,
    poll_interval: Duration,
}

impl HttpMediaService {
    pub fn new(config: &ServiceConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: utils::build_http_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            fetch_timeout: config.fetch_timeout,
            poll_interval: config.poll_interval,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

#[async_trait]
impl MediaService for HttpMediaService {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_info(&self, url: &SourceUrl) -> Result<MediaMetadata, FetchError> {
        let timeout_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    after: self.fetch_timeout,
                }
            } else {
                FetchError::from(e)
            }
        };

        let response = self
            .client
            .post(self.endpoint("info"))
            .timeout(self.fetch_timeout)
            .json(&json!({ "url": url.as_str() }))
            .send()
            .await
            .map_err(timeout_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(FetchError::Service {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: Value = response.json().await.map_err(timeout_error)?;
        Ok(parse_info(&body))
    }

    async fn start_download(&self, request: &DownloadRequest) -> Result<DownloadJob, DownloadError> {
        let response = self
            .client
            .post(self.endpoint("download"))
            .json(&json!({
                "url": request.source.as_str(),
                "format": request.format.id,
                "quality": request.quality,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(DownloadError::Service {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: Value = response.json().await?;
        let job_id = match &body["job_id"] {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => {
                return Err(DownloadError::Service {
                    status: None,
                    message: "response has no job_id".to_string(),
                })
            }
        };
        info!("[Http] Download job {} accepted", job_id);

        let (tx, job) = DownloadJob::channel(16);
        let client = self.client.clone();
        let progress_url = self.endpoint(&format!("progress/{}", job_id));
        let poll_interval = self.poll_interval;

        tokio::spawn(drive_poller(tx, poll_interval, move || {
            let client = client.clone();
            let url = progress_url.clone();
            async move { poll_progress(&client, &url).await }
        }));

        Ok(job)
    }
}

/// Forward polled updates until a terminal one is sent or the job is dropped
async fn drive_poller<F, Fut>(tx: mpsc::Sender<JobUpdate>, poll_interval: Duration, mut poll: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<JobUpdate>, DownloadError>>,
{
    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!("[Http] Job dropped, stopped polling");
                return;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let update = match poll().await {
            Ok(Some(update)) => update,
            Ok(None) => continue,
            Err(e) => JobUpdate::Failed(e),
        };
        let finished = !matches!(update, JobUpdate::Progress(_));

        if tx.send(update).await.is_err() {
            debug!("[Http] Job dropped, stopped polling");
            return;
        }
        if finished {
            return;
        }
    }
}

async fn poll_progress(client: &reqwest::Client, url: &str) -> Result<Option<JobUpdate>, DownloadError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = error_message(response).await;
        return Err(DownloadError::Service {
            status: Some(status.as_u16()),
            message,
        });
    }

    let body: Value = response.json().await?;
    Ok(parse_progress(&body))
}

/// Best-effort error text of a failed response
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let from_json = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string));

    match from_json {
        Some(message) => message,
        None if !text.trim().is_empty() => text.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

fn parse_info(json: &Value) -> MediaMetadata {
    let text = |key: &str| {
        json[key]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let duration = json["duration"]
        .as_u64()
        .or_else(|| json["duration"].as_f64().filter(|d| *d >= 0.0).map(|d| d.round() as u64));

    MediaMetadata {
        title: text("title"),
        duration,
        platform: json["platform"]
            .as_str()
            .and_then(Platform::from_service_label)
            .unwrap_or_default(),
        uploader: text("uploader").unwrap_or_else(|| "Unknown".to_string()),
        view_count: json["view_count"].as_u64(),
        thumbnail_url: text("thumbnail"),
        upload_date: json["upload_date"].as_str().and_then(utils::parse_upload_date),
        description: text("description"),
    }
}

fn parse_progress(json: &Value) -> Option<JobUpdate> {
    let status = json["status"].as_str().unwrap_or("").to_lowercase();

    match status.as_str() {
        "completed" | "complete" | "finished" | "done" => Some(JobUpdate::Completed),
        "failed" | "error" => {
            let message = json["error"]
                .as_str()
                .unwrap_or("download failed")
                .to_string();
            Some(JobUpdate::Failed(DownloadError::from(message)))
        }
        _ => match json["progress"].as_f64() {
            Some(progress) => Some(JobUpdate::Progress(progress as f32)),
            None => {
                warn!("[Http] Progress response without progress: {}", json);
                None
            }
        },
    }
}
