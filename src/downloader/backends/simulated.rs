use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::downloader::errors::{DownloadError, FetchError};
use crate::downloader::models::{DownloadRequest, MediaMetadata, SourceUrl};
use crate::downloader::traits::{DownloadJob, JobUpdate, MediaService};
use crate::downloader::utils;

const TITLE: &str = "Amazing Video Content - Best Moments Compilation";
const DESCRIPTION: &str = "This is an amazing video that showcases the best moments from our \
     recent adventure. Don't miss out on this incredible content!";

/// Offline service with canned metadata and fixed progress steps
pub struct SimulatedService {
    fetch_delay: Duration,
    tick: Duration,
    step: f32,
}

impl SimulatedService {
    pub fn new() -> Self {
        Self {
            fetch_delay: Duration::from_secs(2),
            tick: Duration::from_millis(200),
            step: 12.5,
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Delay between progress ticks
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Percentage added per tick; values <= 0 are ignored
    pub fn with_step(mut self, step: f32) -> Self {
        if step > 0.0 {
            self.step = step;
        }
        self
    }

    fn canned_metadata(url: &SourceUrl) -> MediaMetadata {
        MediaMetadata {
            title: Some(TITLE.to_string()),
            duration: Some(245),
            platform: url.platform,
            uploader: "Content Creator".to_string(),
            view_count: Some(1_250_000),
            thumbnail_url: Some("https://picsum.photos/480/270".to_string()),
            upload_date: utils::parse_upload_date("2024-12-15"),
            description: Some(DESCRIPTION.to_string()),
        }
    }
}

impl Default for SimulatedService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaService for SimulatedService {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn fetch_info(&self, url: &SourceUrl) -> Result<MediaMetadata, FetchError> {
        tokio::time::sleep(self.fetch_delay).await;
        Ok(Self::canned_metadata(url))
    }

    async fn start_download(&self, request: &DownloadRequest) -> Result<DownloadJob, DownloadError> {
        let (tx, job) = DownloadJob::channel(8);
        let tick = self.tick;
        let step = self.step;
        debug!(
            "[Simulated] Starting {} @ {}",
            request.format.id, request.quality
        );

        tokio::spawn(async move {
            let mut progress = 0.0f32;
            while progress < 100.0 {
                tokio::time::sleep(tick).await;
                progress = (progress + step).min(100.0);
                if tx.send(JobUpdate::Progress(progress)).await.is_err() {
                    // Receiver gone, task was cancelled
                    return;
                }
            }
            let _ = tx.send(JobUpdate::Completed).await;
        });

        Ok(job)
    }
}
