// MetadataFetcher - bounded "get info" requests with last-call-wins tickets

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::errors::FetchError;
use super::models::{MediaMetadata, Platform, SourceUrl};
use super::traits::MediaService;
use crate::config::DEFAULT_FETCH_TIMEOUT;

/// Identifies one fetch call; stale once a newer call started
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}

#[derive(Clone)]
pub struct MetadataFetcher {
    service: Arc<dyn MediaService>,
    timeout: Duration,
    latest: Arc<AtomicU64>,
}

impl MetadataFetcher {
    pub fn new(service: Arc<dyn MediaService>) -> Self {
        Self::with_timeout(service, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(service: Arc<dyn MediaService>, timeout: Duration) -> Self {
        Self {
            service,
            timeout,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Supersede every earlier call
    pub fn begin(&self) -> FetchTicket {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        FetchTicket {
            generation,
            latest: self.latest.clone(),
        }
    }

    /// Fetch metadata for `url`, bounded by the configured timeout
    pub async fn fetch_info(&self, url: &SourceUrl) -> Result<MediaMetadata, FetchError> {
        info!("[Fetcher] Fetching info via {} for {}", self.service.name(), url);

        let result = match timeout(self.timeout, self.service.fetch_info(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                after: self.timeout,
            }),
        };

        match result {
            Ok(mut metadata) => {
                if metadata.platform == Platform::Unknown {
                    metadata.platform = url.platform;
                }
                debug!("[Fetcher] Got metadata: {:?}", metadata.title);
                Ok(metadata)
            }
            Err(e) => {
                warn!("[Fetcher] {} failed: {}", self.service.name(), e);
                Err(e)
            }
        }
    }
}
