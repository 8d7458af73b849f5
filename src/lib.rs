pub mod config;
pub mod downloader;
pub mod session;

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

pub use config::{AppConfig, ConfigError, ServiceConfig};
pub use downloader::{
    DownloadError, DownloadOrchestrator, FetchError, FormatCatalog, MediaService, MetadataFetcher,
    UrlValidator,
};
pub use session::{Phase, Session, SessionError, SessionEvent, SessionState};

/// Install a fmt subscriber filtered by `RUST_LOG` (info by default, debug when verbose).
///
/// Returns false when the host already installed a global subscriber.
pub fn init_tracing(verbose: bool) -> bool {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}
