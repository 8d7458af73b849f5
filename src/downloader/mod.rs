// Downloader module - catalog, validation, fetching and task orchestration

pub mod backends;
pub mod clipboard;
pub mod errors;
pub mod format_catalog;
pub mod metadata_fetcher;
pub mod models;
pub mod orchestrator;
pub mod traits;
pub mod url_validator;
pub mod utils;

pub use clipboard::{Clipboard, MemoryClipboard};
pub use errors::{CatalogError, ClipboardError, DownloadError, FetchError, ValidationError};
pub use format_catalog::{BatchPreset, FormatCatalog, Preset};
pub use metadata_fetcher::{FetchTicket, MetadataFetcher};
pub use models::{
    DownloadRequest, DownloadStatus, DownloadTask, FormatFamily, FormatSpec, MediaMetadata,
    Platform, SourceUrl, TaskId, TaskSlot,
};
pub use orchestrator::{BatchHandle, BatchReport, DownloadOrchestrator, TaskOutcome};
pub use traits::{DownloadEvent, DownloadJob, JobUpdate, MediaService, ProgressEmitter};
pub use url_validator::UrlValidator;
