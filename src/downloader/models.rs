// Common data models for the download workflow

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Date;

use super::errors::DownloadError;
use super::utils;

/// Site a source URL belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    TwitterX,
    Instagram,
    TikTok,
    Facebook,
    Vimeo,
    #[default]
    Unknown,
}

impl Platform {
    /// Platforms the UI advertises as supported
    pub fn supported() -> &'static [Platform] {
        &[
            Self::YouTube,
            Self::TwitterX,
            Self::Instagram,
            Self::TikTok,
            Self::Facebook,
            Self::Vimeo,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::TwitterX => "Twitter/X",
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
            Self::Facebook => "Facebook",
            Self::Vimeo => "Vimeo",
            Self::Unknown => "Unknown",
        }
    }

    /// Map the `platform` label sent by the remote service
    pub fn from_service_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "youtube" => Some(Self::YouTube),
            "twitter" | "x" | "twitterx" => Some(Self::TwitterX),
            "instagram" => Some(Self::Instagram),
            "tiktok" => Some(Self::TikTok),
            "facebook" => Some(Self::Facebook),
            "vimeo" => Some(Self::Vimeo),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A validated source URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUrl {
    /// Input as typed by the user
    pub raw: String,
    /// Trimmed, scheme-completed form sent to the service
    pub normalized: String,
    /// Best-effort classification
    pub platform: Platform,
}

impl SourceUrl {
    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized)
    }
}

/// Metadata returned by the "get info" request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    /// Duration in seconds
    pub duration: Option<u64>,
    pub platform: Platform,
    pub uploader: String,
    pub view_count: Option<u64>,
    pub thumbnail_url: Option<String>,
    #[serde(default, with = "iso_date")]
    pub upload_date: Option<Date>,
    pub description: Option<String>,
}

impl MediaMetadata {
    /// "4:05", "1:02:03" or "N/A"
    pub fn formatted_duration(&self) -> String {
        utils::format_duration(self.duration)
    }

    /// "1.3M", "2.5K" or "N/A"
    pub fn formatted_views(&self) -> String {
        utils::format_views(self.view_count)
    }

    /// "Dec 15, 2024" or "N/A"
    pub fn formatted_upload_date(&self) -> String {
        utils::format_date(self.upload_date)
    }
}

/// Output family of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFamily {
    Video,
    Audio,
}

/// Output format with its quality tiers, best first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub family: FormatFamily,
    /// Format id sent to the service (e.g. "mp4")
    pub id: String,
    pub name: String,
    pub description: String,
    /// Canonical file extension, without the dot
    pub extension: String,
    pub qualities: Vec<String>,
}

/// Value object built for each download invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub source: SourceUrl,
    pub format: Arc<FormatSpec>,
    pub quality: String,
    pub metadata: MediaMetadata,
}

impl DownloadRequest {
    pub fn new(
        source: SourceUrl,
        format: Arc<FormatSpec>,
        quality: impl Into<String>,
        metadata: MediaMetadata,
    ) -> Self {
        Self {
            source,
            format,
            quality: quality.into(),
            metadata,
        }
    }

    /// File name the finished download is saved under
    pub fn target_filename(&self) -> String {
        utils::derive_filename(self.metadata.title.as_deref(), &self.format.extension)
    }
}

/// Identifier of a download task within one orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Where a task lives: the single primary slot or a position in a batch chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskSlot {
    Primary,
    Batch { batch: u64, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_active()
    }
}

/// Snapshot of a download task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadTask {
    pub id: TaskId,
    pub slot: TaskSlot,
    pub request: DownloadRequest,
    pub status: DownloadStatus,
    /// 0.0 to 100.0, never decreasing
    pub progress: f32,
    pub error: Option<DownloadError>,
    /// Set on completion
    pub filename: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl DownloadTask {
    pub fn new(id: TaskId, slot: TaskSlot, request: DownloadRequest) -> Self {
        Self {
            id,
            slot,
            request,
            status: DownloadStatus::Pending,
            progress: 0.0,
            error: None,
            filename: None,
            output_path: None,
        }
    }
}

// Option<Date> as "YYYY-MM-DD"
mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::macros::format_description;
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => {
                let text = date
                    .format(format_description!("[year]-[month]-[day]"))
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Date>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| Date::parse(&t, format_description!("[year]-[month]-[day]")))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
