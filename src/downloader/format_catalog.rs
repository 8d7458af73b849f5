// FormatCatalog - data-driven registry of output formats
//
// Each format carries its quality tiers ordered best first. Selection
// defaults differ by family:
// - video: third tier when present, else the first
// - audio: always the first (highest) tier
//
// The asymmetry matches what the UI has always shown; keep it until the
// product side confirms otherwise.

use std::collections::HashSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::Deserialize;

use super::errors::CatalogError;
use super::models::{FormatFamily, FormatSpec};

/// Video formats default to this tier index when it exists
const VIDEO_DEFAULT_TIER: usize = 2;

// id, name, description, qualities
const VIDEO_FORMATS: &[(&str, &str, &str, &[&str])] = &[
    (
        "mp4",
        "MP4 (H.264)",
        "Best compatibility, works everywhere",
        &["2160p", "1440p", "1080p", "720p", "480p", "360p"],
    ),
    (
        "webm",
        "WebM (VP9)",
        "High quality, smaller file size",
        &["2160p", "1440p", "1080p", "720p", "480p"],
    ),
    ("avi", "AVI", "Classic format, high quality", &["1080p", "720p", "480p"]),
    ("mov", "MOV (QuickTime)", "Apple optimized format", &["1080p", "720p", "480p"]),
];

const AUDIO_FORMATS: &[(&str, &str, &str, &[&str])] = &[
    (
        "mp3",
        "MP3",
        "Universal audio format",
        &["320kbps", "256kbps", "192kbps", "128kbps"],
    ),
    ("wav", "WAV", "Lossless audio quality", &["48kHz", "44.1kHz"]),
    ("flac", "FLAC", "Lossless compression", &["96kHz", "48kHz", "44.1kHz"]),
    ("m4a", "M4A (AAC)", "High quality, small size", &["256kbps", "192kbps", "128kbps"]),
];

lazy_static! {
    static ref BUILTIN: FormatCatalog = FormatCatalog::from_table();
}

impl FormatSpec {
    /// Tier preselected for this format
    pub fn default_quality(&self) -> Option<&str> {
        let tier = match self.family {
            FormatFamily::Video => self
                .qualities
                .get(VIDEO_DEFAULT_TIER)
                .or_else(|| self.qualities.first()),
            FormatFamily::Audio => self.qualities.first(),
        };
        tier.map(String::as_str)
    }

    /// Resolve a requested tier, understanding the "best" and "medium" aliases
    pub fn resolve_quality(&self, requested: Option<&str>) -> Result<String, CatalogError> {
        let unknown = |quality: &str| CatalogError::UnknownQuality {
            format: self.id.clone(),
            quality: quality.to_string(),
        };

        let tier = match requested.map(str::trim) {
            None | Some("medium") => self.default_quality(),
            Some("best") => self.qualities.first().map(String::as_str),
            Some(q) => self
                .qualities
                .iter()
                .find(|tier| tier.eq_ignore_ascii_case(q))
                .map(String::as_str),
        };

        tier.map(str::to_string)
            .ok_or_else(|| unknown(requested.unwrap_or("default")))
    }
}

/// Registry of supported output formats
#[derive(Debug, Clone)]
pub struct FormatCatalog {
    formats: Vec<Arc<FormatSpec>>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    formats: Vec<FormatSpec>,
}

impl FormatCatalog {
    /// Catalog shipped with the crate, built once per process
    pub fn builtin() -> &'static FormatCatalog {
        &BUILTIN
    }

    fn from_table() -> Self {
        let entries = VIDEO_FORMATS
            .iter()
            .map(|entry| (FormatFamily::Video, entry))
            .chain(AUDIO_FORMATS.iter().map(|entry| (FormatFamily::Audio, entry)));

        let formats = entries
            .map(|(family, (id, name, description, qualities))| {
                Arc::new(FormatSpec {
                    family,
                    id: id.to_string(),
                    name: name.to_string(),
                    description: description.to_string(),
                    extension: id.to_string(),
                    qualities: qualities.iter().map(|q| q.to_string()).collect(),
                })
            })
            .collect();

        Self { formats }
    }

    /// Load a host-provided catalog: `{"formats": [FormatSpec, ...]}`
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text)
            .map_err(|e| CatalogError::InvalidCatalog(e.to_string()))?;

        let mut seen = HashSet::new();
        for format in &file.formats {
            if !seen.insert(format.id.to_lowercase()) {
                return Err(CatalogError::InvalidCatalog(format!(
                    "duplicate format id {}",
                    format.id
                )));
            }
            if format.qualities.is_empty() {
                return Err(CatalogError::InvalidCatalog(format!(
                    "format {} has no quality tiers",
                    format.id
                )));
            }
        }

        Ok(Self {
            formats: file.formats.into_iter().map(Arc::new).collect(),
        })
    }

    /// Formats of one family, in display order
    pub fn list_formats(&self, family: FormatFamily) -> Vec<Arc<FormatSpec>> {
        self.formats
            .iter()
            .filter(|f| f.family == family)
            .cloned()
            .collect()
    }

    pub fn resolve(&self, format_id: &str) -> Result<Arc<FormatSpec>, CatalogError> {
        let wanted = format_id.trim();
        self.formats
            .iter()
            .find(|f| f.id.eq_ignore_ascii_case(wanted))
            .cloned()
            .ok_or_else(|| CatalogError::UnknownFormat(format_id.to_string()))
    }
}

/// Quick actions of the simple view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    BestVideo,
    MediumVideo,
    Audio,
}

impl Preset {
    /// (format id, quality or alias)
    pub fn selection(&self) -> (&'static str, &'static str) {
        match self {
            Self::BestVideo => ("mp4", "best"),
            Self::MediumVideo => ("mp4", "medium"),
            Self::Audio => ("mp3", "320kbps"),
        }
    }
}

/// Multi-format actions, run as a batch chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPreset {
    VideoPlusAudio,
    Mp4PlusWebm,
}

impl BatchPreset {
    pub fn selections(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::VideoPlusAudio => &[("mp4", "best"), ("mp3", "320kbps")],
            Self::Mp4PlusWebm => &[("mp4", "best"), ("webm", "best")],
        }
    }
}
