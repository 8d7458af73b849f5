// URL validation and platform classification
//
// Validation only rejects empty input. Classification is advisory: a URL
// without any known marker gets the configured default platform.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;
use url::Url;

use super::errors::ValidationError;
use super::models::{Platform, SourceUrl};

lazy_static! {
    // Checked in order, first match wins
    static ref PLATFORM_MARKERS: Vec<(Platform, Regex)> = vec![
        (Platform::YouTube, Regex::new(r"youtube|youtu\.be").unwrap()),
        (Platform::TwitterX, Regex::new(r"twitter|(^|[/.@])x\.com").unwrap()),
        (Platform::Instagram, Regex::new(r"instagram|instagr\.am").unwrap()),
        (Platform::TikTok, Regex::new(r"tiktok").unwrap()),
        (Platform::Facebook, Regex::new(r"facebook|fb\.watch|(^|[/.])fb\.com").unwrap()),
        (Platform::Vimeo, Regex::new(r"vimeo").unwrap()),
    ];
}

#[derive(Debug, Clone)]
pub struct UrlValidator {
    default_platform: Platform,
}

impl UrlValidator {
    pub fn new(default_platform: Platform) -> Self {
        Self { default_platform }
    }

    pub fn default_platform(&self) -> Platform {
        self.default_platform
    }

    pub fn validate(&self, raw: &str) -> Result<SourceUrl, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }

        let normalized = normalize(trimmed);
        let platform = self.classify(&normalized);
        debug!("Validated {} as {}", normalized, platform);

        Ok(SourceUrl {
            raw: raw.to_string(),
            normalized,
            platform,
        })
    }

    /// Never fails; unmatched URLs get the default platform
    pub fn classify(&self, url: &str) -> Platform {
        let lower = url.to_lowercase();
        PLATFORM_MARKERS
            .iter()
            .find(|(_, marker)| marker.is_match(&lower))
            .map(|(platform, _)| *platform)
            .unwrap_or(self.default_platform)
    }
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new(Platform::Unknown)
    }
}

fn normalize(trimmed: &str) -> String {
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    match Url::parse(&candidate) {
        Ok(url) => url.to_string(),
        Err(_) => candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_rejected() {
        let validator = UrlValidator::default();
        for input in ["", "   ", "\t\n", " \r\n "] {
            assert_eq!(validator.validate(input), Err(ValidationError::EmptyUrl));
        }
    }

    #[test]
    fn test_known_markers() {
        let validator = UrlValidator::default();
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Platform::YouTube),
            ("youtu.be/dQw4w9WgXcQ", Platform::YouTube),
            ("https://twitter.com/user/status/1", Platform::TwitterX),
            ("https://x.com/user/status/1", Platform::TwitterX),
            ("https://www.instagram.com/p/abc/", Platform::Instagram),
            ("https://www.tiktok.com/@user/video/1", Platform::TikTok),
            ("https://fb.watch/abc/", Platform::Facebook),
            ("https://www.facebook.com/watch?v=1", Platform::Facebook),
            ("https://vimeo.com/123", Platform::Vimeo),
        ];

        for (url, expected) in cases {
            assert_eq!(validator.validate(url).unwrap().platform, expected, "{}", url);
        }
    }

    #[test]
    fn test_unmatched_uses_default_platform() {
        let validator = UrlValidator::new(Platform::YouTube);
        let url = validator.validate("https://example.org/clip").unwrap();
        assert_eq!(url.platform, Platform::YouTube);

        let validator = UrlValidator::default();
        for input in ["https://netflix.com/title/1", "not a url at all", "ftp://files"] {
            assert_eq!(validator.validate(input).unwrap().platform, Platform::Unknown);
        }
    }

    #[test]
    fn test_normalization() {
        let validator = UrlValidator::default();
        let url = validator.validate("  YouTube.com/watch?v=abc  ").unwrap();
        assert_eq!(url.raw, "  YouTube.com/watch?v=abc  ");
        assert_eq!(url.normalized, "https://youtube.com/watch?v=abc");
        assert_eq!(url.as_str(), url.normalized);
    }
}
