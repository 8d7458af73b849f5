// Helper functions shared by the session, the orchestrator and the backends

use time::macros::format_description;
use time::Date;
use tracing::{debug, warn};

use crate::config::ServiceConfig;

/// Title characters kept in a derived file name
pub const FILENAME_TITLE_CHARS: usize = 30;

/// `<first 30 chars of title, or "download">.<extension>`
pub fn derive_filename(title: Option<&str>, extension: &str) -> String {
    let stem: String = match title {
        Some(t) if !t.is_empty() => t.chars().take(FILENAME_TITLE_CHARS).collect(),
        _ => "download".to_string(),
    };
    format!("{}.{}", stem, extension)
}

/// Path separators would turn a title into nested directories
pub fn path_safe(filename: &str) -> String {
    filename.replace(['/', '\\'], "_")
}

/// Format seconds as "m:ss" or "h:mm:ss"
pub fn format_duration(seconds: Option<u64>) -> String {
    let seconds = match seconds {
        Some(s) if s > 0 => s,
        _ => return "N/A".to_string(),
    };

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let rest = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, rest)
    } else {
        format!("{}:{:02}", minutes, rest)
    }
}

/// Compact view count: "1.3M", "2.5K", "1.0B"
pub fn format_views(views: Option<u64>) -> String {
    let views = match views {
        Some(v) if v > 0 => v,
        _ => return "N/A".to_string(),
    };

    let (divisor, suffix) = if views >= 1_000_000_000 {
        (1_000_000_000u128, "B")
    } else if views >= 1_000_000 {
        (1_000_000, "M")
    } else if views >= 1_000 {
        (1_000, "K")
    } else {
        return views.to_string();
    };

    // Round half up to one decimal; u128 so counts near u64::MAX cannot overflow
    let tenths = (u128::from(views) * 10 + divisor / 2) / divisor;
    format!("{}.{}{}", tenths / 10, tenths % 10, suffix)
}

/// "Dec 15, 2024"
pub fn format_date(date: Option<Date>) -> String {
    date.and_then(|d| {
        d.format(format_description!(
            "[month repr:short] [day padding:none], [year]"
        ))
        .ok()
    })
    .unwrap_or_else(|| "N/A".to_string())
}

/// Accepts "2024-12-15" and "20241215"
pub fn parse_upload_date(text: &str) -> Option<Date> {
    let text = text.trim();
    let expanded;
    let iso = if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        expanded = format!("{}-{}-{}", &text[..4], &text[4..6], &text[6..]);
        expanded.as_str()
    } else {
        text
    };

    Date::parse(iso, format_description!("[year]-[month]-[day]"))
        .map_err(|e| debug!("Ignoring upload date {:?}: {}", text, e))
        .ok()
}

/// Build the HTTP client used by the remote service backend
pub fn build_http_client(config: &ServiceConfig) -> Result<reqwest::Client, reqwest::Error> {
    let builder = reqwest::Client::builder().timeout(config.request_timeout);

    let builder = match config.proxy.as_deref() {
        Some(proxy_url) => match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => {
                debug!("Using proxy {}", proxy_url);
                builder.proxy(proxy)
            }
            Err(e) => {
                // Fall back to a direct connection
                warn!("Invalid proxy URL {}: {}", proxy_url, e);
                builder
            }
        },
        None => builder,
    };

    builder.build()
}
