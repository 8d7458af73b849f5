// Clipboard access for the paste and copy helpers
//
// Failures here are soft: callers log them and carry on.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::errors::ClipboardError;

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn read_text(&self) -> Result<String, ClipboardError>;

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// In-process clipboard, for hosts without a system one
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    text: Mutex<String>,
    denied: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
            denied: AtomicBool::new(false),
        }
    }

    /// Clipboard that refuses every access
    pub fn denied() -> Self {
        let clipboard = Self::default();
        clipboard.set_denied(true);
        clipboard
    }

    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::Release);
    }

    pub fn contents(&self) -> String {
        self.text.lock().clone()
    }

    fn check_access(&self) -> Result<(), ClipboardError> {
        if self.denied.load(Ordering::Acquire) {
            return Err(ClipboardError::PermissionDenied(
                "clipboard access is not allowed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        self.check_access()?;
        Ok(self.contents())
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.check_access()?;
        *self.text.lock() = text.to_string();
        Ok(())
    }
}
