/// The `capture` module grabs a user-selected screen region and hands it to
/// the pipeline as a decoded bitmap. The OS capture tool writes to the
/// clipboard, so clipboard access lives here as well.
pub mod clipboard;
pub mod encode;
pub mod screen;

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Capture modes understood by the OS capture tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Interactive region selection, result placed on the clipboard.
    Area,
}

impl CaptureMode {
    pub fn process_arguments(&self) -> &'static [&'static str] {
        match self {
            CaptureMode::Area => &["-cs"],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to launch capture tool: {0}")]
    Spawn(String),
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),
}

/// Anything that can produce a bitmap for the pipeline.
/// `Ok(None)` means the user cancelled; it is not an error.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn capture(&self, mode: CaptureMode) -> Result<Option<DynamicImage>, CaptureError>;
}

/// A decoded bitmap from one capture.
#[derive(Debug)]
pub struct CapturedImage {
    pub id: u64,
    pub image: DynamicImage,
    pub captured_at: SystemTime,
}

/// Every capture of this session, oldest first. Nothing is ever removed.
#[derive(Default)]
pub struct ImageHistory {
    images: Mutex<Vec<Arc<CapturedImage>>>,
}

impl ImageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, image: DynamicImage) -> Arc<CapturedImage> {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        let captured = Arc::new(CapturedImage {
            id: images.len() as u64 + 1,
            image,
            captured_at: SystemTime::now(),
        });
        images.push(Arc::clone(&captured));
        captured
    }

    pub fn latest(&self) -> Option<Arc<CapturedImage>> {
        self.images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.images.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
