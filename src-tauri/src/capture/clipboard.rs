// clipboard.rs: System clipboard access via arboard. The capture tool
// leaves its bitmap here and recognised text is delivered back here.

use image::{DynamicImage, RgbaImage};

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("clipboard image is malformed ({width}x{height}, {len} bytes)")]
    MalformedImage {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("failed to write clipboard: {0}")]
    Write(String),
}

/// Destination for recognised text.
pub trait ClipboardWriter: Send + Sync {
    /// Replace the entire clipboard contents with `text` as plain UTF-8.
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Clipboard access needed by the capture tool, which hands its bitmap over
/// through the clipboard.
pub trait CaptureClipboard: Send + Sync {
    /// Empty the clipboard so a bitmap read afterwards can only come from the
    /// capture that follows.
    fn clear(&self) -> Result<(), ClipboardError>;
    /// The clipboard bitmap, if the clipboard currently holds one.
    fn read_image(&self) -> Result<Option<DynamicImage>, ClipboardError>;
}

/// The OS clipboard. A fresh `arboard::Clipboard` is opened per call so the
/// handle is never shared across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SystemClipboard {
    fn open() -> Result<arboard::Clipboard, ClipboardError> {
        arboard::Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }
}

impl CaptureClipboard for SystemClipboard {
    fn clear(&self) -> Result<(), ClipboardError> {
        Self::open()?
            .clear()
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }

    fn read_image(&self) -> Result<Option<DynamicImage>, ClipboardError> {
        let mut clipboard = Self::open()?;
        let data = match clipboard.get_image() {
            Ok(data) => data,
            Err(arboard::Error::ContentNotAvailable) => return Ok(None),
            Err(e) => return Err(ClipboardError::Unavailable(e.to_string())),
        };

        let (width, height, len) = (data.width, data.height, data.bytes.len());
        let rgba = RgbaImage::from_raw(width as u32, height as u32, data.bytes.into_owned())
            .ok_or(ClipboardError::MalformedImage { width, height, len })?;
        Ok(Some(DynamicImage::ImageRgba8(rgba)))
    }
}

impl ClipboardWriter for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut clipboard = Self::open()?;
        clipboard
            .set_text(text)
            .map_err(|e| ClipboardError::Write(e.to_string()))?;
        log::info!("Copied {} chars to clipboard", text.chars().count());
        Ok(())
    }
}
