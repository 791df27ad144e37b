// screen.rs: Runs the macOS `screencapture` tool in interactive selection
// mode and picks the resulting bitmap up from the clipboard.

use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use super::clipboard::{CaptureClipboard, SystemClipboard};
use super::{CaptureError, CaptureMode, ImageSource};

const SCREENCAPTURE_BIN: &str = "/usr/sbin/screencapture";

/// Interactive region capture through the OS tool.
///
/// The clipboard is emptied before the child process starts, so any bitmap
/// found after it exits was written by this capture. An empty clipboard
/// afterwards means the user cancelled the selection.
#[derive(Clone)]
pub struct ScreencaptureTool {
    binary: PathBuf,
    clipboard: Arc<dyn CaptureClipboard>,
}

impl Default for ScreencaptureTool {
    fn default() -> Self {
        Self::new(SCREENCAPTURE_BIN, Arc::new(SystemClipboard))
    }
}

impl ScreencaptureTool {
    pub fn new(binary: impl Into<PathBuf>, clipboard: Arc<dyn CaptureClipboard>) -> Self {
        Self {
            binary: binary.into(),
            clipboard,
        }
    }

    fn capture_blocking(&self, mode: CaptureMode) -> Result<Option<DynamicImage>, CaptureError> {
        self.clipboard.clear()?;

        let status = Command::new(&self.binary)
            .args(mode.process_arguments())
            .status()
            .map_err(|e| CaptureError::Spawn(format!("{}: {e}", self.binary.display())))?;
        log::debug!("screencapture exited with {}", status);

        match self.clipboard.read_image()? {
            Some(image) => {
                log::info!("Captured {}x{} region", image.width(), image.height());
                Ok(Some(image))
            }
            None => {
                log::info!("No image on clipboard after capture (cancelled)");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ImageSource for ScreencaptureTool {
    async fn capture(&self, mode: CaptureMode) -> Result<Option<DynamicImage>, CaptureError> {
        let tool = self.clone();
        tokio::task::spawn_blocking(move || tool.capture_blocking(mode))
            .await
            .map_err(|e| CaptureError::Spawn(format!("capture task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::clipboard::ClipboardError;
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;

    /// In-memory pasteboard. `on_capture` is what the capture tool writes:
    /// it becomes visible once the pasteboard has been cleared, the way the
    /// real tool's write follows our `clear`.
    struct FakePasteboard {
        contents: Mutex<Option<DynamicImage>>,
        on_capture: Mutex<Option<DynamicImage>>,
        clears: Mutex<usize>,
    }

    impl FakePasteboard {
        fn new(contents: Option<DynamicImage>, on_capture: Option<DynamicImage>) -> Arc<Self> {
            Arc::new(Self {
                contents: Mutex::new(contents),
                on_capture: Mutex::new(on_capture),
                clears: Mutex::new(0),
            })
        }
    }

    impl CaptureClipboard for FakePasteboard {
        fn clear(&self) -> Result<(), ClipboardError> {
            *self.clears.lock().unwrap() += 1;
            *self.contents.lock().unwrap() = self.on_capture.lock().unwrap().take();
            Ok(())
        }

        fn read_image(&self) -> Result<Option<DynamicImage>, ClipboardError> {
            Ok(self.contents.lock().unwrap().clone())
        }
    }

    fn window_shot() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 20, Rgba([12, 34, 56, 255])))
    }

    /// A binary that exits immediately on both macOS and Linux.
    fn noop_tool(pasteboard: Arc<FakePasteboard>) -> ScreencaptureTool {
        ScreencaptureTool::new("true", pasteboard)
    }

    #[test]
    fn default_tool_points_at_system_binary() {
        let tool = ScreencaptureTool::default();
        assert_eq!(tool.binary, PathBuf::from("/usr/sbin/screencapture"));
    }

    #[tokio::test]
    async fn identical_recapture_is_delivered() {
        // The previous capture's bitmap is still on the clipboard and the
        // user grabs the same window again.
        let pasteboard = FakePasteboard::new(Some(window_shot()), Some(window_shot()));
        let image = noop_tool(pasteboard.clone())
            .capture(CaptureMode::Area)
            .await
            .unwrap();

        assert_eq!(image.unwrap().as_bytes(), window_shot().as_bytes());
        assert_eq!(*pasteboard.clears.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_clipboard_image_reads_as_cancel() {
        let pasteboard = FakePasteboard::new(Some(window_shot()), None);
        let image = noop_tool(pasteboard)
            .capture(CaptureMode::Area)
            .await
            .unwrap();
        assert!(image.is_none());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let tool = ScreencaptureTool::new(
            "/nonexistent/snapvis-screencapture",
            FakePasteboard::new(None, None),
        );
        match tool.capture(CaptureMode::Area).await {
            Err(CaptureError::Spawn(msg)) => assert!(msg.contains("snapvis-screencapture")),
            other => panic!("expected spawn error, got {other:?}"),
        }
    }
}
