// ocr.rs: On-device OCR, used only when the cloud provider is unreachable.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use rusty_tesseract::{Args, Image};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Failed to prepare image for OCR: {0}")]
    Image(String),
    #[error("Error recognizing text: {0}")]
    Recognition(String),
}

/// Local text recognition.
#[async_trait]
pub trait LocalOcr: Send + Sync {
    /// Recognise all text in `image`, one line per row, top to bottom.
    /// An image without text yields an empty string.
    async fn recognize_locally(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Tesseract-backed recognizer. Tesseract reads from a file, so each call
/// writes a scratch PNG that is deleted when the call returns.
pub struct TesseractOcr {
    language: String,
}

impl TesseractOcr {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    fn args(&self) -> Args {
        Args {
            lang: self.language.clone(),
            config_variables: HashMap::new(),
            dpi: Some(300),
            // Automatic page segmentation, LSTM engine.
            psm: Some(3),
            oem: Some(1),
        }
    }

    fn recognize_blocking(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let scratch = write_scratch_png(image)?;
        let img = Image::from_path(scratch.path().to_path_buf())
            .map_err(|e| OcrError::Image(e.to_string()))?;
        let raw = rusty_tesseract::image_to_string(&img, &self.args())
            .map_err(|e| OcrError::Recognition(e.to_string()))?;
        Ok(normalize_lines(&raw))
    }
}

#[async_trait]
impl LocalOcr for TesseractOcr {
    async fn recognize_locally(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let ocr = TesseractOcr::new(self.language.clone());
        let image = image.clone();
        let text = tokio::task::spawn_blocking(move || ocr.recognize_blocking(&image))
            .await
            .map_err(|e| OcrError::Recognition(format!("OCR task failed: {e}")))??;
        log::info!("Local OCR recognised {} lines", text.lines().count());
        Ok(text)
    }
}

/// Write `image` to a temporary PNG. The file is removed when the handle is
/// dropped, including when encoding fails halfway.
fn write_scratch_png(image: &DynamicImage) -> Result<NamedTempFile, OcrError> {
    let mut file = tempfile::Builder::new()
        .prefix("snapvis-ocr-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| OcrError::Image(e.to_string()))?;
    image
        .write_to(&mut file, ImageFormat::Png)
        .map_err(|e| OcrError::Image(e.to_string()))?;
    file.flush().map_err(|e| OcrError::Image(e.to_string()))?;
    Ok(file)
}

/// Collapse Tesseract output to one trimmed, non-empty line per recognised line.
pub fn normalize_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
