// pipeline.rs: Orchestrates capture → recognize → deliver.
//
// Plain flow: the capture goes to the cloud provider with the extraction
// prompt; connectivity failures fall back once to local OCR; the text lands
// on the clipboard. Prompted flow: the capture waits for a user question and
// the answer is shown in the response window instead of the clipboard.
//
// Each plain capture takes a generation number. A result whose generation is
// no longer current is dropped, so a slow request can never overwrite the
// clipboard write of a newer capture.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Mutex as TokioMutex;

use crate::ai::{
    self, RecognitionError, RecognitionProvider, RecognitionRequest, DEFAULT_EXTRACTION_PROMPT,
};
use crate::capture::clipboard::{ClipboardError, ClipboardWriter};
use crate::capture::{CaptureError, CaptureMode, CapturedImage, ImageHistory, ImageSource};
use crate::ocr::{LocalOcr, OcrError};
use crate::settings::Settings;
use crate::status::{
    PipelineStatus, StatusEvent, StatusNotifier, MSG_COPIED, MSG_FALLING_BACK, MSG_PROCESSING,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    NotConfigured(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Error processing image: {0}")]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    LocalOcr(#[from] OcrError),
    #[error("Failed to copy to clipboard: {0}")]
    Clipboard(#[from] ClipboardError),
    #[error("Prompt is empty")]
    EmptyPrompt,
    #[error("No screenshot is waiting for a prompt")]
    NoPendingCapture,
    #[error("No screenshot captured yet")]
    NoCapture,
    #[error("No recognized text to copy yet")]
    NothingToCopy,
    #[error("Superseded by a newer request")]
    Superseded,
}

/// Which recognizer produced the delivered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecognitionPath {
    Cloud,
    LocalOcr,
}

/// Result of one user-initiated capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outcome {
    /// Text was written to the clipboard.
    Delivered { text: String, path: RecognitionPath },
    /// The capture is waiting for the user's question.
    AwaitingPrompt { image_id: u64 },
    /// The user dismissed the selection without grabbing anything.
    Cancelled,
    /// A selection was already on screen; the trigger was ignored.
    Busy,
    /// A newer capture started before this one resolved; its result was dropped.
    Superseded,
    /// The failure shown to the user.
    Failed { message: String },
}

/// State of the prompted Q&A flow, as displayed by the response window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSession {
    pub image_id: u64,
    pub width: u32,
    pub height: u32,
    pub prompt: String,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub loading: bool,
}

impl PromptSession {
    fn for_image(image: &CapturedImage) -> Self {
        Self {
            image_id: image.id,
            width: image.image.width(),
            height: image.image.height(),
            prompt: String::new(),
            answer: None,
            error: None,
            loading: false,
        }
    }
}

/// Windows of the prompted flow.
pub trait PromptView: Send + Sync {
    /// Ask the user for a question about the capture in `session`.
    fn request_prompt(&self, session: &PromptSession);
    /// Show the current question/answer state.
    fn show_answer(&self, session: &PromptSession);
}

type ProviderSlot = Result<Arc<dyn RecognitionProvider>, String>;

pub struct Pipeline {
    source: Arc<dyn ImageSource>,
    provider: RwLock<ProviderSlot>,
    ocr: Arc<dyn LocalOcr>,
    clipboard: Arc<dyn ClipboardWriter>,
    status: StatusNotifier,
    prompt_view: Arc<dyn PromptView>,
    history: ImageHistory,
    extraction_prompt: RwLock<String>,
    /// Held while the selection UI is on screen.
    capture_lock: TokioMutex<()>,
    generation: AtomicU64,
    prompt_generation: AtomicU64,
    last_text: Mutex<Option<String>>,
    pending_image: Mutex<Option<Arc<CapturedImage>>>,
    prompt_session: Mutex<Option<PromptSession>>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ImageSource>,
        ocr: Arc<dyn LocalOcr>,
        clipboard: Arc<dyn ClipboardWriter>,
        status: StatusNotifier,
        prompt_view: Arc<dyn PromptView>,
    ) -> Self {
        Self {
            source,
            provider: RwLock::new(Err("No recognition provider configured".into())),
            ocr,
            clipboard,
            status,
            prompt_view,
            history: ImageHistory::new(),
            extraction_prompt: RwLock::new(DEFAULT_EXTRACTION_PROMPT.into()),
            capture_lock: TokioMutex::new(()),
            generation: AtomicU64::new(0),
            prompt_generation: AtomicU64::new(0),
            last_text: Mutex::new(None),
            pending_image: Mutex::new(None),
            prompt_session: Mutex::new(None),
        }
    }

    /// Install the cloud provider.
    pub fn set_provider(&self, provider: Arc<dyn RecognitionProvider>) {
        *self.provider.write().unwrap_or_else(|e| e.into_inner()) = Ok(provider);
    }

    /// Remove the provider; recognitions fail with `reason` until one is set.
    pub fn clear_provider(&self, reason: impl Into<String>) {
        *self.provider.write().unwrap_or_else(|e| e.into_inner()) = Err(reason.into());
    }

    pub fn is_configured(&self) -> bool {
        self.provider
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_ok()
    }

    pub fn set_extraction_prompt(&self, prompt: impl Into<String>) {
        *self.extraction_prompt.write().unwrap_or_else(|e| e.into_inner()) = prompt.into();
    }

    /// Rebuild the provider and prompt from `settings`.
    pub fn apply_settings(&self, settings: &Settings, env: impl Fn(&str) -> Option<String>) {
        self.set_extraction_prompt(settings.extraction_prompt.clone());
        match ai::build_provider(settings, env) {
            Ok(provider) => self.set_provider(provider),
            Err(e) => {
                log::warn!("Recognition disabled: {}", e);
                self.clear_provider(e.to_string());
            }
        }
    }

    pub fn status(&self) -> &StatusNotifier {
        &self.status
    }

    pub fn current_status(&self) -> PipelineStatus {
        self.status.current()
    }

    pub fn last_text(&self) -> Option<String> {
        self.last_text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn prompt_session(&self) -> Option<PromptSession> {
        self.prompt_session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn provider(&self) -> Result<Arc<dyn RecognitionProvider>, PipelineError> {
        self.provider
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .map_err(PipelineError::NotConfigured)
    }

    fn extraction_prompt(&self) -> String {
        self.extraction_prompt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn ensure_current(&self, generation: u64) -> Result<(), PipelineError> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(PipelineError::Superseded)
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run the OS capture and record the bitmap. Failures are reported on the
    /// banner; cancellation is silent.
    ///
    /// With `supersede`, the capture takes a new generation while the
    /// selection lock is still held, so a pending delivery that was waiting
    /// for the selection sees it is stale.
    async fn acquire(&self, supersede: bool) -> Result<(Arc<CapturedImage>, u64), Outcome> {
        let _selection = self.capture_lock.try_lock().map_err(|_| {
            log::info!("Capture already in progress, ignoring trigger");
            Outcome::Busy
        })?;

        match self.source.capture(CaptureMode::Area).await {
            Ok(Some(image)) => {
                let captured = self.history.push(image);
                log::info!(
                    "Capture #{} stored ({}x{})",
                    captured.id,
                    captured.image.width(),
                    captured.image.height()
                );
                let generation = if supersede { self.next_generation() } else { 0 };
                Ok((captured, generation))
            }
            Ok(None) => Err(Outcome::Cancelled),
            Err(e) => {
                log::error!("Capture failed: {}", e);
                Err(self.fail(PipelineError::from(e)))
            }
        }
    }

    fn fail(&self, error: PipelineError) -> Outcome {
        let message = error.to_string();
        self.status.apply(StatusEvent::Failed(message.clone()));
        Outcome::Failed { message }
    }

    /// Plain flow: capture a region, extract its text, copy it to the clipboard.
    pub async fn capture_and_extract(&self) -> Outcome {
        match self.acquire(true).await {
            Ok((captured, generation)) => self.extract(captured, generation).await,
            Err(outcome) => outcome,
        }
    }

    /// Run the plain flow again on the most recent capture.
    pub async fn reprocess_latest(&self) -> Outcome {
        let Some(captured) = self.history.latest() else {
            return self.fail(PipelineError::NoCapture);
        };
        log::info!(
            "Reprocessing capture #{} of {}",
            captured.id,
            self.history.len()
        );
        let generation = self.next_generation();
        self.extract(captured, generation).await
    }

    /// Copy the last delivered text to the clipboard again.
    pub fn recopy_last_text(&self) -> Result<String, PipelineError> {
        let text = self.last_text().ok_or(PipelineError::NothingToCopy)?;
        self.clipboard.set_text(&text)?;
        self.status.apply(StatusEvent::Succeeded(MSG_COPIED.into()));
        Ok(text)
    }

    async fn extract(&self, captured: Arc<CapturedImage>, generation: u64) -> Outcome {
        self.status.apply(StatusEvent::Started(MSG_PROCESSING.into()));

        let result = match self.recognize_with_fallback(&captured, generation).await {
            Ok((text, path)) => self.deliver(&text, generation).await.map(|_| (text, path)),
            Err(e) => Err(e),
        };

        match result {
            Ok((text, path)) => {
                self.status.apply(StatusEvent::Succeeded(MSG_COPIED.into()));
                Outcome::Delivered { text, path }
            }
            Err(PipelineError::Superseded) => {
                log::info!("Discarding result of superseded capture #{}", captured.id);
                Outcome::Superseded
            }
            Err(e) => match self.ensure_current(generation) {
                Ok(()) => self.fail(e),
                Err(_) => Outcome::Superseded,
            },
        }
    }

    async fn recognize_with_fallback(
        &self,
        captured: &Arc<CapturedImage>,
        generation: u64,
    ) -> Result<(String, RecognitionPath), PipelineError> {
        let provider = self.provider()?;
        let request = RecognitionRequest::new(Arc::clone(captured), self.extraction_prompt());

        match provider.recognize(&request).await {
            Ok(text) => Ok((text, RecognitionPath::Cloud)),
            Err(e) if e.is_transport() => {
                self.ensure_current(generation)?;
                log::warn!(
                    "{} unreachable ({}), falling back to local OCR",
                    provider.name(),
                    e
                );
                self.status
                    .apply(StatusEvent::FallingBack(MSG_FALLING_BACK.into()));
                let text = self.ocr.recognize_locally(&captured.image).await?;
                Ok((text, RecognitionPath::LocalOcr))
            }
            Err(e) => {
                log::error!("{} failed: {}", provider.name(), e);
                Err(e.into())
            }
        }
    }

    /// Write `text` to the clipboard unless a newer capture exists. Waits for
    /// any open selection first: the capture tool hands its bitmap over
    /// through the clipboard.
    async fn deliver(&self, text: &str, generation: u64) -> Result<(), PipelineError> {
        let _selection = self.capture_lock.lock().await;
        self.ensure_current(generation)?;
        self.clipboard.set_text(text)?;
        *self.last_text.lock().unwrap_or_else(|e| e.into_inner()) = Some(text.to_string());
        Ok(())
    }

    /// Prompted flow, step one: capture a region and ask for a question.
    pub async fn capture_for_prompt(&self) -> Outcome {
        let captured = match self.acquire(false).await {
            Ok((captured, _)) => captured,
            Err(outcome) => return outcome,
        };

        let session = PromptSession::for_image(&captured);
        *self.pending_image.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&captured));
        self.store_session(session.clone());
        self.prompt_view.request_prompt(&session);
        Outcome::AwaitingPrompt {
            image_id: captured.id,
        }
    }

    /// Prompted flow, step two: send the pending capture with `prompt` and
    /// show the answer. The clipboard is left alone.
    pub async fn submit_prompt(&self, prompt: &str) -> Result<String, PipelineError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::EmptyPrompt);
        }
        let image = self
            .pending_image
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(PipelineError::NoPendingCapture)?;

        let generation = self.prompt_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut session = PromptSession::for_image(&image);
        session.prompt = prompt.to_string();
        session.loading = true;
        self.store_session(session.clone());
        self.prompt_view.show_answer(&session);

        let result = match self.provider() {
            Ok(provider) => provider
                .recognize(&RecognitionRequest::new(image, prompt))
                .await
                .map_err(PipelineError::from),
            Err(e) => Err(e),
        };

        if self.prompt_generation.load(Ordering::SeqCst) != generation {
            return Err(PipelineError::Superseded);
        }

        session.loading = false;
        match &result {
            Ok(answer) => session.answer = Some(answer.clone()),
            Err(e) => {
                log::error!("Prompted request failed: {}", e);
                session.error = Some(e.to_string());
            }
        }
        self.store_session(session.clone());
        self.prompt_view.show_answer(&session);
        result
    }

    fn store_session(&self, session: PromptSession) {
        *self.prompt_session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognition_errors_read_as_user_messages() {
        let e = PipelineError::from(RecognitionError::Api("quota exceeded".into()));
        assert_eq!(e.to_string(), "Error processing image: quota exceeded");
    }

    #[test]
    fn not_configured_message_is_passed_through() {
        let e = PipelineError::NotConfigured("set GOOGLE_API_KEY".into());
        assert_eq!(e.to_string(), "set GOOGLE_API_KEY");
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(Outcome::Delivered {
            text: "HELLO".into(),
            path: RecognitionPath::LocalOcr,
        })
        .unwrap();
        assert_eq!(json["kind"], "delivered");
        assert_eq!(json["path"], "localOcr");
    }

    #[test]
    fn outcome_fields_use_the_webview_casing() {
        let json = serde_json::to_value(Outcome::AwaitingPrompt { image_id: 7 }).unwrap();
        assert_eq!(json["kind"], "awaitingPrompt");
        assert_eq!(json["imageId"], 7);
        assert!(json.get("image_id").is_none());
    }
}
