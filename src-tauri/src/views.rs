// views.rs: Tauri-side renderers for the pipeline: the floating status
// banner and the prompt/response windows. Each emits an event for the
// webview and toggles window visibility.

use tauri::{AppHandle, Emitter, Manager};

use crate::pipeline::{PromptSession, PromptView};
use crate::status::{PipelineStatus, StatusSink};

pub const BANNER_WINDOW: &str = "banner";
pub const PROMPT_WINDOW: &str = "prompt";
pub const RESPONSE_WINDOW: &str = "response";

fn show_window(app: &AppHandle, label: &str, focus: bool) {
    match app.get_webview_window(label) {
        Some(win) => {
            let _ = win.show();
            if focus {
                let _ = win.set_focus();
            }
        }
        None => log::warn!("Window '{}' not found", label),
    }
}

fn hide_window(app: &AppHandle, label: &str) {
    if let Some(win) = app.get_webview_window(label) {
        let _ = win.hide();
    }
}

/// Renders [`PipelineStatus`] into the `banner` window.
pub struct BannerSink {
    app: AppHandle,
}

impl BannerSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl StatusSink for BannerSink {
    fn show(&self, status: &PipelineStatus) {
        if let Err(e) = self.app.emit("status:changed", status) {
            log::error!("Failed to emit status:changed: {}", e);
        }
        match status {
            PipelineStatus::Idle => hide_window(&self.app, BANNER_WINDOW),
            // The banner never takes focus away from the app the user is in.
            _ => show_window(&self.app, BANNER_WINDOW, false),
        }
    }
}

/// Drives the `prompt` and `response` windows.
pub struct WindowPromptView {
    app: AppHandle,
}

impl WindowPromptView {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl PromptView for WindowPromptView {
    fn request_prompt(&self, session: &PromptSession) {
        if let Err(e) = self.app.emit("prompt:requested", session) {
            log::error!("Failed to emit prompt:requested: {}", e);
        }
        show_window(&self.app, PROMPT_WINDOW, true);
    }

    fn show_answer(&self, session: &PromptSession) {
        hide_window(&self.app, PROMPT_WINDOW);
        if let Err(e) = self.app.emit("prompt:answer", session) {
            log::error!("Failed to emit prompt:answer: {}", e);
        }
        show_window(&self.app, RESPONSE_WINDOW, true);
    }
}
