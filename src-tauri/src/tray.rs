// tray.rs: Menu-bar icon + menu for SnapVis, and the global shortcut handler.
// Shortcuts are parsed from settings and registered in lib.rs.

use std::sync::Arc;
use tauri::{
    menu::{Menu, MenuItem, PredefinedMenuItem},
    tray::TrayIconBuilder,
    AppHandle, Manager,
};
use tauri_plugin_global_shortcut::{Shortcut, ShortcutEvent, ShortcutState};
use tauri_plugin_opener::OpenerExt;

use crate::pipeline::Pipeline;
use crate::settings::{self, Settings};

/// The two user-facing flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Capture → extract text → clipboard.
    Extract,
    /// Capture → ask a question → answer window.
    Prompt,
    /// Extract again from the most recent capture.
    Reprocess,
    /// Put the last extracted text back on the clipboard.
    CopyLast,
}

/// Global shortcuts resolved from settings.
pub struct ShortcutBindings {
    pub capture: Shortcut,
    pub prompt: Shortcut,
}

impl ShortcutBindings {
    pub fn from_settings(settings: &Settings) -> Result<Self, String> {
        let parse = |raw: &str| {
            raw.parse::<Shortcut>()
                .map_err(|e| format!("invalid shortcut '{raw}': {e}"))
        };
        Ok(Self {
            capture: parse(&settings.capture_shortcut)?,
            prompt: parse(&settings.prompt_shortcut)?,
        })
    }

    fn trigger_for(&self, shortcut: &Shortcut) -> Option<Trigger> {
        if shortcut.id() == self.capture.id() {
            Some(Trigger::Extract)
        } else if shortcut.id() == self.prompt.id() {
            Some(Trigger::Prompt)
        } else {
            None
        }
    }
}

/// Run one flow on the async runtime. Callable from any thread.
pub fn dispatch(app: &AppHandle, trigger: Trigger) {
    let pipeline = Arc::clone(app.state::<Arc<Pipeline>>().inner());
    tauri::async_runtime::spawn(async move {
        match trigger {
            Trigger::Extract => {
                let outcome = pipeline.capture_and_extract().await;
                log::debug!("{:?} finished: {:?}", trigger, outcome);
            }
            Trigger::Prompt => {
                let outcome = pipeline.capture_for_prompt().await;
                log::debug!("{:?} finished: {:?}", trigger, outcome);
            }
            Trigger::Reprocess => {
                let outcome = pipeline.reprocess_latest().await;
                log::debug!("{:?} finished: {:?}", trigger, outcome);
            }
            Trigger::CopyLast => {
                if let Err(e) = pipeline.recopy_last_text() {
                    log::warn!("Copy last text: {}", e);
                }
            }
        }
    });
}

// ─── Tray setup ──────────────────────────────────────────────────────

/// Call this from `App::setup` to create the menu-bar icon and menu.
pub fn setup_tray(app: &tauri::App) -> Result<(), Box<dyn std::error::Error>> {
    let handle = app.handle();

    let select_item = MenuItem::with_id(handle, "select_area", "Select area", true, None::<&str>)?;
    let ask_item = MenuItem::with_id(handle, "ask_area", "Ask about area", true, None::<&str>)?;
    let reprocess_item =
        MenuItem::with_id(handle, "reprocess", "Extract last capture again", true, None::<&str>)?;
    let copy_item = MenuItem::with_id(handle, "copy_last", "Copy last text", true, None::<&str>)?;
    let separator = PredefinedMenuItem::separator(handle)?;
    let settings_item = MenuItem::with_id(handle, "settings", "Settings…", true, None::<&str>)?;
    let separator2 = PredefinedMenuItem::separator(handle)?;
    let quit_item = MenuItem::with_id(handle, "quit", "Quit", true, None::<&str>)?;

    let menu = Menu::with_items(
        handle,
        &[
            &select_item,
            &ask_item,
            &reprocess_item,
            &copy_item,
            &separator,
            &settings_item,
            &separator2,
            &quit_item,
        ],
    )?;

    let mut builder = TrayIconBuilder::new()
        .menu(&menu)
        .tooltip("SnapVis")
        .show_menu_on_left_click(true)
        .on_menu_event(move |app_handle, event| match event.id().as_ref() {
            "select_area" => {
                log::info!("Tray: select area");
                dispatch(app_handle, Trigger::Extract);
            }
            "ask_area" => {
                log::info!("Tray: ask about area");
                dispatch(app_handle, Trigger::Prompt);
            }
            "reprocess" => dispatch(app_handle, Trigger::Reprocess),
            "copy_last" => dispatch(app_handle, Trigger::CopyLast),
            "settings" => open_settings_file(app_handle),
            "quit" => {
                log::info!("Tray: quit requested");
                app_handle.exit(0);
            }
            _ => {}
        });
    if let Some(icon) = app.default_window_icon() {
        builder = builder.icon(icon.clone());
    }
    builder.build(app)?;

    log::info!("Menu-bar icon created");
    Ok(())
}

/// Open `settings.toml` in the default editor, writing defaults first if needed.
fn open_settings_file(app: &AppHandle) {
    let result = settings::config_path(app)
        .map_err(|e| e.to_string())
        .and_then(|path| {
            if !path.exists() {
                let content = Settings::default().to_toml().map_err(|e| e.to_string())?;
                std::fs::write(&path, content).map_err(|e| e.to_string())?;
            }
            app.opener()
                .open_path(path.to_string_lossy(), None::<&str>)
                .map_err(|e| e.to_string())
        });
    if let Err(e) = result {
        log::error!("Could not open settings: {}", e);
    }
}

// ─── Global shortcut handler ─────────────────────────────────────────

/// Called by the global-shortcut plugin when *any* registered shortcut fires.
pub fn on_shortcut_event(app: &AppHandle, shortcut: &Shortcut, event: ShortcutEvent) {
    // Only act on key-down (Pressed), not Released.
    if event.state() != ShortcutState::Pressed {
        return;
    }

    let Some(bindings) = app.try_state::<ShortcutBindings>() else {
        return;
    };
    if let Some(trigger) = bindings.trigger_for(shortcut) {
        log::info!("Shortcut {:?}: {:?}", shortcut, trigger);
        dispatch(app, trigger);
    }
}
