pub mod ai;
pub mod capture;
pub mod ocr;
pub mod pipeline;
pub mod settings;
pub mod status;
mod tray;
mod views;

use tauri::Manager;

use std::sync::Arc;
use std::time::Duration;

use capture::clipboard::SystemClipboard;
use capture::screen::ScreencaptureTool;
use ocr::TesseractOcr;
use pipeline::{Outcome, Pipeline, PromptSession};
use settings::Settings;
use status::{PipelineStatus, StatusNotifier};

/// Plain capture: select a region, extract its text, copy it.
#[tauri::command]
async fn capture_text(state: tauri::State<'_, Arc<Pipeline>>) -> Result<Outcome, String> {
    Ok(state.capture_and_extract().await)
}

/// Prompted capture: select a region and open the prompt window.
#[tauri::command]
async fn capture_with_prompt(state: tauri::State<'_, Arc<Pipeline>>) -> Result<Outcome, String> {
    Ok(state.capture_for_prompt().await)
}

#[tauri::command]
async fn submit_prompt(
    state: tauri::State<'_, Arc<Pipeline>>,
    prompt: String,
) -> Result<String, String> {
    state.submit_prompt(&prompt).await.map_err(|e| e.to_string())
}

/// Run text extraction again on the most recent capture.
#[tauri::command]
async fn reprocess_latest(state: tauri::State<'_, Arc<Pipeline>>) -> Result<Outcome, String> {
    Ok(state.reprocess_latest().await)
}

/// Async so the banner's revert timer is spawned on the runtime.
#[tauri::command]
async fn copy_last_text(state: tauri::State<'_, Arc<Pipeline>>) -> Result<String, String> {
    state.recopy_last_text().map_err(|e| e.to_string())
}

#[tauri::command]
fn get_last_text(state: tauri::State<'_, Arc<Pipeline>>) -> Option<String> {
    state.last_text()
}

#[tauri::command]
fn get_status(state: tauri::State<'_, Arc<Pipeline>>) -> PipelineStatus {
    state.current_status()
}

#[tauri::command]
fn dismiss_status(state: tauri::State<'_, Arc<Pipeline>>) {
    state.status().dismiss();
}

#[tauri::command]
fn get_prompt_session(state: tauri::State<'_, Arc<Pipeline>>) -> Option<PromptSession> {
    state.prompt_session()
}

fn build_pipeline(app: &tauri::AppHandle, settings: &Settings) -> Arc<Pipeline> {
    let notifier = StatusNotifier::new(
        Arc::new(views::BannerSink::new(app.clone())),
        Duration::from_millis(settings.banner_duration_ms),
    );
    let pipeline = Pipeline::new(
        Arc::new(ScreencaptureTool::default()),
        Arc::new(TesseractOcr::new(settings.ocr_language.clone())),
        Arc::new(SystemClipboard),
        notifier,
        Arc::new(views::WindowPromptView::new(app.clone())),
    );
    pipeline.apply_settings(settings, settings::process_env);
    Arc::new(pipeline)
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(
            tauri_plugin_global_shortcut::Builder::new()
                .with_handler(tray::on_shortcut_event)
                .build(),
        )
        // The three windows are reused for every capture; closing only hides them.
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                let _ = window.hide();
                api.prevent_close();
            }
        })
        .invoke_handler(tauri::generate_handler![
            capture_text,
            capture_with_prompt,
            submit_prompt,
            reprocess_latest,
            copy_last_text,
            get_last_text,
            get_status,
            dismiss_status,
            get_prompt_session,
            settings::load_settings,
            settings::save_settings,
        ])
        .setup(|app| {
            // Menu-bar only: no Dock icon, no app switcher entry.
            #[cfg(target_os = "macos")]
            app.set_activation_policy(tauri::ActivationPolicy::Accessory);

            let settings = Settings::load_from_app(app.handle()).unwrap_or_else(|e| {
                log::warn!("Using default settings: {}", e);
                Settings::default()
            });

            app.manage(build_pipeline(app.handle(), &settings));
            tray::setup_tray(app)?;

            use tauri_plugin_global_shortcut::GlobalShortcutExt;
            match tray::ShortcutBindings::from_settings(&settings) {
                Ok(bindings) => {
                    for raw in [
                        settings.capture_shortcut.as_str(),
                        settings.prompt_shortcut.as_str(),
                    ] {
                        if let Err(e) = app.global_shortcut().register(raw) {
                            log::warn!("Could not register global shortcut {}: {}", raw, e);
                        }
                    }
                    app.manage(bindings);
                    log::info!(
                        "Global shortcuts registered ({}, {})",
                        settings.capture_shortcut,
                        settings.prompt_shortcut
                    );
                }
                Err(e) => log::error!("Global shortcuts disabled: {}", e),
            }

            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
