// status.rs: State machine behind the transient status banner.
//
//   Idle ──Started──▶ InProgress ──FallingBack──▶ InProgress
//                         │
//            Succeeded/Failed
//                         ▼
//               Success / Failed ──DisplayElapsed──▶ Idle
//
// Any new event cancels a pending auto-revert.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long a terminal state stays on screen before reverting to idle.
pub const DEFAULT_DISPLAY_DURATION: Duration = Duration::from_millis(2500);

pub const MSG_PROCESSING: &str = "Processing…";
pub const MSG_FALLING_BACK: &str = "Network error, falling back to local OCR…";
pub const MSG_COPIED: &str = "Copied to clipboard";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum PipelineStatus {
    Idle,
    InProgress(String),
    Success(String),
    Failed(String),
}

impl PipelineStatus {
    /// Success and Failed revert to Idle on their own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Success(_) | PipelineStatus::Failed(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            PipelineStatus::Idle => None,
            PipelineStatus::InProgress(m) | PipelineStatus::Success(m) | PipelineStatus::Failed(m) => {
                Some(m)
            }
        }
    }

    /// Pure transition function.
    pub fn on(&self, event: StatusEvent) -> PipelineStatus {
        match event {
            StatusEvent::Started(m) | StatusEvent::FallingBack(m) => PipelineStatus::InProgress(m),
            StatusEvent::Succeeded(m) => PipelineStatus::Success(m),
            StatusEvent::Failed(m) => PipelineStatus::Failed(m),
            StatusEvent::DisplayElapsed if self.is_terminal() => PipelineStatus::Idle,
            StatusEvent::DisplayElapsed => self.clone(),
            StatusEvent::Dismissed => PipelineStatus::Idle,
        }
    }
}

/// Pipeline events that drive the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Started(String),
    FallingBack(String),
    Succeeded(String),
    Failed(String),
    DisplayElapsed,
    Dismissed,
}

/// Where status changes are rendered (the banner window, a test recorder).
pub trait StatusSink: Send + Sync {
    fn show(&self, status: &PipelineStatus);
}

struct NotifierState {
    status: PipelineStatus,
    /// Bumped on every transition; a revert timer only fires if it still matches.
    epoch: u64,
    revert: Option<JoinHandle<()>>,
}

/// Owned per application session and shared by `Arc`.
pub struct StatusNotifier {
    state: Arc<Mutex<NotifierState>>,
    sink: Arc<dyn StatusSink>,
    display_duration: Duration,
}

impl StatusNotifier {
    pub fn new(sink: Arc<dyn StatusSink>, display_duration: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState {
                status: PipelineStatus::Idle,
                epoch: 0,
                revert: None,
            })),
            sink,
            display_duration,
        }
    }

    pub fn current(&self) -> PipelineStatus {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .status
            .clone()
    }

    /// Apply `event`, render the new state, and (re)arm the auto-revert timer.
    /// Must be called from within a tokio runtime.
    pub fn apply(&self, event: StatusEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = state.revert.take() {
            timer.abort();
        }

        let next = state.status.on(event);
        state.epoch += 1;
        state.status = next.clone();
        self.sink.show(&next);
        log_status_for_testing(&next);

        if next.is_terminal() {
            let epoch = state.epoch;
            let shared = Arc::clone(&self.state);
            let sink = Arc::clone(&self.sink);
            let delay = self.display_duration;
            state.revert = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                if state.epoch != epoch {
                    return;
                }
                state.status = state.status.on(StatusEvent::DisplayElapsed);
                state.epoch += 1;
                state.revert = None;
                sink.show(&state.status);
                log_status_for_testing(&state.status);
            }));
        }
    }

    pub fn dismiss(&self) {
        self.apply(StatusEvent::Dismissed);
    }
}

#[derive(Serialize)]
struct StatusLogLine<'a> {
    event: &'static str,
    timestamp: String,
    payload: &'a PipelineStatus,
}

/// When `SNAPVIS_TEST_LOG` is set, append the transition as a JSONL line to that file.
fn log_status_for_testing(status: &PipelineStatus) {
    if let Ok(path) = std::env::var("SNAPVIS_TEST_LOG") {
        use std::io::Write;
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            let line = StatusLogLine {
                event: "status:changed",
                timestamp: now_iso(),
                payload: status,
            };
            let json = serde_json::to_string(&line).unwrap_or_default();
            let _ = writeln!(file, "{}", json);
        }
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (y, m, d) = epoch_days_to_ymd((secs / 86400) as i64);
    let t = secs % 86400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        t / 3600,
        (t % 3600) / 60,
        t % 60
    )
}

/// Convert days since 1970-01-01 to a civil (year, month, day).
fn epoch_days_to_ymd(mut days: i64) -> (i64, u32, u32) {
    days += 719_468;
    let era = (if days >= 0 { days } else { days - 146_096 }) / 146_097;
    let doe = (days - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe as i64 + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<PipelineStatus>>);

    impl StatusSink for Recorder {
        fn show(&self, status: &PipelineStatus) {
            self.0.lock().unwrap().push(status.clone());
        }
    }

    fn notifier() -> (StatusNotifier, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        (StatusNotifier::new(rec.clone(), DEFAULT_DISPLAY_DURATION), rec)
    }

    fn progress(m: &str) -> PipelineStatus {
        PipelineStatus::InProgress(m.into())
    }

    #[test]
    fn transitions_follow_the_state_diagram() {
        let idle = PipelineStatus::Idle;
        let busy = idle.on(StatusEvent::Started("a".into()));
        assert_eq!(busy, progress("a"));

        let fallback = busy.on(StatusEvent::FallingBack("b".into()));
        assert_eq!(fallback, progress("b"));

        let done = fallback.on(StatusEvent::Succeeded("c".into()));
        assert_eq!(done, PipelineStatus::Success("c".into()));
        assert_eq!(done.on(StatusEvent::DisplayElapsed), PipelineStatus::Idle);

        let failed = busy.on(StatusEvent::Failed("d".into()));
        assert_eq!(failed.on(StatusEvent::DisplayElapsed), PipelineStatus::Idle);
    }

    #[test]
    fn display_elapsed_does_not_interrupt_progress() {
        let busy = progress("working");
        assert_eq!(busy.on(StatusEvent::DisplayElapsed), busy);
        assert_eq!(PipelineStatus::Idle.on(StatusEvent::DisplayElapsed), PipelineStatus::Idle);
    }

    #[test]
    fn dismiss_always_returns_to_idle() {
        assert_eq!(progress("x").on(StatusEvent::Dismissed), PipelineStatus::Idle);
        assert_eq!(
            PipelineStatus::Failed("x".into()).on(StatusEvent::Dismissed),
            PipelineStatus::Idle
        );
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_value(PipelineStatus::Failed("quota exceeded".into())).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["message"], "quota exceeded");
        let idle = serde_json::to_value(PipelineStatus::Idle).unwrap();
        assert_eq!(idle["state"], "idle");
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_state_reverts_after_display_duration() {
        let (n, rec) = notifier();
        n.apply(StatusEvent::Started(MSG_PROCESSING.into()));
        n.apply(StatusEvent::Succeeded(MSG_COPIED.into()));
        assert_eq!(n.current(), PipelineStatus::Success(MSG_COPIED.into()));

        tokio::time::sleep(Duration::from_millis(2400)).await;
        assert_eq!(n.current(), PipelineStatus::Success(MSG_COPIED.into()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(n.current(), PipelineStatus::Idle);
        assert_eq!(
            *rec.0.lock().unwrap(),
            vec![
                progress(MSG_PROCESSING),
                PipelineStatus::Success(MSG_COPIED.into()),
                PipelineStatus::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_event_cancels_pending_revert() {
        let (n, rec) = notifier();
        n.apply(StatusEvent::Failed("boom".into()));
        tokio::time::sleep(Duration::from_millis(2000)).await;

        n.apply(StatusEvent::Started(MSG_PROCESSING.into()));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(n.current(), progress(MSG_PROCESSING));
        assert!(!rec.0.lock().unwrap().contains(&PipelineStatus::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_is_immediate() {
        let (n, _rec) = notifier();
        n.apply(StatusEvent::Failed("boom".into()));
        n.dismiss();
        assert_eq!(n.current(), PipelineStatus::Idle);
    }

    #[test]
    fn now_iso_format() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn epoch_days_known_dates() {
        assert_eq!(epoch_days_to_ymd(0), (1970, 1, 1));
        assert_eq!(epoch_days_to_ymd(19_723), (2024, 1, 1));
        assert_eq!(epoch_days_to_ymd(11_016), (2000, 2, 29));
    }
}
