//! Presentation hooks
//!
//! The session never renders anything itself. It reports through exactly
//! three hooks: transient notifications, a blocking confirm-before-delete
//! dialog, and a blocking result dialog after a delete.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// How long a notification stays on screen
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(2);

/// [`NOTIFICATION_TTL`] in milliseconds, as handed to browser clients
#[must_use]
pub fn notification_ttl_ms() -> u64 {
    u64::try_from(NOTIFICATION_TTL.as_millis()).unwrap_or(u64::MAX)
}

/// Result of a confirmed delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted { key: String },
    Failed { key: String, message: String },
}

/// Sink for user-visible events
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Show a transient notification
    ///
    /// Visual presenters dismiss it after [`NOTIFICATION_TTL`].
    fn notify(&self, message: &str);

    /// Ask before deleting; `true` means go ahead
    async fn confirm_delete(&self, key: &str) -> bool;

    /// Report how a confirmed delete went
    fn show_delete_result(&self, outcome: &DeleteOutcome);
}

/// A presentation event captured by [`RecordingPresenter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresentationEvent {
    Notification { message: String },
    ConfirmDelete { key: String, confirmed: bool },
    DeleteResult { result: DeleteOutcome },
}

/// Presenter that records events instead of showing them
///
/// Backs the HTTP surface (events are returned to the browser) and tests.
#[derive(Debug)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresentationEvent>>,
    confirm: bool,
}

impl RecordingPresenter {
    /// Create a presenter that answers every confirmation with `confirm`
    #[must_use]
    pub const fn new(confirm: bool) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            confirm,
        }
    }

    /// Events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<PresentationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Remove and return recorded events
    pub fn drain(&self) -> Vec<PresentationEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    /// Recorded notification messages only
    #[must_use]
    pub fn notifications(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresentationEvent::Notification { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PresentationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    fn notify(&self, message: &str) {
        self.push(PresentationEvent::Notification {
            message: message.to_string(),
        });
    }

    async fn confirm_delete(&self, key: &str) -> bool {
        self.push(PresentationEvent::ConfirmDelete {
            key: key.to_string(),
            confirmed: self.confirm,
        });
        self.confirm
    }

    fn show_delete_result(&self, outcome: &DeleteOutcome) {
        self.push(PresentationEvent::DeleteResult {
            result: outcome.clone(),
        });
    }
}

/// Presenter for interactive terminals
#[derive(Debug, Default)]
pub struct TerminalPresenter {
    assume_yes: bool,
}

impl TerminalPresenter {
    /// Create a presenter; `assume_yes` skips delete confirmations
    #[must_use]
    pub const fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl Presenter for TerminalPresenter {
    fn notify(&self, message: &str) {
        tracing::debug!(message, "notification");
        eprintln!("» {message}");
    }

    async fn confirm_delete(&self, key: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        let prompt = format!("Delete {key}? You won't be able to revert this!");
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "confirmation prompt failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "confirmation task failed");
                false
            }
        }
    }

    fn show_delete_result(&self, outcome: &DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted { key } => {
                println!("Deleted! {key} has been deleted.");
            }
            DeleteOutcome::Failed { message, .. } => {
                println!("Error! There was an error deleting the file: {message}");
            }
        }
    }
}
