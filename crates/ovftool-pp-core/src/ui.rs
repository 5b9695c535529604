//! Progress and diagnostic output.

use tracing::{error, info};

/// Sink for user-facing messages. Implementations must not fail.
pub trait Ui {
    /// Announce a major step.
    fn say(&self, message: &str);

    /// Show supplementary detail, such as tool output.
    fn message(&self, message: &str);

    /// Report a problem.
    fn error(&self, message: &str);
}

/// A [`Ui`] that forwards everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogUi;

impl Ui for LogUi {
    fn say(&self, message: &str) {
        info!(target: "ui", "{}", message);
    }

    fn message(&self, message: &str) {
        info!(target: "ui", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "ui", "{}", message);
    }
}
