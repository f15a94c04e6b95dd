//! Cancellation and deadline signal of a single call.

use callguard_core::Status;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The caller's cancellation and deadline, supplied by the transport.
///
/// Long-running handlers select on [`CallSignal::done`] next to their own
/// work so that they return promptly once the caller goes away.
#[derive(Debug, Clone, Default)]
pub struct CallSignal {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallSignal {
    /// A signal with a fresh token and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal driven by an existing token, e.g. one per connection.
    #[must_use]
    pub fn from_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancels the call. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the call has been canceled or has run past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the call is canceled or its deadline passes, yielding
    /// the status the call should finish with.
    pub async fn done(&self) -> Status {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.cancel.cancelled() => canceled(),
                    () = tokio::time::sleep_until(deadline) => {
                        Status::deadline_exceeded("context deadline exceeded")
                    }
                }
            }
            None => {
                self.cancel.cancelled().await;
                canceled()
            }
        }
    }
}

fn canceled() -> Status {
    Status::canceled("context canceled")
}
