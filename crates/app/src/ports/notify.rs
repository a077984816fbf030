//! Notification sink port — best-effort operator-visible messages.
//!
//! Used only for side effects (block conflicts, calibration milestones,
//! safety refusals); never gates control flow, so the methods are infallible
//! from the caller's point of view.

use std::future::Future;

/// Delivers best-effort messages to the operator (chat, speech, …).
pub trait NotificationSink {
    /// Send a text notification.
    fn inform(&self, message: &str) -> impl Future<Output = ()> + Send;

    /// Speak a message aloud at the given volume (0..=100).
    fn speak(&self, message: &str, volume: u8) -> impl Future<Output = ()> + Send;
}

impl<T: NotificationSink + Send + Sync> NotificationSink for std::sync::Arc<T> {
    fn inform(&self, message: &str) -> impl Future<Output = ()> + Send {
        (**self).inform(message)
    }

    fn speak(&self, message: &str, volume: u8) -> impl Future<Output = ()> + Send {
        (**self).speak(message, volume)
    }
}
