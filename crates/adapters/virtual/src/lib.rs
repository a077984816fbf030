//! # hestia-adapter-virtual
//!
//! Simulated collaborators for demos and tests: a [`VirtualGateway`] that
//! accepts device writes and echoes them back as synthetic telemetry, and a
//! [`VirtualNotifier`] that logs notifications instead of delivering them.
//!
//! With these two plugged in, the full engine runs without any real hardware.

use std::sync::Mutex;

use hestia_app::engine::{EngineHandle, TelemetryReading, TelemetryValue};
use hestia_app::ports::gateway::{DeviceGateway, PointValue};
use hestia_app::ports::notify::NotificationSink;
use hestia_domain::error::GatewayError;

/// Gateway simulation: every write succeeds and is immediately reflected back
/// into the engine inbox as a telemetry reading, as a well-behaved device
/// would eventually report.
#[derive(Debug)]
pub struct VirtualGateway {
    handle: EngineHandle,
    writes: Mutex<Vec<(String, PointValue)>>,
}

impl VirtualGateway {
    #[must_use]
    pub fn new(handle: EngineHandle) -> Self {
        Self {
            handle,
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Every write dispatched so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, PointValue)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl DeviceGateway for VirtualGateway {
    async fn set_state(&self, point_id: &str, value: PointValue) -> Result<(), GatewayError> {
        tracing::info!(point_id, ?value, "virtual device write");
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((point_id.to_string(), value));
        }

        let echoed = match value {
            PointValue::Level(level) => TelemetryValue::Level(level),
            PointValue::OnOff(on) => TelemetryValue::OnOff(on),
        };
        self.handle.send_telemetry(TelemetryReading {
            point_id: point_id.to_string(),
            value: echoed,
        });
        Ok(())
    }
}

/// Notifier simulation: messages end up in the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualNotifier;

impl NotificationSink for VirtualNotifier {
    async fn inform(&self, message: &str) {
        tracing::info!(message, "notification");
    }

    async fn speak(&self, message: &str, volume: u8) {
        tracing::info!(message, volume, "spoken notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_app::engine::Input;

    #[tokio::test]
    async fn should_record_write_and_echo_telemetry() {
        let (handle, mut rx) = EngineHandle::channel();
        let gateway = VirtualGateway::new(handle);

        gateway
            .set_state("p-level", PointValue::Level(40))
            .await
            .unwrap();

        assert_eq!(
            gateway.writes(),
            vec![("p-level".to_string(), PointValue::Level(40))]
        );
        match rx.recv().await {
            Some(Input::Telemetry(reading)) => {
                assert_eq!(reading.point_id, "p-level");
                assert_eq!(reading.value, TelemetryValue::Level(40));
            }
            other => panic!("expected telemetry echo, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_echo_switch_state() {
        let (handle, mut rx) = EngineHandle::channel();
        let gateway = VirtualGateway::new(handle);

        gateway
            .set_state("p-on", PointValue::OnOff(true))
            .await
            .unwrap();

        match rx.recv().await {
            Some(Input::Telemetry(reading)) => {
                assert_eq!(reading.value, TelemetryValue::OnOff(true));
            }
            other => panic!("expected telemetry echo, got {other:?}"),
        }
    }
}
