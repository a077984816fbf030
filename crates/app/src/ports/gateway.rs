//! Device gateway port — fire-and-forget writes to actuator data points.

use std::future::Future;

use hestia_domain::error::GatewayError;

/// Value written to a device data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointValue {
    /// Absolute shutter level, 0=closed..100=open.
    Level(u8),
    /// On/off actuator state.
    OnOff(bool),
}

/// Dispatches state changes to the device-telemetry gateway.
///
/// Writes are fire-and-forget: a returned `Ok` means the write was handed to
/// the gateway, not that the device acknowledged it. Effects are observed
/// later through telemetry. The gateway gives no retry guarantee; the core
/// never retries either.
pub trait DeviceGateway {
    /// Dispatch a state change for the given data point.
    fn set_state(
        &self,
        point_id: &str,
        value: PointValue,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

impl<T: DeviceGateway + Send + Sync> DeviceGateway for std::sync::Arc<T> {
    fn set_state(
        &self,
        point_id: &str,
        value: PointValue,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).set_state(point_id, value)
    }
}
