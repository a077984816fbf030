//! Persistence port — asynchronous, best-effort state snapshots.
//!
//! Absence of a configured store must degrade to a no-op, never an error;
//! [`NoopStore`] is that degradation.

use std::future::Future;

use hestia_domain::block::AutomaticBlock;
use hestia_domain::id::ActuatorId;

/// Persists control-plane state for restart continuity.
pub trait StateStore {
    /// Persist an installed or replaced suppression window.
    fn persist_block(&self, block: &AutomaticBlock) -> impl Future<Output = ()> + Send;

    /// Persist learned shutter travel times.
    fn persist_calibration(
        &self,
        actuator_id: ActuatorId,
        ms_to_fully_open: Option<u64>,
        ms_to_fully_close: Option<u64>,
    ) -> impl Future<Output = ()> + Send;
}

impl<T: StateStore + Send + Sync> StateStore for std::sync::Arc<T> {
    fn persist_block(&self, block: &AutomaticBlock) -> impl Future<Output = ()> + Send {
        (**self).persist_block(block)
    }

    fn persist_calibration(
        &self,
        actuator_id: ActuatorId,
        ms_to_fully_open: Option<u64>,
        ms_to_fully_close: Option<u64>,
    ) -> impl Future<Output = ()> + Send {
        (**self).persist_calibration(actuator_id, ms_to_fully_open, ms_to_fully_close)
    }
}

/// Store used when no persistence is configured; every call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl StateStore for NoopStore {
    fn persist_block(&self, _block: &AutomaticBlock) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn persist_calibration(
        &self,
        _actuator_id: ActuatorId,
        _ms_to_fully_open: Option<u64>,
        _ms_to_fully_close: Option<u64>,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}
