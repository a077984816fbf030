//! In-memory spy implementations of the outbound ports, shared by tests.

use std::sync::Mutex;

use hestia_domain::block::AutomaticBlock;
use hestia_domain::error::GatewayError;
use hestia_domain::id::ActuatorId;

use crate::ports::gateway::{DeviceGateway, PointValue};
use crate::ports::notify::NotificationSink;
use crate::ports::store::StateStore;

/// Gateway spy recording every dispatched write, optionally failing them all.
#[derive(Debug, Default)]
pub(crate) struct SpyGateway {
    writes: Mutex<Vec<(String, PointValue)>>,
    pub(crate) fail: bool,
}

impl SpyGateway {
    pub(crate) fn failing() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn writes(&self) -> Vec<(String, PointValue)> {
        self.writes.lock().unwrap().clone()
    }
}

impl DeviceGateway for SpyGateway {
    async fn set_state(&self, point_id: &str, value: PointValue) -> Result<(), GatewayError> {
        self.writes
            .lock()
            .unwrap()
            .push((point_id.to_string(), value));
        if self.fail {
            return Err(GatewayError {
                point_id: point_id.to_string(),
                message: "gateway unreachable".to_string(),
            });
        }
        Ok(())
    }
}

/// Notification spy recording informed and spoken messages.
#[derive(Debug, Default)]
pub(crate) struct SpyNotifier {
    informed: Mutex<Vec<String>>,
    spoken: Mutex<Vec<(String, u8)>>,
}

impl SpyNotifier {
    pub(crate) fn informed(&self) -> Vec<String> {
        self.informed.lock().unwrap().clone()
    }

    pub(crate) fn spoken(&self) -> Vec<(String, u8)> {
        self.spoken.lock().unwrap().clone()
    }
}

impl NotificationSink for SpyNotifier {
    async fn inform(&self, message: &str) {
        self.informed.lock().unwrap().push(message.to_string());
    }

    async fn speak(&self, message: &str, volume: u8) {
        self.spoken
            .lock()
            .unwrap()
            .push((message.to_string(), volume));
    }
}

/// Store spy recording persisted blocks and calibrations.
#[derive(Debug, Default)]
pub(crate) struct SpyStore {
    blocks: Mutex<Vec<AutomaticBlock>>,
    calibrations: Mutex<Vec<(ActuatorId, Option<u64>, Option<u64>)>>,
}

impl SpyStore {
    pub(crate) fn blocks(&self) -> Vec<AutomaticBlock> {
        self.blocks.lock().unwrap().clone()
    }

    pub(crate) fn calibrations(&self) -> Vec<(ActuatorId, Option<u64>, Option<u64>)> {
        self.calibrations.lock().unwrap().clone()
    }
}

impl StateStore for SpyStore {
    async fn persist_block(&self, block: &AutomaticBlock) {
        self.blocks.lock().unwrap().push(block.clone());
    }

    async fn persist_calibration(
        &self,
        actuator_id: ActuatorId,
        ms_to_fully_open: Option<u64>,
        ms_to_fully_close: Option<u64>,
    ) {
        self.calibrations
            .lock()
            .unwrap()
            .push((actuator_id, ms_to_fully_open, ms_to_fully_close));
    }
}
