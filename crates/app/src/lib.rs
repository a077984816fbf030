//! # hestia-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceGateway` — fire-and-forget device writes
//!   - `NotificationSink` — best-effort operator messages
//!   - `StateStore` — best-effort persistence (no-op when unconfigured)
//! - Provide the arbitration/scheduling core:
//!   - `BlockArbitrator` — per-actuator automatic suppression windows
//!   - `TriggerScheduler` — fire-once events from clock and solar times
//!   - `ShutterService` / `SwitchService` — per-actuator command handling
//!   - `Engine` — the single-threaded cooperative dispatch loop
//! - Provide **in-process infrastructure** (timer queue) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `hestia-domain` only (plus `tokio::sync`/`time` for the loop).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod arbitrator;
#[cfg(test)]
pub(crate) mod test_support;
pub mod engine;
pub mod ports;
pub mod registry;
pub mod scheduler;
pub mod shutter_service;
pub mod switch_service;
pub mod timer;
