//! # hestia-domain
//!
//! Pure domain model for the hestia home automation control plane.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Commands** (provenance-carrying state-change requests with ranks)
//! - Define **Automatic blocks** (suppression windows with collision policies)
//! - Define **Time triggers** (fixed clock times and solar events with clamps)
//! - Define **Shutter state** (position arbitration, safety flags, travel-time
//!   calibration)
//! - Define **Rooms** (logical grouping with a floor, used for fan-out commands)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod block;
pub mod command;
pub mod room;
pub mod shutter;
pub mod sun;
pub mod trigger;
