//! Trigger scheduler — converts clock/solar trigger definitions into
//! fire-once events.
//!
//! Driven by a periodic wall-clock tick (`perform_check`). Each registered
//! trigger fires at most once per crossing of its computed time; a callback
//! failure is logged and never stops sibling triggers in the same pass.

use std::sync::Arc;

use chrono::TimeZone;

use hestia_domain::command::{Command, CommandSource};
use hestia_domain::error::HestiaError;
use hestia_domain::sun::{GeoLocation, SunTimes};
use hestia_domain::time::Timestamp;
use hestia_domain::trigger::{TimeTrigger, TriggerKind};

/// Invoked when a trigger fires; receives the provenance root for the chain
/// of commands the callback issues.
pub type TriggerCallback = Box<dyn FnMut(Arc<Command>) -> Result<(), HestiaError> + Send>;

struct Entry {
    trigger: TimeTrigger,
    callback: TriggerCallback,
}

/// Registry and evaluator for [`TimeTrigger`]s.
pub struct TriggerScheduler<Tz: TimeZone> {
    tz: Tz,
    location: Option<GeoLocation>,
    ephemeris: Option<SunTimes>,
    /// Cloud cover fraction, 0.0 (clear) ..= 1.0 (overcast).
    cloudiness: f64,
    last_check: Option<Timestamp>,
    entries: Vec<Entry>,
}

impl<Tz: TimeZone> TriggerScheduler<Tz> {
    #[must_use]
    pub fn new(tz: Tz, location: Option<GeoLocation>) -> Self {
        Self {
            tz,
            location,
            ephemeris: None,
            cloudiness: 0.0,
            last_check: None,
            entries: Vec::new(),
        }
    }

    /// Register a trigger with its callback.
    ///
    /// Registering a solar trigger without a configured location is a
    /// configuration error: logged at high severity, and the trigger simply
    /// never schedules (the registration itself is kept, so fixing the
    /// configuration at restart heals it).
    pub fn register(&mut self, trigger: TimeTrigger, callback: TriggerCallback) {
        if self.location.is_none()
            && !matches!(trigger.kind, TriggerKind::FixedTime { .. })
        {
            tracing::error!(
                trigger = %trigger.name,
                "solar trigger registered without a configured location; it will never fire"
            );
        }
        self.entries.push(Entry { trigger, callback });
    }

    /// Update the cloud cover fraction used for solar drift, from octas (0..=8).
    pub fn update_cloudiness_octas(&mut self, octas: u8) {
        self.cloudiness = f64::from(octas.min(8)) / 8.0;
    }

    /// Evaluate all triggers against `now`; returns how many fired.
    ///
    /// Invoked on a fixed wall-clock tick. A trigger fires when its computed
    /// `next_fire` lies between the previous check and `now` — never on the
    /// very first check, and never twice for one crossing.
    pub fn perform_check(&mut self, now: Timestamp) -> usize {
        self.refresh_ephemeris(now);

        let mut fired = 0;
        for entry in &mut self.entries {
            if entry.trigger.next_fire.is_none() || entry.trigger.is_stale() {
                entry.trigger.recalc_next_fire(
                    now,
                    &self.tz,
                    self.ephemeris.as_ref(),
                    self.cloudiness,
                );
            }

            let due = entry.trigger.next_fire.is_some_and(|next| {
                next <= now && self.last_check.is_some_and(|previous| next > previous)
            });
            if !due {
                continue;
            }

            tracing::info!(trigger = %entry.trigger.name, "time trigger fired");
            let root = Arc::new(
                Command::time_trigger_fired(CommandSource::Automatic, entry.trigger.name.clone())
                    .with_reason(entry.trigger.name.clone()),
            );
            // One failing callback must not stop the remaining triggers.
            if let Err(err) = (entry.callback)(root) {
                tracing::warn!(
                    trigger = %entry.trigger.name,
                    error = %err,
                    "trigger callback failed"
                );
            }
            entry.trigger.mark_fired(now);
            // Make the next occurrence visible right away.
            entry.trigger.recalc_next_fire(
                now,
                &self.tz,
                self.ephemeris.as_ref(),
                self.cloudiness,
            );
            fired += 1;
        }

        self.last_check = Some(now);
        fired
    }

    /// Keep the stored sunrise/sunset current: compute today's pair on first
    /// use and roll to the next day once both of today's events have passed.
    fn refresh_ephemeris(&mut self, now: Timestamp) {
        let Some(location) = self.location else {
            return;
        };
        let today = now.date_naive();
        let needs = match &self.ephemeris {
            None => Some(today),
            Some(eph) if eph.date < today => Some(today),
            Some(eph) if eph.date == today && eph.is_over(now) => today.succ_opt(),
            Some(_) => None,
        };
        if let Some(date) = needs {
            self.ephemeris = SunTimes::compute(date, location);
            match &self.ephemeris {
                Some(eph) => tracing::debug!(
                    date = %eph.date,
                    sunrise = %eph.sunrise,
                    sunset = %eph.sunset,
                    "ephemeris refreshed"
                ),
                None => tracing::debug!(%date, "no sun events (polar day/night)"),
            }
        }
    }

    /// The computed next fire of a named trigger, for diagnostics and tests.
    #[must_use]
    pub fn next_fire_of(&self, name: &str) -> Option<Timestamp> {
        self.entries
            .iter()
            .find(|entry| entry.trigger.name == name)
            .and_then(|entry| entry.trigger.next_fire)
    }
}
