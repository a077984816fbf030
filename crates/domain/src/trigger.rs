//! Time trigger — a fire-once event computed from clock time or solar position.
//!
//! A trigger's lifecycle is `{unscheduled} --recalc--> {scheduled(next_fire)}
//! --fire--> {unscheduled}`. The invariant upheld here: a computed `next_fire`
//! is never in the past relative to the computation instant. Fixed-time
//! triggers roll to the next calendar day; solar triggers whose adjusted time
//! has already elapsed stay unscheduled for the rest of the day.
//!
//! All fixed-time math is done in local wall-clock via a [`TimeZone`], never in
//! elapsed milliseconds, so 23- and 25-hour DST days come out right.

use chrono::{NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::sun::SunTimes;
use crate::time::Timestamp;

/// What instant family the trigger is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// A fixed local time of day.
    FixedTime { hour: u32, minute: u32 },
    /// Relative to today's astronomical sunrise.
    SunriseRelative,
    /// Relative to today's astronomical sunset.
    SunsetRelative,
}

/// Bounds keeping solar triggers inside civilised hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SunTimeClamp {
    /// A sunrise trigger never fires before this local time.
    pub earliest_sunrise: Option<NaiveTime>,
    /// A sunset trigger never fires after this local time.
    pub latest_sunset: Option<NaiveTime>,
}

/// A scheduled event computed from fixed clock time or solar position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeTrigger {
    pub name: String,
    pub kind: TriggerKind,
    /// Minutes added to the base instant (fixed time or sun event).
    pub minute_offset: i64,
    pub clamp: Option<SunTimeClamp>,
    /// Maximum extra minutes under full cloud cover; scaled by the current
    /// cloudiness fraction. Added for sunrise, subtracted for sunset.
    pub cloud_minutes: Option<i64>,
    pub last_fired: Option<Timestamp>,
    /// Absent until computed; cleared immediately after firing.
    pub next_fire: Option<Timestamp>,
}

impl TimeTrigger {
    /// Create a builder for constructing a [`TimeTrigger`].
    #[must_use]
    pub fn builder() -> TimeTriggerBuilder {
        TimeTriggerBuilder::default()
    }

    /// A stored `next_fire` older than the last firing must be recomputed
    /// before the next comparison.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        match (self.next_fire, self.last_fired) {
            (Some(next), Some(last)) => next < last,
            _ => false,
        }
    }

    /// Recompute `next_fire` relative to `now`.
    ///
    /// `sun` is the currently stored ephemeris (present for solar kinds unless
    /// the location has polar day/night); `cloudiness` is the current cloud
    /// cover fraction in `0.0..=1.0`.
    pub fn recalc_next_fire<Tz: TimeZone>(
        &mut self,
        now: Timestamp,
        tz: &Tz,
        sun: Option<&SunTimes>,
        cloudiness: f64,
    ) {
        self.next_fire = match self.kind {
            TriggerKind::FixedTime { hour, minute } => {
                Some(next_clock_occurrence(now, tz, hour, minute, self.minute_offset))
            }
            TriggerKind::SunriseRelative => sun.and_then(|sun| {
                let offset = self.minute_offset + self.cloud_offset(cloudiness);
                let mut at = sun.sunrise + TimeDelta::minutes(offset);
                if let Some(earliest) = self.clamp.and_then(|c| c.earliest_sunrise) {
                    let floor = local_time_on_day_of(sun.sunrise, tz, earliest);
                    if floor > at {
                        at = floor;
                    }
                }
                // Already elapsed: skip today rather than fire late.
                (at > now).then_some(at)
            }),
            TriggerKind::SunsetRelative => sun.and_then(|sun| {
                let offset = self.minute_offset - self.cloud_offset(cloudiness);
                let mut at = sun.sunset + TimeDelta::minutes(offset);
                if let Some(latest) = self.clamp.and_then(|c| c.latest_sunset) {
                    let ceiling = local_time_on_day_of(sun.sunset, tz, latest);
                    if ceiling < at {
                        at = ceiling;
                    }
                }
                (at > now).then_some(at)
            }),
        };
    }

    /// Mark the trigger as fired; `next_fire` must be recomputed afterwards.
    pub fn mark_fired(&mut self, now: Timestamp) {
        self.last_fired = Some(now);
        self.next_fire = None;
    }

    fn cloud_offset(&self, cloudiness: f64) -> i64 {
        self.cloud_minutes
            .map_or(0, |max| (max as f64 * cloudiness.clamp(0.0, 1.0)).round() as i64)
    }
}

/// Step-by-step builder for [`TimeTrigger`].
#[derive(Debug, Default)]
pub struct TimeTriggerBuilder {
    name: Option<String>,
    kind: Option<TriggerKind>,
    minute_offset: i64,
    clamp: Option<SunTimeClamp>,
    cloud_minutes: Option<i64>,
}

impl TimeTriggerBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: TriggerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn minute_offset(mut self, minutes: i64) -> Self {
        self.minute_offset = minutes;
        self
    }

    #[must_use]
    pub fn clamp(mut self, clamp: SunTimeClamp) -> Self {
        self.clamp = Some(clamp);
        self
    }

    #[must_use]
    pub fn cloud_minutes(mut self, minutes: i64) -> Self {
        self.cloud_minutes = Some(minutes);
        self
    }

    /// Consume the builder, validate, and return a [`TimeTrigger`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when no name was given and
    /// [`ValidationError::InvalidClockTime`] for an out-of-range fixed time.
    pub fn build(self) -> Result<TimeTrigger, ValidationError> {
        let name = self.name.unwrap_or_default();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let kind = self.kind.unwrap_or(TriggerKind::FixedTime { hour: 0, minute: 0 });
        if let TriggerKind::FixedTime { hour, minute } = kind {
            if hour >= 24 || minute >= 60 {
                return Err(ValidationError::InvalidClockTime { hour, minute });
            }
        }
        Ok(TimeTrigger {
            name,
            kind,
            minute_offset: self.minute_offset,
            clamp: self.clamp,
            cloud_minutes: self.cloud_minutes,
            last_fired: None,
            next_fire: None,
        })
    }
}

/// Next strictly-future occurrence of a local wall-clock time.
fn next_clock_occurrence<Tz: TimeZone>(
    now: Timestamp,
    tz: &Tz,
    hour: u32,
    minute: u32,
    minute_offset: i64,
) -> Timestamp {
    let local_now = now.with_timezone(tz);
    let mut date = local_now.date_naive();
    loop {
        let naive = date
            .and_hms_opt(hour, minute, 0)
            .expect("validated clock time")
            + TimeDelta::minutes(minute_offset);
        let candidate = resolve_local(tz, naive);
        if candidate > now {
            return candidate;
        }
        date = date.succ_opt().expect("calendar does not end");
    }
}

/// The given local wall-clock time on the same local day as `instant`.
fn local_time_on_day_of<Tz: TimeZone>(
    instant: Timestamp,
    tz: &Tz,
    time: NaiveTime,
) -> Timestamp {
    let date = instant.with_timezone(tz).date_naive();
    resolve_local(tz, date.and_time(time))
}

/// Map a naive local time into `Tz`, handling DST gaps and folds.
///
/// Ambiguous times (clocks fall back) take the earlier instant; nonexistent
/// times (clocks spring forward) slide forward until a valid instant exists.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: chrono::NaiveDateTime) -> Timestamp {
    let mut naive = naive;
    loop {
        match tz.from_local_datetime(&naive) {
            chrono::LocalResult::Single(t) | chrono::LocalResult::Ambiguous(t, _) => {
                return t.with_timezone(&Utc);
            }
            chrono::LocalResult::None => naive += TimeDelta::minutes(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone as _};
    use crate::sun::GeoLocation;

    const BERLIN: GeoLocation = GeoLocation {
        latitude: 52.52,
        longitude: 13.405,
    };

    fn cest() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn utc_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    fn fixed_trigger(hour: u32, minute: u32) -> TimeTrigger {
        TimeTrigger::builder()
            .name("nightly")
            .kind(TriggerKind::FixedTime { hour, minute })
            .build()
            .unwrap()
    }

    fn sun_for(date: NaiveDate) -> SunTimes {
        SunTimes::compute(date, BERLIN).unwrap()
    }

    #[test]
    fn should_schedule_fixed_time_later_today_when_not_yet_passed() {
        // 01:00 UTC checked against a 02:00 UTC trigger.
        let mut trigger = fixed_trigger(2, 0);
        let now = utc_at(2026, 5, 10, 1, 0);
        trigger.recalc_next_fire(now, &Utc, None, 0.0);
        assert_eq!(trigger.next_fire, Some(utc_at(2026, 5, 10, 2, 0)));
    }

    #[test]
    fn should_roll_fixed_time_to_next_day_when_already_passed() {
        let mut trigger = fixed_trigger(2, 0);
        let now = utc_at(2026, 5, 10, 2, 30);
        trigger.recalc_next_fire(now, &Utc, None, 0.0);
        assert_eq!(trigger.next_fire, Some(utc_at(2026, 5, 11, 2, 0)));
    }

    #[test]
    fn should_compute_fixed_time_in_local_wall_clock() {
        // 23:30 UTC is already 01:30 local (+2) the next day, so the next
        // local 02:00 is only half an hour away: 00:00 UTC on the 11th.
        let mut trigger = fixed_trigger(2, 0);
        let now = utc_at(2026, 5, 10, 23, 30);
        trigger.recalc_next_fire(now, &cest(), None, 0.0);
        assert_eq!(trigger.next_fire, Some(utc_at(2026, 5, 11, 0, 0)));
    }

    #[test]
    fn should_apply_minute_offset_to_fixed_time() {
        let mut trigger = TimeTrigger::builder()
            .name("late lights")
            .kind(TriggerKind::FixedTime { hour: 22, minute: 0 })
            .minute_offset(15)
            .build()
            .unwrap();
        let now = utc_at(2026, 5, 10, 12, 0);
        trigger.recalc_next_fire(now, &Utc, None, 0.0);
        assert_eq!(trigger.next_fire, Some(utc_at(2026, 5, 10, 22, 15)));
    }

    #[test]
    fn should_clamp_sunrise_to_earliest_allowed_time() {
        // Berlin mid-June: sunrise well before 06:24 local (UTC+2).
        let date = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let sun = sun_for(date);
        let mut trigger = TimeTrigger::builder()
            .name("open shutters")
            .kind(TriggerKind::SunriseRelative)
            .clamp(SunTimeClamp {
                earliest_sunrise: NaiveTime::from_hms_opt(6, 24, 0),
                latest_sunset: None,
            })
            .build()
            .unwrap();
        let now = utc_at(2026, 6, 15, 0, 30);
        trigger.recalc_next_fire(now, &cest(), Some(&sun), 0.0);
        // 06:24 local = 04:24 UTC, later than the astronomical sunrise.
        assert_eq!(trigger.next_fire, Some(utc_at(2026, 6, 15, 4, 24)));
    }

    #[test]
    fn should_use_astronomical_sunrise_when_clamp_is_earlier() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let sun = sun_for(date);
        let mut trigger = TimeTrigger::builder()
            .name("open shutters")
            .kind(TriggerKind::SunriseRelative)
            .clamp(SunTimeClamp {
                earliest_sunrise: NaiveTime::from_hms_opt(3, 0, 0),
                latest_sunset: None,
            })
            .build()
            .unwrap();
        let now = utc_at(2026, 6, 15, 0, 30);
        trigger.recalc_next_fire(now, &cest(), Some(&sun), 0.0);
        assert_eq!(trigger.next_fire, Some(sun.sunrise));
    }

    #[test]
    fn should_leave_sunrise_trigger_unscheduled_when_time_already_passed() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let sun = sun_for(date);
        let mut trigger = TimeTrigger::builder()
            .name("open shutters")
            .kind(TriggerKind::SunriseRelative)
            .build()
            .unwrap();
        let now = sun.sunrise + TimeDelta::hours(2);
        trigger.recalc_next_fire(now, &cest(), Some(&sun), 0.0);
        assert_eq!(trigger.next_fire, None);
    }

    #[test]
    fn should_delay_sunrise_and_advance_sunset_under_cloud_cover() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let sun = sun_for(date);
        let now = utc_at(2026, 6, 15, 0, 30);

        let mut sunrise = TimeTrigger::builder()
            .name("open")
            .kind(TriggerKind::SunriseRelative)
            .cloud_minutes(30)
            .build()
            .unwrap();
        sunrise.recalc_next_fire(now, &cest(), Some(&sun), 1.0);
        assert_eq!(sunrise.next_fire, Some(sun.sunrise + TimeDelta::minutes(30)));

        // Sign inversion on the sunset path is intentional.
        let mut sunset = TimeTrigger::builder()
            .name("close")
            .kind(TriggerKind::SunsetRelative)
            .cloud_minutes(30)
            .build()
            .unwrap();
        sunset.recalc_next_fire(now, &cest(), Some(&sun), 1.0);
        assert_eq!(sunset.next_fire, Some(sun.sunset - TimeDelta::minutes(30)));
    }

    #[test]
    fn should_clamp_sunset_to_latest_allowed_time() {
        // Berlin mid-June sunset is past 21:00 local; clamp at 21:00.
        let date = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let sun = sun_for(date);
        let mut trigger = TimeTrigger::builder()
            .name("close shutters")
            .kind(TriggerKind::SunsetRelative)
            .clamp(SunTimeClamp {
                earliest_sunrise: None,
                latest_sunset: NaiveTime::from_hms_opt(21, 0, 0),
            })
            .build()
            .unwrap();
        let now = utc_at(2026, 6, 15, 12, 0);
        trigger.recalc_next_fire(now, &cest(), Some(&sun), 0.0);
        // 21:00 local = 19:00 UTC, earlier than astronomical sunset.
        assert_eq!(trigger.next_fire, Some(utc_at(2026, 6, 15, 19, 0)));
    }

    #[test]
    fn should_stay_unscheduled_without_ephemeris() {
        let mut trigger = TimeTrigger::builder()
            .name("open")
            .kind(TriggerKind::SunriseRelative)
            .build()
            .unwrap();
        trigger.recalc_next_fire(utc_at(2026, 6, 15, 1, 0), &Utc, None, 0.0);
        assert_eq!(trigger.next_fire, None);
    }

    #[test]
    fn should_detect_stale_next_fire() {
        let mut trigger = fixed_trigger(2, 0);
        trigger.next_fire = Some(utc_at(2026, 5, 10, 2, 0));
        trigger.last_fired = Some(utc_at(2026, 5, 10, 3, 0));
        assert!(trigger.is_stale());

        trigger.mark_fired(utc_at(2026, 5, 11, 2, 0));
        assert_eq!(trigger.next_fire, None);
        assert!(!trigger.is_stale());
    }

    #[test]
    fn should_reject_invalid_clock_time() {
        let result = TimeTrigger::builder()
            .name("bad")
            .kind(TriggerKind::FixedTime { hour: 24, minute: 0 })
            .build();
        assert_eq!(
            result.unwrap_err(),
            ValidationError::InvalidClockTime { hour: 24, minute: 0 }
        );
    }

    #[test]
    fn should_reject_empty_name() {
        let result = TimeTrigger::builder()
            .kind(TriggerKind::FixedTime { hour: 1, minute: 0 })
            .build();
        assert_eq!(result.unwrap_err(), ValidationError::EmptyName);
    }
}
