//! Open-slot computation.
//!
//! Everything here is pure: callers load the blocking appointments for the
//! window and pass the current time in. Arithmetic on caller-supplied times
//! is checked, so dates at the edge of chrono's range fail validation.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::config::SchedulingConfig;
use crate::error::{Error, Result};
use crate::model::{Appointment, Location, Service};

/// Longest date range one availability query may cover.
pub const MAX_QUERY_DAYS: i64 = 31;

/// `time + delta`, or a validation error if that is not representable.
///
/// # Errors
///
/// Returns a validation error on overflow.
pub fn add_checked(time: DateTime<Utc>, delta: Duration) -> Result<DateTime<Utc>> {
    time.checked_add_signed(delta).ok_or_else(out_of_range)
}

/// `time - delta`, or a validation error if that is not representable.
///
/// # Errors
///
/// Returns a validation error on overflow.
pub fn sub_checked(time: DateTime<Utc>, delta: Duration) -> Result<DateTime<Utc>> {
    time.checked_sub_signed(delta).ok_or_else(out_of_range)
}

fn out_of_range() -> Error {
    Error::validation("date is out of range")
}

/// Slot constraints taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRules {
    /// Practice local time zone.
    pub offset: FixedOffset,
    /// Spacing of start times from opening.
    pub increment: Duration,
    /// Gap kept clear around existing appointments.
    pub buffer: Duration,
    /// How far ahead of now a slot must start.
    pub min_notice: Duration,
    /// How far ahead of now a slot may start.
    pub horizon: Duration,
}

impl SlotRules {
    /// Rules from the scheduling section of the configuration.
    #[must_use]
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            offset: config.local_offset(),
            increment: config.slot_increment(),
            buffer: config.buffer(),
            min_notice: config.min_notice(),
            horizon: config.booking_horizon(),
        }
    }

    /// UTC bounds `[start of from, end of to)` of an inclusive local date range.
    ///
    /// # Errors
    ///
    /// Returns a validation error if either bound is not representable.
    pub fn day_bounds(&self, from: NaiveDate, to: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.local_to_utc(from, NaiveTime::default());
        let end = to
            .succ_opt()
            .and_then(|next| self.local_to_utc(next, NaiveTime::default()));
        start.zip(end).ok_or_else(out_of_range)
    }

    /// Check that an inclusive local date range reaches into the days a
    /// slot may currently fall on.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the whole range is in the past or
    /// beyond the booking horizon.
    pub fn check_bookable_dates(&self, from: NaiveDate, to: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        let latest = add_checked(now, self.horizon)?;
        if from > latest.with_timezone(&self.offset).date_naive() {
            return Err(Error::validation(format!(
                "appointments can be booked at most {} days ahead",
                self.horizon.num_days()
            )));
        }
        if to < now.with_timezone(&self.offset).date_naive() {
            return Err(Error::validation("dates in the past cannot be booked"));
        }
        Ok(())
    }

    /// Earliest and latest start time a slot may have at `now`.
    fn bookable_window(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((
            now.checked_add_signed(self.min_notice)?,
            now.checked_add_signed(self.horizon)?,
        ))
    }

    fn local_to_utc(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        // A fixed offset has no gaps or folds
        date.and_time(time)
            .checked_sub_signed(self.offset_duration())
            .map(|t| t.and_utc())
    }

    fn offset_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.offset.local_minus_utc()))
    }
}

/// Validate an inclusive local date range for an availability query.
///
/// # Errors
///
/// Returns a validation error if `to` precedes `from` or the range is too long.
pub fn check_range(from: NaiveDate, to: NaiveDate) -> Result<()> {
    if to < from {
        return Err(Error::validation("`to` must not be before `from`"));
    }
    if (to - from).num_days() >= MAX_QUERY_DAYS {
        return Err(Error::validation(format!(
            "date range must cover at most {MAX_QUERY_DAYS} days"
        )));
    }
    Ok(())
}

/// Availability of one service at one location.
#[derive(Debug, Clone, Copy)]
pub struct Availability<'a> {
    rules: SlotRules,
    location: &'a Location,
    service: &'a Service,
    blocking: &'a [Appointment],
    exclude_id: Option<&'a str>,
}

impl<'a> Availability<'a> {
    /// Availability given the appointments that currently hold time.
    #[must_use]
    pub fn new(
        rules: SlotRules,
        location: &'a Location,
        service: &'a Service,
        blocking: &'a [Appointment],
    ) -> Self {
        Self {
            rules,
            location,
            service,
            blocking,
            exclude_id: None,
        }
    }

    /// Ignore one appointment, so a rescheduling appointment can move into
    /// or next to its own old slot.
    #[must_use]
    pub fn excluding(mut self, appointment_id: &'a str) -> Self {
        self.exclude_id = Some(appointment_id);
        self
    }

    /// Open slot start times within an inclusive local date range, in order.
    #[must_use]
    pub fn open_slots(&self, from: NaiveDate, to: NaiveDate, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut slots = Vec::new();
        if !self.location.active || !self.service.active || self.rules.increment <= Duration::zero() {
            return slots;
        }
        let Some((earliest, latest)) = self.rules.bookable_window(now) else {
            return slots;
        };

        for date in from.iter_days().take_while(|d| *d <= to) {
            let mut hours: Vec<_> = self.location.hours_on(date.weekday()).collect();
            hours.sort_by_key(|h| h.opens);
            for window in hours {
                let (Some(mut start), Some(closes)) = (
                    self.rules.local_to_utc(date, window.opens),
                    self.rules.local_to_utc(date, window.closes),
                ) else {
                    continue;
                };
                while let Some(end) = start.checked_add_signed(self.duration()) {
                    if end > closes {
                        break;
                    }
                    if start >= earliest && start <= latest && self.is_free(start, end) {
                        slots.push(start);
                    }
                    match start.checked_add_signed(self.rules.increment) {
                        Some(next) => start = next,
                        None => break,
                    }
                }
            }
        }
        slots.sort();
        slots.dedup();
        slots
    }

    /// Check that `start` is a slot [`open_slots`](Self::open_slots) would offer.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the time is too soon, too far out,
    /// outside working hours, or off the slot grid, and a conflict if
    /// another appointment holds it.
    pub fn check_slot(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if !self.location.active {
            return Err(Error::validation("location is not accepting bookings"));
        }
        if !self.service.active {
            return Err(Error::validation("service is not offered"));
        }
        let (earliest, latest) = self.rules.bookable_window(now).ok_or_else(out_of_range)?;
        if start < earliest {
            return Err(Error::validation(format!(
                "appointments must be booked at least {} hours in advance",
                self.rules.min_notice.num_hours()
            )));
        }
        if start > latest {
            return Err(Error::validation(format!(
                "appointments can be booked at most {} days ahead",
                self.rules.horizon.num_days()
            )));
        }
        let end = add_checked(start, self.duration())?;
        if !self.fits_hours(start, end) {
            return Err(Error::validation(
                "start time is outside working hours or not on the booking grid",
            ));
        }
        if !self.is_free(start, end) {
            return Err(Error::conflict("that time is no longer available"));
        }
        Ok(())
    }

    fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.service.duration_minutes))
    }

    fn fits_hours(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let local = start.with_timezone(&self.rules.offset);
        let date = local.date_naive();
        let increment = self.rules.increment.num_seconds();
        self.location.hours_on(date.weekday()).any(|window| {
            let (Some(opens), Some(closes)) = (
                self.rules.local_to_utc(date, window.opens),
                self.rules.local_to_utc(date, window.closes),
            ) else {
                return false;
            };
            start >= opens
                && end <= closes
                && increment > 0
                && (start - opens).num_seconds() % increment == 0
        })
    }

    fn is_free(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !self
            .blocking
            .iter()
            .filter(|a| a.status.blocks_slot())
            .filter(|a| Some(a.id.as_str()) != self.exclude_id)
            .any(|a| a.overlaps(start, end, self.rules.buffer))
    }
}
