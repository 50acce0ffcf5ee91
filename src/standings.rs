//! Lap statistics and standings
//!
//! Pure functions over [`Driver`] records. The controller calls them with the
//! relevant driver locks held; nothing here touches shared state.
//!
//! Two scoring rules exist:
//!
//! - **Race**: more laps wins, ties broken by lower cumulative lap time. The
//!   split is the time (or lap) difference to the car one position ahead.
//! - **Everything else**: lower best lap wins. The split is the best-lap
//!   difference to the previous driver in order.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt::Write;
use std::time::Duration;

use crate::types::{Driver, LapCompleted, SessionType};

/// Which registry collection a driver is being ranked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverGroup {
    Connected,
    Disconnected,
}

/// Order `a` relative to `b`; [`Ordering::Less`] means `a` ranks higher.
pub fn compare(session_type: SessionType, group: DriverGroup, a: &Driver, b: &Driver) -> Ordering {
    if session_type.is_race() {
        return match group {
            DriverGroup::Connected => b
                .total_laps
                .cmp(&a.total_laps)
                .then_with(|| a.total_lap_time().cmp(&b.total_lap_time())),
            // Drivers who left later rank above those who left earlier.
            DriverGroup::Disconnected => b.last_lap_completed().cmp(&a.last_lap_completed()),
        };
    }

    match (a.best_lap(), b.best_lap()) {
        (Some(a_best), Some(b_best)) => a_best.cmp(&b_best),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b
            .total_laps
            .cmp(&a.total_laps)
            .then_with(|| a.last_lap_completed().cmp(&b.last_lap_completed())),
    }
}

/// Record a completed lap against the driver's current car.
///
/// Returns `true` when the lap is a new personal best. Laps with cuts count
/// towards lap totals but never towards the best lap.
pub fn complete_lap(driver: &mut Driver, lap: &LapCompleted, now: DateTime<Utc>) -> bool {
    let lap_time = Duration::from_millis(u64::from(lap.lap_time_ms));
    driver.total_laps += 1;

    let car = driver.ensure_current_car(now);
    car.laps += 1;
    car.total_lap_time += lap_time;
    car.last_lap = lap_time;
    car.last_lap_completed = now;

    let personal_best = lap.cuts == 0 && car.best_lap.is_none_or(|best| lap_time < best);
    if personal_best {
        car.best_lap = Some(lap_time);
        car.top_speed_best_lap = car.top_speed_this_lap;
    }
    car.top_speed_this_lap = 0.0;

    personal_best
}

/// Assign positions (1-based, slice order) and splits to sorted drivers.
pub fn update_positions_and_splits(session_type: SessionType, drivers: &mut [&mut Driver]) {
    let splits: Vec<String> = (0..drivers.len())
        .map(|index| {
            if index == 0 {
                return format_split(0);
            }
            let (ahead, driver) = (&*drivers[index - 1], &*drivers[index]);
            if session_type.is_race() { race_split(ahead, driver) } else { best_lap_split(ahead, driver) }
        })
        .collect();

    for (index, (driver, split)) in drivers.iter_mut().zip(splits).enumerate() {
        driver.position = index as u32 + 1;
        driver.split = split;
    }
}

fn race_split(ahead: &Driver, driver: &Driver) -> String {
    if ahead.total_laps == driver.total_laps {
        let delta = signed_millis(driver.total_lap_time()) - signed_millis(ahead.total_lap_time());
        format_split(delta)
    } else {
        format_lap_difference(ahead.total_laps.abs_diff(driver.total_laps))
    }
}

fn best_lap_split(ahead: &Driver, driver: &Driver) -> String {
    match (ahead.best_lap(), driver.best_lap()) {
        (Some(ahead_best), Some(best)) => format_split(signed_millis(best) - signed_millis(ahead_best)),
        _ => String::new(),
    }
}

fn signed_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Render a millisecond difference the way clients expect it.
///
/// ```rust
/// use race_control::standings::format_split;
///
/// assert_eq!(format_split(0), "0s");
/// assert_eq!(format_split(450), "450ms");
/// assert_eq!(format_split(1_234), "1.234s");
/// assert_eq!(format_split(62_500), "1m2.5s");
/// assert_eq!(format_split(-3_000), "-3s");
/// ```
pub fn format_split(millis: i64) -> String {
    if millis == 0 {
        return "0s".to_owned();
    }

    let mut out = String::new();
    if millis < 0 {
        out.push('-');
    }
    let ms = millis.unsigned_abs();
    if ms < 1_000 {
        let _ = write!(out, "{ms}ms");
        return out;
    }

    let hours = ms / 3_600_000;
    let minutes = ms / 60_000 % 60;
    let seconds = ms / 1_000 % 60;
    let fraction = ms % 1_000;

    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let _ = write!(out, "{seconds}");
    if fraction > 0 {
        let digits = format!("{fraction:03}");
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out.push('s');
    out
}

/// "1 lap", "3 laps".
pub fn format_lap_difference(laps: u32) -> String {
    if laps == 1 { "1 lap".to_owned() } else { format!("{laps} laps") }
}
