pub mod activity;
pub mod ai;
pub mod reminders;
pub mod streaks;

use chrono::{Local, NaiveDate};

/// Calendar day in the server's local time zone. Entry, schedule and
/// activity dates are all bucketed by this.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
