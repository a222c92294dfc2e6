use chrono::{Datelike, Days, Duration, Local, NaiveDate};

/// Widest window the activity grid will render, about ten years.
pub const MAX_GRID_DAYS: u32 = 3660;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The `days` calendar days ending at `today`, oldest first. Capped at
/// [`MAX_GRID_DAYS`] and at the earliest representable date.
pub fn last_n_days(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    let Some(back) = days.min(MAX_GRID_DAYS).checked_sub(1) else {
        return Vec::new();
    };
    let start = today
        .checked_sub_days(Days::new(u64::from(back)))
        .unwrap_or(NaiveDate::MIN);
    start.iter_days().take_while(|d| *d <= today).collect()
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// "Today", "Yesterday", or e.g. "Monday, Mar 3".
pub fn relative_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if Some(date) == today.pred_opt() {
        "Yesterday".to_string()
    } else {
        date.format("%A, %b %-d").to_string()
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
