use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Explicit layouts first (day-month-year before year-month-day, matching
/// how the source exports are actually written), then a permissive tail.
const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d %b %Y",
];

/// Parse a loosely formatted date. Missing input is `None`; input that no
/// layout accepts is logged and also `None`. Callers must treat `None` as
/// "unknown", never as an error.
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty())?;

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    // Timestamp-style exports ("2024-01-15 00:00:00"): take the date part.
    if let Some(date_part) = raw.split_whitespace().next() {
        if date_part != raw {
            for fmt in DATE_FORMATS {
                if let Ok(d) = NaiveDate::parse_from_str(date_part, fmt) {
                    return Some(d);
                }
            }
        }
    }

    warn!(value = raw, "failed to parse date");
    None
}

/// Clock times come as "09:05:00", occasionally without seconds.
pub fn parse_time(value: Option<&str>) -> Option<NaiveTime> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty())?;

    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| warn!(value = raw, "failed to parse time"))
        .ok()
}

static YEARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*year").unwrap());
static MONTHS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*month").unwrap());
static DAYS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*day").unwrap());

/// Convert free text like "4 years 1 months 25 days" to decimal years,
/// rounded to 2 decimal places. Each component is optional and defaults to
/// zero; a bare numeric value is taken as years directly. Lossy on purpose:
/// anything unrecognizable yields 0.0, never an error.
pub fn parse_experience(value: &str) -> f64 {
    let text = value.trim().to_lowercase();
    if text.is_empty() {
        return 0.0;
    }
    // Some exports carry pre-computed decimal years ("4.5") rather than the
    // worded form; accept those as-is instead of zeroing them.
    if let Ok(years) = text.parse::<f64>() {
        return (years * 100.0).round() / 100.0;
    }

    let capture = |re: &Regex| {
        re.captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let years = capture(&YEARS_RE);
    let months = capture(&MONTHS_RE);
    let days = capture(&DAYS_RE);

    let total = years + months / 12.0 + days / 365.0;
    (total * 100.0).round() / 100.0
}

/// Plain float parse for hour columns; garbage is logged and dropped.
pub fn parse_hours(value: &str) -> Option<f64> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(value = raw, "failed to parse hours");
            None
        }
    }
}

fn wrap_char(c: char) -> char {
    match c {
        '0'..='9' => char::from_digit((c.to_digit(10).unwrap() + 1) % 10, 10).unwrap(),
        'a'..='z' | 'A'..='Z' => {
            let upper = c.to_ascii_uppercase();
            (((upper as u8 - b'A' + 1) % 26) + b'A') as char
        }
        other => other,
    }
}

/// Find a value not present in `taken` by deterministically perturbing the
/// identifier, starting at the last character (digits wrap 0-9, letters wrap
/// A-Z). If every variant of a position is taken, the walk moves one
/// character toward the front. Used for government ID columns that carry a
/// uniqueness constraint; the perturbed value is synthetic, not a corrected
/// identifier.
pub fn disambiguate_identifier(value: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(value) {
        return value.to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    for pos in (0..chars.len()).rev() {
        if !chars[pos].is_ascii_alphanumeric() {
            continue;
        }
        let mut candidate = chars.clone();
        loop {
            candidate[pos] = wrap_char(candidate[pos]);
            if candidate[pos] == chars[pos] {
                break; // full cycle at this position, step left
            }
            let s: String = candidate.iter().collect();
            if !taken.contains(&s) {
                return s;
            }
        }
    }

    // Degenerate case: every single-position variant is taken. Extend the
    // value until it is free; still deterministic.
    let mut s = value.to_string();
    while taken.contains(&s) {
        s.push('0');
    }
    s
}
