// Utility helpers for parsing and basic statistics.
//
// This module centralizes the "dirty" CSV/number/date handling so the rest
// of the code can assume clean, typed values.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use serde::Deserialize;

/// Separator convention of a table's numeric cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    /// `1,234.5` (listing exports, pandas defaults).
    #[default]
    DecimalPoint,
    /// `1.234,5` (Spanish statistics portals).
    DecimalComma,
}

impl NumberFormat {
    /// `(thousands, decimal)` separators.
    const fn separators(self) -> (char, char) {
        match self {
            Self::DecimalPoint => (',', '.'),
            Self::DecimalComma => ('.', ','),
        }
    }
}

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in listing exports.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace and strips currency/percent decorations (`€`, `$`, `%`).
/// - Rejects values that contain alphabetic characters (`"nan"`, `"N/A"`).
/// - Drops thousands separators only where they group exactly three
///   digits; `"2,5"` under [`NumberFormat::DecimalPoint`] is rejected
///   instead of being read as `25`.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>, format: NumberFormat) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '%' | ' '))
        .collect();
    let (sign, unsigned) = match cleaned.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };

    let (thousands, decimal) = format.separators();
    let (int_part, frac_part) = match unsigned.split_once(decimal) {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (unsigned, None),
    };
    let mut normalized = format!("{sign}{}", ungroup(int_part, thousands)?);
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        normalized.push('.');
        normalized.push_str(frac);
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

// Integer digits with thousands separators removed; every group after the
// first must have exactly three digits.
fn ungroup(int_part: &str, thousands: char) -> Option<String> {
    let mut groups = int_part.split(thousands);
    let lead = groups.next().unwrap_or_default();
    let rest: Vec<&str> = groups.collect();
    if !rest.is_empty() && (!(1..=3).contains(&lead.len()) || rest.iter().any(|g| g.len() != 3)) {
        return None;
    }
    let digits: String = std::iter::once(lead).chain(rest).collect();
    digits.chars().all(|c| c.is_ascii_digit()).then_some(digits)
}

/// Parse a whole-number column. Exports frequently write integers as
/// `"200.0"`, so any value with no fractional part is accepted.
pub fn parse_i64_safe(s: Option<&str>, format: NumberFormat) -> Option<i64> {
    let v = parse_f64_safe(s, format)?;
    if v.fract() != 0.0 {
        return None;
    }
    Some(v as i64)
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    // Review dates are `YYYY-MM-DD`; some regional exports use `DD/MM/YYYY`.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .ok()
}

/// Treat blank cells as missing.
pub fn non_empty(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Number of entries in an amenities cell.
///
/// Sources ship either a comma-separated list or a JSON-style array such as
/// `["Wifi", "Kitchen"]`; an empty array counts as zero.
pub fn count_amenities(raw: &str) -> usize {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .filter(|item| !item.trim().trim_matches('"').trim().is_empty())
        .count()
}

pub fn average(v: &[f64]) -> Option<f64> {
    // Arithmetic mean; `None` for an empty slice so callers never see NaN.
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

/// Sample standard deviation (n - 1 denominator), `None` below two values.
pub fn std_dev(v: &[f64]) -> Option<f64> {
    if v.len() < 2 {
        return None;
    }
    let mean = average(v)?;
    let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (v.len() - 1) as f64;
    Some(var.sqrt())
}

/// Quantile with linear interpolation between closest ranks.
///
/// Expects `sorted` in ascending order and `q` in `0.0..=1.0`.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

/// Like [`format_number`] but renders missing values as `N/A`.
pub fn format_opt(n: Option<f64>, decimals: usize) -> String {
    n.map(|v| format_number(v, decimals))
        .unwrap_or_else(|| "N/A".to_string())
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for counts in console messages
    // (e.g., `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}
