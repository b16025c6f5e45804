//! Input normalization for phone numbers, postal codes and dates
//!
//! Converts what a person types into the canonical, storage-ready form the
//! record service keeps, and back into the display form the forms show.
//! Nothing here fails loudly: unparsable input yields an empty string or
//! `None`.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};

/// National country calling code prefixed by [`to_e164`].
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// Maximum digits in a national phone number (2 area + 9 subscriber).
pub const PHONE_MAX_DIGITS: usize = 11;

/// Minimum digits accepted when a phone number is submitted for issuance.
pub const PHONE_MIN_DIGITS: usize = 10;

/// Digits in a postal code (CEP).
pub const POSTAL_CODE_DIGITS: usize = 8;

/// Keep only ASCII digits.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Mask a phone number as `(DD) DDDD-DDDD` (landline) or `(DD) DDDDD-DDDD`
/// (mobile).
///
/// The mask is always re-derived from the digits, so masking an already
/// masked value is a no-op. Fewer than six digits are returned bare, since
/// there is not yet enough to place the separators.
pub fn normalize_phone(raw: &str) -> String {
    let mut digits = digits_only(raw);
    digits.truncate(PHONE_MAX_DIGITS);

    let local = if digits.len() <= 10 { 4 } else { 5 };
    if digits.len() < 2 + local {
        return digits;
    }

    let (area, rest) = digits.split_at(2);
    let (prefix, line) = rest.split_at(local);
    format!("({}) {}-{}", area, prefix, line)
}

/// Whether a phone value has enough digits to be submitted.
pub fn is_valid_phone(raw: &str) -> bool {
    digits_only(raw).len() >= PHONE_MIN_DIGITS
}

/// Convert a (possibly masked) phone number to digits with the country code.
///
/// Any number that already starts with the country code digits is assumed to
/// be prefixed. A local number whose area code happens to equal the country
/// code is therefore left as is; see DESIGN.md for this open question.
pub fn to_e164(masked: &str, country_code: &str) -> String {
    let digits = digits_only(masked);
    if digits.is_empty() || digits.starts_with(country_code) {
        digits
    } else {
        format!("{}{}", country_code, digits)
    }
}

/// Strip the country code from an international number so it fits the
/// national mask. Numbers that are already national are returned unchanged.
pub fn to_national(raw: &str, country_code: &str) -> String {
    let digits = digits_only(raw);
    if digits.len() > PHONE_MAX_DIGITS {
        if let Some(national) = digits.strip_prefix(country_code) {
            return national.to_string();
        }
    }
    digits
}

/// Mask a postal code as `DDDDD-DDD`.
pub fn normalize_postal_code(raw: &str) -> String {
    let mut digits = digits_only(raw);
    digits.truncate(POSTAL_CODE_DIGITS);

    if digits.len() < 5 {
        return digits;
    }
    let (head, tail) = digits.split_at(5);
    format!("{}-{}", head, tail)
}

/// The two ways a date is shown and typed in the forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateConvention {
    /// Free text `dd/mm/yyyy`
    SlashText,
    /// Date picker bound to an ISO value (`yyyy-mm-dd` or a full instant)
    IsoPicker,
}

/// Parse a display value into the canonical instant (midnight UTC).
pub fn to_canonical_date(display: &str, convention: DateConvention) -> Option<DateTime<Utc>> {
    let display = display.trim();
    let date = match convention {
        DateConvention::SlashText => NaiveDate::parse_from_str(display, "%d/%m/%Y").ok()?,
        DateConvention::IsoPicker => parse_iso_date(display)?,
    };
    Some(midnight_utc(date))
}

/// Render a stored value in the given display convention.
///
/// Returns an empty string when the stored value is empty or unparsable.
pub fn to_display_date(stored: &str, convention: DateConvention) -> String {
    match parse_stored_date(stored) {
        Some(date) => match convention {
            DateConvention::SlashText => date.format("%d/%m/%Y").to_string(),
            DateConvention::IsoPicker => date.format("%Y-%m-%d").to_string(),
        },
        None => String::new(),
    }
}

/// Storage form of a canonical instant, e.g. `1990-05-17T00:00:00.000Z`.
pub fn canonical_string(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored date value.
///
/// Accepts the canonical instant, a bare ISO date, and the `dd/mm/yyyy` text
/// older records were saved with.
pub fn parse_stored_date(stored: &str) -> Option<NaiveDate> {
    let stored = stored.trim();
    if stored.is_empty() {
        return None;
    }
    parse_iso_date(stored).or_else(|| NaiveDate::parse_from_str(stored, "%d/%m/%Y").ok())
}

/// Canonical storage form of a stored date in any accepted shape, e.g.
/// `17/05/1990` -> `1990-05-17T00:00:00.000Z`.
pub fn to_canonical_stored(stored: &str) -> Option<String> {
    parse_stored_date(stored).map(|date| canonical_string(&midnight_utc(date)))
}

/// Whether a stored date field may be submitted: empty or a parsable date.
pub fn is_submittable_date(stored: &str) -> bool {
    stored.trim().is_empty() || parse_stored_date(stored).is_some()
}

fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc).date_naive());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}
