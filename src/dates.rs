use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Formats tried in order when a stored date has to be interpreted.
const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &["%d-%m-%Y %H:%M:%S"];

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year pattern"));

/// Convert a `DD-MM-YYYY[ HH:MM:SS]` notification date to `MM/DD/YYYY`.
///
/// Anything that does not split into three numeric parts is returned as is.
pub fn convert_source_b_date(raw: &str) -> String {
    let date_part = raw.split(' ').next().unwrap_or_default();
    let parts: Vec<&str> = date_part.split('-').collect();
    if parts.len() != 3 {
        return raw.to_string();
    }

    let numbers: Result<Vec<u32>, _> = parts
        .iter()
        .map(|part| part.trim().parse::<u32>())
        .collect();
    match numbers.as_deref() {
        Ok([day, month, year]) => format!("{month:02}/{day:02}/{year}"),
        _ => raw.to_string(),
    }
}

/// Best-effort parse of a stored date string.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    // Datetime formats first: a date-only format would reject the trailing time anyway.
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|datetime| datetime.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        })
}

/// First plausible four-digit year (1900-2099) found in the text.
pub fn extract_year(value: &str) -> Option<String> {
    YEAR.find(value).map(|found| found.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_notification_datetime() {
        assert_eq!(convert_source_b_date("05-03-2024 10:00:00"), "03/05/2024");
        assert_eq!(convert_source_b_date("2-1-2024"), "01/02/2024");
    }

    #[test]
    fn passes_through_unparseable_dates() {
        assert_eq!(convert_source_b_date(""), "");
        assert_eq!(convert_source_b_date("03/05/2024"), "03/05/2024");
        assert_eq!(convert_source_b_date("aa-bb-cccc"), "aa-bb-cccc");
        assert_eq!(convert_source_b_date("2024-03"), "2024-03");
        assert_eq!(convert_source_b_date("01-02-03-04"), "01-02-03-04");
    }

    #[test]
    fn parses_canonical_and_legacy_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date("03/05/2024"), Some(expected));
        assert_eq!(parse_date("05-03-2024 10:00:00"), Some(expected));
        assert_eq!(parse_date("2024-03-05"), Some(expected));
        assert_eq!(parse_date("March 05, 2024"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("  "), None);
    }

    #[test]
    fn extracts_year_from_free_text() {
        assert_eq!(extract_year("03/05/2024").as_deref(), Some("2024"));
        assert_eq!(extract_year("reported 1999-ish"), Some("1999".to_string()));
        assert_eq!(extract_year("12345"), None);
        assert_eq!(extract_year(""), None);
    }
}
