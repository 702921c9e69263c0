//! Interpretation of digitizer stdout.
//!
//! The digitizer prints free text, optionally with one JSON object per line.
//! The first line holding a JSON object is the payload; when none is found the
//! raw text is wrapped in a fallback payload instead. The planner date is read
//! from the payload's `date` field or, failing that, from date-like text.

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

use crate::models::ExtractionOutput;

static JSON_DATE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""date":\s*"([^"]+)""#).unwrap());

static MONTH_NAME_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+)\s+(\d{1,2}),?\s+(\d{4})").unwrap());

/// Numeric date patterns in the order they are tried.
static NUMERIC_DATE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // 2025-05-28
        (Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(), "ymd"),
        // 5/28/2025
        (Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap(), "mdy"),
    ]
});

const DATE_STRING_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%B %d, %Y", "%b %d, %Y"];

/// Build an `ExtractionOutput` from the full stdout of one digitizer run.
pub fn parse_output(stdout: &str, parser_type: &str) -> ExtractionOutput {
    let data = first_json_object(stdout).unwrap_or_else(|| {
        json!({
            "raw_output": stdout,
            "processed_at": Local::now().to_rfc3339(),
            "parser_type": parser_type,
        })
    });

    let date = data
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_date_str)
        .or_else(|| extract_date(stdout));

    ExtractionOutput { date, data }
}

fn first_json_object(stdout: &str) -> Option<Value> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{') && line.ends_with('}'))
        .find_map(|line| serde_json::from_str::<Value>(line).ok().filter(Value::is_object))
}

/// Find the first recognisable date anywhere in `text`.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    let from_field = JSON_DATE_FIELD
        .captures_iter(text)
        .find_map(|caps| parse_date_str(&caps[1]));
    if from_field.is_some() {
        return from_field;
    }

    if let Some(date) = MONTH_NAME_DATE.captures_iter(text).find_map(|caps| {
        from_month_name(&caps[1], &caps[2], &caps[3])
    }) {
        return Some(date);
    }

    for (pattern, format) in NUMERIC_DATE_PATTERNS.iter() {
        if let Some(date) = pattern
            .captures_iter(text)
            .find_map(|caps| parse_captured_date(&caps, format))
        {
            return Some(date);
        }
    }

    None
}

/// Parse a standalone date string such as `2025-05-28` or `May 28, 2025`.
pub fn parse_date_str(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_STRING_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            let caps = MONTH_NAME_DATE.captures(value)?;
            from_month_name(&caps[1], &caps[2], &caps[3])
        })
}

fn parse_captured_date(caps: &regex::Captures, format: &str) -> Option<NaiveDate> {
    match format {
        "ymd" => {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        "mdy" => {
            let month: u32 = caps.get(1)?.as_str().parse().ok()?;
            let day: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

fn from_month_name(month: &str, day: &str, year: &str) -> Option<NaiveDate> {
    let month = month_number(month)?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_ascii_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_json_line_is_the_payload() {
        let stdout = "Loading model...\n{\"date\": \"2025-05-28\", \"tasks\": [\"call mom\"]}\n{\"date\": \"2025-06-01\"}\n";
        let output = parse_output(stdout, "gpt4_vision");

        assert_eq!(output.date, Some(ymd(2025, 5, 28)));
        assert_eq!(output.data["tasks"][0], "call mom");
    }

    #[test]
    fn test_fallback_payload_keeps_raw_text() {
        let stdout = "Planner page for Wednesday, May 28, 2025\nNo structured output";
        let output = parse_output(stdout, "gpt4_vision");

        assert_eq!(output.data["raw_output"], stdout);
        assert_eq!(output.data["parser_type"], "gpt4_vision");
        assert!(output.data["processed_at"].is_string());
        assert_eq!(output.date, Some(ymd(2025, 5, 28)));
    }

    #[test]
    fn test_json_array_line_is_not_a_payload() {
        let output = parse_output("[1, 2, 3]\n", "test");
        assert!(output.data.get("raw_output").is_some());
        assert_eq!(output.date, None);
    }

    #[test]
    fn test_date_patterns() {
        assert_eq!(extract_date("scanned 2025-05-28 at noon"), Some(ymd(2025, 5, 28)));
        assert_eq!(extract_date("due 5/28/2025"), Some(ymd(2025, 5, 28)));
        assert_eq!(extract_date("Sept 3 2024 notes"), Some(ymd(2024, 9, 3)));
        assert_eq!(extract_date("Page 3, 2025 then 2025-01-02"), Some(ymd(2025, 1, 2)));
        assert_eq!(extract_date("no dates here"), None);
    }

    #[test]
    fn test_date_string_formats() {
        assert_eq!(parse_date_str("2025-05-28"), Some(ymd(2025, 5, 28)));
        assert_eq!(parse_date_str("05/28/2025"), Some(ymd(2025, 5, 28)));
        assert_eq!(parse_date_str("28/05/2025"), Some(ymd(2025, 5, 28)));
        assert_eq!(parse_date_str("May 28, 2025"), Some(ymd(2025, 5, 28)));
        assert_eq!(parse_date_str("Dec 1, 2024"), Some(ymd(2024, 12, 1)));
        assert_eq!(parse_date_str("someday"), None);
    }
}
