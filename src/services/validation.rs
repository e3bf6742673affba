//! Request validation
//!
//! Every check collects its messages instead of stopping at the first
//! problem, so a client sees all offending fields at once.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::DateRange;

pub const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=15;
pub const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 8..=12;
pub const SUBJECT_COUNT: std::ops::RangeInclusive<usize> = 1..=5;
pub const HOLIDAY_NAME_LEN: std::ops::RangeInclusive<usize> = 3..=30;

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$";

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| match Regex::new(EMAIL_PATTERN) {
    Ok(re) => Some(re),
    Err(e) => {
        tracing::error!("Email pattern failed to compile, rejecting all emails: {}", e);
        None
    }
});

/// Collected validation messages
type Errors = Vec<String>;

fn finish<T>(errors: Errors, value: T) -> Result<T, Errors> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

fn check_len(
    errors: &mut Errors,
    field: &str,
    value: &str,
    bounds: &std::ops::RangeInclusive<usize>,
) {
    let len = value.trim().chars().count();
    if !bounds.contains(&len) {
        errors.push(format!(
            "{} must be between {} and {} characters",
            field,
            bounds.start(),
            bounds.end()
        ));
    }
}

fn check_email(errors: &mut Errors, field: &str, value: &str) {
    if !is_valid_email(value) {
        errors.push(format!("{} must be a valid email address", field));
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .map_or(false, |re| re.is_match(value.trim()))
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{} must be a date in YYYY-MM-DD format", field))
}

/// Registration fields shared by students and parents.
pub fn validate_registration(
    first_name: &str,
    last_name: &str,
    email: &str,
    password: &str,
) -> Result<(), Vec<String>> {
    let mut errors = Errors::new();
    check_len(&mut errors, "first_name", first_name, &NAME_LEN);
    check_len(&mut errors, "last_name", last_name, &NAME_LEN);
    check_email(&mut errors, "email", email);
    if !PASSWORD_LEN.contains(&password.chars().count()) {
        errors.push(format!(
            "password must be between {} and {} characters",
            PASSWORD_LEN.start(),
            PASSWORD_LEN.end()
        ));
    }
    finish(errors, ())
}

/// Trimmed, deduplicated subject names.
pub fn validate_subject_names(names: &[String]) -> Result<Vec<String>, Vec<String>> {
    let mut errors = Errors::new();
    if !SUBJECT_COUNT.contains(&names.len()) {
        errors.push(format!(
            "subject_names must contain between {} and {} entries",
            SUBJECT_COUNT.start(),
            SUBJECT_COUNT.end()
        ));
    }

    let mut cleaned: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            errors.push("subject_names must not contain empty names".to_string());
            break;
        }
        if !cleaned.iter().any(|n| n == trimmed) {
            cleaned.push(trimmed.to_string());
        }
    }
    finish(errors, cleaned)
}

pub fn validate_login(email: &str, password: &str) -> Result<(), Vec<String>> {
    let mut errors = Errors::new();
    check_email(&mut errors, "email", email);
    if password.is_empty() {
        errors.push("password is required".to_string());
    }
    finish(errors, ())
}

/// Optional profile fields; only the present ones are checked.
pub fn validate_profile_changes(
    first_name: Option<&str>,
    last_name: Option<&str>,
    email: Option<&str>,
) -> Result<(), Vec<String>> {
    let mut errors = Errors::new();
    if let Some(v) = first_name {
        check_len(&mut errors, "first_name", v, &NAME_LEN);
    }
    if let Some(v) = last_name {
        check_len(&mut errors, "last_name", v, &NAME_LEN);
    }
    if let Some(v) = email {
        check_email(&mut errors, "email", v);
    }
    finish(errors, ())
}

pub fn validate_email(email: &str) -> Result<(), Vec<String>> {
    let mut errors = Errors::new();
    check_email(&mut errors, "email", email);
    finish(errors, ())
}

pub fn validate_marks(marks: i64) -> Result<(), Vec<String>> {
    let mut errors = Errors::new();
    if marks < 0 {
        errors.push("marks must not be negative".to_string());
    }
    finish(errors, ())
}

/// Parse `start`/`end` and check `end > start` and the optional end cap.
fn parse_range(
    errors: &mut Errors,
    start: &str,
    end: Option<&str>,
    max_end: Option<NaiveDate>,
) -> Option<(NaiveDate, Option<NaiveDate>)> {
    let start = parse_date("start_date", start).map_err(|e| errors.push(e)).ok();
    let end = match end {
        Some(raw) => match parse_date("end_date", raw) {
            Ok(d) => Some(Some(d)),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        None => Some(None),
    };

    let (start, end) = (start?, end?);
    if let Some(end) = end {
        if end <= start {
            errors.push("end_date must be after start_date".to_string());
        }
        if let Some(max) = max_end {
            if end > max {
                errors.push(format!("end_date must not be after {}", max));
            }
        }
    }
    Some((start, end))
}

/// Holiday creation: name, `start >= today`, `end > start`, and the cap.
///
/// An absent end makes the holiday open-ended.
pub fn validate_holiday(
    name: &str,
    start: &str,
    end: Option<&str>,
    today: NaiveDate,
    max_end: Option<NaiveDate>,
) -> Result<(String, DateRange), Vec<String>> {
    let mut errors = Errors::new();
    check_len(&mut errors, "name", name, &HOLIDAY_NAME_LEN);

    let parsed = parse_range(&mut errors, start, end, max_end);
    if let Some((start, _)) = parsed {
        if start < today {
            errors.push("start_date must not be in the past".to_string());
        }
    }

    match parsed {
        Some((start, end)) if errors.is_empty() => Ok((
            name.trim().to_string(),
            DateRange { start, end },
        )),
        _ => Err(errors),
    }
}

/// Range query: no floor on `start`; a missing end means the start day only.
pub fn validate_range_query(
    start: &str,
    end: Option<&str>,
    max_end: Option<NaiveDate>,
) -> Result<DateRange, Vec<String>> {
    let mut errors = Errors::new();
    let parsed = parse_range(&mut errors, start, end, max_end);

    match parsed.and_then(|(start, end)| DateRange::for_query(start, end)) {
        Some(range) if errors.is_empty() => Ok(range),
        _ => Err(errors),
    }
}

pub fn validate_assignment(student_ids: &[i64], holiday_id: i64) -> Result<(), Vec<String>> {
    let mut errors = Errors::new();
    if student_ids.is_empty() {
        errors.push("studentIds must not be empty".to_string());
    }
    if holiday_id < 1 {
        errors.push("holidayId must be a positive integer".to_string());
    }
    finish(errors, ())
}

pub fn validate_holiday_id(holiday_id: i64) -> Result<(), Vec<String>> {
    let mut errors = Errors::new();
    if holiday_id < 1 {
        errors.push("holidayId must be a positive integer".to_string());
    }
    finish(errors, ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_registration_collects_every_error() {
        let errors = validate_registration("Al", "B", "not-an-email", "short").unwrap_err();
        assert_eq!(errors.len(), 4);

        assert!(validate_registration("Alan", "Turing", "alan@example.com", "enigma123").is_ok());
    }

    #[test]
    fn test_email_pattern_compiles() {
        assert!(Regex::new(EMAIL_PATTERN).is_ok());
        assert!(EMAIL_RE.is_some());
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("a.b+c@school.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a b@example.com"));
    }

    #[test]
    fn test_subject_names() {
        let names = vec![" Math ".to_string(), "Physics".to_string(), "Math".to_string()];
        assert_eq!(validate_subject_names(&names).unwrap(), vec!["Math", "Physics"]);

        assert!(validate_subject_names(&[]).is_err());
        assert!(validate_subject_names(&vec!["x".to_string(); 6]).is_err());
        assert!(validate_subject_names(&["  ".to_string()]).is_err());
    }

    #[test]
    fn test_holiday_requires_future_start_and_strict_end() {
        let today = d(2030, 1, 10);

        let (name, range) =
            validate_holiday(" Winter ", "2030-01-10", Some("2030-01-20"), today, None).unwrap();
        assert_eq!(name, "Winter");
        assert_eq!(range.end, Some(d(2030, 1, 20)));

        assert!(validate_holiday("Winter", "2030-01-09", None, today, None).is_err());
        assert!(validate_holiday("Winter", "2030-01-12", Some("2030-01-12"), today, None).is_err());
        assert!(validate_holiday("Wi", "2030-01-12", None, today, None).is_err());
    }

    #[test]
    fn test_holiday_without_end_is_open() {
        let (_, range) =
            validate_holiday("Sabbatical", "2030-02-01", None, d(2030, 1, 1), None).unwrap();
        assert!(range.is_open());
    }

    #[test]
    fn test_max_end_date_cap() {
        let cap = Some(d(2030, 12, 31));
        assert!(validate_holiday("Break", "2030-12-20", Some("2031-01-02"), d(2030, 1, 1), cap)
            .is_err());
        assert!(validate_range_query("2030-12-20", Some("2031-01-02"), cap).is_err());
        assert!(validate_range_query("2030-12-20", Some("2030-12-31"), cap).is_ok());
    }

    #[test]
    fn test_range_query_has_no_floor_and_defaults_to_one_day() {
        let range = validate_range_query("1999-05-01", None, None).unwrap();
        assert_eq!(range, DateRange::single(d(1999, 5, 1)));
    }

    #[test]
    fn test_unparseable_dates() {
        let errors = validate_range_query("2030/01/01", Some("tomorrow"), None).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_assignment_ids() {
        assert!(validate_assignment(&[1, 2], 1).is_ok());
        assert_eq!(validate_assignment(&[], 0).unwrap_err().len(), 2);
    }
}
