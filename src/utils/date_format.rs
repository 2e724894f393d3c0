use chrono::{DateTime, NaiveDateTime, Utc};

use crate::utils::errors::ServiceError;

/// Wire format for every date the API accepts or returns, e.g. `25/12/2026 09:30 AM`.
pub const DATE_FORMAT: &str = "%d/%m/%Y %I:%M %p";

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<DateTime<Utc>, ServiceError> {
    NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            ServiceError::validation("Invalid date, expected format dd/mm/yyyy hh:mm AM")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn formats_with_twelve_hour_clock() {
        let date = Utc.with_ymd_and_hms(2026, 12, 25, 21, 5, 0).unwrap();
        assert_eq!(format_date(&date), "25/12/2026 09:05 PM");
    }

    #[test]
    fn parses_afternoon_times() {
        let date = parse_date("01/02/2027 01:30 PM").unwrap();
        assert_eq!(date.hour(), 13);
        assert_eq!(date.minute(), 30);
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2027-02-01");
    }

    #[test]
    fn rejects_iso_dates() {
        let err = parse_date("2027-02-01T13:30:00Z").unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
