//! The wall-clock window around the THOR invocation, as recorded by `date` on the instance.

use chrono::NaiveDateTime;

use super::AnalysisError;

/// `date` output with the zone token removed, e.g. `Thu Jun 29 05:58:38 2023`.
const DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Parse the default output of `date`, e.g. `Thu Jun 29 05:58:38 UTC 2023`.
///
/// Both ends of the window are written by the same host, so the zone is dropped rather than
/// interpreted. `date` pads single-digit days with a space, which splitting on whitespace absorbs.
pub fn parse_timestamp(timestamp: &str) -> Result<NaiveDateTime, AnalysisError> {
    let bad = || AnalysisError::BadTimestamp {
        timestamp: timestamp.trim().into(),
    };

    let fields: Vec<&str> = timestamp.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(bad());
    }

    let without_zone = [fields[0], fields[1], fields[2], fields[3], fields[5]].join(" ");
    NaiveDateTime::parse_from_str(&without_zone, DATE_FORMAT).map_err(|_| bad())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ExecutionWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, AnalysisError> {
        let start = parse_timestamp(start)?;
        let end = parse_timestamp(end)?;

        if end < start {
            return Err(AnalysisError::NegativeWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        Ok(ExecutionWindow { start, end })
    }

    pub fn seconds(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn date_output() {
        let ts = parse_timestamp("Thu Jun 29 05:58:38 UTC 2023\n").unwrap();
        assert_eq!(ts.to_string(), "2023-06-29 05:58:38");
    }

    #[test]
    fn space_padded_day() {
        let ts = parse_timestamp("Fri Jun  9 23:01:02 UTC 2023").unwrap();
        assert_eq!(ts.to_string(), "2023-06-09 23:01:02");
    }

    #[test]
    fn garbage() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2023-06-29T05:58:38Z").is_err());
        assert!(parse_timestamp("Thu Jun 29 25:58:38 UTC 2023").is_err());
    }

    #[test]
    fn window_across_midnight() {
        let window = ExecutionWindow::parse(
            "Wed Jun 28 23:30:00 UTC 2023",
            "Thu Jun 29 01:00:30 UTC 2023",
        )
        .unwrap();
        assert_eq!(window.seconds(), 5430.0);
    }

    #[test]
    fn end_before_start() {
        let err = ExecutionWindow::parse(
            "Thu Jun 29 05:58:38 UTC 2023",
            "Thu Jun 29 05:58:37 UTC 2023",
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::NegativeWindow { .. }));
    }
}
