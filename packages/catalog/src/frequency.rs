//! Publication-cadence model.
//!
//! Maps a dataset's update-frequency label to a minimum number of days
//! between refreshes, and decides whether a refresh is due.

use chrono::{DateTime, Utc};

/// Fallback interval for unrecognized or missing frequency labels.
const DEFAULT_INTERVAL_DAYS: u32 = 180;

/// Returns the minimum number of days between refreshes for a frequency
/// label. Unrecognized labels (including the empty string) fall back to a
/// conservative six months.
#[must_use]
pub fn days_for(frequency: &str) -> u32 {
    match frequency {
        "Daily" => 1,
        "Weekly" => 7,
        "Bi-weekly" => 14,
        "Monthly" => 30,
        "Quarterly" => 90,
        "Annual" => 365,
        "Semi-annual" | "Occasional" => 180,
        _ => DEFAULT_INTERVAL_DAYS,
    }
}

/// Whether enough time has passed since the last ingestion to refresh.
///
/// Elapsed time is truncated to whole days; the boundary is inclusive
/// (exactly N days counts as due).
#[must_use]
pub fn is_due(frequency: &str, last_ingestion: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let elapsed_days = (now - last_ingestion).num_days();
    elapsed_days >= i64::from(days_for(frequency))
}

/// Decodes the source API's numeric frequency code into its label.
///
/// This is a wire-format detail: the code is decoded once at the
/// catalog-fetch boundary and the label is carried everywhere downstream.
#[must_use]
pub const fn decode_frequency(code: i64) -> &'static str {
    match code {
        1 => "Occasional",
        2 => "Biannual",
        6 => "Monthly",
        9 => "Quarterly",
        11 => "Bimonthly",
        12 => "Annual",
        13 => "Biennial",
        14 => "Triennial",
        15 => "Quinquennial",
        16 => "Decennial",
        17 => "Every 3 years",
        18 => "Census",
        19 => "Every 4 years",
        20 => "Every 6 years",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn known_labels() {
        assert_eq!(days_for("Daily"), 1);
        assert_eq!(days_for("Weekly"), 7);
        assert_eq!(days_for("Bi-weekly"), 14);
        assert_eq!(days_for("Monthly"), 30);
        assert_eq!(days_for("Quarterly"), 90);
        assert_eq!(days_for("Semi-annual"), 180);
        assert_eq!(days_for("Annual"), 365);
        assert_eq!(days_for("Occasional"), 180);
    }

    #[test]
    fn unknown_labels_default_to_six_months() {
        assert_eq!(days_for("Fortnightly-ish"), 180);
        assert_eq!(days_for(""), 180);
        assert_eq!(days_for("monthly"), 180); // case-sensitive
    }

    #[test]
    fn due_boundary_is_inclusive() {
        let last = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let day = chrono::Duration::days(1);

        assert!(!is_due("Monthly", last, last + day * 29));
        assert!(is_due("Monthly", last, last + day * 30));
        assert!(is_due("Monthly", last, last + day * 31));
    }

    #[test]
    fn fractional_days_are_truncated() {
        let last = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        // 29 days and 23 hours truncates to 29 whole days: not due.
        let almost = last + chrono::Duration::days(29) + chrono::Duration::hours(23);
        assert!(!is_due("Monthly", last, almost));
    }

    #[test]
    fn decodes_wire_codes() {
        assert_eq!(decode_frequency(1), "Occasional");
        assert_eq!(decode_frequency(6), "Monthly");
        assert_eq!(decode_frequency(9), "Quarterly");
        assert_eq!(decode_frequency(12), "Annual");
        assert_eq!(decode_frequency(18), "Census");
        assert_eq!(decode_frequency(99), "Unknown");
        assert_eq!(decode_frequency(-1), "Unknown");
    }
}
