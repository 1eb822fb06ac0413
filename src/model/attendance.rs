use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Composite identity of an attendance record: one record per employee per
/// calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub employee_id: u64,
    pub date: NaiveDate,
}

impl RecordKey {
    pub fn new(employee_id: u64, date: NaiveDate) -> Self {
        Self { employee_id, date }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    OnLeave,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2024-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,

    #[schema(example = "2024-01-05T09:00:00Z", format = "date-time", value_type = Option<String>)]
    pub check_in_at: Option<DateTime<Utc>>,
    pub check_in_location: Option<String>,
    pub check_in_ip: Option<String>,
    pub check_in_photo_path: Option<String>,
    pub check_in_photo_mime: Option<String>,

    #[schema(example = "2024-01-05T17:30:00Z", format = "date-time", value_type = Option<String>)]
    pub check_out_at: Option<DateTime<Utc>>,
    pub check_out_location: Option<String>,
    pub check_out_ip: Option<String>,
    pub check_out_photo_path: Option<String>,
    pub check_out_photo_mime: Option<String>,

    pub status: AttendanceStatus,
    #[schema(example = 30600)]
    pub worked_seconds: Option<i64>,
    pub note: Option<String>,
}

impl AttendanceRecord {
    /// An untouched record for the given key: no events applied yet,
    /// `status` defaulting to `present` as the table schema does.
    pub fn blank(key: &RecordKey) -> Self {
        Self {
            employee_id: key.employee_id,
            date: key.date,
            check_in_at: None,
            check_in_location: None,
            check_in_ip: None,
            check_in_photo_path: None,
            check_in_photo_mime: None,
            check_out_at: None,
            check_out_location: None,
            check_out_ip: None,
            check_out_photo_path: None,
            check_out_photo_mime: None,
            status: AttendanceStatus::Present,
            worked_seconds: None,
            note: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.employee_id, self.date)
    }

    /// `worked_seconds` rendered as `HH:MM:SS`, if the day is complete.
    pub fn worked_duration(&self) -> Option<String> {
        let secs = self.worked_seconds?;
        Some(format!(
            "{:02}:{:02}:{:02}",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_duration_formats_hours_minutes_seconds() {
        let key = RecordKey::new(1, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let rec = AttendanceRecord {
            worked_seconds: Some(30600),
            ..AttendanceRecord::blank(&key)
        };
        assert_eq!(rec.worked_duration().as_deref(), Some("08:30:00"));

        let incomplete = AttendanceRecord {
            worked_seconds: None,
            ..rec
        };
        assert_eq!(incomplete.worked_duration(), None);
    }
}
