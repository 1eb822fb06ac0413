use crate::attendance::evidence::Evidence;
use crate::attendance::store::{AttendanceRepo, AttendanceStore, StoreError};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, RecordKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Why a check-in or check-out intent was turned away. These are expected,
/// caller-recoverable outcomes, never faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadyCheckedIn,
    AlreadyCheckedOut,
    NotCheckedIn,
    /// Check-out timestamp precedes the stored check-in (clock skew or a
    /// tampered submission). Negative durations are rejected, not clamped.
    CheckOutBeforeCheckIn,
}

impl RejectReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::AlreadyCheckedIn => "You have already checked in today.",
            RejectReason::AlreadyCheckedOut => "You have already checked out today.",
            RejectReason::NotCheckedIn => "You have not checked in yet.",
            RejectReason::CheckOutBeforeCheckIn => {
                "Check-out time precedes today's check-in."
            }
        }
    }
}

#[derive(Debug)]
pub enum CheckOutcome {
    Applied(AttendanceRecord),
    Rejected(RejectReason),
}

/// The attendance state machine: `NotStarted → CheckedIn → CheckedOut`,
/// terminal for the day. Holds no state between calls; every decision is
/// made against the record re-read inside the store's exclusive window, so
/// concurrent duplicate submissions resolve to exactly one winner.
pub struct AttendanceLifecycle<R> {
    store: AttendanceStore<R>,
}

impl<R: AttendanceRepo> AttendanceLifecycle<R> {
    pub fn new(store: AttendanceStore<R>) -> Self {
        Self { store }
    }

    pub async fn request_check_in(
        &self,
        employee_id: u64,
        submitted_at: DateTime<Utc>,
        evidence: Evidence,
        location: Option<String>,
        ip: Option<String>,
    ) -> Result<CheckOutcome, StoreError> {
        // The calendar date is fixed here, once, from the submission time.
        let key = RecordKey::new(employee_id, submitted_at.date_naive());
        let creation_key = key.clone();

        self.store
            .with_exclusive_record(key.clone(), move |current| {
                if let Some(existing) = &current {
                    if existing.check_in_at.is_some() {
                        return (None, CheckOutcome::Rejected(RejectReason::AlreadyCheckedIn));
                    }
                }

                // A record may pre-exist with status absent/on_leave set by an
                // external process; physical check-in overrides it to present.
                let mut record =
                    current.unwrap_or_else(|| AttendanceRecord::blank(&creation_key));
                record.check_in_at = Some(submitted_at);
                record.check_in_location = location;
                record.check_in_ip = ip;
                record.check_in_photo_path = Some(evidence.reference);
                record.check_in_photo_mime = evidence.mime;
                record.status = AttendanceStatus::Present;

                (Some(record.clone()), CheckOutcome::Applied(record))
            })
            .await
            .inspect(|outcome| {
                debug!(employee_id, date = %key.date, ?outcome, "check-in evaluated")
            })
    }

    pub async fn request_check_out(
        &self,
        employee_id: u64,
        submitted_at: DateTime<Utc>,
        evidence: Evidence,
        location: Option<String>,
        ip: Option<String>,
    ) -> Result<CheckOutcome, StoreError> {
        let key = RecordKey::new(employee_id, submitted_at.date_naive());

        self.store
            .with_exclusive_record(key.clone(), move |current| {
                let Some(mut record) = current else {
                    return (None, CheckOutcome::Rejected(RejectReason::NotCheckedIn));
                };
                let Some(check_in_at) = record.check_in_at else {
                    return (None, CheckOutcome::Rejected(RejectReason::NotCheckedIn));
                };
                if record.check_out_at.is_some() {
                    return (None, CheckOutcome::Rejected(RejectReason::AlreadyCheckedOut));
                }
                if submitted_at < check_in_at {
                    return (
                        None,
                        CheckOutcome::Rejected(RejectReason::CheckOutBeforeCheckIn),
                    );
                }

                record.check_out_at = Some(submitted_at);
                record.check_out_location = location;
                record.check_out_ip = ip;
                record.check_out_photo_path = Some(evidence.reference);
                record.check_out_photo_mime = evidence.mime;
                // Written in the same upsert as check_out_at; never separately.
                record.worked_seconds = Some((submitted_at - check_in_at).num_seconds());

                (Some(record.clone()), CheckOutcome::Applied(record))
            })
            .await
            .inspect(|outcome| {
                debug!(employee_id, date = %key.date, ?outcome, "check-out evaluated")
            })
    }

    /// All of an employee's records, newest day first. Reads outside the
    /// exclusive window by design.
    pub async fn history(&self, employee_id: u64) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.store.history(employee_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::testing::{blank_record, MemoryRepo};
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Arc;
    use std::time::Duration;

    fn lifecycle() -> AttendanceLifecycle<MemoryRepo> {
        AttendanceLifecycle::new(AttendanceStore::new(
            MemoryRepo::default(),
            Duration::from_secs(2),
        ))
    }

    fn lifecycle_with_repo(repo: MemoryRepo) -> AttendanceLifecycle<MemoryRepo> {
        AttendanceLifecycle::new(AttendanceStore::new(repo, Duration::from_secs(2)))
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, h, m, s).unwrap()
    }

    fn photo(reference: &str) -> Evidence {
        Evidence {
            reference: reference.to_string(),
            mime: Some("image/jpeg".to_string()),
        }
    }

    #[tokio::test]
    async fn full_day_scenario() {
        let lc = lifecycle();

        // 09:00 check-in creates the record.
        let outcome = lc
            .request_check_in(1, at(9, 0, 0), photo("r1"), Some("Office".into()), None)
            .await
            .unwrap();
        let CheckOutcome::Applied(record) = outcome else {
            panic!("first check-in must succeed");
        };
        assert_eq!(record.check_in_at, Some(at(9, 0, 0)));
        assert_eq!(record.check_in_photo_path.as_deref(), Some("r1"));
        assert_eq!(record.status, AttendanceStatus::Present);

        // 09:05 retry is rejected and mutates nothing.
        let retry = lc
            .request_check_in(1, at(9, 5, 0), photo("r2"), None, None)
            .await
            .unwrap();
        assert!(matches!(
            retry,
            CheckOutcome::Rejected(RejectReason::AlreadyCheckedIn)
        ));
        let history = lc.history(1).await.unwrap();
        assert_eq!(history[0].check_in_at, Some(at(9, 0, 0)));
        assert_eq!(history[0].check_in_photo_path.as_deref(), Some("r1"));

        // 17:30 check-out computes 8h30m.
        let outcome = lc
            .request_check_out(1, at(17, 30, 0), photo("r3"), None, None)
            .await
            .unwrap();
        let CheckOutcome::Applied(record) = outcome else {
            panic!("check-out must succeed");
        };
        assert_eq!(record.worked_seconds, Some(30600));
        assert_eq!(record.check_out_at, Some(at(17, 30, 0)));

        // 17:31 second check-out is rejected.
        let second = lc
            .request_check_out(1, at(17, 31, 0), photo("r4"), None, None)
            .await
            .unwrap();
        assert!(matches!(
            second,
            CheckOutcome::Rejected(RejectReason::AlreadyCheckedOut)
        ));
        let history = lc.history(1).await.unwrap();
        assert_eq!(history[0].worked_seconds, Some(30600));
    }

    #[tokio::test]
    async fn check_out_without_check_in_is_rejected() {
        let lc = lifecycle();
        let outcome = lc
            .request_check_out(7, at(17, 0, 0), photo("r1"), None, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckOutcome::Rejected(RejectReason::NotCheckedIn)
        ));
        assert!(lc.history(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_out_rejected_when_record_exists_but_check_in_unset() {
        let repo = MemoryRepo::default();
        let mut pre = blank_record(7, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        pre.status = AttendanceStatus::OnLeave;
        repo.seed(pre);
        let lc = lifecycle_with_repo(repo);

        let outcome = lc
            .request_check_out(7, at(17, 0, 0), photo("r1"), None, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckOutcome::Rejected(RejectReason::NotCheckedIn)
        ));
    }

    #[tokio::test]
    async fn check_in_overrides_preexisting_leave_status() {
        let repo = MemoryRepo::default();
        let mut pre = blank_record(3, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        pre.status = AttendanceStatus::OnLeave;
        pre.note = Some("approved leave".into());
        repo.seed(pre);
        let lc = lifecycle_with_repo(repo);

        let outcome = lc
            .request_check_in(3, at(8, 0, 0), photo("r1"), None, None)
            .await
            .unwrap();
        let CheckOutcome::Applied(record) = outcome else {
            panic!("check-in over a leave record must proceed");
        };
        assert_eq!(record.status, AttendanceStatus::Present);
        // Unrelated fields on the pre-existing record survive.
        assert_eq!(record.note.as_deref(), Some("approved leave"));
    }

    #[tokio::test]
    async fn worked_seconds_is_exact_second_difference() {
        let lc = lifecycle();
        lc.request_check_in(1, at(9, 0, 0), photo("r1"), None, None)
            .await
            .unwrap();
        let outcome = lc
            .request_check_out(1, at(10, 1, 1), photo("r2"), None, None)
            .await
            .unwrap();
        let CheckOutcome::Applied(record) = outcome else {
            panic!("check-out must succeed");
        };
        assert_eq!(record.worked_seconds, Some(3661));
    }

    #[tokio::test]
    async fn check_out_before_check_in_timestamp_is_rejected() {
        let lc = lifecycle();
        lc.request_check_in(1, at(9, 0, 0), photo("r1"), None, None)
            .await
            .unwrap();

        let outcome = lc
            .request_check_out(1, at(8, 59, 59), photo("r2"), None, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckOutcome::Rejected(RejectReason::CheckOutBeforeCheckIn)
        ));

        // Equal timestamps are a zero-length day, not a rejection.
        let outcome = lc
            .request_check_out(1, at(9, 0, 0), photo("r2"), None, None)
            .await
            .unwrap();
        let CheckOutcome::Applied(record) = outcome else {
            panic!("zero-duration check-out must succeed");
        };
        assert_eq!(record.worked_seconds, Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_check_ins_have_exactly_one_winner() {
        let lc = Arc::new(lifecycle());
        let n = 16;

        let tasks: Vec<_> = (0..n)
            .map(|i| {
                let lc = lc.clone();
                tokio::spawn(async move {
                    lc.request_check_in(1, at(9, 0, 0), photo(&format!("r{i}")), None, None)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        let mut rejected = 0;
        for t in tasks {
            match t.await.unwrap() {
                CheckOutcome::Applied(_) => applied += 1,
                CheckOutcome::Rejected(RejectReason::AlreadyCheckedIn) => rejected += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(rejected, n - 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_check_outs_have_exactly_one_winner() {
        let lc = Arc::new(lifecycle());
        lc.request_check_in(1, at(9, 0, 0), photo("r0"), None, None)
            .await
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let lc = lc.clone();
                tokio::spawn(async move {
                    lc.request_check_out(1, at(17, 0, 0), photo(&format!("o{i}")), None, None)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for t in tasks {
            if let CheckOutcome::Applied(record) = t.await.unwrap() {
                assert_eq!(record.worked_seconds, Some(8 * 3600));
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn different_days_are_independent_records() {
        let lc = lifecycle();
        let day1 = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 1, 6, 9, 0, 0).unwrap();

        for ts in [day1, day2] {
            let outcome = lc
                .request_check_in(1, ts, photo("r"), None, None)
                .await
                .unwrap();
            assert!(matches!(outcome, CheckOutcome::Applied(_)));
        }

        let history = lc.history(1).await.unwrap();
        assert_eq!(history.len(), 2);
        // Newest date first.
        assert_eq!(history[0].date, day2.date_naive());
        assert_eq!(history[1].date, day1.date_naive());
    }
}
