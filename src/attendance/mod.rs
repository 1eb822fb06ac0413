//! Attendance record lifecycle and its concurrent mutation engine.
//!
//! All mutation of attendance records goes through [`AttendanceLifecycle`],
//! which evaluates the day's state machine inside the per-(employee, date)
//! exclusive window provided by [`AttendanceStore`]. Handlers only translate
//! HTTP requests into intents and outcomes into responses.

pub mod clock;
pub mod evidence;
pub mod lifecycle;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use evidence::{Evidence, EvidencePhase, EvidenceStore, FsEvidenceStore};
pub use lifecycle::{AttendanceLifecycle, CheckOutcome, RejectReason};
pub use store::{AttendanceRepo, AttendanceStore, MySqlAttendanceRepo, StoreError};

/// The production lifecycle wiring.
pub type MySqlLifecycle = AttendanceLifecycle<MySqlAttendanceRepo>;

#[cfg(test)]
pub(crate) mod testing {
    use super::store::{AttendanceRepo, StoreError};
    use crate::model::attendance::{AttendanceRecord, RecordKey};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory repo for exercising the store and lifecycle without MySQL.
    #[derive(Default)]
    pub struct MemoryRepo {
        records: Mutex<HashMap<RecordKey, AttendanceRecord>>,
        fail_next_save: AtomicBool,
        hang_next_fetch: AtomicBool,
    }

    impl MemoryRepo {
        pub fn seed(&self, record: AttendanceRecord) {
            self.records.lock().unwrap().insert(record.key(), record);
        }

        pub fn fail_next_save(&self) {
            self.fail_next_save.store(true, Ordering::SeqCst);
        }

        /// The next fetch never resolves; lets a test park a caller inside
        /// the exclusive window and then cancel it.
        pub fn hang_next_fetch(&self) {
            self.hang_next_fetch.store(true, Ordering::SeqCst);
        }
    }

    impl AttendanceRepo for MemoryRepo {
        async fn fetch(&self, key: &RecordKey) -> Result<Option<AttendanceRecord>, StoreError> {
            if self.hang_next_fetch.swap(false, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(self.records.lock().unwrap().get(key).cloned())
        }

        async fn save(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
            if self.fail_next_save.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            self.records
                .lock()
                .unwrap()
                .insert(record.key(), record.clone());
            Ok(())
        }

        async fn list_for_employee(
            &self,
            employee_id: u64,
        ) -> Result<Vec<AttendanceRecord>, StoreError> {
            let mut records: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.employee_id == employee_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| b.date.cmp(&a.date));
            Ok(records)
        }
    }

    pub fn blank_record(employee_id: u64, date: NaiveDate) -> AttendanceRecord {
        AttendanceRecord::blank(&RecordKey::new(employee_id, date))
    }
}
