use crate::model::attendance::{AttendanceRecord, RecordKey};
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("attendance record for employee {employee_id} on {date} is locked by another request")]
    Contention { employee_id: u64, date: chrono::NaiveDate },
    #[error("attendance persistence failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable access to attendance records by composite key.
///
/// Implementations only move bytes; all locking and ordering is the
/// [`AttendanceStore`]'s job, so `save` may assume it runs inside an
/// exclusive window for `record.key()`. `save` must be all-or-nothing.
pub trait AttendanceRepo: Send + Sync {
    fn fetch(
        &self,
        key: &RecordKey,
    ) -> impl Future<Output = Result<Option<AttendanceRecord>, StoreError>> + Send;

    fn save(
        &self,
        record: &AttendanceRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All records for one employee, newest calendar date first.
    fn list_for_employee(
        &self,
        employee_id: u64,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, StoreError>> + Send;
}

/// Sharded lock table: one async mutex per in-use record key. Entries are
/// created on demand and swept once nobody holds or waits on them, so the
/// map only ever contains keys with live contention.
struct KeyedLocks {
    inner: StdMutex<HashMap<RecordKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    async fn acquire(
        &self,
        key: &RecordKey,
        wait: Duration,
    ) -> Result<KeyGuard<'_>, StoreError> {
        let slot = {
            let mut map = self.inner.lock().expect("lock table poisoned");
            map.entry(key.clone()).or_default().clone()
        };

        let held = match timeout(wait, slot.clone().lock_owned()).await {
            Ok(held) => held,
            Err(_) => {
                drop(slot);
                self.sweep(key);
                return Err(StoreError::Contention {
                    employee_id: key.employee_id,
                    date: key.date,
                });
            }
        };

        Ok(KeyGuard {
            locks: self,
            key: key.clone(),
            held: Some(held),
        })
    }

    /// Drop the map entry if this key is no longer held or awaited.
    /// strong_count == 1 means the map holds the only remaining reference.
    fn sweep(&self, key: &RecordKey) {
        let mut map = self.inner.lock().expect("lock table poisoned");
        if let Some(slot) = map.get(key) {
            if Arc::strong_count(slot) == 1 {
                map.remove(key);
            }
        }
    }
}

/// Holds the key's mutex for the duration of an exclusive window. Dropping
/// the guard releases the mutex first and then sweeps the map entry, so the
/// entry is reclaimed on every exit path, including panics and futures
/// dropped mid-await.
struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: RecordKey,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        self.locks.sweep(&self.key);
    }
}

/// Owns persisted attendance state and hands out per-(employee, date)
/// exclusive-access windows. Unrelated keys never contend; two requests for
/// the same key serialize, with a bounded wait.
pub struct AttendanceStore<R> {
    repo: R,
    locks: KeyedLocks,
    lock_wait: Duration,
}

impl<R: AttendanceRepo> AttendanceStore<R> {
    pub fn new(repo: R, lock_wait: Duration) -> Self {
        Self {
            repo,
            locks: KeyedLocks::new(),
            lock_wait,
        }
    }

    /// Run `f` with exclusive access to the record for `key`.
    ///
    /// `f` sees the current record (absent if the employee has no record for
    /// that day) and returns the mutated record to persist, or `None` for a
    /// no-op, plus its own result. The lock is released on every exit path,
    /// including persistence failure; a failed save leaves the prior record
    /// untouched because persistence is a single upsert.
    pub async fn with_exclusive_record<F, T>(&self, key: RecordKey, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Option<AttendanceRecord>) -> (Option<AttendanceRecord>, T),
    {
        let _guard = self.locks.acquire(&key, self.lock_wait).await?;

        let current = self.repo.fetch(&key).await?;
        let (mutated, out) = f(current);
        if let Some(record) = mutated {
            debug_assert_eq!(record.key(), key);
            self.repo.save(&record).await?;
        }
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn lock_entry_count(&self) -> usize {
        self.locks.inner.lock().expect("lock table poisoned").len()
    }

    /// Read-only; does not take the key lock. Callers tolerate eventual
    /// consistency with in-flight mutations.
    pub async fn history(&self, employee_id: u64) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.repo.list_for_employee(employee_id).await
    }
}

/// MySQL-backed repository. Persistence is one upsert on the table's unique
/// `(employee_id, date)` key, so a half-applied record is never visible.
pub struct MySqlAttendanceRepo {
    pool: MySqlPool,
}

impl MySqlAttendanceRepo {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const RECORD_COLUMNS: &str = "employee_id, date, \
     check_in_at, check_in_location, check_in_ip, check_in_photo_path, check_in_photo_mime, \
     check_out_at, check_out_location, check_out_ip, check_out_photo_path, check_out_photo_mime, \
     status, worked_seconds, note";

impl AttendanceRepo for MySqlAttendanceRepo {
    async fn fetch(&self, key: &RecordKey) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendances WHERE employee_id = ? AND date = ?"
        );
        let record = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(key.employee_id)
            .bind(key.date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn save(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO attendances ({RECORD_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
             check_in_at = VALUES(check_in_at), \
             check_in_location = VALUES(check_in_location), \
             check_in_ip = VALUES(check_in_ip), \
             check_in_photo_path = VALUES(check_in_photo_path), \
             check_in_photo_mime = VALUES(check_in_photo_mime), \
             check_out_at = VALUES(check_out_at), \
             check_out_location = VALUES(check_out_location), \
             check_out_ip = VALUES(check_out_ip), \
             check_out_photo_path = VALUES(check_out_photo_path), \
             check_out_photo_mime = VALUES(check_out_photo_mime), \
             status = VALUES(status), \
             worked_seconds = VALUES(worked_seconds), \
             note = VALUES(note)"
        );
        sqlx::query(&sql)
            .bind(record.employee_id)
            .bind(record.date)
            .bind(record.check_in_at)
            .bind(&record.check_in_location)
            .bind(&record.check_in_ip)
            .bind(&record.check_in_photo_path)
            .bind(&record.check_in_photo_mime)
            .bind(record.check_out_at)
            .bind(&record.check_out_location)
            .bind(&record.check_out_ip)
            .bind(&record.check_out_photo_path)
            .bind(&record.check_out_photo_mime)
            .bind(record.status)
            .bind(record.worked_seconds)
            .bind(&record.note)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendances WHERE employee_id = ? ORDER BY date DESC"
        );
        let records = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::testing::MemoryRepo;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn key(employee_id: u64, day: u32) -> RecordKey {
        RecordKey::new(employee_id, NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_callers_serialize() {
        let store = Arc::new(AttendanceStore::new(
            MemoryRepo::default(),
            Duration::from_secs(5),
        ));
        let counter = Arc::new(StdMutex::new((0u32, 0u32))); // (in_flight, max_seen)

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .with_exclusive_record(key(1, 5), |current| {
                        {
                            let mut c = counter.lock().unwrap();
                            c.0 += 1;
                            c.1 = c.1.max(c.0);
                        }
                        std::thread::sleep(Duration::from_millis(5));
                        counter.lock().unwrap().0 -= 1;
                        (None, current.is_none())
                    })
                    .await
                    .unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(counter.lock().unwrap().1, 1, "two callers overlapped in the window");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiting_caller_times_out_with_contention_error() {
        let store = Arc::new(AttendanceStore::new(
            MemoryRepo::default(),
            Duration::from_millis(20),
        ));

        let holder = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .with_exclusive_record(key(1, 5), |_| {
                        std::thread::sleep(Duration::from_millis(200));
                        (None, ())
                    })
                    .await
                    .unwrap();
            })
        };

        // Give the holder time to enter the window.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = store
            .with_exclusive_record(key(1, 5), |_| (None, ()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Contention { employee_id: 1, .. }));

        holder.await.unwrap();

        // The lock is gone once the holder finishes.
        store
            .with_exclusive_record(key(1, 5), |_| (None, ()))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unrelated_keys_do_not_contend() {
        let store = Arc::new(AttendanceStore::new(
            MemoryRepo::default(),
            Duration::from_millis(100),
        ));

        // Hold employee 1 / day 5 for longer than the lock wait; a different
        // day and a different employee must both get through regardless.
        let holder = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .with_exclusive_record(key(1, 5), |_| {
                        std::thread::sleep(Duration::from_millis(300));
                        (None, ())
                    })
                    .await
                    .unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        store
            .with_exclusive_record(key(1, 6), |_| (None, ()))
            .await
            .expect("same employee, different day must not block");
        store
            .with_exclusive_record(key(2, 5), |_| (None, ()))
            .await
            .expect("different employee must not block");

        holder.await.unwrap();
    }

    #[tokio::test]
    async fn persistence_failure_releases_lock_and_writes_nothing() {
        let repo = MemoryRepo::default();
        repo.fail_next_save();
        let store = AttendanceStore::new(repo, Duration::from_millis(100));

        let record = crate::attendance::testing::blank_record(1, key(1, 5).date);
        let err = store
            .with_exclusive_record(key(1, 5), move |_| (Some(record), ()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));

        // No partial write is visible and the key is usable again.
        let found = store
            .with_exclusive_record(key(1, 5), |current| (None, current.is_some()))
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn panicking_caller_reclaims_lock_entry() {
        let store = Arc::new(AttendanceStore::new(
            MemoryRepo::default(),
            Duration::from_millis(100),
        ));

        let panicking = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .with_exclusive_record(key(1, 5), |_| -> (Option<AttendanceRecord>, ()) {
                        panic!("boom")
                    })
                    .await
            })
        };
        assert!(panicking.await.unwrap_err().is_panic());

        assert_eq!(store.lock_entry_count(), 0);
        store
            .with_exclusive_record(key(1, 5), |_| (None, ()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_caller_reclaims_lock_entry() {
        let repo = MemoryRepo::default();
        repo.hang_next_fetch();
        let store = Arc::new(AttendanceStore::new(repo, Duration::from_millis(100)));

        // The task parks inside the exclusive window, then gets aborted.
        let hung = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .with_exclusive_record(key(1, 5), |_| (None, ()))
                    .await
                    .unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        hung.abort();
        let _ = hung.await;

        assert_eq!(store.lock_entry_count(), 0);
        store
            .with_exclusive_record(key(1, 5), |_| (None, ()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_op_closure_persists_nothing() {
        let store = AttendanceStore::new(MemoryRepo::default(), Duration::from_millis(100));

        store
            .with_exclusive_record(key(1, 5), |_| (None, ()))
            .await
            .unwrap();

        assert!(store.history(1).await.unwrap().is_empty());
    }
}
