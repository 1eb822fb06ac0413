use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("failed to write evidence file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidencePhase {
    CheckIn,
    CheckOut,
}

impl EvidencePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidencePhase::CheckIn => "checkin",
            EvidencePhase::CheckOut => "checkout",
        }
    }
}

/// Captured photo proof, already persisted by an [`EvidenceStore`]. The
/// lifecycle records the reference verbatim and never looks inside it.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub reference: String,
    pub mime: Option<String>,
}

/// Stores raw photo bytes under a per-(employee, date, phase) namespace and
/// returns an opaque, stable reference string.
pub trait EvidenceStore: Send + Sync {
    fn store(
        &self,
        employee_id: u64,
        date: NaiveDate,
        phase: EvidencePhase,
        taken_at: DateTime<Utc>,
        extension: &str,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = Result<String, EvidenceError>> + Send;

    /// Undo a `store` whose reference ended up attached to nothing. A
    /// reference that is already gone is not an error.
    fn discard(
        &self,
        reference: &str,
    ) -> impl std::future::Future<Output = Result<(), EvidenceError>> + Send;
}

/// Filesystem-backed evidence store. References are paths relative to the
/// configured root: `attendances/{employee}/{date}/{phase}_{YmdHis}.{ext}`.
pub struct FsEvidenceStore {
    root: PathBuf,
}

impl FsEvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Supporting documents for leave requests share the evidence root under
    /// their own namespace: `leave_attachments/{user}/{YmdHis}.{ext}`.
    pub async fn store_leave_attachment(
        &self,
        user_id: u64,
        submitted_at: DateTime<Utc>,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, EvidenceError> {
        let relative = format!(
            "leave_attachments/{}/{}.{}",
            user_id,
            submitted_at.format("%Y%m%d%H%M%S"),
            extension
        );
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(relative)
    }
}

impl EvidenceStore for FsEvidenceStore {
    async fn store(
        &self,
        employee_id: u64,
        date: NaiveDate,
        phase: EvidencePhase,
        taken_at: DateTime<Utc>,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, EvidenceError> {
        let relative = format!(
            "attendances/{}/{}/{}_{}.{}",
            employee_id,
            date,
            phase.as_str(),
            taken_at.format("%Y%m%d%H%M%S"),
            extension
        );
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(relative)
    }

    async fn discard(&self, reference: &str) -> Result<(), EvidenceError> {
        match tokio::fs::remove_file(self.root.join(reference)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
