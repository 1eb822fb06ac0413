use chrono::{DateTime, Utc};

/// Source of submission timestamps. The lifecycle never reads a wall clock
/// itself; handlers take the time once at the boundary and pass it down,
/// which keeps the state machine deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
