//! Write Retry Policy
//!
//! SQLITE_BUSY is the one transient storage failure. Writes retry with
//! bounded exponential backoff: 100 ms initial, doubling, capped at 2 s,
//! at most 3 attempts, with ±10% jitter. Anything else surfaces
//! immediately.

use std::time::Duration;

use rand::Rng;

use super::StorageError;

/// Initial backoff delay
const INITIAL_BACKOFF_MS: u64 = 100;
/// Backoff multiplier per attempt
const BACKOFF_FACTOR: u32 = 2;
/// Backoff ceiling
const MAX_BACKOFF_MS: u64 = 2_000;
/// Total attempts before surfacing `DatabaseLocked`
const MAX_ATTEMPTS: u32 = 3;

/// Check if a rusqlite error is SQLITE_BUSY (lock contention).
pub(crate) fn is_busy_error(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::DatabaseBusy,
                ..
            },
            _,
        )
    )
}

/// Apply ±10% jitter to a delay.
fn jittered(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.9..=1.1);
    delay.mul_f64(factor)
}

/// Run a write operation, retrying on lock contention.
///
/// The closure may be invoked up to `MAX_ATTEMPTS` times; it must be safe
/// to re-run (each database operation is a short self-contained unit).
pub(crate) fn with_write_retry<T, F>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Result<T, rusqlite::Error>,
{
    let mut delay = Duration::from_millis(INITIAL_BACKOFF_MS);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_busy_error(&e) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(StorageError::DatabaseLocked { attempts: attempt });
                }
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "database locked, backing off");
                std::thread::sleep(jittered(delay));
                delay = (delay * BACKOFF_FACTOR).min(Duration::from_millis(MAX_BACKOFF_MS));
            }
            Err(e) => return Err(StorageError::Database(e)),
        }
    }
}
