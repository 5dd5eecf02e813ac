#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for multi-threaded tests in the slot allocator workspace.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

// Miri is dramatically slower at thread synchronization.
const MIRI_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Lock-based code that deadlocks would otherwise hang the test run forever. With this wrapper,
/// a deadlocked test panics after a timeout instead (10 seconds, or 60 seconds under Miri).
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the test runs directly on
/// the calling thread without a timeout, so that mutation testing can detect hanging mutants.
///
/// # Panics
///
/// Panics if the test exceeds the timeout, or resumes the panic of the test if it panicked.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) { MIRI_TIMEOUT } else { TIMEOUT };

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // If the receiver has already given up, there is nobody left to tell.
        drop(tx.send(test_fn()));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread.join().expect("test thread already sent its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {timeout:?}, possible deadlock");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without sending a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}
