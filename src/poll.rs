// SPDX-License-Identifier: GPL-2.0

//! Bounded polling.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Polls periodically until a condition is met, an error occurs, or the timeout is reached.
///
/// The function repeatedly executes the given operation `op` closure and checks its result using
/// the condition closure `cond`.
///
/// If `cond` returns `true`, the function returns successfully with the result of `op`.
/// Otherwise, it waits for at least `sleep_delta` before executing `op` again.
///
/// The wait never exceeds `timeout_delta` of wall-clock time. When `sleep_delta` is non-zero,
/// `op` is additionally run at most `timeout_delta / sleep_delta` times (at least once).
///
/// # Errors
///
/// If `op` returns an error, then that error is returned directly.
///
/// If the timeout is reached, then `Err(Error::Timeout)` is returned.
pub fn read_poll_timeout<Op, Cond, T>(
    mut op: Op,
    mut cond: Cond,
    sleep_delta: Duration,
    timeout_delta: Duration,
) -> Result<T>
where
    Op: FnMut() -> Result<T>,
    Cond: FnMut(&T) -> bool,
{
    let start = Instant::now();
    let max_polls = poll_budget(sleep_delta, timeout_delta);
    let mut polls: u64 = 0;

    loop {
        let val = op()?;
        polls += 1;
        if cond(&val) {
            return Ok(val);
        }

        let expired = max_polls.is_some_and(|max| polls >= max) || start.elapsed() > timeout_delta;
        if expired {
            return Err(Error::Timeout);
        }

        if !sleep_delta.is_zero() {
            thread::sleep(sleep_delta);
        }

        std::hint::spin_loop();
    }
}

/// Maximum number of times the predicate is evaluated, or `None` when only the wall clock
/// bounds the wait.
pub fn poll_budget(sleep_delta: Duration, timeout_delta: Duration) -> Option<u64> {
    if sleep_delta.is_zero() {
        return None;
    }

    let polls = timeout_delta.as_nanos() / sleep_delta.as_nanos();
    Some(u64::try_from(polls).unwrap_or(u64::MAX).max(1))
}

/// Waits until `cond` returns `true`, checking every `sleep_delta` for at most `timeout_delta`.
///
/// Thin wrapper around [`read_poll_timeout`] for predicates that can themselves fail.
pub fn wait_on<F>(sleep_delta: Duration, timeout_delta: Duration, mut cond: F) -> Result
where
    F: FnMut() -> Result<bool>,
{
    read_poll_timeout(&mut cond, |done: &bool| *done, sleep_delta, timeout_delta).map(|_| ())
}
