// This file is part of Poolsync.
//
// Poolsync is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Poolsync is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Poolsync.
// If not, see https://www.gnu.org/licenses/.

//! Utilities for retrying operations.

use std::{future::Future, time::Duration};

use rand::Rng;
use tokio::time;
use tracing::warn;

/// Options for retrying an operation using exponential backoff
/// with jitter.
#[derive(Clone, Copy, Debug)]
pub struct RetryOpts {
    /// Maximum number of attempts to make. Zero is treated as one.
    pub max_attempts: u64,
    /// The first retry is immediately after the first failure (plus jitter).
    /// The next retry after that will wait this long.
    pub min_nonzero_wait: Duration,
    /// The maximum amount of time to wait between retries.
    pub max_wait: Duration,
    /// The maximum amount of jitter to add to the wait time.
    pub max_jitter: Duration,
}

impl Default for RetryOpts {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_nonzero_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(5),
            max_jitter: Duration::from_millis(250),
        }
    }
}

/// Retry a function using exponential backoff with jitter.
///
/// Errors for which `should_retry` returns false are returned immediately,
/// as is the error of the final attempt.
pub async fn with_retries<Func, Fut, Out, Err>(
    description: &str,
    func: Func,
    opts: RetryOpts,
    should_retry: impl Fn(&Err) -> bool,
) -> Result<Out, Err>
where
    Func: Fn() -> Fut,
    Fut: Future<Output = Result<Out, Err>>,
{
    let mut next_wait = Duration::ZERO;
    let mut attempt_number = 1;
    loop {
        let error = match func().await {
            Ok(out) => return Ok(out),
            Err(error) => error,
        };
        if attempt_number >= opts.max_attempts || !should_retry(&error) {
            return Err(error);
        }
        warn!("Failed to {description} (attempt {attempt_number})");

        // Grab a new rng each iteration because we can't hold it across awaits.
        let jitter = if opts.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..opts.max_jitter)
        };
        time::sleep(next_wait + jitter).await;
        next_wait = (2 * next_wait).clamp(opts.min_nonzero_wait, opts.max_wait);
        attempt_number += 1;
    }
}
