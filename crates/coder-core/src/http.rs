use crate::LlmError;
use std::thread;
use std::time::Duration;
use tracing::warn;
use ureq::{Agent, Error as UreqError};

const TIMEOUT_GLOBAL: Duration = Duration::from_secs(90);
const TIMEOUT_PER_CALL: Duration = Duration::from_secs(60);
const TIMEOUT_RESOLVE: Duration = Duration::from_secs(5);
const TIMEOUT_CONNECT: Duration = Duration::from_secs(5);
const TIMEOUT_SEND_REQUEST: Duration = Duration::from_secs(5);
const TIMEOUT_SEND_BODY: Duration = Duration::from_secs(15);
const TIMEOUT_RECV_RESPONSE: Duration = Duration::from_secs(30);
const TIMEOUT_RECV_BODY: Duration = Duration::from_secs(60);

const RETRY_BASE_MS: u64 = 100;

/// Total attempts per LLM call, the first one included.
pub const MAX_ATTEMPTS: usize = 3;

pub fn default_agent() -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(TIMEOUT_GLOBAL))
        .timeout_per_call(Some(TIMEOUT_PER_CALL))
        .timeout_resolve(Some(TIMEOUT_RESOLVE))
        .timeout_connect(Some(TIMEOUT_CONNECT))
        .timeout_send_request(Some(TIMEOUT_SEND_REQUEST))
        .timeout_send_body(Some(TIMEOUT_SEND_BODY))
        .timeout_recv_response(Some(TIMEOUT_RECV_RESPONSE))
        .timeout_recv_body(Some(TIMEOUT_RECV_BODY))
        .build();
    config.into()
}

pub fn should_retry(err: &UreqError) -> bool {
    match err {
        UreqError::StatusCode(code) => *code == 429 || (500..=599).contains(code),
        UreqError::Timeout(_)
        | UreqError::Io(_)
        | UreqError::HostNotFound
        | UreqError::ConnectionFailed
        | UreqError::TooManyRedirects
        | UreqError::RedirectFailed => true,
        _ => false,
    }
}

/// Transient transport failures become `Network`, everything else `Rejected`.
pub fn classify_error(err: UreqError) -> LlmError {
    if should_retry(&err) {
        LlmError::Network(err.to_string())
    } else {
        LlmError::Rejected(err.to_string())
    }
}

/// Wait after failed attempt `attempt` (0-based): 100ms, 200ms, 400ms, ...
pub fn retry_delay(attempt: usize) -> Duration {
    let shift = attempt.min(6) as u32;
    let delay = RETRY_BASE_MS.saturating_mul(1_u64 << shift);
    Duration::from_millis(delay)
}

/// Bounded retry with a replaceable delay schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: fn(usize) -> Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            delay: retry_delay,
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping.
    pub fn immediate() -> Self {
        Self {
            delay: |_| Duration::ZERO,
            ..Self::default()
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub fn run<T>(&self, mut call: impl FnMut() -> Result<T, LlmError>) -> Result<T, LlmError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    let delay = (self.delay)(attempt);
                    warn!(attempt = attempt + 1, ?delay, error = %err, "llm call failed, retrying");
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn delays_double_from_base() {
        assert_eq!(retry_delay(0), Duration::from_millis(100));
        assert_eq!(retry_delay(1), Duration::from_millis(200));
        assert_eq!(retry_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn status_codes_split_by_retryability() {
        assert!(should_retry(&UreqError::StatusCode(429)));
        assert!(should_retry(&UreqError::StatusCode(503)));
        assert!(!should_retry(&UreqError::StatusCode(401)));
        assert!(matches!(
            classify_error(UreqError::StatusCode(400)),
            LlmError::Rejected(_)
        ));
        assert!(matches!(
            classify_error(UreqError::StatusCode(500)),
            LlmError::Network(_)
        ));
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let result = RetryPolicy::immediate().run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(LlmError::Network("flaky".into()))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::immediate().run(|| {
            calls.set(calls.get() + 1);
            Err(LlmError::Network(format!("attempt {}", calls.get())))
        });
        assert_eq!(calls.get(), 3);
        assert_eq!(result.unwrap_err().to_string(), "network error: attempt 3");
    }

    #[test]
    fn rejected_calls_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::immediate().run(|| {
            calls.set(calls.get() + 1);
            Err(LlmError::Rejected("401".into()))
        });
        assert!(matches!(result, Err(LlmError::Rejected(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delay_schedule_is_pluggable() {
        thread_local! {
            static SEEN: std::cell::RefCell<Vec<usize>> = const { std::cell::RefCell::new(Vec::new()) };
        }
        fn record(attempt: usize) -> Duration {
            SEEN.with(|seen| seen.borrow_mut().push(attempt));
            Duration::ZERO
        }
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: record,
        };
        let _: Result<(), _> = policy.run(|| Err(LlmError::InvalidResponse("no json".into())));
        SEEN.with(|seen| assert_eq!(*seen.borrow(), vec![0, 1]));
    }
}
