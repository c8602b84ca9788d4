//! Retry delay computation shared by listeners that accept a `RetryPolicy`
//! (currently the webhook listener).

use reloader_api::RetryPolicy;
use std::time::Duration;

/// Delay before the `attempt`-th retry (0-indexed). `"linear"` always waits a
/// flat second; anything else (including an unset algorithm) is exponential
/// backoff, `2^attempt` seconds.
pub fn next_retry_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    if policy.algorithm == "linear" {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(2u64.saturating_pow(attempt))
    }
}

/// Whether `attempt` (0-indexed, the number of attempts already made)
/// exhausts the policy's retry budget.
pub fn retries_exhausted(policy: &RetryPolicy, attempt: u32) -> bool {
    attempt >= policy.max_retries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(algorithm: &str, max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            algorithm: algorithm.to_string(),
            max_retries,
        }
    }

    #[test]
    fn linear_is_always_one_second() {
        let p = policy("linear", 10);
        assert_eq!(next_retry_delay(&p, 0), Duration::from_secs(1));
        assert_eq!(next_retry_delay(&p, 5), Duration::from_secs(1));
    }

    #[test]
    fn exponential_doubles_each_attempt() {
        let p = policy("exponential", 10);
        assert_eq!(next_retry_delay(&p, 0), Duration::from_secs(1));
        assert_eq!(next_retry_delay(&p, 3), Duration::from_secs(8));
    }

    #[test]
    fn unrecognized_algorithm_defaults_to_exponential() {
        let p = policy("", 10);
        assert_eq!(next_retry_delay(&p, 2), Duration::from_secs(4));
    }

    #[test]
    fn exhaustion_is_inclusive_of_max() {
        let p = policy("linear", 3);
        assert!(!retries_exhausted(&p, 2));
        assert!(retries_exhausted(&p, 3));
    }
}
