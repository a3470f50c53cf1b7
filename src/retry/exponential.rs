use super::RetryPolicy;
use crate::error::CoreError;
use rand::Rng;
use std::time::Duration;

/// 指数退避重试策略
///
/// 第 n 次失败后的等待时间为 `base_delay * 2^(n-1)`，不超过 `max_delay`，
/// 开启 jitter 时在 [50%, 100%] 区间内随机取值，避免整个集群同时重连注册中心。
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl ExponentialBackoffPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    /// 不限次数的退避（用于后台重连循环）
    pub fn unbounded(base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(usize::MAX, base_delay, max_delay)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn should_retry(&self, attempt: usize, error: &CoreError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }

        // 只对可重试的错误进行重试
        error.is_retryable()
    }

    fn backoff_duration(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let delay = self
            .base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy =
            ExponentialBackoffPolicy::new(10, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_duration(5), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(60), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy =
            ExponentialBackoffPolicy::new(10, Duration::from_millis(100), Duration::from_secs(1))
                .with_jitter(true);
        for _ in 0..100 {
            let d = policy.backoff_duration(3);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[test]
    fn stops_at_max_attempts() {
        let policy = ExponentialBackoffPolicy::new(3, Duration::ZERO, Duration::ZERO);
        assert!(policy.should_retry(2, &CoreError::NoClients));
        assert!(!policy.should_retry(3, &CoreError::NoClients));
        assert!(!policy.should_retry(1, &CoreError::Signal("SIGINT".into())));
    }
}
