use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use dashboard_config::{BackoffStrategy, RetryConfig};
use rand::Rng;

/// Delay schedule for one execution.
///
/// Built fresh for every call so no state leaks between executions.
pub struct Backoff {
    schedule: Schedule,
    last: Duration,
}

enum Schedule {
    Fixed(Duration),
    Jitter { min: Duration, max: Duration },
    Builder(Box<dyn backon::Backoff>),
}

impl Backoff {
    pub fn from_config(config: &RetryConfig) -> Self {
        let (min, max) = config.jitter_range();
        let schedule = match config.backoff {
            BackoffStrategy::FixedJitter => Schedule::Fixed(random_between(min, max)),
            BackoffStrategy::Jitter => Schedule::Jitter { min, max },
            BackoffStrategy::Exponential => Schedule::Builder(Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(config.base_delay())
                    .with_max_delay(config.max_delay())
                    .with_factor(2.0)
                    .with_max_times(config.max_retries)
                    .build(),
            )),
            BackoffStrategy::Constant => Schedule::Builder(Box::new(
                ConstantBuilder::default()
                    .with_delay(config.base_delay())
                    .with_max_times(config.max_retries)
                    .build(),
            )),
        };

        Self { schedule, last: config.base_delay() }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match &mut self.schedule {
            Schedule::Fixed(delay) => *delay,
            Schedule::Jitter { min, max } => random_between(*min, *max),
            // A drained builder keeps repeating its final delay
            Schedule::Builder(backoff) => backoff.next().unwrap_or(self.last),
        };
        self.last = delay;
        delay
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::rng().random_range(min.as_millis() as u64..max.as_millis() as u64);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_exponential_doubles_from_base() {
        let fixture = RetryConfig::exponential(4, Duration::from_secs(1));
        let mut backoff = Backoff::from_config(&fixture);

        let actual: Vec<_> = (0..4).map(|_| backoff.next_delay()).collect();
        let expected = vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ];

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_exponential_is_capped() {
        let fixture = RetryConfig::exponential(5, Duration::from_secs(1)).max_delay_ms(3000u64);
        let mut backoff = Backoff::from_config(&fixture);

        let actual = (0..5).map(|_| backoff.next_delay()).max().unwrap();

        assert!(actual <= Duration::from_secs(3));
    }

    #[test]
    fn test_constant_repeats_base_delay() {
        let fixture = RetryConfig::default()
            .backoff(BackoffStrategy::Constant)
            .base_delay_ms(250u64)
            .max_retries(2usize);
        let mut backoff = Backoff::from_config(&fixture);

        // One extra call past the schedule keeps the last delay
        let actual: Vec<_> = (0..3).map(|_| backoff.next_delay()).collect();
        let expected = vec![Duration::from_millis(250); 3];

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_fixed_jitter_is_drawn_once() {
        let fixture = RetryConfig::default().backoff(BackoffStrategy::FixedJitter);
        let mut backoff = Backoff::from_config(&fixture);

        let first = backoff.next_delay();
        let actual: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();

        assert!(first >= Duration::from_secs(1) && first < Duration::from_secs(6));
        assert!(actual.iter().all(|delay| *delay == first));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let fixture = RetryConfig::default()
            .backoff(BackoffStrategy::Jitter)
            .jitter_min_ms(10u64)
            .jitter_max_ms(20u64);
        let mut backoff = Backoff::from_config(&fixture);

        for _ in 0..50 {
            let actual = backoff.next_delay();
            assert!(actual >= Duration::from_millis(10) && actual < Duration::from_millis(20));
        }
    }

    #[test]
    fn test_empty_jitter_range_uses_minimum() {
        let fixture = RetryConfig::default()
            .backoff(BackoffStrategy::Jitter)
            .jitter_min_ms(5u64)
            .jitter_max_ms(5u64);
        let mut backoff = Backoff::from_config(&fixture);

        let actual = backoff.next_delay();
        let expected = Duration::from_millis(5);

        assert_eq!(actual, expected);
    }
}
