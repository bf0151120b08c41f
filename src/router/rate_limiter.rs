//! Per-agent sliding-window rate limiter
//!
//! Transcribed from `original_source/backend/agents/security/rate_limiter.py`'s
//! `AgentRateLimiter`: a true sliding window (not fixed buckets) of request timestamps per
//! provider, a minimum inter-request cooldown, and an atomic `check_and_record`.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio::sync::Mutex;

use crate::domain_types::Provider;
use crate::time_provider::SharedTimeProvider;

/// Tunables for one provider's rate limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    /// Carried from the prior implementation's config shape; not itself load-bearing in the
    /// check algorithm (the cooldown and sliding windows are what actually gate requests).
    pub burst_size: u32,
    pub cooldown_seconds: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
            burst_size: 10,
            cooldown_seconds: 1.0,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::DeepSeek | Provider::Qwen => Self {
                requests_per_minute: 30,
                requests_per_hour: 500,
                burst_size: 5,
                cooldown_seconds: 2.0,
            },
            Provider::Perplexity => Self {
                requests_per_minute: 20,
                requests_per_hour: 300,
                burst_size: 3,
                cooldown_seconds: 3.0,
            },
            Provider::OpenAi => Self {
                requests_per_minute: 60,
                requests_per_hour: 1000,
                burst_size: 10,
                cooldown_seconds: 1.0,
            },
            Provider::Anthropic => Self {
                requests_per_minute: 40,
                requests_per_hour: 600,
                burst_size: 5,
                cooldown_seconds: 1.5,
            },
            Provider::Ollama => Self {
                requests_per_minute: 120,
                requests_per_hour: 5000,
                burst_size: 20,
                cooldown_seconds: 0.5,
            },
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub current_rpm: u32,
    pub current_rph: u32,
    pub limit_rpm: u32,
    pub limit_rph: u32,
    pub retry_after_seconds: f64,
    pub reason: String,
}

struct Window {
    timestamps: VecDeque<f64>,
}

/// Sliding-window limiter over per-provider request timestamps, measured in seconds since an
/// arbitrary epoch via the injected clock.
pub struct AgentRateLimiter {
    time: SharedTimeProvider,
    epoch: Instant,
    windows: Mutex<HashMap<Provider, Window>>,
}

impl AgentRateLimiter {
    #[must_use]
    pub fn new(time: SharedTimeProvider) -> Self {
        let epoch = time.instant();
        Self {
            time,
            epoch,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn now_secs(&self) -> f64 {
        self.time.instant().duration_since(self.epoch).as_secs_f64()
    }

    /// Checks whether a request is allowed; does not record it.
    pub async fn check(&self, provider: Provider, config: RateLimitConfig) -> RateLimitResult {
        let now = self.monotonic_now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(provider).or_insert_with(|| Window {
            timestamps: VecDeque::new(),
        });
        clean_window(&mut window.timestamps, now);

        let one_min_ago = now - 60.0;
        let rpm_count = window.timestamps.iter().filter(|&&t| t >= one_min_ago).count() as u32;
        let rph_count = window.timestamps.len() as u32;

        if let Some(&last) = window.timestamps.back() {
            let since_last = now - last;
            if since_last < config.cooldown_seconds {
                let retry_after = config.cooldown_seconds - since_last;
                return RateLimitResult {
                    allowed: false,
                    current_rpm: rpm_count,
                    current_rph: rph_count,
                    limit_rpm: config.requests_per_minute,
                    limit_rph: config.requests_per_hour,
                    retry_after_seconds: retry_after,
                    reason: format!("Cooldown: {retry_after:.1}s remaining"),
                };
            }
        }

        if rpm_count >= config.requests_per_minute {
            let oldest_in_minute = window
                .timestamps
                .iter()
                .find(|&&t| t >= one_min_ago)
                .copied()
                .unwrap_or(now);
            let retry_after = (60.0 - (now - oldest_in_minute)).max(0.1);
            return RateLimitResult {
                allowed: false,
                current_rpm: rpm_count,
                current_rph: rph_count,
                limit_rpm: config.requests_per_minute,
                limit_rph: config.requests_per_hour,
                retry_after_seconds: retry_after,
                reason: format!("RPM limit exceeded: {rpm_count}/{}", config.requests_per_minute),
            };
        }

        if rph_count >= config.requests_per_hour {
            let retry_after = (3600.0
                - (now - window.timestamps.front().copied().unwrap_or(now)))
            .max(0.1);
            return RateLimitResult {
                allowed: false,
                current_rpm: rpm_count,
                current_rph: rph_count,
                limit_rpm: config.requests_per_minute,
                limit_rph: config.requests_per_hour,
                retry_after_seconds: retry_after,
                reason: format!("RPH limit exceeded: {rph_count}/{}", config.requests_per_hour),
            };
        }

        RateLimitResult {
            allowed: true,
            current_rpm: rpm_count,
            current_rph: rph_count,
            limit_rpm: config.requests_per_minute,
            limit_rph: config.requests_per_hour,
            retry_after_seconds: 0.0,
            reason: String::new(),
        }
    }

    /// Records a completed request.
    pub async fn record(&self, provider: Provider) {
        let now = self.monotonic_now();
        let mut windows = self.windows.lock().await;
        windows
            .entry(provider)
            .or_insert_with(|| Window {
                timestamps: VecDeque::new(),
            })
            .timestamps
            .push_back(now);
    }

    /// Checks and records in a single call, atomic with respect to other callers of either
    /// `check` or `check_and_record` on this limiter.
    pub async fn check_and_record(
        &self,
        provider: Provider,
        config: RateLimitConfig,
    ) -> RateLimitResult {
        let now = self.monotonic_now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(provider).or_insert_with(|| Window {
            timestamps: VecDeque::new(),
        });
        clean_window(&mut window.timestamps, now);

        let one_min_ago = now - 60.0;
        let rpm_count = window.timestamps.iter().filter(|&&t| t >= one_min_ago).count() as u32;
        let rph_count = window.timestamps.len() as u32;

        if let Some(&last) = window.timestamps.back() {
            let since_last = now - last;
            if since_last < config.cooldown_seconds {
                let retry_after = config.cooldown_seconds - since_last;
                return RateLimitResult {
                    allowed: false,
                    current_rpm: rpm_count,
                    current_rph: rph_count,
                    limit_rpm: config.requests_per_minute,
                    limit_rph: config.requests_per_hour,
                    retry_after_seconds: retry_after,
                    reason: format!("Cooldown: {retry_after:.1}s remaining"),
                };
            }
        }

        if rpm_count >= config.requests_per_minute {
            return RateLimitResult {
                allowed: false,
                current_rpm: rpm_count,
                current_rph: rph_count,
                limit_rpm: config.requests_per_minute,
                limit_rph: config.requests_per_hour,
                retry_after_seconds: 0.1,
                reason: format!("RPM limit exceeded: {rpm_count}/{}", config.requests_per_minute),
            };
        }

        if rph_count >= config.requests_per_hour {
            return RateLimitResult {
                allowed: false,
                current_rpm: rpm_count,
                current_rph: rph_count,
                limit_rpm: config.requests_per_minute,
                limit_rph: config.requests_per_hour,
                retry_after_seconds: 0.1,
                reason: format!("RPH limit exceeded: {rph_count}/{}", config.requests_per_hour),
            };
        }

        window.timestamps.push_back(now);
        RateLimitResult {
            allowed: true,
            current_rpm: rpm_count + 1,
            current_rph: rph_count + 1,
            limit_rpm: config.requests_per_minute,
            limit_rph: config.requests_per_hour,
            retry_after_seconds: 0.0,
            reason: String::new(),
        }
    }

    fn monotonic_now(&self) -> f64 {
        // Anchored to process start via the injected clock's `Instant`; only differences matter.
        self.now_secs()
    }

    /// Clears every provider's window.
    pub async fn reset_all(&self) {
        self.windows.lock().await.clear();
    }
}

fn clean_window(timestamps: &mut VecDeque<f64>, now: f64) {
    let cutoff = now - 3600.0;
    while timestamps.front().is_some_and(|&t| t < cutoff) {
        timestamps.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_provider::production_time_provider;

    #[tokio::test]
    async fn enforces_minimum_cooldown_between_requests() {
        let limiter = AgentRateLimiter::new(production_time_provider());
        let config = RateLimitConfig {
            requests_per_minute: 30,
            requests_per_hour: 500,
            burst_size: 5,
            cooldown_seconds: 0.2,
        };

        let first = limiter.check_and_record(Provider::DeepSeek, config).await;
        assert!(first.allowed);

        let second = limiter.check_and_record(Provider::DeepSeek, config).await;
        assert!(!second.allowed);
        assert!(second.reason.starts_with("Cooldown:"));

        tokio::time::sleep(std::time::Duration::from_millis(220)).await;
        let third = limiter.check_and_record(Provider::DeepSeek, config).await;
        assert!(third.allowed);
    }

    #[tokio::test]
    async fn independent_windows_per_provider() {
        let limiter = AgentRateLimiter::new(production_time_provider());
        let config = RateLimitConfig {
            cooldown_seconds: 10.0,
            ..RateLimitConfig::default()
        };
        let a = limiter.check_and_record(Provider::DeepSeek, config).await;
        let b = limiter.check_and_record(Provider::Perplexity, config).await;
        assert!(a.allowed);
        assert!(b.allowed);
    }

    #[tokio::test]
    async fn check_and_record_enforces_hourly_quota() {
        let limiter = AgentRateLimiter::new(production_time_provider());
        let config = RateLimitConfig {
            requests_per_minute: 1000,
            requests_per_hour: 2,
            burst_size: 10,
            cooldown_seconds: 0.0,
        };

        let first = limiter.check_and_record(Provider::DeepSeek, config).await;
        assert!(first.allowed);
        let second = limiter.check_and_record(Provider::DeepSeek, config).await;
        assert!(second.allowed);

        let third = limiter.check_and_record(Provider::DeepSeek, config).await;
        assert!(!third.allowed);
        assert!(third.reason.starts_with("RPH limit exceeded"));
    }
}
