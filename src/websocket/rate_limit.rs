use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;

struct Window {
    count: u32,
    reset_at: Instant,
}

/// Per-user rolling-window limiter for inbound socket events. Injected
/// where it is used rather than living as module state, so it can be
/// constructed per test and swapped for a distributed limiter later.
///
/// Exceeding the threshold rejects the triggering event; it never
/// disconnects the user.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<Uuid, Window>>,
    max_events: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_events,
            window,
        }
    }

    pub fn check(&self, user_id: Uuid) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entry = self.windows.entry(user_id).or_insert_with(|| Window {
            count: 0,
            reset_at: now + self.window,
        });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        if entry.count >= self.max_events {
            return Err(AppError::RateLimited);
        }

        entry.count += 1;
        Ok(())
    }

    /// Drops expired windows so idle users do not accumulate entries.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| window.reset_at > now);
    }

    /// Spawns the periodic sweep task.
    pub fn start_sweeper(&self, every: Duration) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                limiter.sweep();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_threshold() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let user = Uuid::new_v4();

        for _ in 0..3 {
            assert!(limiter.check(user).is_ok());
        }
        assert!(matches!(limiter.check(user), Err(AppError::RateLimited)));
    }

    #[tokio::test]
    async fn limits_are_per_user() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_err());
        assert!(limiter.check(b).is_ok());
    }

    #[tokio::test]
    async fn window_resets_after_it_elapses() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        let user = Uuid::new_v4();

        assert!(limiter.check(user).is_ok());
        assert!(limiter.check(user).is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check(user).is_ok());
    }

    #[tokio::test]
    async fn sweep_drops_expired_windows() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        limiter.check(Uuid::new_v4()).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.sweep();
        assert!(limiter.windows.is_empty());
    }
}
