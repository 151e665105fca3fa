//! Time source for actor timestamps and alarms.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Where an actor reads "now" from.
///
/// `Runtime` anchors wall-clock time once and then advances with the tokio
/// clock, so a paused test runtime moves stored timestamps and alarm
/// deadlines together.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Runtime {
        epoch: DateTime<Utc>,
        started: Instant,
    },
}

impl Clock {
    /// A clock that follows the tokio runtime from this instant on.
    pub fn runtime() -> Self {
        Clock::Runtime {
            epoch: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Runtime { epoch, started } => {
                *epoch + TimeDelta::from_std(started.elapsed()).unwrap_or(TimeDelta::zero())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn runtime_clock_follows_paused_time() {
        let clock = Clock::runtime();
        let before = clock.now();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        let elapsed = clock.now() - before;
        assert!(elapsed >= TimeDelta::hours(1));
        assert!(elapsed < TimeDelta::hours(1) + TimeDelta::seconds(1));
    }

    #[test]
    fn system_clock_is_default() {
        assert!(matches!(Clock::default(), Clock::System));
    }
}
