use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{info, trace};

use crate::cache::RenderCache;
use crate::config::CacheConfig;

const MIN_EVICTION_INTERVAL: Duration = Duration::from_secs(1);

/// Background expiry and periodic reset of the render cache
pub struct CacheMaintenance {
    cache: RenderCache,
    eviction_interval: Option<Duration>,
    reset_interval: Option<Duration>,
}

impl CacheMaintenance {
    pub fn new(cache: RenderCache, eviction_interval: Option<Duration>, reset_interval: Option<Duration>) -> Self {
        Self {
            cache,
            eviction_interval,
            reset_interval,
        }
    }

    /// Evict every `ttl / 2` (at least one second) and reset every
    /// `reset_interval`. A zero setting disables the matching job.
    pub fn from_config(cache: RenderCache, config: &CacheConfig) -> Self {
        let eviction_interval =
            (!config.ttl.is_zero()).then(|| (config.ttl / 2).max(MIN_EVICTION_INTERVAL));
        let reset_interval = (!config.reset_interval.is_zero()).then_some(config.reset_interval);
        Self::new(cache, eviction_interval, reset_interval)
    }

    pub fn is_idle(&self) -> bool {
        self.eviction_interval.is_none() && self.reset_interval.is_none()
    }

    /// Run until the task is dropped
    pub async fn start(self) {
        if self.is_idle() {
            info!("Cache maintenance disabled");
            return;
        }

        info!(
            eviction_interval = ?self.eviction_interval,
            reset_interval = ?self.reset_interval,
            "Starting cache maintenance"
        );

        let mut evict = self.eviction_interval.map(ticker);
        let mut reset = self.reset_interval.map(ticker);

        loop {
            tokio::select! {
                _ = tick(&mut evict) => {
                    let evicted = self.cache.evict_expired();
                    trace!(evicted, "Cache eviction pass complete");
                }
                _ = tick(&mut reset) => {
                    let cleared = self.cache.reset();
                    info!(cleared, "Periodic cache reset");
                }
            }
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    // First tick one full period from now, not immediately.
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
