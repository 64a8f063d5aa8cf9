//! Fixed-period tick scheduler for Roomrelay.
//!
//! The relay has two periodic jobs: draining the datagram peer transport
//! (tens of ticks per second) and sweeping the reaper for expired empty
//! rooms (about once a second). Both run as a `tokio::select!` branch
//! next to their shutdown signal:
//!
//! ```ignore
//! let mut ticks = TickScheduler::with_period(Duration::from_secs(1));
//! loop {
//!     tokio::select! {
//!         _ = ticks.wait_for_tick() => {
//!             registry.reap_due(Instant::now()).await;
//!             ticks.record_tick_end();
//!         }
//!         _ = shutdown.changed() => break,
//!     }
//! }
//! ```
//!
//! A scheduler with no period pends forever, which lets a caller keep one
//! `select!` shape whether or not a job is enabled.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Full configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `None` disables ticking.
    pub period: Option<Duration>,
    /// Fraction of the period (0.0–1.0) after which a slow tick body is
    /// logged. Default: 0.80.
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max µs) added to the *first* tick so jobs started
    /// together don't fire in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: None,
            budget_warn_threshold: 0.80,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// A config ticking `tick_rate_hz` times per second. 0 disables.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        let rate = if tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick rate exceeds maximum, clamping"
            );
            Self::MAX_TICK_RATE_HZ
        } else {
            tick_rate_hz
        };
        let period = (rate > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(rate)));
        Self {
            period,
            ..Default::default()
        }
    }

    /// A config ticking once per `period`. A zero period disables.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period: (!period.is_zero()).then_some(period),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// The configured period.
    pub period: Duration,
    /// `true` if this tick woke up more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun.
    pub ticks_skipped: u64,
}

/// Counters kept across the scheduler's life.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Longest tick body reported via [`TickScheduler::record_tick_end`].
    pub max_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-period tick scheduler.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    /// When the next tick should fire (Tokio instant for `sleep_until`).
    next_tick: Option<TokioInstant>,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler. The first tick is one period (plus jitter)
    /// from now.
    pub fn new(mut config: TickConfig) -> Self {
        config.budget_warn_threshold = config.budget_warn_threshold.clamp(0.0, 1.0);

        let next_tick = config.period.map(|d| {
            let jitter = if config.initial_jitter_us > 0 {
                let us = rand::rng().random_range(0..config.initial_jitter_us);
                Duration::from_micros(us)
            } else {
                Duration::ZERO
            };
            TokioInstant::now() + d + jitter
        });

        match config.period {
            Some(period) => debug!(
                period_ms = period.as_secs_f64() * 1000.0,
                "tick scheduler created"
            ),
            None => debug!("tick scheduler created disabled"),
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// A scheduler ticking `tick_rate_hz` times per second.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// A scheduler ticking once per `period`.
    pub fn with_period(period: Duration) -> Self {
        Self::new(TickConfig::with_period(period))
    }

    /// Waits until the next tick is due.
    ///
    /// A tick that wakes up late skips the periods it missed and
    /// reschedules one period from now, so a stall never produces a burst.
    /// When disabled this future pends forever.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.config.period) {
            (Some(next), Some(period)) => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = Some(now + period);

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            period,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that the work for the current tick has finished.
    ///
    /// Logs when the work took longer than the configured share of the
    /// period.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }

        if let Some(period) = self.config.period {
            let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
            if utilization >= self.config.budget_warn_threshold {
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    period_ms = period.as_secs_f64() * 1000.0,
                    "tick work approaching period"
                );
            }
        }
    }

    /// Whether the scheduler never ticks.
    pub fn is_disabled(&self) -> bool {
        self.config.period.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn period(&self) -> Option<Duration> {
        self.config.period
    }
}
