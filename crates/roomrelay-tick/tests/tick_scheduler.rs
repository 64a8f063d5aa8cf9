//! Integration tests for the fixed-period tick scheduler.
//!
//! Uses paused Tokio time so `sleep_until` resolves as soon as the clock
//! is advanced (or auto-advances when every task is idle).

use std::time::Duration;

use roomrelay_tick::{TickConfig, TickScheduler};

// =========================================================================
// Helpers
// =========================================================================

fn config_20hz() -> TickConfig {
    TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_rate(20)
    }
}

fn config_one_second() -> TickConfig {
    TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_period(Duration::from_secs(1))
    }
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_is_disabled() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.period, None);
}

#[test]
fn test_with_rate_sets_period() {
    let cfg = TickConfig::with_rate(20);
    assert_eq!(cfg.period, Some(Duration::from_millis(50)));
}

#[test]
fn test_with_rate_zero_is_disabled() {
    assert_eq!(TickConfig::with_rate(0).period, None);
}

#[test]
fn test_with_rate_clamps_to_max() {
    let cfg = TickConfig::with_rate(10_000);
    let expected = Duration::from_secs_f64(1.0 / f64::from(TickConfig::MAX_TICK_RATE_HZ));
    assert_eq!(cfg.period, Some(expected));
}

#[test]
fn test_with_period_zero_is_disabled() {
    assert_eq!(TickConfig::with_period(Duration::ZERO).period, None);
}

// =========================================================================
// Scheduler creation and accessors
// =========================================================================

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(config_20hz());
    assert_eq!(s.tick_count(), 0);
    assert!(!s.is_disabled());
    assert_eq!(s.period(), Some(Duration::from_millis(50)));
}

#[test]
fn test_with_period_constructor() {
    let s = TickScheduler::with_period(Duration::from_secs(1));
    assert_eq!(s.period(), Some(Duration::from_secs(1)));
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_and_increments() {
    let mut s = TickScheduler::new(config_20hz());

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert_eq!(info.period, Duration::from_millis(50));
    assert!(!info.overrun);
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(s.tick_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_one_second_ticks_follow_the_clock() {
    let mut s = TickScheduler::new(config_one_second());
    let start = tokio::time::Instant::now();

    for expected in 1..=3 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
    }

    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_never_fires() {
    let mut s = TickScheduler::new(TickConfig::default());
    let result = tokio::time::timeout(Duration::from_secs(5), s.wait_for_tick()).await;
    assert!(result.is_err(), "disabled scheduler should pend forever");
}

// =========================================================================
// Overruns
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_after_stall_reports_skipped_ticks() {
    let mut s = TickScheduler::new(config_one_second());

    // Stall for three and a half periods before waiting.
    tokio::time::advance(Duration::from_millis(3_500)).await;
    let info = s.wait_for_tick().await;

    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 2);
    assert_eq!(s.metrics().total_overruns, 1);
    assert_eq!(s.metrics().total_skipped, 2);

    // Rescheduled from now, so the next tick is a full period away.
    let start = tokio::time::Instant::now();
    s.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

// =========================================================================
// Metrics
// =========================================================================

#[test]
fn test_initial_metrics_are_zero() {
    let s = TickScheduler::new(config_20hz());
    let m = s.metrics();
    assert_eq!(m.total_ticks, 0);
    assert_eq!(m.total_overruns, 0);
    assert_eq!(m.total_skipped, 0);
    assert_eq!(m.max_tick_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_noop() {
    let mut s = TickScheduler::new(config_20hz());
    s.record_tick_end();
    assert_eq!(s.metrics().total_ticks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_max_tick_time_tracked() {
    let mut s = TickScheduler::new(config_20hz());

    // record_tick_end uses the wall clock, not Tokio time.
    s.wait_for_tick().await;
    std::thread::sleep(Duration::from_micros(50));
    s.record_tick_end();

    assert!(s.metrics().max_tick_time > Duration::ZERO);
    assert_eq!(s.metrics().total_ticks, 1);
}

// =========================================================================
// select! loop pattern (mirrors the reaper worker)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_pattern() {
    let mut s = TickScheduler::new(config_20hz());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(10);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(160)).await;
        tx.send("stop").await.ok();
    });

    let mut ticks_fired = 0u64;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            info = s.wait_for_tick() => {
                ticks_fired += 1;
                s.record_tick_end();
                assert_eq!(info.tick, ticks_fired);
            }
        }
    }

    assert!(ticks_fired >= 3, "expected at least 3 ticks, got {ticks_fired}");
}
