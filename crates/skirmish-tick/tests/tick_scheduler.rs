//! Integration tests for the tick scheduler.
//!
//! Uses Tokio's paused clock so `sleep_until` resolves as soon as every
//! task is idle, and `tokio::time::advance` to simulate a stalled room.

use std::time::Duration;

use skirmish_tick::{SecondAccumulator, TickConfig, TickScheduler};

// =========================================================================
// Helpers
// =========================================================================

fn config_20hz() -> TickConfig {
    TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_rate(20)
    }
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_is_twenty_hz() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.tick_rate_hz, 20);
    assert_eq!(cfg.tick_duration(), Duration::from_millis(50));
}

#[test]
fn test_validated_zero_rate_clamps_to_one() {
    let cfg = TickConfig::with_rate(0).validated();
    assert_eq!(cfg.tick_rate_hz, 1);
}

#[test]
fn test_validated_excessive_rate_clamps_to_max() {
    let cfg = TickConfig::with_rate(1_000).validated();
    assert_eq!(cfg.tick_rate_hz, TickConfig::MAX_TICK_RATE_HZ);
}

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(config_20hz());
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.tick_rate_hz(), 20);
    assert_eq!(s.tick_duration(), Duration::from_millis(50));
    assert_eq!(s.metrics().total_ticks, 0);
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_on_schedule_reports_nominal_dt() {
    let mut s = TickScheduler::new(config_20hz());

    for expected in 1..=3 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert_eq!(info.dt, Duration::from_millis(50));
        assert!(!info.late);
    }
    assert_eq!(s.tick_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_after_stall_reports_actual_elapsed() {
    let mut s = TickScheduler::new(config_20hz());
    s.wait_for_tick().await;

    // The room was busy for 2 seconds.
    tokio::time::advance(Duration::from_secs(2)).await;
    let info = s.wait_for_tick().await;

    assert!(info.late);
    assert_eq!(info.dt, Duration::from_secs(2));
    assert_eq!(s.metrics().total_late, 1);

    // Missed ticks are not replayed: the next one is a normal period away.
    let info = s.wait_for_tick().await;
    assert_eq!(info.dt, Duration::from_millis(50));
    assert!(!info.late);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_noop() {
    let mut s = TickScheduler::new(config_20hz());
    s.record_tick_end();
    assert_eq!(s.metrics().max_tick_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_tracks_budget_utilization() {
    let mut s = TickScheduler::new(config_20hz());

    s.wait_for_tick().await;
    // Budget measurement uses the wall clock, not Tokio's paused one.
    std::thread::sleep(Duration::from_micros(50));
    s.record_tick_end();

    let util = s.metrics().budget_utilization;
    assert!(util > 0.0);
    assert!(util < 1.0);
    assert!(s.metrics().max_tick_time > Duration::ZERO);
}

// =========================================================================
// Scheduler + accumulator (mirrors the room's phase clock)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_thirty_seconds_of_ticks_yield_thirty_whole_seconds() {
    let mut s = TickScheduler::new(config_20hz());
    let mut acc = SecondAccumulator::new();

    let mut seconds = 0;
    for _ in 0..600 {
        let info = s.wait_for_tick().await;
        seconds += acc.accumulate(info.dt);
    }

    assert_eq!(seconds, 30);
}

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

    assert_eq!(ticks_fired, 3);
}
