//! Fixed-rate tick scheduler for Skirmish rooms.
//!
//! A room's phase clock runs on whole seconds, but the room loop ticks
//! much faster (20 Hz by default) so that phase changes land promptly.
//! Two pieces make that work:
//!
//! - [`TickScheduler`] wakes the room at a fixed rate and reports the
//!   *actual* time elapsed since the previous tick, which is larger than
//!   the nominal period when the room falls behind.
//! - [`SecondAccumulator`] sums those elapsed times and hands out whole
//!   seconds, several at once if a tick was very late. The game owns one
//!   and feeds it from `Game::advance(dt)`.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         tick = scheduler.wait_for_tick() => {
//!             let events = game.advance(tick.dt);
//!             /* broadcast events, replicate the patch */
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz, `1..=128`.
    pub tick_rate_hz: u32,
    /// Fraction of the tick period (0.0–1.0) above which a slow tick is
    /// logged. Default: 0.80.
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max µs) added to the *first* tick so rooms created
    /// at the same instant don't tick in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            budget_warn_threshold: 0.80,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub const MIN_TICK_RATE_HZ: u32 = 1;
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Create a config for a specific tick rate with default settings.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        let clamped = self
            .tick_rate_hz
            .clamp(Self::MIN_TICK_RATE_HZ, Self::MAX_TICK_RATE_HZ);
        if clamped != self.tick_rate_hz {
            warn!(
                rate = self.tick_rate_hz,
                clamped, "tick_rate_hz out of range, clamping"
            );
            self.tick_rate_hz = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Nominal duration of a single tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
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
    /// Time actually elapsed since the previous tick (or since the
    /// scheduler was created, for the first one).
    pub dt: Duration,
    /// `true` if the tick woke more than 10% of a period late.
    pub late: bool,
}

/// Runtime counters for one scheduler.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_late: u64,
    /// Longest tick body reported via [`TickScheduler::record_tick_end`].
    pub max_tick_time: Duration,
    /// Last tick body time divided by the tick period.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-rate tick scheduler. One per room actor.
///
/// Missed ticks are never replayed: after a late wake-up the next tick is
/// scheduled one period from *now*, and the extra time shows up in `dt`.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Duration,
    tick_count: u64,
    next_tick: TokioInstant,
    last_tick: TokioInstant,
    /// Wall-clock start of the current tick body, consumed by
    /// `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Create a new scheduler. The first tick is scheduled one period from
    /// now plus a random jitter.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
        } else {
            Duration::ZERO
        };
        let now = TokioInstant::now();

        debug!(
            rate_hz = config.tick_rate_hz,
            budget_ms = tick_duration.as_secs_f64() * 1000.0,
            "tick scheduler created"
        );

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick: now + tick_duration + jitter,
            last_tick: now,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Create a scheduler for a specific tick rate with default settings.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Wait until the next tick is due.
    ///
    /// Cancel-safe: if the future is dropped before it resolves (another
    /// `select!` branch won), no state has changed.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        time::sleep_until(self.next_tick).await;

        let now = TokioInstant::now();
        let dt = now.saturating_duration_since(self.last_tick);
        let late_by = now.saturating_duration_since(self.next_tick);
        let late = late_by > self.tick_duration / 10;

        self.tick_count += 1;
        self.last_tick = now;
        self.next_tick = now + self.tick_duration;
        self.tick_start = Some(Instant::now());

        self.metrics.total_ticks += 1;
        if late {
            self.metrics.total_late += 1;
            debug!(
                tick = self.tick_count,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick fired late"
            );
        }
        trace!(tick = self.tick_count, ?dt, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt,
            late,
        }
    }

    /// Record that the room finished processing the current tick.
    ///
    /// Warns when the tick body used more than the configured share of
    /// the period. A no-op without a preceding `wait_for_tick`.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.tick_duration.as_secs_f64();
        self.metrics.budget_utilization = utilization;
        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }

        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.tick_duration.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick approaching budget limit"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}

// ---------------------------------------------------------------------------
// Whole-second accumulation
// ---------------------------------------------------------------------------

/// Turns a stream of tick durations into whole seconds.
///
/// Sub-second remainders carry over between calls. Call
/// [`reset`](Self::reset) whenever the clock should not be running (paused,
/// or in a phase without a timer) so the remainder is discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecondAccumulator {
    carry: Duration,
}

impl SecondAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `dt` and returns how many whole seconds are now complete.
    pub fn accumulate(&mut self, dt: Duration) -> u32 {
        self.carry += dt;
        let whole = self.carry.as_secs();
        self.carry -= Duration::from_secs(whole);
        u32::try_from(whole).unwrap_or(u32::MAX)
    }

    /// Discards the pending sub-second remainder.
    pub fn reset(&mut self) {
        self.carry = Duration::ZERO;
    }

    /// Time accumulated towards the next whole second.
    pub fn pending(&self) -> Duration {
        self.carry
    }
}
