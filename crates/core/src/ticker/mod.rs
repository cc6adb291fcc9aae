use std::time::{Duration, Instant};

use crate::{
    config::TickerConfig,
    subscription::{DispatchReport, SubscriptionHandle, Subscriptions},
    Result,
};

/// Timing information delivered to every `update` subscriber for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    /// Time since the previous tick. Never negative.
    pub elapsed: Duration,
    /// Time since the ticker was started.
    pub absolute: Duration,
    /// Zero-based frame counter since the ticker was started.
    pub frame: u64,
}

/// Source of frame timestamps. Values are measured from an arbitrary origin.
pub trait FrameClock {
    fn now(&mut self) -> Duration;
}

/// Monotonic wall clock.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for SystemClock {
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }
}

/// Deterministic clock for headless runs and tests.
///
/// Every call to [`FrameClock::now`] returns the current reading and then
/// advances it by `step`. The reading can also be set explicitly, including
/// backwards, to simulate clock adjustments.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Duration,
    step: Duration,
}

impl ManualClock {
    pub fn new(step: Duration) -> Self {
        Self {
            now: Duration::ZERO,
            step,
        }
    }

    pub fn set(&mut self, now: Duration) {
        self.now = now;
    }

    pub fn peek(&self) -> Duration {
        self.now
    }
}

impl FrameClock for ManualClock {
    fn now(&mut self) -> Duration {
        let now = self.now;
        self.now += self.step;
        now
    }
}

#[derive(Debug, Clone, Copy)]
struct Running {
    started_at: Duration,
    last_tick: Option<Duration>,
    frame: u64,
}

/// Frame scheduler. The frame source calls [`Ticker::frame`] once per
/// animation frame; while started, the ticker turns that into a [`Tick`] and
/// notifies every `update` subscriber in registration order.
#[derive(Debug, Default)]
pub struct Ticker {
    subscribers: Subscriptions<Tick>,
    first_tick_elapsed: Duration,
    running: Option<Running>,
}

impl Ticker {
    pub fn new(config: &TickerConfig) -> Self {
        Self {
            first_tick_elapsed: config.first_tick_elapsed(),
            ..Self::default()
        }
    }

    /// Registers an `update` subscriber.
    pub fn on_update<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&Tick) -> Result<()> + 'static,
    {
        self.subscribers.insert(Box::new(callback))
    }

    pub fn off(&mut self, handle: &SubscriptionHandle) {
        handle.cancel();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Begins frame notification. Returns `false` if already running, in
    /// which case nothing changes.
    pub fn start(&mut self, now: Duration) -> bool {
        if self.running.is_some() {
            return false;
        }
        tracing::info!(?now, "ticker started");
        self.running = Some(Running {
            started_at: now,
            last_tick: None,
            frame: 0,
        });
        true
    }

    /// Halts frame notification. Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.running.take().is_some();
        if was_running {
            tracing::info!("ticker stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Handles one frame from the frame source. Returns `None` while stopped.
    pub fn frame(&mut self, now: Duration) -> Option<DispatchReport> {
        let running = self.running.as_mut()?;

        let elapsed = match running.last_tick {
            None => self.first_tick_elapsed,
            Some(last) => now.checked_sub(last).unwrap_or(Duration::ZERO),
        };
        let tick = Tick {
            elapsed,
            absolute: now.saturating_sub(running.started_at),
            frame: running.frame,
        };
        running.last_tick = Some(now);
        running.frame += 1;

        tracing::debug!(frame = tick.frame, elapsed = ?tick.elapsed, "tick");
        Some(self.subscribers.dispatch("update", &tick))
    }

    /// Convenience loop that pulls `frames` timestamps from `clock`.
    pub fn run_frames(&mut self, clock: &mut dyn FrameClock, frames: u64) -> DispatchReport {
        let mut total = DispatchReport::default();
        for _ in 0..frames {
            if let Some(report) = self.frame(clock.now()) {
                total.delivered += report.delivered;
                total.faulted += report.faulted;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn recording_ticker() -> (Ticker, Rc<RefCell<Vec<Tick>>>) {
        let mut ticker = Ticker::default();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&ticks);
        ticker.on_update(move |tick| {
            sink.borrow_mut().push(*tick);
            Ok(())
        });
        (ticker, ticks)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn computes_elapsed_and_absolute() {
        let (mut ticker, ticks) = recording_ticker();
        ticker.start(ms(100));
        ticker.frame(ms(100));
        ticker.frame(ms(116));
        ticker.frame(ms(150));

        let ticks = ticks.borrow();
        assert_eq!(ticks[0].elapsed, Duration::ZERO);
        assert_eq!(ticks[1].elapsed, ms(16));
        assert_eq!(ticks[2].elapsed, ms(34));
        assert_eq!(ticks[2].absolute, ms(50));
        assert_eq!(ticks[2].frame, 2);
    }

    #[test]
    fn first_tick_uses_configured_default() {
        let mut ticker = Ticker::new(&TickerConfig {
            first_tick_elapsed_ms: 16,
        });
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        ticker.on_update(move |tick| {
            *sink.borrow_mut() = Some(tick.elapsed);
            Ok(())
        });

        ticker.start(ms(5_000));
        ticker.frame(ms(9_000));
        assert_eq!(*seen.borrow(), Some(ms(16)));
    }

    #[test]
    fn backwards_clock_clamps_to_zero() {
        let (mut ticker, ticks) = recording_ticker();
        ticker.start(ms(0));
        ticker.frame(ms(500));
        ticker.frame(ms(200));
        ticker.frame(ms(210));

        let ticks = ticks.borrow();
        assert_eq!(ticks[1].elapsed, Duration::ZERO);
        assert_eq!(ticks[2].elapsed, ms(10));
    }

    #[test]
    fn start_is_idempotent() {
        let (mut ticker, ticks) = recording_ticker();
        assert!(ticker.start(ms(0)));
        assert!(!ticker.start(ms(40)));

        ticker.frame(ms(60));
        assert_eq!(ticks.borrow().len(), 1);
        assert_eq!(ticks.borrow()[0].absolute, ms(60));
    }

    #[test]
    fn stopped_ticker_delivers_nothing() {
        let (mut ticker, ticks) = recording_ticker();
        assert!(ticker.frame(ms(10)).is_none());
        ticker.start(ms(10));
        ticker.frame(ms(20));
        assert!(ticker.stop());
        assert!(ticker.frame(ms(30)).is_none());
        assert_eq!(ticks.borrow().len(), 1);
    }

    #[test]
    fn delivers_once_per_tick_in_registration_order() {
        let mut ticker = Ticker::default();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            ticker.on_update(move |_| {
                order.borrow_mut().push(tag);
                Ok(())
            });
        }

        ticker.start(ms(0));
        ticker.frame(ms(0));
        ticker.frame(ms(16));
        assert_eq!(*order.borrow(), vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn unsubscribing_mid_tick_keeps_current_delivery() {
        let mut ticker = Ticker::default();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<SubscriptionHandle>>> = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&victim);
        let log = Rc::clone(&calls);
        ticker.on_update(move |_| {
            log.borrow_mut().push("killer");
            if let Some(handle) = slot.borrow().as_ref() {
                handle.cancel();
            }
            Ok(())
        });
        let log = Rc::clone(&calls);
        let handle = ticker.on_update(move |_| {
            log.borrow_mut().push("victim");
            Ok(())
        });
        *victim.borrow_mut() = Some(handle);

        ticker.start(ms(0));
        ticker.frame(ms(0));
        ticker.frame(ms(16));

        assert_eq!(*calls.borrow(), vec!["killer", "victim", "killer"]);
        assert_eq!(ticker.subscriber_count(), 1);
    }

    #[test]
    fn faulty_subscriber_is_isolated() {
        let mut ticker = Ticker::default();
        ticker.on_update(|_| panic!("broken subsystem"));
        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        ticker.on_update(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        ticker.start(ms(0));
        let report = ticker.run_frames(&mut ManualClock::new(ms(16)), 3);

        assert_eq!(*hits.borrow(), 3);
        assert_eq!(report.faulted, 3);
        assert_eq!(report.delivered, 3);
    }
}
