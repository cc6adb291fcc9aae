//! Time-driven interpolation of animated parameters.
//!
//! A [`Transition`] is idle until a new target is published. It then eases
//! from the value it held at that moment to the target over a fixed duration.
//! Progress goes through [`ease`] twice, which flattens both ends and
//! concentrates motion around the midpoint. When the remaining time runs out
//! the value snaps to exactly the target.
//!
//! Retargeting a running transition restarts it from the current interpolated
//! value, so the output never jumps.

use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::{raster::Rgb, HyperviewError, Result};

/// Values that can be linearly interpolated.
pub trait Interpolate: Copy {
    fn interpolate(self, to: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Interpolate for Rgb {
    fn interpolate(self, to: Self, t: f32) -> Self {
        self.lerp(to, t)
    }
}

/// Smoothstep ease-in-ease-out on `[0, 1]`. Input is clamped.
pub fn ease(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Running<T> {
    start: T,
    remaining: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition<T> {
    current: T,
    target: T,
    duration: Duration,
    running: Option<Running<T>>,
}

impl<T: Interpolate> Transition<T> {
    /// Creates an idle transition resting at `value`.
    pub fn new(value: T, duration: Duration) -> Self {
        Self {
            current: value,
            target: value,
            duration,
            running: None,
        }
    }

    pub fn current(&self) -> T {
        self.current
    }

    pub fn target(&self) -> T {
        self.target
    }

    /// Value the running transition started from, if any.
    pub fn start(&self) -> Option<T> {
        self.running.map(|r| r.start)
    }

    pub fn remaining(&self) -> Duration {
        self.running.map(|r| r.remaining).unwrap_or(Duration::ZERO)
    }

    pub fn total(&self) -> Duration {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Linear progress in `[0, 1]`; `1.0` when idle.
    pub fn progress(&self) -> f32 {
        match self.running {
            Some(running) if !self.duration.is_zero() => {
                let left = running.remaining.as_secs_f64() / self.duration.as_secs_f64();
                (1.0 - left).clamp(0.0, 1.0) as f32
            }
            _ => 1.0,
        }
    }

    /// Starts easing towards `target` from the current value, restarting the
    /// full duration.
    pub fn retarget(&mut self, target: T) {
        let start = self.current;
        self.target = target;
        if self.duration.is_zero() {
            self.current = target;
            self.running = None;
            return;
        }
        self.running = Some(Running {
            start,
            remaining: self.duration,
        });
    }

    /// Moves the transition forward by `elapsed`.
    pub fn advance(&mut self, elapsed: Duration) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        running.remaining = running.remaining.saturating_sub(elapsed);
        if running.remaining.is_zero() {
            self.current = self.target;
            self.running = None;
            return;
        }

        let start = running.start;
        let eased = ease(ease(self.progress()));
        self.current = start.interpolate(self.target, eased);
    }
}

/// A transition shared between its owning pass and the control-bus
/// subscription that retargets it.
#[derive(Debug)]
pub struct SharedTransition<T> {
    inner: Rc<RefCell<Transition<T>>>,
    label: &'static str,
}

impl<T> Clone for SharedTransition<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            label: self.label,
        }
    }
}

impl<T: Interpolate> SharedTransition<T> {
    pub fn new(label: &'static str, value: T, duration: Duration) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Transition::new(value, duration))),
            label,
        }
    }

    pub fn retarget(&self, target: T) -> Result<()> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| HyperviewError::Busy(self.label))?
            .retarget(target);
        Ok(())
    }

    pub fn advance(&self, elapsed: Duration) -> Result<()> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| HyperviewError::Busy(self.label))?
            .advance(elapsed);
        Ok(())
    }

    pub fn current(&self) -> Result<T> {
        Ok(self.snapshot_ref()?.current())
    }

    /// Copy of the transition state at this instant.
    pub fn snapshot(&self) -> Result<Transition<T>> {
        Ok(self.snapshot_ref()?.clone())
    }

    fn snapshot_ref(&self) -> Result<std::cell::Ref<'_, Transition<T>>> {
        self.inner
            .try_borrow()
            .map_err(|_| HyperviewError::Busy(self.label))
    }
}
