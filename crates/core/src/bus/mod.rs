use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    raster::Rgb,
    subscription::{DispatchReport, SubscriptionHandle, Subscriptions},
    HyperviewError, Result,
};

/// Flips the visibility of the debug guide.
pub const TOGGLE_GUIDE: &str = "toggleGuide";
/// Publishes a new target for the composite pass's exclusion colour.
pub const CHANGE_EXCLUSION_COLOR: &str = "changeExclusionColor";
/// Publishes a new target opacity (`[0, 1]`) for the overlay pass.
pub const CHANGE_OVERLAY_OPACITY: &str = "changeOverlayOpacity";

/// Payload carried by a control event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ControlValue {
    Unit,
    Bool(bool),
    Number(f64),
    Color(Rgb),
    Text(String),
}

impl ControlValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Color(_) => "color",
            Self::Text(_) => "text",
        }
    }

    /// Extracts a colour whose components all lie in `[0, 1]`.
    pub fn normalized_color(&self, parameter: &str) -> Result<Rgb> {
        match self {
            Self::Color(color) if color.is_normalized() => Ok(*color),
            Self::Color(color) => Err(HyperviewError::invalid_target(
                parameter,
                format!("colour {color:?} has components outside [0, 1]"),
            )),
            other => Err(HyperviewError::invalid_target(
                parameter,
                format!("expected a colour, got {}", other.kind()),
            )),
        }
    }

    /// Extracts a finite number within `range`.
    pub fn number_in(&self, parameter: &str, range: std::ops::RangeInclusive<f64>) -> Result<f64> {
        match self {
            Self::Number(value) if value.is_finite() && range.contains(value) => Ok(*value),
            Self::Number(value) => Err(HyperviewError::invalid_target(
                parameter,
                format!("{value} is outside {range:?}"),
            )),
            other => Err(HyperviewError::invalid_target(
                parameter,
                format!("expected a number, got {}", other.kind()),
            )),
        }
    }
}

impl From<Rgb> for ControlValue {
    fn from(value: Rgb) -> Self {
        Self::Color(value)
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ControlValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Named-event dispatcher. Delivery is synchronous and follows subscription
/// order; events without subscribers are dropped.
#[derive(Debug, Default)]
pub struct ControlBus {
    channels: HashMap<String, Subscriptions<ControlValue>>,
}

impl ControlBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, name: &str, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&ControlValue) -> Result<()> + 'static,
    {
        self.channels
            .entry(name.to_string())
            .or_default()
            .insert(Box::new(callback))
    }

    pub fn off(&mut self, handle: &SubscriptionHandle) {
        handle.cancel();
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.channels.get(name).map(Subscriptions::len).unwrap_or(0)
    }

    pub fn emit(&mut self, name: &str, payload: impl Into<ControlValue>) -> DispatchReport {
        let payload = payload.into();
        match self.channels.get_mut(name) {
            Some(subscribers) => {
                tracing::debug!(event = name, kind = payload.kind(), "control event");
                subscribers.dispatch(name, &payload)
            }
            None => {
                tracing::trace!(event = name, "control event dropped, no subscribers");
                DispatchReport::default()
            }
        }
    }
}
