//! Post-processing pass chain.
//!
//! Passes only couple through images: each enabled pass receives the previous
//! enabled pass's output. Exactly one pass, which must be the last enabled
//! one, writes to the [`Surface`] instead of forwarding its output.

mod passes;

use std::time::Duration;

pub use passes::{CompositePass, CopyPass, DeformPass, HsvAdjust, OverlayPass, Tunable};

use crate::{raster::Image, subscription::isolate, HyperviewError, Result};

/// One stage of image post-processing.
pub trait Pass {
    fn name(&self) -> &str;

    fn render(&self, input: &Image) -> Result<Image>;

    /// Advances animated parameters. Most passes have none.
    fn update(&mut self, _elapsed: Duration) -> Result<()> {
        Ok(())
    }
}

/// Display target written by the terminal pass.
#[derive(Debug, Default)]
pub struct Surface {
    presented: Option<Image>,
    presents: u64,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present(&mut self, image: Image) {
        self.presented = Some(image);
        self.presents += 1;
    }

    pub fn last_presented(&self) -> Option<&Image> {
        self.presented.as_ref()
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }
}

/// Per-frame outcome of [`PassChain::render`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub passes_run: usize,
    /// Passes whose output was discarded this frame.
    pub faulted: Vec<String>,
}

struct PassSlot {
    pass: Box<dyn Pass>,
    enabled: bool,
    renders_to_screen: bool,
}

#[derive(Default)]
pub struct PassChain {
    slots: Vec<PassSlot>,
    /// Slot indices in the order their `update` runs. Defaults to chain order.
    update_order: Vec<usize>,
}

impl PassChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an enabled pass and returns its index.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) -> usize {
        self.slots.push(PassSlot {
            pass: Box::new(pass),
            enabled: true,
            renders_to_screen: false,
        });
        let index = self.slots.len() - 1;
        self.update_order.push(index);
        index
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.pass.name()).collect()
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.slot_mut(index)?.enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.slots.get(index).map(|slot| slot.enabled).unwrap_or(false)
    }

    pub fn set_render_to_screen(&mut self, index: usize, renders_to_screen: bool) -> Result<()> {
        self.slot_mut(index)?.renders_to_screen = renders_to_screen;
        Ok(())
    }

    /// Flags the last added pass as the terminal one.
    pub fn render_to_screen_last(&mut self) -> Result<()> {
        let last = self
            .slots
            .len()
            .checked_sub(1)
            .ok_or_else(|| HyperviewError::InvalidChain("chain has no passes".into()))?;
        self.set_render_to_screen(last, true)
    }

    /// Sets the order in which [`Self::update`] visits the passes. `order`
    /// must name every pass exactly once.
    pub fn set_update_order(&mut self, order: &[usize]) -> Result<()> {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        if !sorted.iter().copied().eq(0..self.slots.len()) {
            return Err(HyperviewError::InvalidChain(format!(
                "update order {order:?} is not a permutation of {} passes",
                self.slots.len()
            )));
        }
        self.update_order = order.to_vec();
        Ok(())
    }

    pub fn update_order(&self) -> Vec<&str> {
        self.update_order
            .iter()
            .filter_map(|&index| self.slots.get(index))
            .map(|slot| slot.pass.name())
            .collect()
    }

    pub fn terminal_index(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.renders_to_screen)
    }

    /// Checks that exactly one pass is terminal and that it is the last
    /// enabled pass.
    pub fn validate(&self) -> Result<usize> {
        let flagged: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.renders_to_screen)
            .map(|(index, _)| index)
            .collect();
        let terminal = match flagged.as_slice() {
            [index] => *index,
            [] => return Err(HyperviewError::InvalidChain("no pass renders to screen".into())),
            many => {
                return Err(HyperviewError::InvalidChain(format!(
                    "{} passes render to screen",
                    many.len()
                )))
            }
        };

        let last_enabled = self.slots.iter().rposition(|slot| slot.enabled);
        if last_enabled != Some(terminal) {
            return Err(HyperviewError::InvalidChain(format!(
                "terminal pass `{}` is not the last enabled pass",
                self.slots[terminal].pass.name()
            )));
        }
        Ok(terminal)
    }

    /// Advances every pass's animated state in update order, isolating
    /// faults. Returns the names of the passes that failed.
    pub fn update(&mut self, elapsed: Duration) -> Vec<String> {
        let mut faulted = Vec::new();
        for &index in &self.update_order {
            let Some(slot) = self.slots.get_mut(index) else {
                continue;
            };
            let name = slot.pass.name().to_string();
            if let Err(err) = isolate(&name, || slot.pass.update(elapsed)) {
                tracing::warn!(pass = %name, error = %err, "pass update failed");
                faulted.push(name);
            }
        }
        faulted
    }

    /// Runs the enabled passes front to back starting from `scene`, and
    /// presents the terminal pass's output on `surface`.
    ///
    /// A pass that fails is skipped for this frame: its input flows on to
    /// the next pass unchanged.
    pub fn render(&self, scene: Image, surface: &mut Surface) -> Result<RenderReport> {
        let terminal = self.validate()?;
        let mut report = RenderReport::default();
        let mut current = scene;

        for slot in self.slots[..=terminal].iter().filter(|slot| slot.enabled) {
            let name = slot.pass.name();
            match isolate(name, || slot.pass.render(&current)) {
                Ok(output) => {
                    current = output;
                    report.passes_run += 1;
                }
                Err(err) => {
                    tracing::warn!(pass = name, error = %err, "pass render failed");
                    report.faulted.push(name.to_string());
                }
            }
        }

        surface.present(current);
        Ok(report)
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut PassSlot> {
        let len = self.slots.len();
        self.slots.get_mut(index).ok_or_else(|| {
            HyperviewError::InvalidChain(format!("pass index {index} out of range ({len} passes)"))
        })
    }
}

impl std::fmt::Debug for PassChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassChain")
            .field("passes", &self.pass_names())
            .field("update_order", &self.update_order())
            .field("terminal", &self.terminal_index())
            .finish()
    }
}
