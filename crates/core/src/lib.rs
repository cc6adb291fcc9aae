//! Core library for the Hyperview real-time visualisation.
//!
//! Everything runs on one thread. A [`Ticker`] turns frame timestamps into
//! ticks, the [`Orchestrator`] updates the scene subsystems and the pass
//! state in a fixed order on every tick and then renders the [`PassChain`].
//! Named control events arrive through the [`ControlBus`] and retarget
//! animated parameters, which ease towards their new value through a
//! [`Transition`]. Nothing is constructed until the [`StartupBarrier`] has
//! every declared asset in hand.

pub mod assets;
pub mod bus;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod raster;
pub mod render;
pub mod scene;
pub mod startup;
pub mod subscription;
pub mod ticker;
pub mod transition;

pub use assets::{
    Asset, AssetEntry, AssetKind, AssetLoader, AssetManifest, AssetStore, FsLoader,
    ProceduralLoader,
};
pub use bus::{ControlBus, ControlValue};
pub use config::AppConfig;
pub use error::{HyperviewError, Result};
pub use orchestrator::{FrameReport, Orchestrator};
pub use raster::{Image, Rgb};
pub use render::{Pass, PassChain, Surface};
pub use scene::{Scene, Subsystem};
pub use startup::StartupBarrier;
pub use subscription::{DispatchReport, SubscriptionHandle};
pub use ticker::{FrameClock, ManualClock, SystemClock, Tick, Ticker};
pub use transition::{ease, SharedTransition, Transition};
