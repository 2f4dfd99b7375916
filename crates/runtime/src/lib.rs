//! # Headgear Runtime
//!
//! Attaches a head-mounted device model to the local player's character and
//! keeps it out of the first-person view, on whichever host scripting
//! runtime the game shipped with.
//!
//! ## Modules
//!
//! - [`backend`]: Adapters for runtime A (ECS world) and runtime B (retained tree)
//! - [`assets`]: Embedded payload → temp file → bundle → template
//! - [`anchor`]: Head bone / name search / root fallback
//! - [`attachment`]: Instance lifecycle and material assignment
//! - [`visibility`]: Camera polling and render layer switching
//! - [`connection`]: Waiting for the local character to spawn
//! - [`session`]: The facade tying it together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       HeadgearSession                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  tick(now)                                                      │
//! │  ├── AttachmentController::verify   (instance lost? re-arm)     │
//! │  ├── PlayerConnector::poll          (bounded retry, auto-attach)│
//! │  └── VisibilityMachine::tick        (100ms poll, layer flips)   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  attach                                                         │
//! │  ├── AssetPipeline::template        (self-healing)              │
//! │  ├── AnchorResolver                 (strategy + confidence)     │
//! │  └── instantiate → parent → transform → materials → persist     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Box<dyn Backend>  (EcsBackend | RetainedBackend, chosen once)  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod anchor;
pub mod assets;
pub mod attachment;
pub mod backend;
pub mod connection;
pub mod error;
pub mod session;
pub mod visibility;

use bevy::prelude::*;
use headgear_common::{HeadgearConfig, RuntimeVariant};
use std::path::PathBuf;

pub use backend::HostBindings;
pub use session::HeadgearSession;

// ============================================================================
// Plugin
// ============================================================================

/// Runs a [`HeadgearSession`] inside a Bevy app.
///
/// # Example
/// ```rust,ignore
/// use bevy::prelude::*;
/// use headgear_runtime::{HeadgearPlugin, HostBindings};
///
/// fn main() {
///     let world = headgear_host::ecs::share(World::new());
///     App::new()
///         .add_plugins(MinimalPlugins)
///         .add_plugins(HeadgearPlugin::new(HostBindings::ecs(world)))
///         .run();
/// }
/// ```
pub struct HeadgearPlugin {
    bindings: HostBindings,
    config: HeadgearConfig,
    variant: Option<RuntimeVariant>,
    temp_dir: Option<PathBuf>,
}

impl HeadgearPlugin {
    pub fn new(bindings: HostBindings) -> Self {
        Self {
            bindings,
            config: HeadgearConfig::default(),
            variant: None,
            temp_dir: None,
        }
    }

    pub fn with_config(mut self, config: HeadgearConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip environment detection.
    pub fn with_variant(mut self, variant: RuntimeVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

impl Plugin for HeadgearPlugin {
    fn build(&self, app: &mut App) {
        let bindings = self.bindings.clone();
        let config = self.config.clone();
        let mut session = match self.variant {
            Some(variant) => HeadgearSession::for_variant(variant, bindings, config),
            None => HeadgearSession::for_environment(bindings, config),
        };
        if let Some(dir) = &self.temp_dir {
            session = session.with_temp_dir(dir.clone());
        }

        if !session.initialize() {
            tracing::warn!("Headgear started without device assets: {}", session.status());
        }

        app.insert_resource(session)
            .add_systems(Update, drive_session);

        tracing::info!("HeadgearPlugin initialized");
    }
}

fn drive_session(mut session: ResMut<HeadgearSession>, time: Res<Time>) {
    session.tick(time.elapsed());
}

pub mod prelude {
    pub use crate::anchor::{AnchorResolution, AnchorStrategy};
    pub use crate::assets::{AcquisitionState, ResourceTable};
    pub use crate::attachment::AttachmentState;
    pub use crate::backend::{select_backend, HostBindings};
    pub use crate::session::HeadgearSession;
    pub use crate::HeadgearPlugin;
    pub use headgear_common::{AudioChannel, HeadgearConfig, RuntimeVariant};
}
