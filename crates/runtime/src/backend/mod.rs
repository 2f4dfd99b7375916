//! # Backend Adapters
//!
//! One adapter per host runtime, both implementing [`Backend`]. The variant is
//! chosen once; code above this module never learns which one it talks to.
//!
//! Native calls go through a versioned method table resolved at adapter
//! construction, so a missing or renamed native entry point is a table
//! lookup decision rather than a runtime surprise.

pub mod ecs;
pub mod registry;
pub mod retained;

pub use ecs::EcsBackend;
pub use registry::HandleRegistry;
pub use retained::RetainedBackend;

use headgear_common::{Backend, RuntimeVariant};
use headgear_host::ecs::{EcsError, SharedWorld};
use headgear_host::retained::{NativeError, SharedRuntime};
use thiserror::Error;

/// Failures inside an adapter. Logged and swallowed at the capability
/// boundary.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Host runtime not bound")]
    Unbound,

    #[error("Unknown or released handle")]
    UnknownHandle,

    #[error("Handle refers to the wrong kind of object")]
    WrongKind,

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error(transparent)]
    Retained(#[from] NativeError),
}

/// Native runtimes available to this process. Normally only one is `Some`.
#[derive(Clone, Default)]
pub struct HostBindings {
    pub ecs: Option<SharedWorld>,
    pub retained: Option<SharedRuntime>,
}

impl HostBindings {
    pub fn ecs(world: SharedWorld) -> Self {
        Self {
            ecs: Some(world),
            retained: None,
        }
    }

    pub fn retained(runtime: SharedRuntime) -> Self {
        Self {
            ecs: None,
            retained: Some(runtime),
        }
    }
}

/// Build the adapter for `variant`. The other runtime's binding is ignored.
pub fn select_backend(variant: RuntimeVariant, bindings: HostBindings) -> Box<dyn Backend> {
    match variant {
        RuntimeVariant::Ecs => {
            if bindings.ecs.is_none() {
                tracing::warn!("ECS runtime selected but no world is bound");
            }
            Box::new(EcsBackend::new(bindings.ecs))
        }
        RuntimeVariant::Retained => {
            if bindings.retained.is_none() {
                tracing::warn!("Retained runtime selected but no runtime is bound");
            }
            Box::new(RetainedBackend::new(bindings.retained))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::prelude::World;
    use headgear_host::{ecs, retained};

    #[test]
    fn test_select_backend_ignores_other_binding() {
        let bindings = HostBindings {
            ecs: Some(ecs::share(World::new())),
            retained: Some(retained::share(retained::RetainedRuntime::new(1))),
        };

        let a = select_backend(RuntimeVariant::Ecs, bindings.clone());
        assert_eq!(a.variant(), RuntimeVariant::Ecs);
        assert!(a.is_bound());

        let b = select_backend(RuntimeVariant::Retained, bindings);
        assert_eq!(b.variant(), RuntimeVariant::Retained);
        assert_eq!(b.api_version(), 1);
    }

    #[test]
    fn test_unbound_backend_is_neutral() {
        let backend = select_backend(RuntimeVariant::Ecs, HostBindings::default());
        assert!(!backend.is_bound());
        assert!(backend.local_character().is_none());
        assert!(backend.player_camera().is_none());
    }
}
