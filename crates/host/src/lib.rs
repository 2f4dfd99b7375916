//! # Headgear Host Runtimes
//!
//! The game ships with one of two scripting runtimes. Their object models
//! have nothing in common, which is why Headgear talks to them only through
//! the adapters in `headgear-runtime`.
//!
//! - [`ecs`]: Runtime A. A Bevy [`World`](bevy::ecs::world::World) where
//!   characters, bones and bundles are entities.
//! - [`retained`]: Runtime B. A retained object tree addressed by
//!   generation-checked [`ObjectId`](retained::ObjectId)s whose calls fail with
//!   [`NativeError`](retained::NativeError) instead of panicking.
//!
//! Both modules also carry scene-building helpers (characters from a
//! [`CharacterBlueprint`], cameras, mixers) used by hosts and tests.

pub mod ecs;
pub mod retained;

use headgear_common::PrefabNode;

/// Description of a character to spawn into either runtime.
#[derive(Debug, Clone)]
pub struct CharacterBlueprint {
    pub name: String,
    /// Transform hierarchy under the character root
    pub skeleton: PrefabNode,
    /// Whether the character gets a skeletal avatar component
    pub has_avatar: bool,
    /// Name of the skeleton node the avatar designates as head bone
    pub head_bone: Option<String>,
    /// Survives scene unloads
    pub persistent: bool,
}

impl CharacterBlueprint {
    /// Humanoid with an avatar whose head bone is `Head`.
    pub fn humanoid(name: &str) -> Self {
        Self {
            name: name.to_string(),
            skeleton: PrefabNode::new("Hips").with_child(
                PrefabNode::new("Spine").with_child(
                    PrefabNode::new("Neck")
                        .with_child(PrefabNode::new("Head").with_translation([0.0, 0.1, 0.0])),
                ),
            ),
            has_avatar: true,
            head_bone: Some("Head".to_string()),
            persistent: true,
        }
    }

    pub fn with_skeleton(mut self, skeleton: PrefabNode) -> Self {
        self.skeleton = skeleton;
        self
    }

    /// Drop the avatar component; anchors must then come from name search.
    pub fn without_avatar(mut self) -> Self {
        self.has_avatar = false;
        self.head_bone = None;
        self
    }

    pub fn with_head_bone(mut self, name: Option<&str>) -> Self {
        self.head_bone = name.map(str::to_string);
        self
    }

    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }
}
