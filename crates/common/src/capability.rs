//! # Capability Interfaces
//!
//! The narrow surface Headgear consumes from the host engine. Both backend
//! adapters implement every trait here; nothing outside the adapters touches
//! a native object model directly.
//!
//! Every method is infallible from the caller's point of view. A native
//! failure (missing singleton, destroyed object, wrong object class) is logged
//! by the adapter and reported as the neutral value: `false`, `None`, or an
//! empty `Vec`.

use crate::bundle::ObjectCategory;
use crate::camera::CameraSnapshot;
use crate::handle::{
    AudioMixerHandle, AvatarHandle, BundleHandle, CameraHandle, CharacterHandle, DeviceHandle,
    NativeKey, TemplateHandle, TransformHandle,
};
use crate::variant::RuntimeVariant;
use bevy::prelude::{Transform, Vec3};
use std::fmt;
use std::path::Path;

/// Scene graph access shared by every object kind.
pub trait SceneCapability {
    /// Whether the native object behind `key` still exists.
    fn is_live(&self, key: NativeKey) -> bool;

    fn node_name(&self, node: TransformHandle) -> Option<String>;

    /// Direct children only, in native order.
    fn children(&self, node: TransformHandle) -> Vec<TransformHandle>;

    fn local_position(&self, node: TransformHandle) -> Option<Vec3>;

    /// Deep-copy a template into the live scene. The copy starts unparented.
    fn instantiate(&mut self, template: TemplateHandle) -> Option<DeviceHandle>;

    fn set_parent(&mut self, node: TransformHandle, parent: TransformHandle) -> bool;

    fn set_local_transform(&mut self, node: TransformHandle, transform: Transform) -> bool;

    /// Material names of the node's own renderer. Empty for non-renderers.
    fn material_slots(&self, node: TransformHandle) -> Vec<String>;

    fn set_material_slots(&mut self, node: TransformHandle, materials: Vec<String>) -> bool;

    fn render_layer(&self, node: TransformHandle) -> Option<u8>;

    /// Set the render layer of `node` and every descendant.
    fn set_render_layer_recursive(&mut self, node: TransformHandle, layer: u8) -> bool;

    /// Keep the node alive across scene unloads.
    fn mark_persistent(&mut self, node: TransformHandle) -> bool;

    /// Destroy the node and its descendants.
    fn destroy(&mut self, node: TransformHandle) -> bool;
}

pub trait CharacterCapability {
    /// The character controlled by this client, once spawned.
    fn local_character(&self) -> Option<CharacterHandle>;

    fn character_root(&self, character: CharacterHandle) -> Option<TransformHandle>;

    fn character_name(&self, character: CharacterHandle) -> Option<String>;

    /// Skeletal avatar, absent on simplified or still-loading characters.
    fn avatar(&self, character: CharacterHandle) -> Option<AvatarHandle>;
}

pub trait AvatarCapability {
    fn head_bone(&self, avatar: AvatarHandle) -> Option<TransformHandle>;
}

pub trait CameraCapability {
    fn player_camera(&self) -> Option<CameraHandle>;

    fn camera_snapshot(&self, camera: CameraHandle) -> Option<CameraSnapshot>;
}

pub trait BundleCapability {
    /// Load a bundle container from a file on disk.
    fn load_bundle(&mut self, path: &Path) -> Option<BundleHandle>;

    fn load_asset(
        &mut self,
        bundle: BundleHandle,
        name: &str,
        category: ObjectCategory,
    ) -> Option<TemplateHandle>;

    fn load_all_assets(&mut self, bundle: BundleHandle, category: ObjectCategory)
        -> Vec<TemplateHandle>;

    fn asset_names(&self, bundle: BundleHandle) -> Vec<String>;

    /// Unload the container. With `unload_objects`, loaded templates go too.
    fn unload_bundle(&mut self, bundle: BundleHandle, unload_objects: bool) -> bool;
}

/// Mixer channels the game exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioChannel {
    Master,
    Music,
    Effects,
    Ambient,
    Ui,
}

impl AudioChannel {
    pub const ALL: [AudioChannel; 5] = [
        AudioChannel::Master,
        AudioChannel::Music,
        AudioChannel::Effects,
        AudioChannel::Ambient,
        AudioChannel::Ui,
    ];
}

impl fmt::Display for AudioChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioChannel::Master => "Master",
            AudioChannel::Music => "Music",
            AudioChannel::Effects => "Effects",
            AudioChannel::Ambient => "Ambient",
            AudioChannel::Ui => "Ui",
        };
        f.write_str(name)
    }
}

pub trait AudioMixerCapability {
    fn audio_mixer(&self) -> Option<AudioMixerHandle>;

    /// Linear volume in `0.0..=1.0`.
    fn channel_volume(&self, mixer: AudioMixerHandle, channel: AudioChannel) -> Option<f32>;

    fn set_channel_volume(
        &mut self,
        mixer: AudioMixerHandle,
        channel: AudioChannel,
        volume: f32,
    ) -> bool;
}

pub trait MusicPlayerCapability {
    /// Stop the game's own background music so it doesn't fight ours.
    fn stop_music(&mut self) -> bool;
}

/// One complete adapter set, bound to exactly one host runtime.
pub trait Backend:
    SceneCapability
    + CharacterCapability
    + AvatarCapability
    + CameraCapability
    + BundleCapability
    + AudioMixerCapability
    + MusicPlayerCapability
    + Send
    + Sync
{
    fn variant(&self) -> RuntimeVariant;

    /// Version of the native method table this adapter selected.
    fn api_version(&self) -> u32;

    /// False when the native runtime was absent at construction.
    fn is_bound(&self) -> bool;
}
