//! # Native Object Handles
//!
//! A handle is a generational key issued by a backend adapter for one native
//! object. The key alone says nothing about whether the object still exists:
//! the engine can destroy it at any time (scene unload, unused-asset
//! collection), so consumers re-validate through
//! [`SceneCapability::is_live`](crate::capability::SceneCapability::is_live)
//! before acting on it.

use slotmap::new_key_type;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

new_key_type! {
    /// Raw key into an adapter's handle registry.
    pub struct NativeKey;
}

/// Handle kinds. Uninhabited; only used as type tags.
pub mod kind {
    pub enum Character {}
    pub enum Avatar {}
    pub enum Camera {}
    pub enum Bundle {}
    pub enum Template {}
    pub enum Device {}
    pub enum Transform {}
    pub enum AudioMixer {}
}

/// Typed handle to a native object of kind `K`.
pub struct Handle<K> {
    key: NativeKey,
    _kind: PhantomData<fn() -> K>,
}

pub type CharacterHandle = Handle<kind::Character>;
pub type AvatarHandle = Handle<kind::Avatar>;
pub type CameraHandle = Handle<kind::Camera>;
pub type BundleHandle = Handle<kind::Bundle>;
pub type TemplateHandle = Handle<kind::Template>;
pub type DeviceHandle = Handle<kind::Device>;
pub type TransformHandle = Handle<kind::Transform>;
pub type AudioMixerHandle = Handle<kind::AudioMixer>;

impl<K> Handle<K> {
    /// Wrap a registry key. Only adapters mint handles.
    pub fn from_key(key: NativeKey) -> Self {
        Self {
            key,
            _kind: PhantomData,
        }
    }

    pub fn key(self) -> NativeKey {
        self.key
    }

    /// Reinterpret as another kind sharing the same native object.
    ///
    /// Adapters use this where the native model doesn't distinguish kinds,
    /// e.g. an ECS character entity is also its own root transform.
    pub fn cast<J>(self) -> Handle<J> {
        Handle::from_key(self.key)
    }
}

impl DeviceHandle {
    /// A device instance is a scene node.
    pub fn as_transform(self) -> TransformHandle {
        self.cast()
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<K> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_name = std::any::type_name::<K>();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        write!(f, "{}Handle({:?})", short, self.key)
    }
}
