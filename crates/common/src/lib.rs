//! # Headgear Common
//!
//! Shared types used by the native host runtimes and the attachment runtime.
//!
//! ## Modules
//!
//! - `variant`: Which host scripting runtime is active, detected once per process
//! - `handle`: Generation-checked keys for native objects
//! - `capability`: The contracts both backend adapters implement
//! - `camera`: Camera mode model and first-person classification
//! - `bundle`: RON bundle payload format (plus zstd framing)
//! - `config`: TOML configuration for the whole subsystem
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      headgear-runtime                        │
//! │   pipeline ─ anchor ─ attachment ─ visibility ─ session      │
//! ├──────────────────────────────────────────────────────────────┤
//! │              capability traits (this crate)                  │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │   EcsBackend (runtime A)     │   RetainedBackend (runtime B) │
//! ├──────────────────────────────┼───────────────────────────────┤
//! │   bevy World                 │   retained object tree        │
//! └──────────────────────────────┴───────────────────────────────┘
//! ```

pub mod bundle;
pub mod camera;
pub mod capability;
pub mod config;
pub mod handle;
pub mod variant;

pub use bundle::{
    BundleBuilder, BundleCompression, BundleFile, BundleFormatError, BundleObject,
    ObjectCategory, PrefabNode, BUNDLE_FORMAT_VERSION,
};
pub use camera::{CameraMode, CameraSnapshot};
pub use capability::{
    AudioChannel, AudioMixerCapability, AvatarCapability, Backend, BundleCapability,
    CameraCapability, CharacterCapability, MusicPlayerCapability, SceneCapability,
};
pub use config::{
    AnchorSettings, AssetSettings, AttachmentSettings, ConfigError, ConnectionSettings,
    HeadgearConfig, VisibilitySettings,
};
pub use handle::{
    kind, AudioMixerHandle, AvatarHandle, BundleHandle, CameraHandle, CharacterHandle,
    DeviceHandle, Handle, NativeKey, TemplateHandle, TransformHandle,
};
pub use variant::{detect, resolve_variant, resolve_variant_with, ProbeInputs, RuntimeVariant};
