//! # Headgear Configuration
//!
//! TOML-based configuration. Every field has a default so a partial (or
//! missing) file still yields a working setup.
//!
//! ```toml
//! [assets]
//! template_name = "Headphones"
//!
//! [attachment]
//! position = [0.0, -0.02, 0.0]
//! materials = ["Headphones_Band", "Headphones_Cushion", "Headphones_Metal"]
//!
//! [visibility]
//! poll_interval_ms = 100
//! hidden_layer = 30
//! ```

use bevy::prelude::{EulerRot, Quat, Transform, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadgearConfig {
    #[serde(default)]
    pub assets: AssetSettings,
    #[serde(default)]
    pub attachment: AttachmentSettings,
    #[serde(default)]
    pub anchor: AnchorSettings,
    #[serde(default)]
    pub visibility: VisibilitySettings,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl HeadgearConfig {
    /// Load from TOML file or return default
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::load(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load headgear config {}: {}", path.display(), e);
                }
            }
        }
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save to TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Where the embedded payload lives and what to pull out of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSettings {
    /// Resource name of the embedded bundle
    #[serde(default = "default_payload_name")]
    pub payload_name: String,
    #[serde(default = "default_product_namespace")]
    pub product_namespace: String,
    #[serde(default = "default_short_namespace")]
    pub short_namespace: String,
    /// Prefab to extract; the first prefab in the bundle is used if absent
    #[serde(default = "default_template_name")]
    pub template_name: String,
}

fn default_payload_name() -> String { "headphones.bundle".to_string() }
fn default_product_namespace() -> String { "Headgear.Assets".to_string() }
fn default_short_namespace() -> String { "Assets".to_string() }
fn default_template_name() -> String { "Headphones".to_string() }

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            payload_name: default_payload_name(),
            product_namespace: default_product_namespace(),
            short_namespace: default_short_namespace(),
            template_name: default_template_name(),
        }
    }
}

impl AssetSettings {
    /// Resource names to try, in order: exact, product-namespaced, short-namespaced.
    pub fn payload_name_variants(&self) -> Vec<String> {
        let mut variants = vec![self.payload_name.clone()];
        for namespace in [&self.product_namespace, &self.short_namespace] {
            if !namespace.is_empty() {
                variants.push(format!("{}.{}", namespace, self.payload_name));
            }
        }
        variants.dedup();
        variants
    }
}

/// Placement and look of the device instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentSettings {
    /// Local offset from the anchor
    #[serde(default = "default_position")]
    pub position: [f32; 3],
    /// Local rotation, XYZ euler degrees
    #[serde(default = "default_rotation")]
    pub rotation_degrees: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    /// Per-slot materials, applied when the slot count matches
    #[serde(default = "default_materials")]
    pub materials: Vec<String>,
    /// Used for every configured slot on a count mismatch
    #[serde(default = "default_material")]
    pub default_material: String,
}

fn default_position() -> [f32; 3] { [0.0, -0.02, 0.0] }
fn default_rotation() -> [f32; 3] { [0.0, 90.0, 0.0] }
fn default_scale() -> [f32; 3] { [1.0, 1.0, 1.0] }
fn default_material() -> String { "Headphones_Default".to_string() }

fn default_materials() -> Vec<String> {
    vec![
        "Headphones_Band".to_string(),
        "Headphones_Cushion".to_string(),
        "Headphones_Metal".to_string(),
    ]
}

impl Default for AttachmentSettings {
    fn default() -> Self {
        Self {
            position: default_position(),
            rotation_degrees: default_rotation(),
            scale: default_scale(),
            materials: default_materials(),
            default_material: default_material(),
        }
    }
}

impl AttachmentSettings {
    pub fn local_transform(&self) -> Transform {
        let [x, y, z] = self.rotation_degrees;
        Transform {
            translation: Vec3::from_array(self.position),
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                x.to_radians(),
                y.to_radians(),
                z.to_radians(),
            ),
            scale: Vec3::from_array(self.scale),
        }
    }
}

/// Anchor search vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSettings {
    /// Known head bone names, matched case-insensitively
    #[serde(default = "default_head_bone_names")]
    pub head_bone_names: Vec<String>,
    /// Substrings marking the preferred child of the head bone
    #[serde(default = "default_marker_words")]
    pub marker_words: Vec<String>,
}

fn default_head_bone_names() -> Vec<String> {
    [
        "Head",
        "head",
        "mixamorig:Head",
        "Bip01 Head",
        "Bip001 Head",
        "Head_M",
        "HeadBone",
        "head_bone",
        "c_head",
        "DEF-head",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_marker_words() -> Vec<String> {
    vec!["ear".to_string(), "end".to_string(), "top".to_string()]
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            head_bone_names: default_head_bone_names(),
            marker_words: default_marker_words(),
        }
    }
}

/// First-person culling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilitySettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub visible_layer: u8,
    /// Layer the first-person camera doesn't render
    #[serde(default = "default_hidden_layer")]
    pub hidden_layer: u8,
}

fn default_poll_interval() -> u64 { 100 }
fn default_hidden_layer() -> u8 { 30 }

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            visible_layer: 0,
            hidden_layer: default_hidden_layer(),
        }
    }
}

impl VisibilitySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Local player discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Attach as soon as the local character shows up
    #[serde(default = "default_true")]
    pub auto_attach: bool,
}

fn default_max_attempts() -> u32 { 30 }
fn default_retry_delay() -> u64 { 500 }
fn default_true() -> bool { true }

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            auto_attach: true,
        }
    }
}

impl ConnectionSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
