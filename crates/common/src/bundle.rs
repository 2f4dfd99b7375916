//! # Bundle Payload Format
//!
//! A bundle is a RON document listing named objects. Prefab objects carry a
//! node tree (name, local transform, material slots, children) that a host
//! runtime materialises as template objects.
//!
//! Payloads may be zstd-compressed; decoding detects the zstd frame magic.
//!
//! ```ron
//! (
//!     version: 1,
//!     name: "headphones",
//!     objects: [
//!         (name: "Headphones", category: Prefab, root: Some((
//!             name: "Headphones",
//!             materials: ["Band"],
//!             children: [],
//!         ))),
//!     ],
//! )
//! ```

use bevy::prelude::{Quat, Transform, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current payload format version
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Bundle decoding/encoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BundleFormatError {
    #[error("Bundle payload is empty")]
    Empty,

    #[error("Bundle decompression failed: {0}")]
    Compression(String),

    #[error("Bundle is not valid UTF-8")]
    Utf8,

    #[error("Bundle RON parse error: {0}")]
    Parse(String),

    #[error("Bundle RON write error: {0}")]
    Write(String),

    #[error("Unsupported bundle version: {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid bundle: {0}")]
    Invalid(String),
}

/// Compression applied when encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleCompression {
    #[default]
    None,
    Zstd,
}

/// Category of a bundled object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectCategory {
    Prefab,
    Material,
    Mesh,
    Texture,
    AudioClip,
}

/// One node of a prefab hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabNode {
    pub name: String,
    #[serde(default)]
    pub translation: [f32; 3],
    /// Quaternion `[x, y, z, w]`
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
    /// Renderer material slots, in slot order
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub children: Vec<PrefabNode>,
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl PrefabNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translation: [0.0; 3],
            rotation: identity_rotation(),
            scale: unit_scale(),
            materials: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_materials<I, S>(mut self, materials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.materials = materials.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_translation(mut self, translation: [f32; 3]) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_child(mut self, child: PrefabNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn transform(&self) -> Transform {
        Transform {
            translation: Vec3::from_array(self.translation),
            rotation: Quat::from_array(self.rotation).normalize(),
            scale: Vec3::from_array(self.scale),
        }
    }

    /// Number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PrefabNode::node_count).sum::<usize>()
    }
}

/// A named object inside a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleObject {
    pub name: String,
    pub category: ObjectCategory,
    /// Node tree; required for prefabs, ignored otherwise
    #[serde(default)]
    pub root: Option<PrefabNode>,
}

/// Decoded bundle payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleFile {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub objects: Vec<BundleObject>,
}

impl BundleFile {
    /// Decode raw payload bytes (plain or zstd-framed RON).
    pub fn decode(bytes: &[u8]) -> Result<Self, BundleFormatError> {
        if bytes.is_empty() {
            return Err(BundleFormatError::Empty);
        }

        let decompressed;
        let text_bytes = if bytes.starts_with(&ZSTD_MAGIC) {
            decompressed = zstd::decode_all(bytes)
                .map_err(|e| BundleFormatError::Compression(e.to_string()))?;
            decompressed.as_slice()
        } else {
            bytes
        };

        let text = std::str::from_utf8(text_bytes).map_err(|_| BundleFormatError::Utf8)?;
        let file: BundleFile =
            ron::from_str(text).map_err(|e| BundleFormatError::Parse(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    /// Encode to payload bytes.
    pub fn encode(&self, compression: BundleCompression) -> Result<Vec<u8>, BundleFormatError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| BundleFormatError::Write(e.to_string()))?;

        match compression {
            BundleCompression::None => Ok(text.into_bytes()),
            BundleCompression::Zstd => zstd::encode_all(text.as_bytes(), 3)
                .map_err(|e| BundleFormatError::Compression(e.to_string())),
        }
    }

    fn validate(&self) -> Result<(), BundleFormatError> {
        if self.version != BUNDLE_FORMAT_VERSION {
            return Err(BundleFormatError::UnsupportedVersion {
                found: self.version,
                expected: BUNDLE_FORMAT_VERSION,
            });
        }

        for object in &self.objects {
            if object.name.is_empty() {
                return Err(BundleFormatError::Invalid("object with empty name".into()));
            }
            if object.category == ObjectCategory::Prefab && object.root.is_none() {
                return Err(BundleFormatError::Invalid(format!(
                    "prefab '{}' has no node tree",
                    object.name
                )));
            }
        }

        Ok(())
    }

    pub fn object(&self, name: &str) -> Option<&BundleObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name.clone()).collect()
    }

    pub fn objects_of(&self, category: ObjectCategory) -> impl Iterator<Item = &BundleObject> {
        self.objects.iter().filter(move |o| o.category == category)
    }
}

/// Builder for bundle payloads
pub struct BundleBuilder {
    file: BundleFile,
    compression: BundleCompression,
}

impl BundleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            file: BundleFile {
                version: BUNDLE_FORMAT_VERSION,
                name: name.to_string(),
                objects: Vec::new(),
            },
            compression: BundleCompression::default(),
        }
    }

    pub fn compression(mut self, compression: BundleCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn add_prefab(mut self, name: &str, root: PrefabNode) -> Self {
        self.file.objects.push(BundleObject {
            name: name.to_string(),
            category: ObjectCategory::Prefab,
            root: Some(root),
        });
        self
    }

    pub fn add_object(mut self, name: &str, category: ObjectCategory) -> Self {
        self.file.objects.push(BundleObject {
            name: name.to_string(),
            category,
            root: None,
        });
        self
    }

    pub fn file(&self) -> &BundleFile {
        &self.file
    }

    /// Encode the bundle into payload bytes
    pub fn build(self) -> Result<Vec<u8>, BundleFormatError> {
        self.file.encode(self.compression)
    }
}
