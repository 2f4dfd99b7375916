//! Error types for the attachment pipeline.
//!
//! None of these cross the public session surface: operations there report
//! `bool`/`Option` and log the error. They exist so internal steps can use
//! `?` and so the failure reason lands in status strings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Embedded payload not found (tried {tried:?})")]
    PayloadMissing { tried: Vec<String> },

    #[error("Failed to write payload to {path}: {source}")]
    TempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Host runtime refused to load bundle from {0}")]
    BundleLoad(PathBuf),

    #[error("Template '{name}' not in bundle (contents: {contents:?})")]
    TemplateMissing { name: String, contents: Vec<String> },

    #[error("Bundle container was destroyed")]
    BundleLost,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    #[error("No character to anchor to")]
    NoCharacter,

    #[error("Character no longer exists")]
    CharacterGone,

    #[error("Character has no usable transform")]
    NoAnchor,
}

#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Device template not loaded")]
    NoTemplate,

    #[error("Device template was destroyed")]
    TemplateGone,

    #[error("No local character")]
    NoCharacter,

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error("Failed to instantiate device template")]
    Instantiate,

    #[error("Failed to parent device under anchor")]
    Parent,

    #[error("Failed to position device")]
    Placement,
}
