//! # Asset Pipeline
//!
//! Three-step acquisition of the device template:
//!
//! ```text
//! NotLoaded ──extract──► PayloadExtracted ──load──► BundleLoaded ──extract──► TemplateReady
//!     │                        │                        │
//!     └────────────────────────┴────────────────────────┴──► Failed (cleanup ran)
//! ```
//!
//! The engine may destroy the template at any time (unused-asset collection,
//! scene transitions). [`AssetPipeline::is_ready`] re-extracts it from the
//! still-loaded bundle instead of starting over.

use headgear_common::{AssetSettings, Backend, BundleHandle, ObjectCategory, TemplateHandle};
use std::path::{Path, PathBuf};

use super::payload::{extract_to_temp, ResourceTable};
use crate::error::AssetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionState {
    NotLoaded,
    PayloadExtracted(PathBuf),
    BundleLoaded(BundleHandle),
    TemplateReady(TemplateHandle),
    Failed(String),
}

impl AcquisitionState {
    pub fn label(&self) -> &'static str {
        match self {
            AcquisitionState::NotLoaded => "NotLoaded",
            AcquisitionState::PayloadExtracted(_) => "PayloadExtracted",
            AcquisitionState::BundleLoaded(_) => "BundleLoaded",
            AcquisitionState::TemplateReady(_) => "TemplateReady",
            AcquisitionState::Failed(_) => "Failed",
        }
    }
}

pub struct AssetPipeline {
    settings: AssetSettings,
    temp_dir: PathBuf,
    state: AcquisitionState,
    temp_path: Option<PathBuf>,
    bundle: Option<BundleHandle>,
    template: Option<TemplateHandle>,
    reextractions: u32,
}

impl AssetPipeline {
    pub fn new(settings: AssetSettings) -> Self {
        Self {
            settings,
            temp_dir: std::env::temp_dir(),
            state: AcquisitionState::NotLoaded,
            temp_path: None,
            bundle: None,
            template: None,
            reextractions: 0,
        }
    }

    /// Directory for the extracted payload file.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }

    pub fn settings(&self) -> &AssetSettings {
        &self.settings
    }

    pub fn bundle(&self) -> Option<BundleHandle> {
        self.bundle
    }

    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }

    /// How often the template had to be re-extracted after the engine
    /// destroyed it.
    pub fn reextractions(&self) -> u32 {
        self.reextractions
    }

    /// Run acquisition. A ready pipeline is left alone; a failed one starts
    /// over. Returns whether a template is ready.
    pub fn load(&mut self, backend: &mut dyn Backend, resources: &ResourceTable) -> bool {
        if matches!(self.state, AcquisitionState::TemplateReady(_)) && self.is_ready(backend) {
            return true;
        }
        if !matches!(self.state, AcquisitionState::NotLoaded) {
            self.release(backend);
            self.state = AcquisitionState::NotLoaded;
        }

        match self.acquire(backend, resources) {
            Ok(template) => {
                tracing::info!(
                    "Device template '{}' ready ({} backend)",
                    self.settings.template_name,
                    backend.variant()
                );
                self.template = Some(template);
                self.state = AcquisitionState::TemplateReady(template);
                true
            }
            Err(e) => {
                tracing::error!("Device asset acquisition failed: {}", e);
                self.release(backend);
                self.state = AcquisitionState::Failed(e.to_string());
                false
            }
        }
    }

    fn acquire(
        &mut self,
        backend: &mut dyn Backend,
        resources: &ResourceTable,
    ) -> Result<TemplateHandle, AssetError> {
        let candidates = self.settings.payload_name_variants();
        let (resource_name, bytes) =
            resources
                .find_first(&candidates)
                .ok_or_else(|| AssetError::PayloadMissing {
                    tried: candidates.clone(),
                })?;
        tracing::debug!("Found embedded payload '{}' ({} bytes)", resource_name, bytes.len());

        let path = extract_to_temp(&self.temp_dir, resource_name, bytes).map_err(|source| {
            AssetError::TempFile {
                path: self.temp_dir.clone(),
                source,
            }
        })?;
        self.temp_path = Some(path.clone());
        self.state = AcquisitionState::PayloadExtracted(path.clone());

        let bundle = backend
            .load_bundle(&path)
            .ok_or_else(|| AssetError::BundleLoad(path.clone()))?;
        self.bundle = Some(bundle);
        self.state = AcquisitionState::BundleLoaded(bundle);

        self.extract_template(backend, bundle)
    }

    /// Step 3: pull the template out of a loaded bundle. Falls back to the
    /// first prefab when the configured name is absent.
    fn extract_template(
        &self,
        backend: &mut dyn Backend,
        bundle: BundleHandle,
    ) -> Result<TemplateHandle, AssetError> {
        let name = &self.settings.template_name;
        if let Some(template) = backend.load_asset(bundle, name, ObjectCategory::Prefab) {
            return Ok(template);
        }

        if let Some(first) = backend
            .load_all_assets(bundle, ObjectCategory::Prefab)
            .into_iter()
            .next()
        {
            tracing::warn!("Template '{}' not in bundle, using its first prefab", name);
            return Ok(first);
        }

        Err(AssetError::TemplateMissing {
            name: name.clone(),
            contents: backend.asset_names(bundle),
        })
    }

    /// Whether a live template is available, repairing a destroyed one
    /// from the loaded bundle.
    pub fn is_ready(&mut self, backend: &mut dyn Backend) -> bool {
        let (Some(bundle), Some(template)) = (self.bundle, self.template) else {
            return false;
        };
        if !matches!(self.state, AcquisitionState::TemplateReady(_)) {
            return false;
        }

        if !backend.is_live(bundle.key()) {
            tracing::error!("{}", AssetError::BundleLost);
            self.release(backend);
            self.state = AcquisitionState::Failed(AssetError::BundleLost.to_string());
            return false;
        }

        if backend.is_live(template.key()) {
            return true;
        }

        tracing::warn!("Device template was destroyed by the engine, re-extracting");
        self.reextractions += 1;
        match self.extract_template(backend, bundle) {
            Ok(template) => {
                self.template = Some(template);
                self.state = AcquisitionState::TemplateReady(template);
                true
            }
            Err(e) => {
                tracing::error!("Template re-extraction failed: {}", e);
                self.release(backend);
                self.state = AcquisitionState::Failed(e.to_string());
                false
            }
        }
    }

    /// The live template, if the pipeline is (or can be made) ready.
    pub fn template(&mut self, backend: &mut dyn Backend) -> Option<TemplateHandle> {
        if self.is_ready(backend) {
            self.template
        } else {
            None
        }
    }

    /// Drop the bundle and temp file. Idempotent.
    pub fn unload(&mut self, backend: &mut dyn Backend) {
        self.release(backend);
        self.state = AcquisitionState::NotLoaded;
    }

    pub fn reload(&mut self, backend: &mut dyn Backend, resources: &ResourceTable) -> bool {
        self.unload(backend);
        self.load(backend, resources)
    }

    fn release(&mut self, backend: &mut dyn Backend) {
        self.template = None;

        if let Some(bundle) = self.bundle.take() {
            if backend.is_live(bundle.key()) && !backend.unload_bundle(bundle, true) {
                tracing::warn!("Bundle unload reported failure");
            }
        }

        if let Some(path) = self.temp_path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed payload file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Could not remove payload file {}: {}", path.display(), e),
            }
        }
    }
}
