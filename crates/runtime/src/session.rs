//! # Session Facade
//!
//! [`HeadgearSession`] is the single entry point hosts and mod code talk to.
//! It owns the backend adapter and drives the pipeline, controller,
//! visibility machine and player connector from [`tick`](HeadgearSession::tick).
//!
//! Every operation reports success as a `bool` or `Option`; failures are
//! logged and reflected in [`status`](HeadgearSession::status).

use bevy::prelude::Resource;
use headgear_common::{
    resolve_variant, AttachmentSettings, AudioChannel, Backend, CharacterHandle, HeadgearConfig,
    RuntimeVariant,
};
use std::path::PathBuf;
use std::time::Duration;

use crate::assets::{AssetPipeline, ResourceTable};
use crate::attachment::{AttachmentController, AttachmentState};
use crate::backend::{select_backend, HostBindings};
use crate::connection::PlayerConnector;
use crate::visibility::VisibilityMachine;

#[derive(Resource)]
pub struct HeadgearSession {
    backend: Box<dyn Backend>,
    config: HeadgearConfig,
    resources: ResourceTable,
    pipeline: AssetPipeline,
    controller: AttachmentController,
    visibility: VisibilityMachine,
    connector: PlayerConnector,
    now: Duration,
}

impl HeadgearSession {
    pub fn new(backend: Box<dyn Backend>, config: HeadgearConfig) -> Self {
        Self {
            pipeline: AssetPipeline::new(config.assets.clone()),
            controller: AttachmentController::new(config.attachment.clone(), &config.anchor),
            visibility: VisibilityMachine::new(config.visibility.clone()),
            connector: PlayerConnector::new(config.connection.clone()),
            resources: ResourceTable::embedded(),
            backend,
            config,
            now: Duration::ZERO,
        }
    }

    /// Probe the process environment once and bind the matching backend.
    pub fn for_environment(bindings: HostBindings, config: HeadgearConfig) -> Self {
        Self::for_variant(resolve_variant(), bindings, config)
    }

    pub fn for_variant(
        variant: RuntimeVariant,
        bindings: HostBindings,
        config: HeadgearConfig,
    ) -> Self {
        let backend = select_backend(variant, bindings);
        tracing::info!(
            "Headgear using {} runtime (native API v{})",
            backend.variant(),
            backend.api_version()
        );
        Self::new(backend, config)
    }

    /// Replace the embedded resources. Call before [`initialize`](Self::initialize).
    pub fn with_resources(mut self, resources: ResourceTable) -> Self {
        self.resources = resources;
        self
    }

    /// Extract the payload into `dir`. Call before [`initialize`](Self::initialize).
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pipeline = AssetPipeline::new(self.config.assets.clone()).with_temp_dir(dir);
        self
    }

    /// Acquire the device template.
    pub fn initialize(&mut self) -> bool {
        self.pipeline.load(self.backend.as_mut(), &self.resources)
    }

    /// Per-frame driver: instance loss, player discovery, visibility.
    pub fn tick(&mut self, now: Duration) {
        self.now = now;

        if !self.controller.verify(self.backend.as_ref()) {
            self.connector.rearm(now);
        }

        if let Some(character) = self.connector.poll(self.backend.as_ref(), now) {
            if self.config.connection.auto_attach {
                self.attach_to_character(Some(character));
            }
        }

        let device = self.controller.instance();
        self.visibility.tick(self.backend.as_mut(), device, now);
    }

    pub fn attach_to_local_player(&mut self) -> bool {
        let character = self.backend.local_character();
        self.attach_to_character(character)
    }

    pub fn attach_to_character(&mut self, character: Option<CharacterHandle>) -> bool {
        let template = self.pipeline.template(self.backend.as_mut());
        if template.is_none() {
            tracing::warn!(
                "Device assets not ready ({}), attach will fail",
                self.pipeline.state().label()
            );
        }

        let attached = self
            .controller
            .attach(self.backend.as_mut(), template, character, self.now);
        if attached {
            let device = self.controller.instance();
            self.visibility.force_update(self.backend.as_mut(), device);
        }
        attached
    }

    pub fn detach(&mut self) -> bool {
        self.controller.detach(self.backend.as_mut())
    }

    pub fn toggle(&mut self) -> bool {
        if self.is_attached() {
            self.detach()
        } else {
            self.attach_to_local_player()
        }
    }

    /// Attached with an instance the engine hasn't destroyed.
    pub fn is_attached(&self) -> bool {
        self.controller
            .instance()
            .is_some_and(|instance| self.backend.is_live(instance.key()))
    }

    pub fn status(&self) -> String {
        let backend = format!("[{} v{}]", self.backend.variant(), self.backend.api_version());
        let assets = self.pipeline.state().label();

        let attachment = match self.controller.state() {
            AttachmentState::Attached {
                anchor, character, ..
            } => {
                let who = self.backend.character_name(*character).unwrap_or_default();
                let at = self.backend.node_name(anchor.point).unwrap_or_default();
                format!(
                    "Attached to '{}' at '{}' via {} (confidence {})",
                    who, at, anchor.strategy, anchor.confidence
                )
            }
            other => other.to_string(),
        };
        format!("{} {} | assets: {}", backend, attachment, assets)
    }

    pub fn force_visibility_update(&mut self) -> bool {
        let device = self.controller.instance();
        self.visibility.force_update(self.backend.as_mut(), device)
    }

    /// Reload the bundle from the embedded payload, re-attaching to the same
    /// character if a device was attached.
    pub fn reload_assets(&mut self) -> bool {
        let reattach = self.controller.character().filter(|_| self.is_attached());
        self.controller.detach(self.backend.as_mut());

        let loaded = self.pipeline.reload(self.backend.as_mut(), &self.resources);
        if loaded {
            if let Some(character) = reattach {
                self.attach_to_character(Some(character));
            }
        }
        loaded
    }

    pub fn camera_debug_info(&self) -> String {
        self.visibility
            .debug_info(self.backend.as_ref(), self.controller.instance())
    }

    pub fn update_materials(&mut self, settings: AttachmentSettings) -> bool {
        self.config.attachment = settings.clone();
        self.controller
            .update_materials(self.backend.as_mut(), settings)
    }

    pub fn channel_volume(&self, channel: AudioChannel) -> Option<f32> {
        let mixer = self.backend.audio_mixer()?;
        self.backend.channel_volume(mixer, channel)
    }

    pub fn set_channel_volume(&mut self, channel: AudioChannel, volume: f32) -> bool {
        match self.backend.audio_mixer() {
            Some(mixer) => self.backend.set_channel_volume(mixer, channel, volume),
            None => {
                tracing::warn!("No audio mixer; cannot set {} volume", channel);
                false
            }
        }
    }

    pub fn stop_music(&mut self) -> bool {
        self.backend.stop_music()
    }

    /// Detach and release assets. Also runs on drop.
    pub fn shutdown(&mut self) {
        self.controller.detach(self.backend.as_mut());
        self.pipeline.unload(self.backend.as_mut());
    }

    pub fn variant(&self) -> RuntimeVariant {
        self.backend.variant()
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &HeadgearConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &AssetPipeline {
        &self.pipeline
    }

    pub fn controller(&self) -> &AttachmentController {
        &self.controller
    }

    pub fn visibility(&self) -> &VisibilityMachine {
        &self.visibility
    }

    pub fn connector(&self) -> &PlayerConnector {
        &self.connector
    }
}

impl Drop for HeadgearSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
