//! # Attachment Controller
//!
//! Owns at most one device instance. Attaching instantiates the template,
//! parents it under the resolved anchor, applies the configured offset and
//! materials, and marks it persistent. Any failure on the way destroys the
//! partial instance before the controller reports `Failed`.

use headgear_common::{
    AnchorSettings, AttachmentSettings, Backend, CharacterHandle, DeviceHandle, TemplateHandle,
    TransformHandle,
};
use std::fmt;
use std::time::Duration;

use crate::anchor::{AnchorResolution, AnchorResolver};
use crate::error::AttachError;

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentState {
    Detached,
    Attaching,
    Attached {
        instance: DeviceHandle,
        anchor: AnchorResolution,
        character: CharacterHandle,
        attached_at: Duration,
    },
    DetachingFromAnchor,
    Failed {
        last_error: String,
    },
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentState::Detached => f.write_str("Detached"),
            AttachmentState::Attaching => f.write_str("Attaching"),
            AttachmentState::Attached { anchor, .. } => write!(
                f,
                "Attached ({}, confidence {})",
                anchor.strategy, anchor.confidence
            ),
            AttachmentState::DetachingFromAnchor => f.write_str("DetachingFromAnchor"),
            AttachmentState::Failed { last_error } => write!(f, "Failed: {}", last_error),
        }
    }
}

/// Material names for one renderer after applying `settings`.
///
/// Matching slot counts take the configured table slot by slot. On a
/// mismatch the first `min(slots, configured)` slots get the default
/// material and any remaining slots keep their original.
pub fn configured_slots(original: &[String], settings: &AttachmentSettings) -> Vec<String> {
    let configured = &settings.materials;
    if configured.is_empty() {
        return original.to_vec();
    }
    if original.len() == configured.len() {
        return configured.clone();
    }
    original
        .iter()
        .enumerate()
        .map(|(slot, name)| {
            if slot < configured.len() {
                settings.default_material.clone()
            } else {
                name.clone()
            }
        })
        .collect()
}

/// Renderer slots of one instance node as they came out of the template.
type OriginalSlots = Vec<(TransformHandle, Vec<String>)>;

pub struct AttachmentController {
    state: AttachmentState,
    settings: AttachmentSettings,
    resolver: AnchorResolver,
    original_slots: OriginalSlots,
}

impl AttachmentController {
    pub fn new(settings: AttachmentSettings, anchor: &AnchorSettings) -> Self {
        Self {
            state: AttachmentState::Detached,
            settings,
            resolver: AnchorResolver::new(anchor),
            original_slots: Vec::new(),
        }
    }

    pub fn state(&self) -> &AttachmentState {
        &self.state
    }

    pub fn settings(&self) -> &AttachmentSettings {
        &self.settings
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.state, AttachmentState::Attached { .. })
    }

    pub fn instance(&self) -> Option<DeviceHandle> {
        match self.state {
            AttachmentState::Attached { instance, .. } => Some(instance),
            _ => None,
        }
    }

    pub fn character(&self) -> Option<CharacterHandle> {
        match self.state {
            AttachmentState::Attached { character, .. } => Some(character),
            _ => None,
        }
    }

    pub fn anchor(&self) -> Option<AnchorResolution> {
        match self.state {
            AttachmentState::Attached { anchor, .. } => Some(anchor),
            _ => None,
        }
    }

    /// Attach a fresh instance to `character`. Already attached to the same
    /// character with a live instance is a no-op success; any other existing
    /// instance is detached first.
    pub fn attach(
        &mut self,
        backend: &mut dyn Backend,
        template: Option<TemplateHandle>,
        character: Option<CharacterHandle>,
        now: Duration,
    ) -> bool {
        if let AttachmentState::Attached {
            instance,
            character: current,
            ..
        } = self.state
        {
            if Some(current) == character && backend.is_live(instance.key()) {
                tracing::debug!("Already attached to this character");
                return true;
            }
            self.detach(backend);
        }

        self.state = AttachmentState::Attaching;
        match self.try_attach(backend, template, character, now) {
            Ok((state, originals)) => {
                tracing::info!("Device {}", state);
                self.state = state;
                self.original_slots = originals;
                true
            }
            Err(e) => {
                tracing::error!("Attach failed: {}", e);
                self.state = AttachmentState::Failed {
                    last_error: e.to_string(),
                };
                false
            }
        }
    }

    fn try_attach(
        &self,
        backend: &mut dyn Backend,
        template: Option<TemplateHandle>,
        character: Option<CharacterHandle>,
        now: Duration,
    ) -> Result<(AttachmentState, OriginalSlots), AttachError> {
        let template = template.ok_or(AttachError::NoTemplate)?;
        if !backend.is_live(template.key()) {
            return Err(AttachError::TemplateGone);
        }
        let character = character.ok_or(AttachError::NoCharacter)?;
        let anchor = self
            .resolver
            .find_attachment_point(&*backend, Some(character))?;

        let instance = backend
            .instantiate(template)
            .ok_or(AttachError::Instantiate)?;

        let originals = match self.place(backend, instance.as_transform(), anchor.point) {
            Ok(originals) => originals,
            Err(e) => {
                if !backend.destroy(instance.as_transform()) {
                    tracing::warn!("Could not destroy partial device instance");
                }
                return Err(e);
            }
        };

        let state = AttachmentState::Attached {
            instance,
            anchor,
            character,
            attached_at: now,
        };
        Ok((state, originals))
    }

    fn place(
        &self,
        backend: &mut dyn Backend,
        node: TransformHandle,
        anchor: TransformHandle,
    ) -> Result<OriginalSlots, AttachError> {
        if !backend.set_parent(node, anchor) {
            return Err(AttachError::Parent);
        }
        if !backend.set_local_transform(node, self.settings.local_transform()) {
            return Err(AttachError::Placement);
        }
        let originals = capture_slots(&*backend, node);
        let updated = apply_materials(backend, &originals, &self.settings);
        tracing::debug!("Applied materials to {} renderers", updated);
        if !backend.mark_persistent(node) {
            tracing::warn!("Device instance could not be marked persistent");
        }
        Ok(originals)
    }

    /// Destroy the instance if any. Idempotent.
    pub fn detach(&mut self, backend: &mut dyn Backend) -> bool {
        let previous = std::mem::replace(&mut self.state, AttachmentState::DetachingFromAnchor);
        self.original_slots.clear();
        if let AttachmentState::Attached { instance, .. } = previous {
            if backend.is_live(instance.key()) {
                backend.destroy(instance.as_transform());
            }
            tracing::info!("Device detached");
        }
        self.state = AttachmentState::Detached;
        true
    }

    pub fn toggle(
        &mut self,
        backend: &mut dyn Backend,
        template: Option<TemplateHandle>,
        character: Option<CharacterHandle>,
        now: Duration,
    ) -> bool {
        if self.is_attached() {
            self.detach(backend)
        } else {
            self.attach(backend, template, character, now)
        }
    }

    /// Re-apply materials with new settings to the live instance. Slots are
    /// derived from the instance's original materials, not the last apply.
    pub fn update_materials(
        &mut self,
        backend: &mut dyn Backend,
        settings: AttachmentSettings,
    ) -> bool {
        self.settings = settings;
        match self.instance() {
            Some(instance) if backend.is_live(instance.key()) => {
                apply_materials(backend, &self.original_slots, &self.settings);
                true
            }
            _ => false,
        }
    }

    /// Drop to `Detached` if the engine destroyed our instance. Returns
    /// false when the instance was lost.
    pub fn verify(&mut self, backend: &dyn Backend) -> bool {
        match self.instance() {
            Some(instance) if !backend.is_live(instance.key()) => {
                tracing::warn!("Device instance destroyed by the engine");
                self.state = AttachmentState::Detached;
                self.original_slots.clear();
                false
            }
            _ => true,
        }
    }
}

/// Every renderer under `root` with its current slots.
fn capture_slots(backend: &dyn Backend, root: TransformHandle) -> OriginalSlots {
    let mut captured = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let slots = backend.material_slots(node);
        if !slots.is_empty() {
            captured.push((node, slots));
        }
        stack.extend(backend.children(node));
    }
    captured
}

/// Rewrite each captured renderer from its original slots. Returns how many
/// renderers changed.
fn apply_materials(
    backend: &mut dyn Backend,
    originals: &OriginalSlots,
    settings: &AttachmentSettings,
) -> usize {
    let mut updated = 0;
    for (node, original) in originals {
        let slots = configured_slots(original, settings);
        if slots != backend.material_slots(*node) && backend.set_material_slots(*node, slots) {
            updated += 1;
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorStrategy;
    use crate::assets::{AssetPipeline, ResourceTable};
    use crate::backend::{select_backend, HostBindings};
    use bevy::prelude::{Transform, Vec3};
    use headgear_common::{
        AssetSettings, AudioChannel, AudioMixerCapability, AudioMixerHandle, AvatarCapability,
        AvatarHandle, BundleCapability, BundleHandle, CameraCapability, CameraHandle,
        CameraSnapshot, CharacterCapability, MusicPlayerCapability, NativeKey, ObjectCategory,
        RuntimeVariant, SceneCapability,
    };
    use std::path::Path;
    use headgear_host::retained::{self, RetainedRuntime, SharedRuntime};
    use headgear_host::CharacterBlueprint;

    struct Rig {
        rt: SharedRuntime,
        backend: Box<dyn Backend>,
        pipeline: AssetPipeline,
        _dir: tempfile::TempDir,
    }

    fn rig(api_version: u32) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = RetainedRuntime::new(api_version);
        rt.spawn_local_player(&CharacterBlueprint::humanoid("Player").transient())
            .unwrap();
        let rt = retained::share(rt);
        let bindings = HostBindings::retained(rt.clone());
        let mut backend = select_backend(RuntimeVariant::Retained, bindings);
        let mut pipeline = AssetPipeline::new(AssetSettings::default()).with_temp_dir(dir.path());
        assert!(pipeline.load(backend.as_mut(), &ResourceTable::embedded()));
        Rig {
            rt,
            backend,
            pipeline,
            _dir: dir,
        }
    }

    fn controller() -> AttachmentController {
        AttachmentController::new(AttachmentSettings::default(), &AnchorSettings::default())
    }

    fn slots(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_configured_slots_matching_count() {
        let settings = AttachmentSettings::default();
        assert_eq!(
            configured_slots(&slots(&["a", "b", "c"]), &settings),
            settings.materials
        );
    }

    #[test]
    fn test_configured_slots_mismatch_uses_default() {
        let settings = AttachmentSettings::default();
        assert_eq!(
            configured_slots(&slots(&["a"]), &settings),
            slots(&["Headphones_Default"])
        );
        assert_eq!(
            configured_slots(&slots(&["a", "b", "c", "d", "e"]), &settings),
            slots(&[
                "Headphones_Default",
                "Headphones_Default",
                "Headphones_Default",
                "d",
                "e"
            ])
        );
    }

    #[test]
    fn test_attach_places_instance_under_head() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();

        assert!(controller.attach(rig.backend.as_mut(), template, character, Duration::ZERO));
        let instance = controller.instance().unwrap().as_transform();
        let anchor = controller.anchor().unwrap();
        assert_eq!(anchor.strategy, AnchorStrategy::SkeletalBone);
        assert_eq!(rig.backend.node_name(anchor.point).as_deref(), Some("Head"));
        assert!(rig.backend.children(anchor.point).contains(&instance));

        let body = rig.backend.children(instance)[0];
        assert_eq!(
            rig.backend.material_slots(body),
            AttachmentSettings::default().materials
        );
        let cup = rig.backend.children(instance)[1];
        assert_eq!(rig.backend.material_slots(cup), slots(&["Headphones_Default"]));
    }

    #[test]
    fn test_repeat_attach_keeps_single_instance() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();

        assert!(controller.attach(rig.backend.as_mut(), template, character, Duration::ZERO));
        let first = controller.instance().unwrap();
        let count = rig.rt.lock().object_count();

        let later = Duration::from_secs(1);
        assert!(controller.attach(rig.backend.as_mut(), template, character, later));
        assert_eq!(controller.instance(), Some(first));
        assert_eq!(rig.rt.lock().object_count(), count);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut rig = rig(1);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();
        let baseline = rig.rt.lock().object_count();

        assert!(controller.attach(rig.backend.as_mut(), template, character, Duration::ZERO));
        let instance = controller.instance().unwrap();

        assert!(controller.detach(rig.backend.as_mut()));
        assert!(!rig.backend.is_live(instance.key()));
        assert_eq!(controller.state(), &AttachmentState::Detached);
        assert_eq!(rig.rt.lock().object_count(), baseline);

        assert!(controller.detach(rig.backend.as_mut()));
        assert_eq!(controller.state(), &AttachmentState::Detached);
    }

    #[test]
    fn test_any_sequence_leaves_one_instance() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();
        let baseline = rig.rt.lock().object_count();
        let instance_nodes = 4;

        for step in 0..12u64 {
            let now = Duration::from_millis(step * 10);
            match step % 4 {
                0 | 1 => {
                    controller.attach(rig.backend.as_mut(), template, character, now);
                }
                2 => {
                    controller.toggle(rig.backend.as_mut(), template, character, now);
                }
                _ => {
                    controller.detach(rig.backend.as_mut());
                }
            }
            let expected = if controller.is_attached() { instance_nodes } else { 0 };
            assert_eq!(rig.rt.lock().object_count(), baseline + expected);
        }
    }

    #[test]
    fn test_toggle_round_trip() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();

        assert!(controller.toggle(rig.backend.as_mut(), template, character, Duration::ZERO));
        assert!(controller.is_attached());
        assert!(controller.toggle(rig.backend.as_mut(), template, character, Duration::ZERO));
        assert!(!controller.is_attached());
    }

    #[test]
    fn test_missing_template_fails_without_instantiating() {
        let mut rig = rig(2);
        let mut controller = controller();
        let character = rig.backend.local_character();
        let baseline = rig.rt.lock().object_count();

        assert!(!controller.attach(rig.backend.as_mut(), None, character, Duration::ZERO));
        assert!(matches!(controller.state(), AttachmentState::Failed { .. }));
        assert_eq!(rig.rt.lock().object_count(), baseline);
    }

    #[test]
    fn test_missing_character_fails() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());

        assert!(!controller.attach(rig.backend.as_mut(), template, None, Duration::ZERO));
        let AttachmentState::Failed { last_error } = controller.state() else {
            panic!("expected failure");
        };
        assert!(last_error.contains("character"));
    }

    #[test]
    fn test_verify_notices_lost_instance() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();
        assert!(controller.attach(rig.backend.as_mut(), template, character, Duration::ZERO));

        // Transient character: scene unload takes the device with it
        rig.rt.lock().unload_scene();
        assert!(!controller.verify(rig.backend.as_ref()));
        assert_eq!(controller.state(), &AttachmentState::Detached);
    }

    #[test]
    fn test_update_materials_reapplies() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();
        assert!(controller.attach(rig.backend.as_mut(), template, character, Duration::ZERO));

        let settings = AttachmentSettings {
            materials: slots(&["x", "y", "z"]),
            ..AttachmentSettings::default()
        };
        assert!(controller.update_materials(rig.backend.as_mut(), settings));
        let body = rig.backend.children(controller.instance().unwrap().as_transform())[0];
        assert_eq!(rig.backend.material_slots(body), slots(&["x", "y", "z"]));
    }

    #[test]
    fn test_update_materials_restores_originals() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();
        assert!(controller.attach(rig.backend.as_mut(), template, character, Duration::ZERO));
        let instance = controller.instance().unwrap().as_transform();
        let body = rig.backend.children(instance)[0];
        let cup = rig.backend.children(instance)[1];
        assert_eq!(rig.backend.material_slots(cup), slots(&["Headphones_Default"]));

        // Shorter table: body mismatches now, the cup matches slot for slot
        let shorter = AttachmentSettings {
            materials: slots(&["felt"]),
            ..AttachmentSettings::default()
        };
        assert!(controller.update_materials(rig.backend.as_mut(), shorter));
        assert_eq!(
            rig.backend.material_slots(body),
            slots(&["Headphones_Default", "cushion_leather", "hinge_metal"])
        );
        assert_eq!(rig.backend.material_slots(cup), slots(&["felt"]));

        let empty = AttachmentSettings {
            materials: Vec::new(),
            ..AttachmentSettings::default()
        };
        assert!(controller.update_materials(rig.backend.as_mut(), empty));
        assert_eq!(
            rig.backend.material_slots(body),
            slots(&["band_plastic", "cushion_leather", "hinge_metal"])
        );
        assert_eq!(rig.backend.material_slots(cup), slots(&["cup_shell"]));
    }

    #[test]
    fn test_retarget_destroys_previous_instance() {
        let mut rig = rig(2);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let first = rig.backend.local_character();
        assert!(controller.attach(rig.backend.as_mut(), template, first, Duration::ZERO));
        let old_instance = controller.instance().unwrap();

        rig.rt
            .lock()
            .spawn_local_player(&CharacterBlueprint::humanoid("Second").transient())
            .unwrap();
        let second = rig.backend.local_character();
        assert_ne!(second, first);
        let count = rig.rt.lock().object_count();

        let later = Duration::from_secs(1);
        assert!(controller.attach(rig.backend.as_mut(), template, second, later));
        assert!(!rig.backend.is_live(old_instance.key()));
        assert_ne!(controller.instance(), Some(old_instance));
        assert_eq!(controller.character(), second);
        assert_eq!(rig.rt.lock().object_count(), count);
    }

    #[test]
    fn test_v1_detach_leaves_character_transient() {
        let mut rig = rig(1);
        let mut controller = controller();
        let template = rig.pipeline.template(rig.backend.as_mut());
        let character = rig.backend.local_character();
        let player = rig.rt.lock().local_player().unwrap();

        assert!(controller.attach(rig.backend.as_mut(), template, character, Duration::ZERO));
        assert!(controller.detach(rig.backend.as_mut()));
        rig.rt.lock().unload_scene();
        assert!(!rig.rt.lock().is_alive(player));
    }

    /// Delegates everything but refuses to parent nodes.
    struct RefusesParenting {
        inner: Box<dyn Backend>,
    }

    impl SceneCapability for RefusesParenting {
        fn is_live(&self, key: NativeKey) -> bool {
            self.inner.is_live(key)
        }
        fn node_name(&self, node: TransformHandle) -> Option<String> {
            self.inner.node_name(node)
        }
        fn children(&self, node: TransformHandle) -> Vec<TransformHandle> {
            self.inner.children(node)
        }
        fn local_position(&self, node: TransformHandle) -> Option<Vec3> {
            self.inner.local_position(node)
        }
        fn instantiate(&mut self, template: TemplateHandle) -> Option<DeviceHandle> {
            self.inner.instantiate(template)
        }
        fn set_parent(&mut self, _node: TransformHandle, _parent: TransformHandle) -> bool {
            false
        }
        fn set_local_transform(&mut self, node: TransformHandle, transform: Transform) -> bool {
            self.inner.set_local_transform(node, transform)
        }
        fn material_slots(&self, node: TransformHandle) -> Vec<String> {
            self.inner.material_slots(node)
        }
        fn set_material_slots(&mut self, node: TransformHandle, materials: Vec<String>) -> bool {
            self.inner.set_material_slots(node, materials)
        }
        fn render_layer(&self, node: TransformHandle) -> Option<u8> {
            self.inner.render_layer(node)
        }
        fn set_render_layer_recursive(&mut self, node: TransformHandle, layer: u8) -> bool {
            self.inner.set_render_layer_recursive(node, layer)
        }
        fn mark_persistent(&mut self, node: TransformHandle) -> bool {
            self.inner.mark_persistent(node)
        }
        fn destroy(&mut self, node: TransformHandle) -> bool {
            self.inner.destroy(node)
        }
    }

    impl CharacterCapability for RefusesParenting {
        fn local_character(&self) -> Option<CharacterHandle> {
            self.inner.local_character()
        }
        fn character_root(&self, character: CharacterHandle) -> Option<TransformHandle> {
            self.inner.character_root(character)
        }
        fn character_name(&self, character: CharacterHandle) -> Option<String> {
            self.inner.character_name(character)
        }
        fn avatar(&self, character: CharacterHandle) -> Option<AvatarHandle> {
            self.inner.avatar(character)
        }
    }

    impl AvatarCapability for RefusesParenting {
        fn head_bone(&self, avatar: AvatarHandle) -> Option<TransformHandle> {
            self.inner.head_bone(avatar)
        }
    }

    impl CameraCapability for RefusesParenting {
        fn player_camera(&self) -> Option<CameraHandle> {
            self.inner.player_camera()
        }
        fn camera_snapshot(&self, camera: CameraHandle) -> Option<CameraSnapshot> {
            self.inner.camera_snapshot(camera)
        }
    }

    impl BundleCapability for RefusesParenting {
        fn load_bundle(&mut self, path: &Path) -> Option<BundleHandle> {
            self.inner.load_bundle(path)
        }
        fn load_asset(
            &mut self,
            bundle: BundleHandle,
            name: &str,
            category: ObjectCategory,
        ) -> Option<TemplateHandle> {
            self.inner.load_asset(bundle, name, category)
        }
        fn load_all_assets(
            &mut self,
            bundle: BundleHandle,
            category: ObjectCategory,
        ) -> Vec<TemplateHandle> {
            self.inner.load_all_assets(bundle, category)
        }
        fn asset_names(&self, bundle: BundleHandle) -> Vec<String> {
            self.inner.asset_names(bundle)
        }
        fn unload_bundle(&mut self, bundle: BundleHandle, unload_objects: bool) -> bool {
            self.inner.unload_bundle(bundle, unload_objects)
        }
    }

    impl AudioMixerCapability for RefusesParenting {
        fn audio_mixer(&self) -> Option<AudioMixerHandle> {
            self.inner.audio_mixer()
        }
        fn channel_volume(&self, mixer: AudioMixerHandle, channel: AudioChannel) -> Option<f32> {
            self.inner.channel_volume(mixer, channel)
        }
        fn set_channel_volume(
            &mut self,
            mixer: AudioMixerHandle,
            channel: AudioChannel,
            volume: f32,
        ) -> bool {
            self.inner.set_channel_volume(mixer, channel, volume)
        }
    }

    impl MusicPlayerCapability for RefusesParenting {
        fn stop_music(&mut self) -> bool {
            self.inner.stop_music()
        }
    }

    impl Backend for RefusesParenting {
        fn variant(&self) -> RuntimeVariant {
            self.inner.variant()
        }
        fn api_version(&self) -> u32 {
            self.inner.api_version()
        }
        fn is_bound(&self) -> bool {
            self.inner.is_bound()
        }
    }

    #[test]
    fn test_failed_parenting_destroys_partial_instance() {
        let rig = rig(2);
        let Rig {
            rt,
            backend,
            mut pipeline,
            _dir,
        } = rig;
        let mut backend = RefusesParenting { inner: backend };
        let mut controller = controller();
        let template = pipeline.template(&mut backend);
        let character = backend.local_character();
        let baseline = rt.lock().object_count();

        assert!(!controller.attach(&mut backend, template, character, Duration::ZERO));
        let AttachmentState::Failed { last_error } = controller.state() else {
            panic!("expected failure");
        };
        assert!(last_error.contains(&AttachError::Parent.to_string()));
        assert!(controller.instance().is_none());
        assert_eq!(rt.lock().object_count(), baseline);
    }
}
