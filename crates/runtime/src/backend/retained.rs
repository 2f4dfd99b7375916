//! # Runtime B Adapter
//!
//! Implements [`Backend`] over the retained object runtime. Two native API
//! revisions exist; the method table is picked from the runtime's reported
//! version when the adapter is built:
//!
//! | call            | v1                        | v2                         |
//! |-----------------|---------------------------|----------------------------|
//! | unload bundle   | `unload_bundle` (all)     | `unload_bundle_ex(flag)`   |
//! | persist object  | skipped                   | `set_persistent(true)`     |
//!
//! v1's `dont_destroy_on_load` promotes the whole hierarchy root, so on v1 the
//! device is not marked and lives exactly as long as its character.
//!
//! The mixer speaks decibels; capabilities speak linear volume.

use bevy::prelude::{Transform, Vec3};
use headgear_common::{
    AudioChannel, AudioMixerCapability, AudioMixerHandle, AvatarCapability, AvatarHandle, Backend,
    BundleCapability, BundleHandle, CameraCapability, CameraHandle, CameraMode, CameraSnapshot,
    CharacterCapability, CharacterHandle, DeviceHandle, MusicPlayerCapability, NativeKey,
    ObjectCategory, RuntimeVariant, SceneCapability, TemplateHandle, TransformHandle,
};
use headgear_host::retained::{
    CameraState, NativeResult, ObjectId, RetainedRuntime, SharedRuntime, CAMERA_MODE_DEFAULT,
    CAMERA_MODE_FREECAM, CAMERA_MODE_SKATEBOARD, CAMERA_MODE_VEHICLE, CAMERA_MODE_VIEWING_AVATAR,
    MIXER_MIN_DB,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{BackendError, HandleRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RetainedRef {
    Object(ObjectId),
    Mixer,
}

// ============================================================================
// Method Table
// ============================================================================

struct RetainedMethodTable {
    version: u32,
    unload_bundle: fn(&mut RetainedRuntime, ObjectId, bool) -> NativeResult<()>,
    persist: Option<fn(&mut RetainedRuntime, ObjectId) -> NativeResult<()>>,
}

const RETAINED_METHODS_V1: RetainedMethodTable = RetainedMethodTable {
    version: 1,
    unload_bundle: |rt, bundle, _unload_objects| rt.unload_bundle(bundle),
    persist: None,
};

const RETAINED_METHODS_V2: RetainedMethodTable = RetainedMethodTable {
    version: 2,
    unload_bundle: |rt, bundle, unload_objects| rt.unload_bundle_ex(bundle, unload_objects),
    persist: Some(|rt, id| rt.set_persistent(id, true)),
};

fn methods_for(api_version: u32) -> &'static RetainedMethodTable {
    if api_version >= 2 {
        &RETAINED_METHODS_V2
    } else {
        &RETAINED_METHODS_V1
    }
}

fn mixer_parameter(channel: AudioChannel) -> &'static str {
    match channel {
        AudioChannel::Master => "MasterVolume",
        AudioChannel::Music => "MusicVolume",
        AudioChannel::Effects => "SFXVolume",
        AudioChannel::Ambient => "AmbientVolume",
        AudioChannel::Ui => "UIVolume",
    }
}

pub(crate) fn linear_to_db(volume: f32) -> f32 {
    let volume = volume.clamp(0.0, 1.0);
    if volume <= 0.0001 {
        MIXER_MIN_DB
    } else {
        (20.0 * volume.log10()).max(MIXER_MIN_DB)
    }
}

pub(crate) fn db_to_linear(decibels: f32) -> f32 {
    if decibels <= MIXER_MIN_DB {
        0.0
    } else {
        10f32.powf(decibels / 20.0).clamp(0.0, 1.0)
    }
}

fn camera_mode(mode: i32) -> Option<CameraMode> {
    match mode {
        CAMERA_MODE_DEFAULT => Some(CameraMode::Default),
        CAMERA_MODE_VEHICLE => Some(CameraMode::Vehicle),
        CAMERA_MODE_SKATEBOARD => Some(CameraMode::Skateboard),
        CAMERA_MODE_FREECAM => Some(CameraMode::FreeCam),
        CAMERA_MODE_VIEWING_AVATAR => Some(CameraMode::ViewingAvatar),
        _ => None,
    }
}

fn snapshot_of(state: CameraState) -> Result<CameraSnapshot, BackendError> {
    let mode = camera_mode(state.mode)
        .ok_or_else(|| BackendError::Rejected(format!("unknown camera mode {}", state.mode)))?;
    Ok(CameraSnapshot::new(mode, state.free_cam, state.viewing_avatar))
}

// ============================================================================
// Adapter
// ============================================================================

pub struct RetainedBackend {
    runtime: Option<SharedRuntime>,
    handles: Mutex<HandleRegistry<RetainedRef>>,
    methods: &'static RetainedMethodTable,
    warned_unbound: AtomicBool,
}

impl RetainedBackend {
    pub fn new(runtime: Option<SharedRuntime>) -> Self {
        let version = runtime.as_ref().map_or(1, |rt| rt.lock().api_version());
        tracing::debug!("Retained adapter using native API v{}", version);
        Self {
            runtime,
            handles: Mutex::new(HandleRegistry::new()),
            methods: methods_for(version),
            warned_unbound: AtomicBool::new(false),
        }
    }

    fn call<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(
            &mut RetainedRuntime,
            &mut HandleRegistry<RetainedRef>,
        ) -> Result<T, BackendError>,
    ) -> Option<T> {
        let Some(runtime) = self.runtime.as_ref() else {
            if !self.warned_unbound.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "Retained adapter has no runtime; {} and later calls return nothing",
                    op
                );
            }
            return None;
        };

        let mut runtime = runtime.lock();
        let mut handles = self.handles.lock();
        let result = f(&mut runtime, &mut handles);
        if handles.needs_sweep() {
            let dropped = handles.sweep(|native| match native {
                RetainedRef::Object(id) => runtime.is_alive(id),
                RetainedRef::Mixer => runtime.has_mixer(),
            });
            tracing::debug!("Retained handle sweep dropped {} stale entries", dropped);
        }
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Retained {} failed: {}", op, e);
                None
            }
        }
    }
}

fn object(
    rt: &RetainedRuntime,
    handles: &mut HandleRegistry<RetainedRef>,
    key: NativeKey,
) -> Result<ObjectId, BackendError> {
    match handles.resolve(key) {
        Some(RetainedRef::Object(id)) if rt.is_alive(id) => Ok(id),
        Some(RetainedRef::Object(id)) => {
            handles.forget(key);
            Err(headgear_host::retained::NativeError::Destroyed(id).into())
        }
        Some(RetainedRef::Mixer) => Err(BackendError::WrongKind),
        None => Err(BackendError::UnknownHandle),
    }
}

fn mixer(
    rt: &RetainedRuntime,
    handles: &HandleRegistry<RetainedRef>,
    key: NativeKey,
) -> Result<(), BackendError> {
    match handles.resolve(key) {
        Some(RetainedRef::Mixer) if rt.has_mixer() => Ok(()),
        Some(RetainedRef::Mixer) => Err(headgear_host::retained::NativeError::NoMixer.into()),
        Some(RetainedRef::Object(_)) => Err(BackendError::WrongKind),
        None => Err(BackendError::UnknownHandle),
    }
}

impl SceneCapability for RetainedBackend {
    fn is_live(&self, key: NativeKey) -> bool {
        self.call("is_live", |rt, handles| {
            Ok(match handles.resolve(key) {
                Some(RetainedRef::Object(id)) => {
                    let live = rt.is_alive(id);
                    if !live {
                        handles.forget(key);
                    }
                    live
                }
                Some(RetainedRef::Mixer) => rt.has_mixer(),
                None => false,
            })
        })
        .unwrap_or(false)
    }

    fn node_name(&self, node: TransformHandle) -> Option<String> {
        self.call("node_name", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(rt.name(id)?)
        })
    }

    fn children(&self, node: TransformHandle) -> Vec<TransformHandle> {
        self.call("children", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(rt
                .children(id)?
                .into_iter()
                .map(|child| handles.handle(RetainedRef::Object(child)))
                .collect())
        })
        .unwrap_or_default()
    }

    fn local_position(&self, node: TransformHandle) -> Option<Vec3> {
        self.call("local_position", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(rt.local_transform(id)?.translation)
        })
    }

    fn instantiate(&mut self, template: TemplateHandle) -> Option<DeviceHandle> {
        self.call("instantiate", |rt, handles| {
            let asset = object(rt, handles, template.key())?;
            let instance = rt.instantiate(asset)?;
            Ok(handles.handle(RetainedRef::Object(instance)))
        })
    }

    fn set_parent(&mut self, node: TransformHandle, parent: TransformHandle) -> bool {
        self.call("set_parent", |rt, handles| {
            let child = object(rt, handles, node.key())?;
            let parent = object(rt, handles, parent.key())?;
            Ok(rt.set_parent(child, Some(parent))?)
        })
        .is_some()
    }

    fn set_local_transform(&mut self, node: TransformHandle, transform: Transform) -> bool {
        self.call("set_local_transform", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(rt.set_local_transform(id, transform)?)
        })
        .is_some()
    }

    fn material_slots(&self, node: TransformHandle) -> Vec<String> {
        self.call("material_slots", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(rt.materials(id)?)
        })
        .unwrap_or_default()
    }

    fn set_material_slots(&mut self, node: TransformHandle, materials: Vec<String>) -> bool {
        self.call("set_material_slots", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(rt.set_materials(id, materials)?)
        })
        .is_some()
    }

    fn render_layer(&self, node: TransformHandle) -> Option<u8> {
        self.call("render_layer", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(rt.layer(id)?)
        })
    }

    fn set_render_layer_recursive(&mut self, node: TransformHandle, layer: u8) -> bool {
        self.call("set_render_layer_recursive", |rt, handles| {
            let root = object(rt, handles, node.key())?;
            // Native set_layer touches one object only
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                rt.set_layer(id, layer)?;
                stack.extend(rt.children(id)?);
            }
            Ok(())
        })
        .is_some()
    }

    fn mark_persistent(&mut self, node: TransformHandle) -> bool {
        let Some(persist) = self.methods.persist else {
            tracing::debug!("Native API v1 persists whole hierarchies only; device not marked");
            return true;
        };
        self.call("mark_persistent", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            Ok(persist(rt, id)?)
        })
        .is_some()
    }

    fn destroy(&mut self, node: TransformHandle) -> bool {
        self.call("destroy", |rt, handles| {
            let id = object(rt, handles, node.key())?;
            let mut stack = vec![id];
            while let Some(next) = stack.pop() {
                stack.extend(rt.children(next)?);
                handles.forget_native(RetainedRef::Object(next));
            }
            rt.destroy(id)?;
            Ok(())
        })
        .is_some()
    }
}

impl CharacterCapability for RetainedBackend {
    fn local_character(&self) -> Option<CharacterHandle> {
        self.call("local_character", |rt, handles| {
            Ok(rt
                .local_player()
                .map(|player| handles.handle(RetainedRef::Object(player))))
        })
        .flatten()
    }

    fn character_root(&self, character: CharacterHandle) -> Option<TransformHandle> {
        self.call("character_root", |rt, handles| {
            let player = object(rt, handles, character.key())?;
            let root = rt.root_of(player)?;
            Ok(handles.handle(RetainedRef::Object(root)))
        })
    }

    fn character_name(&self, character: CharacterHandle) -> Option<String> {
        self.call("character_name", |rt, handles| {
            let player = object(rt, handles, character.key())?;
            Ok(rt.name(player)?)
        })
    }

    fn avatar(&self, character: CharacterHandle) -> Option<AvatarHandle> {
        self.call("avatar", |rt, handles| {
            let player = object(rt, handles, character.key())?;
            Ok(rt
                .player_avatar(player)?
                .map(|avatar| handles.handle(RetainedRef::Object(avatar))))
        })
        .flatten()
    }
}

impl AvatarCapability for RetainedBackend {
    fn head_bone(&self, avatar: AvatarHandle) -> Option<TransformHandle> {
        self.call("head_bone", |rt, handles| {
            let avatar = object(rt, handles, avatar.key())?;
            Ok(rt
                .avatar_head_bone(avatar)?
                .map(|bone| handles.handle(RetainedRef::Object(bone))))
        })
        .flatten()
    }
}

impl CameraCapability for RetainedBackend {
    fn player_camera(&self) -> Option<CameraHandle> {
        self.call("player_camera", |rt, handles| {
            Ok(rt
                .main_camera()
                .map(|camera| handles.handle(RetainedRef::Object(camera))))
        })
        .flatten()
    }

    fn camera_snapshot(&self, camera: CameraHandle) -> Option<CameraSnapshot> {
        self.call("camera_snapshot", |rt, handles| {
            let id = object(rt, handles, camera.key())?;
            snapshot_of(rt.camera_state(id)?)
        })
    }
}

impl BundleCapability for RetainedBackend {
    fn load_bundle(&mut self, path: &Path) -> Option<BundleHandle> {
        self.call("load_bundle", |rt, handles| {
            let bundle = rt.load_bundle_from_file(path)?;
            Ok(handles.handle(RetainedRef::Object(bundle)))
        })
    }

    fn load_asset(
        &mut self,
        bundle: BundleHandle,
        name: &str,
        category: ObjectCategory,
    ) -> Option<TemplateHandle> {
        self.call("load_asset", |rt, handles| {
            let bundle = object(rt, handles, bundle.key())?;
            let stored = rt.asset_category(bundle, name)?;
            if stored != category {
                return Err(BackendError::Rejected(format!(
                    "'{}' is a {:?}, not a {:?}",
                    name, stored, category
                )));
            }
            let asset = rt.load_asset(bundle, name)?;
            Ok(handles.handle(RetainedRef::Object(asset)))
        })
    }

    fn load_all_assets(
        &mut self,
        bundle: BundleHandle,
        category: ObjectCategory,
    ) -> Vec<TemplateHandle> {
        self.call("load_all_assets", |rt, handles| {
            let bundle = object(rt, handles, bundle.key())?;
            Ok(rt
                .load_all_assets(bundle, category)?
                .into_iter()
                .map(|asset| handles.handle(RetainedRef::Object(asset)))
                .collect())
        })
        .unwrap_or_default()
    }

    fn asset_names(&self, bundle: BundleHandle) -> Vec<String> {
        self.call("asset_names", |rt, handles| {
            let bundle = object(rt, handles, bundle.key())?;
            Ok(rt.asset_names(bundle)?)
        })
        .unwrap_or_default()
    }

    fn unload_bundle(&mut self, bundle: BundleHandle, unload_objects: bool) -> bool {
        let methods = self.methods;
        self.call("unload_bundle", |rt, handles| {
            let id = object(rt, handles, bundle.key())?;
            (methods.unload_bundle)(rt, id, unload_objects)?;
            handles.forget(bundle.key());
            Ok(())
        })
        .is_some()
    }
}

impl AudioMixerCapability for RetainedBackend {
    fn audio_mixer(&self) -> Option<AudioMixerHandle> {
        self.call("audio_mixer", |rt, handles| {
            Ok(rt.has_mixer().then(|| handles.handle(RetainedRef::Mixer)))
        })
        .flatten()
    }

    fn channel_volume(&self, mixer_handle: AudioMixerHandle, channel: AudioChannel) -> Option<f32> {
        self.call("channel_volume", |rt, handles| {
            mixer(rt, handles, mixer_handle.key())?;
            Ok(db_to_linear(rt.mixer_get_float(mixer_parameter(channel))?))
        })
    }

    fn set_channel_volume(
        &mut self,
        mixer_handle: AudioMixerHandle,
        channel: AudioChannel,
        volume: f32,
    ) -> bool {
        self.call("set_channel_volume", |rt, handles| {
            mixer(rt, handles, mixer_handle.key())?;
            Ok(rt.mixer_set_float(mixer_parameter(channel), linear_to_db(volume))?)
        })
        .is_some()
    }
}

impl MusicPlayerCapability for RetainedBackend {
    fn stop_music(&mut self) -> bool {
        self.call("stop_music", |rt, _| {
            let was_playing = rt.music_stop()?;
            tracing::debug!("Stopped game music (was playing: {})", was_playing);
            Ok(())
        })
        .is_some()
    }
}

impl Backend for RetainedBackend {
    fn variant(&self) -> RuntimeVariant {
        RuntimeVariant::Retained
    }

    fn api_version(&self) -> u32 {
        self.methods.version
    }

    fn is_bound(&self) -> bool {
        self.runtime.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headgear_common::{BundleBuilder, PrefabNode};
    use headgear_host::retained;
    use headgear_host::CharacterBlueprint;

    fn setup(api_version: u32) -> (SharedRuntime, RetainedBackend) {
        let mut rt = RetainedRuntime::new(api_version);
        rt.spawn_local_player(&CharacterBlueprint::humanoid("Player").transient())
            .unwrap();
        rt.spawn_camera(CameraState::default()).unwrap();
        rt.install_mixer();
        let rt = retained::share(rt);
        let backend = RetainedBackend::new(Some(rt.clone()));
        (rt, backend)
    }

    fn bundle_file(dir: &Path) -> std::path::PathBuf {
        let bytes = BundleBuilder::new("gear")
            .add_prefab("Headphones", PrefabNode::new("Headphones"))
            .add_object("Headphones_Band", ObjectCategory::Material)
            .build()
            .unwrap();
        let path = dir.join("gear.bundle");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_method_table_follows_api_version() {
        assert_eq!(setup(1).1.api_version(), 1);
        assert_eq!(setup(2).1.api_version(), 2);
        assert_eq!(RetainedBackend::new(None).api_version(), 1);
    }

    #[test]
    fn test_persist_v1_leaves_character_transient() {
        let (rt, mut backend) = setup(1);
        let character = backend.local_character().unwrap();
        let avatar = backend.avatar(character).unwrap();
        let head = backend.head_bone(avatar).unwrap();

        assert!(backend.mark_persistent(head));
        let player = rt.lock().local_player().unwrap();
        assert!(!rt.lock().is_persistent(player).unwrap());
    }

    #[test]
    fn test_persist_v2_marks_object() {
        let (rt, mut backend) = setup(2);
        let character = backend.local_character().unwrap();
        let root = backend.character_root(character).unwrap();
        let hips = backend.children(root)[0];

        assert!(backend.mark_persistent(hips));
        let player = rt.lock().local_player().unwrap();
        assert!(!rt.lock().is_persistent(player).unwrap());
    }

    #[test]
    fn test_unload_bundle_v2_keeps_objects() {
        let dir = tempfile::tempdir().unwrap();
        let (_rt, mut backend) = setup(2);
        let bundle = backend.load_bundle(&bundle_file(dir.path())).unwrap();
        let template = backend
            .load_asset(bundle, "Headphones", ObjectCategory::Prefab)
            .unwrap();

        assert!(backend.unload_bundle(bundle, false));
        assert!(!backend.is_live(bundle.key()));
        assert!(backend.is_live(template.key()));
    }

    #[test]
    fn test_load_asset_checks_category() {
        let dir = tempfile::tempdir().unwrap();
        let (_rt, mut backend) = setup(1);
        let bundle = backend.load_bundle(&bundle_file(dir.path())).unwrap();

        assert!(backend
            .load_asset(bundle, "Headphones_Band", ObjectCategory::Prefab)
            .is_none());
        assert!(backend
            .load_asset(bundle, "Headphones_Band", ObjectCategory::Material)
            .is_some());
        assert_eq!(backend.asset_names(bundle).len(), 2);
    }

    #[test]
    fn test_load_asset_materialises_only_that_asset() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = BundleBuilder::new("gear")
            .add_prefab("Headphones", PrefabNode::new("Headphones"))
            .add_prefab("Earmuffs", PrefabNode::new("Earmuffs").with_child(PrefabNode::new("Muff")))
            .build()
            .unwrap();
        let path = dir.path().join("gear.bundle");
        std::fs::write(&path, bytes).unwrap();

        let (rt, mut backend) = setup(2);
        let bundle = backend.load_bundle(&path).unwrap();
        let before = rt.lock().object_count();
        let template = backend
            .load_asset(bundle, "Headphones", ObjectCategory::Prefab)
            .unwrap();
        assert_eq!(rt.lock().object_count(), before + 1);
        assert_eq!(backend.node_name(template.cast()).as_deref(), Some("Headphones"));
        assert!(backend
            .load_asset(bundle, "Missing", ObjectCategory::Prefab)
            .is_none());
    }

    #[test]
    fn test_destroy_forgets_subtree() {
        let (_rt, mut backend) = setup(2);
        let character = backend.local_character().unwrap();
        let root = backend.character_root(character).unwrap();
        let hips = backend.children(root)[0];
        let spine = backend.children(hips)[0];
        backend.children(spine);
        let before = backend.handles.lock().len();

        assert!(backend.destroy(hips));
        // Hips, Spine and Neck were registered
        assert_eq!(backend.handles.lock().len(), before - 3);
        assert!(!backend.is_live(spine.key()));
    }

    #[test]
    fn test_camera_modes() {
        let (rt, backend) = setup(2);
        let camera = backend.player_camera().unwrap();
        assert!(backend.camera_snapshot(camera).unwrap().is_first_person());

        let id = rt.lock().main_camera().unwrap();
        rt.lock()
            .set_camera_state(
                id,
                CameraState {
                    mode: CAMERA_MODE_SKATEBOARD,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            backend.camera_snapshot(camera).unwrap().mode,
            CameraMode::Skateboard
        );

        rt.lock()
            .set_camera_state(id, CameraState { mode: 42, ..Default::default() })
            .unwrap();
        assert!(backend.camera_snapshot(camera).is_none());
    }

    #[test]
    fn test_volume_conversion() {
        assert_eq!(linear_to_db(1.0), 0.0);
        assert_eq!(linear_to_db(0.0), MIXER_MIN_DB);
        assert_eq!(db_to_linear(MIXER_MIN_DB), 0.0);
        assert!((db_to_linear(linear_to_db(0.5)) - 0.5).abs() < 1e-4);

        let (_rt, mut backend) = setup(2);
        let mixer = backend.audio_mixer().unwrap();
        assert!(backend.set_channel_volume(mixer, AudioChannel::Music, 0.0));
        assert_eq!(backend.channel_volume(mixer, AudioChannel::Music), Some(0.0));
    }

    #[test]
    fn test_layers_recurse() {
        let (_rt, mut backend) = setup(2);
        let character = backend.local_character().unwrap();
        let root = backend.character_root(character).unwrap();

        assert!(backend.set_render_layer_recursive(root, 30));
        let hips = backend.children(root)[0];
        let spine = backend.children(hips)[0];
        assert_eq!(backend.render_layer(spine), Some(30));
    }
}
