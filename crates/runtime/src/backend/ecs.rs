//! # Runtime A Adapter
//!
//! Implements [`Backend`] over a shared Bevy [`World`]. Characters, bones,
//! bundles and device instances are entities; the mixer is a resource, so it
//! gets a registry entry of its own.

use bevy::camera::visibility::RenderLayers;
use bevy::prelude::*;
use headgear_common::{
    AudioChannel, AudioMixerCapability, AudioMixerHandle, AvatarCapability, AvatarHandle, Backend,
    BundleCapability, BundleHandle, CameraCapability, CameraHandle, CameraMode, CameraSnapshot,
    CharacterCapability, CharacterHandle, DeviceHandle, MusicPlayerCapability, NativeKey,
    ObjectCategory, RuntimeVariant, SceneCapability, TemplateHandle, TransformHandle,
};
use headgear_host::ecs::{
    self, AvatarRig, EcsError, LocalPlayer, MaterialSlots, MixerChannels, MusicPlayer,
    PersistAcrossScenes, PlayerCamera, PlayerCharacter, Prefab, SharedWorld, ViewKind,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{BackendError, HandleRegistry};

/// What a registry key points at in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EcsRef {
    Entity(Entity),
    Mixer,
}

// ============================================================================
// Method Table
// ============================================================================

/// Native entry points, resolved once per adapter.
struct EcsMethodTable {
    version: u32,
    load_bundle: fn(&mut World, &Path) -> Result<Entity, EcsError>,
    load_asset: fn(&mut World, Entity, &str) -> Result<Entity, EcsError>,
    load_all_assets: fn(&mut World, Entity, ObjectCategory) -> Result<Vec<Entity>, EcsError>,
    unload_bundle: fn(&mut World, Entity, bool) -> Result<(), EcsError>,
    instantiate: fn(&mut World, Entity) -> Result<Entity, EcsError>,
}

const ECS_METHODS_V1: EcsMethodTable = EcsMethodTable {
    version: 1,
    load_bundle: ecs::load_bundle_file,
    load_asset: ecs::load_asset,
    load_all_assets: ecs::load_all_assets,
    unload_bundle: ecs::unload_bundle,
    instantiate: ecs::instantiate,
};

/// Game channel names, as registered in [`MixerChannels`].
fn channel_key(channel: AudioChannel) -> &'static str {
    match channel {
        AudioChannel::Master => "master",
        AudioChannel::Music => "music",
        AudioChannel::Effects => "sfx",
        AudioChannel::Ambient => "ambience",
        AudioChannel::Ui => "interface",
    }
}

fn snapshot_of(camera: &PlayerCamera) -> CameraSnapshot {
    let mode = match camera.view {
        ViewKind::OnFoot => CameraMode::Default,
        ViewKind::Driving => CameraMode::Vehicle,
        ViewKind::Boarding => CameraMode::Skateboard,
        ViewKind::Freecam => CameraMode::FreeCam,
        ViewKind::AvatarPreview => CameraMode::ViewingAvatar,
    };
    CameraSnapshot::new(mode, camera.freecam, camera.avatar_preview)
}

// ============================================================================
// Adapter
// ============================================================================

pub struct EcsBackend {
    world: Option<SharedWorld>,
    handles: Mutex<HandleRegistry<EcsRef>>,
    methods: &'static EcsMethodTable,
    warned_unbound: AtomicBool,
}

impl EcsBackend {
    pub fn new(world: Option<SharedWorld>) -> Self {
        Self {
            world,
            handles: Mutex::new(HandleRegistry::new()),
            methods: &ECS_METHODS_V1,
            warned_unbound: AtomicBool::new(false),
        }
    }

    /// Run `op` against the world. Errors are logged and become `None`.
    fn call<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut World, &mut HandleRegistry<EcsRef>) -> Result<T, BackendError>,
    ) -> Option<T> {
        let Some(world) = self.world.as_ref() else {
            if !self.warned_unbound.swap(true, Ordering::Relaxed) {
                tracing::warn!("ECS adapter has no world; {} and later calls return nothing", op);
            }
            return None;
        };

        let mut world = world.lock();
        let mut handles = self.handles.lock();
        let result = f(&mut world, &mut handles);
        if handles.needs_sweep() {
            let dropped = handles.sweep(|native| match native {
                EcsRef::Entity(e) => world.get_entity(e).is_ok(),
                EcsRef::Mixer => world.contains_resource::<MixerChannels>(),
            });
            tracing::debug!("ECS handle sweep dropped {} stale entries", dropped);
        }
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("ECS {} failed: {}", op, e);
                None
            }
        }
    }
}

/// Resolve a key to a live entity, forgetting it if the entity is gone.
fn entity(
    world: &World,
    handles: &mut HandleRegistry<EcsRef>,
    key: NativeKey,
) -> Result<Entity, BackendError> {
    match handles.resolve(key) {
        Some(EcsRef::Entity(e)) if world.get_entity(e).is_ok() => Ok(e),
        Some(EcsRef::Entity(e)) => {
            handles.forget(key);
            Err(EcsError::NoSuchEntity(e).into())
        }
        Some(EcsRef::Mixer) => Err(BackendError::WrongKind),
        None => Err(BackendError::UnknownHandle),
    }
}

fn mixer(
    world: &World,
    handles: &HandleRegistry<EcsRef>,
    key: NativeKey,
) -> Result<(), BackendError> {
    match handles.resolve(key) {
        Some(EcsRef::Mixer) if world.contains_resource::<MixerChannels>() => Ok(()),
        Some(EcsRef::Mixer) => Err(BackendError::Rejected("mixer resource removed".into())),
        Some(EcsRef::Entity(_)) => Err(BackendError::WrongKind),
        None => Err(BackendError::UnknownHandle),
    }
}

impl SceneCapability for EcsBackend {
    fn is_live(&self, key: NativeKey) -> bool {
        self.call("is_live", |world, handles| {
            Ok(match handles.resolve(key) {
                Some(EcsRef::Entity(e)) => {
                    let live = world.get_entity(e).is_ok();
                    if !live {
                        handles.forget(key);
                    }
                    live
                }
                Some(EcsRef::Mixer) => world.contains_resource::<MixerChannels>(),
                None => false,
            })
        })
        .unwrap_or(false)
    }

    fn node_name(&self, node: TransformHandle) -> Option<String> {
        self.call("node_name", |world, handles| {
            let e = entity(world, handles, node.key())?;
            Ok(world.get::<Name>(e).map(|name| name.as_str().to_string()))
        })
        .flatten()
    }

    fn children(&self, node: TransformHandle) -> Vec<TransformHandle> {
        self.call("children", |world, handles| {
            let e = entity(world, handles, node.key())?;
            Ok(ecs::children_of(world, e)
                .into_iter()
                .map(|child| handles.handle(EcsRef::Entity(child)))
                .collect())
        })
        .unwrap_or_default()
    }

    fn local_position(&self, node: TransformHandle) -> Option<Vec3> {
        self.call("local_position", |world, handles| {
            let e = entity(world, handles, node.key())?;
            Ok(world.get::<Transform>(e).map(|t| t.translation))
        })
        .flatten()
    }

    fn instantiate(&mut self, template: TemplateHandle) -> Option<DeviceHandle> {
        let methods = self.methods;
        self.call("instantiate", |world, handles| {
            let prefab = entity(world, handles, template.key())?;
            let instance = (methods.instantiate)(world, prefab)?;
            Ok(handles.handle(EcsRef::Entity(instance)))
        })
    }

    fn set_parent(&mut self, node: TransformHandle, parent: TransformHandle) -> bool {
        self.call("set_parent", |world, handles| {
            let child = entity(world, handles, node.key())?;
            let parent = entity(world, handles, parent.key())?;

            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == child {
                    return Err(BackendError::Rejected(format!(
                        "{:?} is an ancestor of {:?}",
                        child, parent
                    )));
                }
                cursor = world.get::<ChildOf>(current).map(|c| c.parent());
            }

            world.entity_mut(child).insert(ChildOf(parent));
            Ok(())
        })
        .is_some()
    }

    fn set_local_transform(&mut self, node: TransformHandle, transform: Transform) -> bool {
        self.call("set_local_transform", |world, handles| {
            let e = entity(world, handles, node.key())?;
            world.entity_mut(e).insert(transform);
            Ok(())
        })
        .is_some()
    }

    fn material_slots(&self, node: TransformHandle) -> Vec<String> {
        self.call("material_slots", |world, handles| {
            let e = entity(world, handles, node.key())?;
            Ok(world
                .get::<MaterialSlots>(e)
                .map(|slots| slots.0.clone())
                .unwrap_or_default())
        })
        .unwrap_or_default()
    }

    fn set_material_slots(&mut self, node: TransformHandle, materials: Vec<String>) -> bool {
        self.call("set_material_slots", |world, handles| {
            let e = entity(world, handles, node.key())?;
            world.entity_mut(e).insert(MaterialSlots(materials));
            Ok(())
        })
        .is_some()
    }

    fn render_layer(&self, node: TransformHandle) -> Option<u8> {
        self.call("render_layer", |world, handles| {
            let e = entity(world, handles, node.key())?;
            // No RenderLayers means layer 0
            Ok(match world.get::<RenderLayers>(e) {
                Some(layers) => layers.iter().next().map(|layer| layer as u8),
                None => Some(0),
            })
        })
        .flatten()
    }

    fn set_render_layer_recursive(&mut self, node: TransformHandle, layer: u8) -> bool {
        self.call("set_render_layer_recursive", |world, handles| {
            let root = entity(world, handles, node.key())?;
            let mut stack = vec![root];
            while let Some(e) = stack.pop() {
                world
                    .entity_mut(e)
                    .insert(RenderLayers::layer(layer as usize));
                stack.extend(ecs::children_of(world, e));
            }
            Ok(())
        })
        .is_some()
    }

    fn mark_persistent(&mut self, node: TransformHandle) -> bool {
        self.call("mark_persistent", |world, handles| {
            let e = entity(world, handles, node.key())?;
            world.entity_mut(e).insert(PersistAcrossScenes);
            Ok(())
        })
        .is_some()
    }

    fn destroy(&mut self, node: TransformHandle) -> bool {
        self.call("destroy", |world, handles| {
            let e = entity(world, handles, node.key())?;
            let mut stack = vec![e];
            while let Some(next) = stack.pop() {
                stack.extend(ecs::children_of(world, next));
                handles.forget_native(EcsRef::Entity(next));
            }
            world.despawn(e);
            Ok(())
        })
        .is_some()
    }
}

impl CharacterCapability for EcsBackend {
    fn local_character(&self) -> Option<CharacterHandle> {
        self.call("local_character", |world, handles| {
            let mut locals =
                world.query_filtered::<Entity, (With<LocalPlayer>, With<PlayerCharacter>)>();
            let found = locals.iter(world).next();
            Ok(found.map(|e| handles.handle(EcsRef::Entity(e))))
        })
        .flatten()
    }

    fn character_root(&self, character: CharacterHandle) -> Option<TransformHandle> {
        self.call("character_root", |world, handles| {
            let e = entity(world, handles, character.key())?;
            if world.get::<PlayerCharacter>(e).is_none() {
                return Err(BackendError::WrongKind);
            }
            // The character entity is its own root transform
            Ok(character.cast())
        })
    }

    fn character_name(&self, character: CharacterHandle) -> Option<String> {
        self.call("character_name", |world, handles| {
            let e = entity(world, handles, character.key())?;
            world
                .get::<PlayerCharacter>(e)
                .map(|c| c.display_name.clone())
                .ok_or(BackendError::WrongKind)
        })
    }

    fn avatar(&self, character: CharacterHandle) -> Option<AvatarHandle> {
        self.call("avatar", |world, handles| {
            let e = entity(world, handles, character.key())?;
            let avatar = ecs::children_of(world, e)
                .into_iter()
                .find(|child| world.get::<AvatarRig>(*child).is_some());
            Ok(avatar.map(|a| handles.handle(EcsRef::Entity(a))))
        })
        .flatten()
    }
}

impl AvatarCapability for EcsBackend {
    fn head_bone(&self, avatar: AvatarHandle) -> Option<TransformHandle> {
        self.call("head_bone", |world, handles| {
            let e = entity(world, handles, avatar.key())?;
            let rig = world.get::<AvatarRig>(e).ok_or(BackendError::WrongKind)?;
            let bone = rig.head_bone.filter(|bone| world.get_entity(*bone).is_ok());
            Ok(bone.map(|b| handles.handle(EcsRef::Entity(b))))
        })
        .flatten()
    }
}

impl CameraCapability for EcsBackend {
    fn player_camera(&self) -> Option<CameraHandle> {
        self.call("player_camera", |world, handles| {
            let mut cameras = world.query_filtered::<Entity, With<PlayerCamera>>();
            let found = cameras.iter(world).next();
            Ok(found.map(|e| handles.handle(EcsRef::Entity(e))))
        })
        .flatten()
    }

    fn camera_snapshot(&self, camera: CameraHandle) -> Option<CameraSnapshot> {
        self.call("camera_snapshot", |world, handles| {
            let e = entity(world, handles, camera.key())?;
            world
                .get::<PlayerCamera>(e)
                .map(snapshot_of)
                .ok_or(BackendError::WrongKind)
        })
    }
}

impl BundleCapability for EcsBackend {
    fn load_bundle(&mut self, path: &Path) -> Option<BundleHandle> {
        let methods = self.methods;
        self.call("load_bundle", |world, handles| {
            let bundle = (methods.load_bundle)(world, path)?;
            Ok(handles.handle(EcsRef::Entity(bundle)))
        })
    }

    fn load_asset(
        &mut self,
        bundle: BundleHandle,
        name: &str,
        category: ObjectCategory,
    ) -> Option<TemplateHandle> {
        let methods = self.methods;
        self.call("load_asset", |world, handles| {
            let bundle = entity(world, handles, bundle.key())?;
            let asset = (methods.load_asset)(world, bundle, name)?;
            match world.get::<Prefab>(asset) {
                Some(prefab) if prefab.category == category => {
                    Ok(handles.handle(EcsRef::Entity(asset)))
                }
                Some(prefab) => Err(BackendError::Rejected(format!(
                    "'{}' is a {:?}, not a {:?}",
                    name, prefab.category, category
                ))),
                None => Err(EcsError::NotAPrefab(asset).into()),
            }
        })
    }

    fn load_all_assets(
        &mut self,
        bundle: BundleHandle,
        category: ObjectCategory,
    ) -> Vec<TemplateHandle> {
        let methods = self.methods;
        self.call("load_all_assets", |world, handles| {
            let bundle = entity(world, handles, bundle.key())?;
            let assets = (methods.load_all_assets)(world, bundle, category)?;
            Ok(assets
                .into_iter()
                .map(|asset| handles.handle(EcsRef::Entity(asset)))
                .collect())
        })
        .unwrap_or_default()
    }

    fn asset_names(&self, bundle: BundleHandle) -> Vec<String> {
        self.call("asset_names", |world, handles| {
            let bundle = entity(world, handles, bundle.key())?;
            Ok(ecs::asset_names(world, bundle)?)
        })
        .unwrap_or_default()
    }

    fn unload_bundle(&mut self, bundle: BundleHandle, unload_objects: bool) -> bool {
        let methods = self.methods;
        self.call("unload_bundle", |world, handles| {
            let e = entity(world, handles, bundle.key())?;
            (methods.unload_bundle)(world, e, unload_objects)?;
            handles.forget(bundle.key());
            Ok(())
        })
        .is_some()
    }
}

impl AudioMixerCapability for EcsBackend {
    fn audio_mixer(&self) -> Option<AudioMixerHandle> {
        self.call("audio_mixer", |world, handles| {
            Ok(world
                .contains_resource::<MixerChannels>()
                .then(|| handles.handle(EcsRef::Mixer)))
        })
        .flatten()
    }

    fn channel_volume(&self, mixer_handle: AudioMixerHandle, channel: AudioChannel) -> Option<f32> {
        self.call("channel_volume", |world, handles| {
            mixer(world, handles, mixer_handle.key())?;
            Ok(world
                .get_resource::<MixerChannels>()
                .and_then(|channels| channels.volume(channel_key(channel))))
        })
        .flatten()
    }

    fn set_channel_volume(
        &mut self,
        mixer_handle: AudioMixerHandle,
        channel: AudioChannel,
        volume: f32,
    ) -> bool {
        self.call("set_channel_volume", |world, handles| {
            mixer(world, handles, mixer_handle.key())?;
            let mut channels = world
                .get_resource_mut::<MixerChannels>()
                .ok_or(BackendError::Rejected("mixer resource removed".into()))?;
            if channels.set_volume(channel_key(channel), volume) {
                Ok(())
            } else {
                Err(BackendError::Rejected(format!("no '{}' channel", channel_key(channel))))
            }
        })
        .is_some()
    }
}

impl MusicPlayerCapability for EcsBackend {
    fn stop_music(&mut self) -> bool {
        self.call("stop_music", |world, _| {
            let mut player = world
                .get_resource_mut::<MusicPlayer>()
                .ok_or(BackendError::Rejected("no music player".into()))?;
            let was_playing = player.stop();
            tracing::debug!("Stopped game music (was playing: {})", was_playing);
            Ok(())
        })
        .is_some()
    }
}

impl Backend for EcsBackend {
    fn variant(&self) -> RuntimeVariant {
        RuntimeVariant::Ecs
    }

    fn api_version(&self) -> u32 {
        self.methods.version
    }

    fn is_bound(&self) -> bool {
        self.world.is_some()
    }
}
