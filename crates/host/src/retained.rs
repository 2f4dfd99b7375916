//! # Runtime B: Retained Object Tree
//!
//! Objects live in a slot table and are addressed by [`ObjectId`]
//! (index + generation). Destroying an object bumps its slot generation, so
//! stale ids are detected rather than aliased. Every call that touches an
//! object returns `Result<_, NativeError>`.
//!
//! The runtime exists in two API versions:
//!
//! | Call                  | v1 | v2 |
//! |-----------------------|----|----|
//! | `unload_bundle`       | ✅ (always drops objects) | ✅ |
//! | `unload_bundle_ex`    | ❌ | ✅ |
//! | `dont_destroy_on_load`| ✅ (marks the hierarchy root) | ✅ |
//! | `set_persistent`      | ❌ | ✅ |

use bevy::prelude::Transform;
use headgear_common::{BundleFile, BundleFormatError, ObjectCategory, PrefabNode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::CharacterBlueprint;

/// Runtime shared between the game and the adapter.
pub type SharedRuntime = Arc<Mutex<RetainedRuntime>>;

pub fn share(runtime: RetainedRuntime) -> SharedRuntime {
    Arc::new(Mutex::new(runtime))
}

pub const CAMERA_MODE_DEFAULT: i32 = 0;
pub const CAMERA_MODE_VEHICLE: i32 = 1;
pub const CAMERA_MODE_SKATEBOARD: i32 = 2;
pub const CAMERA_MODE_FREECAM: i32 = 3;
pub const CAMERA_MODE_VIEWING_AVATAR: i32 = 4;

/// Exposed mixer parameters, in decibels.
pub const MIXER_PARAMETERS: [&str; 5] = [
    "MasterVolume",
    "MusicVolume",
    "SFXVolume",
    "AmbientVolume",
    "UIVolume",
];

/// Floor of the mixer's decibel range; treated as silence.
pub const MIXER_MIN_DB: f32 = -80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.index, self.generation)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NativeError {
    #[error("Object {0} has been destroyed")]
    Destroyed(ObjectId),

    #[error("Object {id} is not a {expected}")]
    WrongClass { id: ObjectId, expected: &'static str },

    #[error("Asset '{0}' not found in bundle")]
    AssetNotFound(String),

    #[error("{call} is not available in API version {version}")]
    Unsupported { call: &'static str, version: u32 },

    #[error("Parenting {child} under {parent} would create a cycle")]
    Cycle { child: ObjectId, parent: ObjectId },

    #[error("Mixer has no exposed parameter '{0}'")]
    UnknownParameter(String),

    #[error("No audio mixer loaded")]
    NoMixer,

    #[error("No music player loaded")]
    NoMusicPlayer,

    #[error("Bundle I/O failed: {0}")]
    Io(String),

    #[error(transparent)]
    Format(#[from] BundleFormatError),
}

pub type NativeResult<T> = Result<T, NativeError>;

/// Camera fields as the runtime stores them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraState {
    pub mode: i32,
    pub free_cam: bool,
    pub viewing_avatar: bool,
}

#[derive(Debug, Clone)]
enum ObjectKind {
    Node,
    Player { avatar: Option<ObjectId> },
    Avatar { head_bone: Option<ObjectId> },
    Camera(CameraState),
    Bundle {
        file: BundleFile,
        assets: HashMap<String, ObjectId>,
    },
    Asset { category: ObjectCategory },
}

impl ObjectKind {
    fn survives_scene_unload(&self) -> bool {
        matches!(self, ObjectKind::Bundle { .. } | ObjectKind::Asset { .. })
    }
}

#[derive(Debug, Clone)]
struct Object {
    name: String,
    kind: ObjectKind,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    local: Transform,
    layer: u8,
    materials: Vec<String>,
    persistent: bool,
}

impl Object {
    fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            children: Vec::new(),
            local: Transform::IDENTITY,
            layer: 0,
            materials: Vec::new(),
            persistent: false,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<Object>,
}

#[derive(Debug, Clone)]
struct AudioMixer {
    params: HashMap<String, f32>,
}

#[derive(Debug, Clone, Default)]
struct MusicPlayer {
    track: Option<String>,
}

/// The runtime B object world.
#[derive(Debug)]
pub struct RetainedRuntime {
    slots: Vec<Slot>,
    free: Vec<u32>,
    api_version: u32,
    local_player: Option<ObjectId>,
    main_camera: Option<ObjectId>,
    mixer: Option<AudioMixer>,
    music: Option<MusicPlayer>,
}

impl RetainedRuntime {
    /// Create an empty runtime reporting `api_version` (1 or 2).
    pub fn new(api_version: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            api_version: api_version.clamp(1, 2),
            local_player: None,
            main_camera: None,
            mixer: None,
            music: None,
        }
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    // ========================================================================
    // Object table
    // ========================================================================

    fn alloc(&mut self, object: Object) -> ObjectId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                ObjectId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                ObjectId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn get(&self, id: ObjectId) -> NativeResult<&Object> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_ref())
            .ok_or(NativeError::Destroyed(id))
    }

    fn get_mut(&mut self, id: ObjectId) -> NativeResult<&mut Object> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_mut())
            .ok_or(NativeError::Destroyed(id))
    }

    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.get(id).is_ok()
    }

    pub fn object_count(&self) -> usize {
        self.slots.iter().filter(|s| s.object.is_some()).count()
    }

    fn spawn(&mut self, object: Object, parent: Option<ObjectId>) -> NativeResult<ObjectId> {
        if let Some(parent) = parent {
            self.get(parent)?;
        }
        let id = self.alloc(object);
        if let Some(parent) = parent {
            self.get_mut(id)?.parent = Some(parent);
            self.get_mut(parent)?.children.push(id);
        }
        Ok(id)
    }

    pub fn create_object(
        &mut self,
        name: &str,
        parent: Option<ObjectId>,
    ) -> NativeResult<ObjectId> {
        self.spawn(Object::new(name, ObjectKind::Node), parent)
    }

    /// Destroy an object and its whole subtree.
    pub fn destroy(&mut self, id: ObjectId) -> NativeResult<()> {
        let parent = self.get(id)?.parent;
        if let Some(parent) = parent {
            if let Ok(parent) = self.get_mut(parent) {
                parent.children.retain(|c| *c != id);
            }
        }

        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let slot = &mut self.slots[next.index as usize];
            if slot.generation != next.generation {
                continue;
            }
            if let Some(object) = slot.object.take() {
                pending.extend(object.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(next.index);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Transform tree
    // ========================================================================

    pub fn name(&self, id: ObjectId) -> NativeResult<String> {
        Ok(self.get(id)?.name.clone())
    }

    pub fn children(&self, id: ObjectId) -> NativeResult<Vec<ObjectId>> {
        Ok(self.get(id)?.children.clone())
    }

    pub fn parent(&self, id: ObjectId) -> NativeResult<Option<ObjectId>> {
        Ok(self.get(id)?.parent)
    }

    pub fn local_transform(&self, id: ObjectId) -> NativeResult<Transform> {
        Ok(self.get(id)?.local)
    }

    pub fn set_local_transform(&mut self, id: ObjectId, transform: Transform) -> NativeResult<()> {
        self.get_mut(id)?.local = transform;
        Ok(())
    }

    pub fn set_parent(&mut self, id: ObjectId, parent: Option<ObjectId>) -> NativeResult<()> {
        self.get(id)?;
        if let Some(parent) = parent {
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == id {
                    return Err(NativeError::Cycle { child: id, parent });
                }
                cursor = self.get(current)?.parent;
            }
        }

        if let Some(old) = self.get(id)?.parent {
            if let Ok(old) = self.get_mut(old) {
                old.children.retain(|c| *c != id);
            }
        }
        self.get_mut(id)?.parent = parent;
        if let Some(parent) = parent {
            self.get_mut(parent)?.children.push(id);
        }
        Ok(())
    }

    pub fn layer(&self, id: ObjectId) -> NativeResult<u8> {
        Ok(self.get(id)?.layer)
    }

    /// Sets the layer of this object only.
    pub fn set_layer(&mut self, id: ObjectId, layer: u8) -> NativeResult<()> {
        self.get_mut(id)?.layer = layer;
        Ok(())
    }

    pub fn materials(&self, id: ObjectId) -> NativeResult<Vec<String>> {
        Ok(self.get(id)?.materials.clone())
    }

    pub fn set_materials(&mut self, id: ObjectId, materials: Vec<String>) -> NativeResult<()> {
        self.get_mut(id)?.materials = materials;
        Ok(())
    }

    pub fn root_of(&self, id: ObjectId) -> NativeResult<ObjectId> {
        let mut current = id;
        while let Some(parent) = self.get(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    pub fn is_persistent(&self, id: ObjectId) -> NativeResult<bool> {
        Ok(self.get(id)?.persistent)
    }

    /// Keep the object's hierarchy alive across scene unloads. Only roots
    /// can persist, so this marks the root.
    pub fn dont_destroy_on_load(&mut self, id: ObjectId) -> NativeResult<()> {
        let root = self.root_of(id)?;
        self.get_mut(root)?.persistent = true;
        Ok(())
    }

    /// v2: flag the object itself.
    pub fn set_persistent(&mut self, id: ObjectId, persistent: bool) -> NativeResult<()> {
        if self.api_version < 2 {
            return Err(NativeError::Unsupported {
                call: "set_persistent",
                version: self.api_version,
            });
        }
        self.get_mut(id)?.persistent = persistent;
        Ok(())
    }

    fn spawn_tree(
        &mut self,
        node: &PrefabNode,
        parent: Option<ObjectId>,
        kind: ObjectKind,
    ) -> NativeResult<ObjectId> {
        let mut object = Object::new(node.name.clone(), kind);
        object.local = node.transform();
        object.materials = node.materials.clone();
        let id = self.spawn(object, parent)?;

        for child in &node.children {
            self.spawn_tree(child, Some(id), ObjectKind::Node)?;
        }
        Ok(id)
    }

    /// Depth-first exact name search below `root` (inclusive).
    pub fn find_by_name(&self, root: ObjectId, name: &str) -> NativeResult<Option<ObjectId>> {
        let object = self.get(root)?;
        if object.name == name {
            return Ok(Some(root));
        }
        for child in &object.children {
            if let Some(found) = self.find_by_name(*child, name)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Players, avatars, camera
    // ========================================================================

    /// Spawn the local player's character; replaces any previous local player.
    pub fn spawn_local_player(&mut self, blueprint: &CharacterBlueprint) -> NativeResult<ObjectId> {
        let player = self.spawn(
            Object::new(blueprint.name.clone(), ObjectKind::Player { avatar: None }),
            None,
        )?;
        self.get_mut(player)?.persistent = blueprint.persistent;

        let skeleton = self.spawn_tree(&blueprint.skeleton, Some(player), ObjectKind::Node)?;

        if blueprint.has_avatar {
            let head_bone = match blueprint.head_bone.as_deref() {
                Some(name) => self.find_by_name(skeleton, name)?,
                None => None,
            };
            let avatar = self.spawn(
                Object::new("Avatar", ObjectKind::Avatar { head_bone }),
                Some(player),
            )?;
            self.get_mut(player)?.kind = ObjectKind::Player {
                avatar: Some(avatar),
            };
        }

        self.local_player = Some(player);
        Ok(player)
    }

    pub fn local_player(&self) -> Option<ObjectId> {
        self.local_player.filter(|id| self.is_alive(*id))
    }

    /// The player's avatar component, if it has one (and it's alive).
    pub fn player_avatar(&self, player: ObjectId) -> NativeResult<Option<ObjectId>> {
        match self.get(player)?.kind {
            ObjectKind::Player { avatar } => Ok(avatar.filter(|a| self.is_alive(*a))),
            _ => Err(NativeError::WrongClass {
                id: player,
                expected: "Player",
            }),
        }
    }

    pub fn avatar_head_bone(&self, avatar: ObjectId) -> NativeResult<Option<ObjectId>> {
        match self.get(avatar)?.kind {
            ObjectKind::Avatar { head_bone } => Ok(head_bone.filter(|b| self.is_alive(*b))),
            _ => Err(NativeError::WrongClass {
                id: avatar,
                expected: "Avatar",
            }),
        }
    }

    pub fn spawn_camera(&mut self, state: CameraState) -> NativeResult<ObjectId> {
        let camera = self.spawn(Object::new("PlayerCamera", ObjectKind::Camera(state)), None)?;
        self.main_camera = Some(camera);
        Ok(camera)
    }

    pub fn main_camera(&self) -> Option<ObjectId> {
        self.main_camera.filter(|id| self.is_alive(*id))
    }

    pub fn camera_state(&self, camera: ObjectId) -> NativeResult<CameraState> {
        match self.get(camera)?.kind {
            ObjectKind::Camera(state) => Ok(state),
            _ => Err(NativeError::WrongClass {
                id: camera,
                expected: "Camera",
            }),
        }
    }

    pub fn set_camera_state(&mut self, camera: ObjectId, state: CameraState) -> NativeResult<()> {
        match &mut self.get_mut(camera)?.kind {
            ObjectKind::Camera(current) => {
                *current = state;
                Ok(())
            }
            _ => Err(NativeError::WrongClass {
                id: camera,
                expected: "Camera",
            }),
        }
    }

    // ========================================================================
    // Bundles
    // ========================================================================

    pub fn load_bundle_from_file(&mut self, path: &Path) -> NativeResult<ObjectId> {
        let bytes = std::fs::read(path).map_err(|e| NativeError::Io(e.to_string()))?;
        let file = BundleFile::decode(&bytes)?;
        let name = format!("Bundle:{}", file.name);
        self.spawn(
            Object::new(
                name,
                ObjectKind::Bundle {
                    file,
                    assets: HashMap::new(),
                },
            ),
            None,
        )
    }

    fn bundle_parts(
        &self,
        bundle: ObjectId,
    ) -> NativeResult<(&BundleFile, &HashMap<String, ObjectId>)> {
        match &self.get(bundle)?.kind {
            ObjectKind::Bundle { file, assets } => Ok((file, assets)),
            _ => Err(NativeError::WrongClass {
                id: bundle,
                expected: "Bundle",
            }),
        }
    }

    pub fn asset_names(&self, bundle: ObjectId) -> NativeResult<Vec<String>> {
        Ok(self.bundle_parts(bundle)?.0.names())
    }

    /// Category a named asset was stored with, read without loading it.
    pub fn asset_category(&self, bundle: ObjectId, name: &str) -> NativeResult<ObjectCategory> {
        self.bundle_parts(bundle)?
            .0
            .object(name)
            .map(|object| object.category)
            .ok_or_else(|| NativeError::AssetNotFound(name.to_string()))
    }

    /// Materialise (or return the live copy of) a named asset.
    pub fn load_asset(&mut self, bundle: ObjectId, name: &str) -> NativeResult<ObjectId> {
        let (object, existing) = {
            let (file, assets) = self.bundle_parts(bundle)?;
            let object = file
                .object(name)
                .cloned()
                .ok_or_else(|| NativeError::AssetNotFound(name.to_string()))?;
            (object, assets.get(name).copied())
        };

        if let Some(id) = existing.filter(|id| self.is_alive(*id)) {
            return Ok(id);
        }

        let kind = ObjectKind::Asset {
            category: object.category,
        };
        let id = match &object.root {
            Some(root) => self.spawn_tree(root, None, kind)?,
            None => self.spawn(Object::new(object.name.clone(), kind), None)?,
        };

        if let ObjectKind::Bundle { assets, .. } = &mut self.get_mut(bundle)?.kind {
            assets.insert(name.to_string(), id);
        }
        Ok(id)
    }

    pub fn load_all_assets(
        &mut self,
        bundle: ObjectId,
        category: ObjectCategory,
    ) -> NativeResult<Vec<ObjectId>> {
        let names: Vec<String> = self
            .bundle_parts(bundle)?
            .0
            .objects_of(category)
            .map(|o| o.name.clone())
            .collect();
        names.iter().map(|name| self.load_asset(bundle, name)).collect()
    }

    /// v1 shape: always unloads loaded objects along with the container.
    pub fn unload_bundle(&mut self, bundle: ObjectId) -> NativeResult<()> {
        self.unload_bundle_inner(bundle, true)
    }

    /// v2: choose whether loaded objects go too.
    pub fn unload_bundle_ex(
        &mut self,
        bundle: ObjectId,
        unload_all_objects: bool,
    ) -> NativeResult<()> {
        if self.api_version < 2 {
            return Err(NativeError::Unsupported {
                call: "unload_bundle_ex",
                version: self.api_version,
            });
        }
        self.unload_bundle_inner(bundle, unload_all_objects)
    }

    fn unload_bundle_inner(
        &mut self,
        bundle: ObjectId,
        unload_all_objects: bool,
    ) -> NativeResult<()> {
        let assets: Vec<ObjectId> = self.bundle_parts(bundle)?.1.values().copied().collect();
        if unload_all_objects {
            for asset in assets {
                if self.is_alive(asset) {
                    self.destroy(asset)?;
                }
            }
        }
        self.destroy(bundle)
    }

    /// Deep-copy an asset into the live scene, unparented.
    pub fn instantiate(&mut self, asset: ObjectId) -> NativeResult<ObjectId> {
        let is_prefab = matches!(
            self.get(asset)?.kind,
            ObjectKind::Asset {
                category: ObjectCategory::Prefab
            }
        );
        if !is_prefab {
            return Err(NativeError::WrongClass {
                id: asset,
                expected: "Prefab asset",
            });
        }
        self.clone_tree(asset, None)
    }

    fn clone_tree(&mut self, source: ObjectId, parent: Option<ObjectId>) -> NativeResult<ObjectId> {
        let original = self.get(source)?.clone();
        let mut copy = Object::new(original.name, ObjectKind::Node);
        copy.local = original.local;
        copy.layer = original.layer;
        copy.materials = original.materials;
        let id = self.spawn(copy, parent)?;

        for child in original.children {
            self.clone_tree(child, Some(id))?;
        }
        Ok(id)
    }

    // ========================================================================
    // Audio
    // ========================================================================

    pub fn install_mixer(&mut self) {
        let params = MIXER_PARAMETERS.iter().map(|p| (p.to_string(), 0.0)).collect();
        self.mixer = Some(AudioMixer { params });
    }

    pub fn has_mixer(&self) -> bool {
        self.mixer.is_some()
    }

    pub fn mixer_get_float(&self, parameter: &str) -> NativeResult<f32> {
        let mixer = self.mixer.as_ref().ok_or(NativeError::NoMixer)?;
        mixer
            .params
            .get(parameter)
            .copied()
            .ok_or_else(|| NativeError::UnknownParameter(parameter.to_string()))
    }

    pub fn mixer_set_float(&mut self, parameter: &str, decibels: f32) -> NativeResult<()> {
        let mixer = self.mixer.as_mut().ok_or(NativeError::NoMixer)?;
        let slot = mixer
            .params
            .get_mut(parameter)
            .ok_or_else(|| NativeError::UnknownParameter(parameter.to_string()))?;
        *slot = decibels.clamp(MIXER_MIN_DB, 20.0);
        Ok(())
    }

    pub fn install_music_player(&mut self, track: Option<&str>) {
        self.music = Some(MusicPlayer {
            track: track.map(str::to_string),
        });
    }

    pub fn music_track(&self) -> Option<String> {
        self.music.as_ref().and_then(|m| m.track.clone())
    }

    /// Returns whether anything was playing.
    pub fn music_stop(&mut self) -> NativeResult<bool> {
        let music = self.music.as_mut().ok_or(NativeError::NoMusicPlayer)?;
        Ok(music.track.take().is_some())
    }

    // ========================================================================
    // Engine housekeeping
    // ========================================================================

    /// Destroy every root that isn't persistent, a bundle or an asset.
    pub fn unload_scene(&mut self) -> usize {
        let doomed: Vec<ObjectId> = self
            .live_ids()
            .into_iter()
            .filter(|id| {
                self.get(*id).is_ok_and(|o| {
                    o.parent.is_none() && !o.persistent && !o.kind.survives_scene_unload()
                })
            })
            .collect();

        for id in &doomed {
            let _ = self.destroy(*id);
        }
        tracing::debug!("Retained scene unload destroyed {} roots", doomed.len());
        doomed.len()
    }

    /// Destroy every loaded asset object; bundle containers survive.
    pub fn collect_unused_assets(&mut self) -> usize {
        let doomed: Vec<ObjectId> = self
            .live_ids()
            .into_iter()
            .filter(|id| self.get(*id).is_ok_and(|o| matches!(o.kind, ObjectKind::Asset { .. })))
            .collect();

        for id in &doomed {
            let _ = self.destroy(*id);
        }
        doomed.len()
    }

    fn live_ids(&self) -> Vec<ObjectId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some())
            .map(|(index, slot)| ObjectId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }
}

impl Default for RetainedRuntime {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headgear_common::BundleBuilder;

    fn write_bundle(dir: &Path) -> std::path::PathBuf {
        let bytes = BundleBuilder::new("gear")
            .add_prefab(
                "Headphones",
                PrefabNode::new("Headphones")
                    .with_child(PrefabNode::new("Cup").with_materials(["Leather"])),
            )
            .build()
            .unwrap();
        let path = dir.join("gear.bundle");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_destroy_invalidates_subtree_ids() {
        let mut rt = RetainedRuntime::new(2);
        let root = rt.create_object("root", None).unwrap();
        let child = rt.create_object("child", Some(root)).unwrap();

        rt.destroy(root).unwrap();
        assert!(!rt.is_alive(root));
        assert!(!rt.is_alive(child));

        // Slot reuse must not resurrect the old id
        let fresh = rt.create_object("fresh", None).unwrap();
        assert!(rt.is_alive(fresh));
        assert_eq!(rt.name(child), Err(NativeError::Destroyed(child)));
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let mut rt = RetainedRuntime::default();
        let a = rt.create_object("a", None).unwrap();
        let b = rt.create_object("b", Some(a)).unwrap();
        assert!(matches!(rt.set_parent(a, Some(b)), Err(NativeError::Cycle { .. })));

        let c = rt.create_object("c", None).unwrap();
        rt.set_parent(b, Some(c)).unwrap();
        assert!(rt.children(a).unwrap().is_empty());
        assert_eq!(rt.parent(b).unwrap(), Some(c));
    }

    #[test]
    fn test_player_avatar_and_head() {
        let mut rt = RetainedRuntime::default();
        let player = rt.spawn_local_player(&CharacterBlueprint::humanoid("P")).unwrap();
        assert_eq!(rt.local_player(), Some(player));

        let avatar = rt.player_avatar(player).unwrap().unwrap();
        let head = rt.avatar_head_bone(avatar).unwrap().unwrap();
        assert_eq!(rt.name(head).unwrap(), "Head");
        assert!(matches!(
            rt.avatar_head_bone(player),
            Err(NativeError::WrongClass { .. })
        ));
    }

    #[test]
    fn test_v1_lacks_v2_calls() {
        let mut rt = RetainedRuntime::new(1);
        let obj = rt.create_object("x", None).unwrap();
        assert!(matches!(
            rt.set_persistent(obj, true),
            Err(NativeError::Unsupported { version: 1, .. })
        ));

        let child = rt.create_object("y", Some(obj)).unwrap();
        rt.dont_destroy_on_load(child).unwrap();
        assert!(rt.is_persistent(obj).unwrap());
    }

    #[test]
    fn test_bundle_assets_and_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = RetainedRuntime::new(1);
        let bundle = rt.load_bundle_from_file(&write_bundle(dir.path())).unwrap();

        let asset = rt.load_asset(bundle, "Headphones").unwrap();
        let copy = rt.instantiate(asset).unwrap();
        assert_ne!(copy, asset);

        assert_eq!(rt.collect_unused_assets(), 1);
        assert!(!rt.is_alive(asset));
        assert!(rt.is_alive(copy));
        assert!(rt.is_alive(bundle));

        rt.unload_bundle(bundle).unwrap();
        assert!(!rt.is_alive(bundle));
    }

    #[test]
    fn test_unload_scene() {
        let mut rt = RetainedRuntime::default();
        let keep = rt.spawn_local_player(&CharacterBlueprint::humanoid("Keep")).unwrap();
        let camera = rt.spawn_camera(CameraState::default()).unwrap();

        assert_eq!(rt.unload_scene(), 1);
        assert!(rt.is_alive(keep));
        assert!(!rt.is_alive(camera));
        assert_eq!(rt.main_camera(), None);
    }

    #[test]
    fn test_mixer_parameters() {
        let mut rt = RetainedRuntime::default();
        assert_eq!(rt.mixer_get_float("MusicVolume"), Err(NativeError::NoMixer));

        rt.install_mixer();
        rt.mixer_set_float("MusicVolume", -200.0).unwrap();
        assert_eq!(rt.mixer_get_float("MusicVolume").unwrap(), MIXER_MIN_DB);
        assert!(matches!(
            rt.mixer_set_float("Radio", 0.0),
            Err(NativeError::UnknownParameter(_))
        ));
    }
}
