//! # Runtime A: ECS World
//!
//! Everything is an entity in a Bevy [`World`]:
//!
//! - Characters: `Name` + `Transform` + [`PlayerCharacter`], the local one
//!   tagged [`LocalPlayer`]. The skeleton hangs below via `ChildOf`.
//! - Avatar: child entity carrying [`AvatarRig`] with the head bone entity.
//! - Camera: entity with [`PlayerCamera`].
//! - Bundles: entity with [`LoadedBundle`]; assets are materialised on demand
//!   as [`Prefab`] entities, which [`collect_unused_assets`] may despawn at any
//!   time.
//! - Audio: [`MixerChannels`] and [`MusicPlayer`] resources.

use bevy::camera::visibility::RenderLayers;
use bevy::prelude::*;
use headgear_common::{BundleFile, BundleFormatError, ObjectCategory, PrefabNode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::CharacterBlueprint;

/// World shared between the game and the adapter.
pub type SharedWorld = Arc<Mutex<World>>;

pub fn share(world: World) -> SharedWorld {
    Arc::new(Mutex::new(world))
}

#[derive(Error, Debug)]
pub enum EcsError {
    #[error("Entity {0:?} does not exist")]
    NoSuchEntity(Entity),

    #[error("Entity {0:?} is not a loaded bundle")]
    NotABundle(Entity),

    #[error("Entity {0:?} is not a prefab")]
    NotAPrefab(Entity),

    #[error("Asset '{name}' not found in bundle '{bundle}'")]
    AssetNotFound { bundle: String, name: String },

    #[error("Bundle read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] BundleFormatError),
}

// ============================================================================
// Components & Resources
// ============================================================================

#[derive(Component, Debug, Clone)]
pub struct PlayerCharacter {
    pub display_name: String,
}

/// The character this client controls.
#[derive(Component, Debug, Default)]
pub struct LocalPlayer;

#[derive(Component, Debug, Clone, Default)]
pub struct AvatarRig {
    pub head_bone: Option<Entity>,
}

/// Native camera view kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewKind {
    #[default]
    OnFoot,
    Driving,
    Boarding,
    Freecam,
    AvatarPreview,
}

#[derive(Component, Debug, Clone, Default)]
pub struct PlayerCamera {
    pub view: ViewKind,
    pub freecam: bool,
    pub avatar_preview: bool,
}

/// Renderer material slots.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct MaterialSlots(pub Vec<String>);

/// Root entities with this marker survive [`unload_scene`].
#[derive(Component, Debug, Default)]
pub struct PersistAcrossScenes;

#[derive(Component, Debug)]
pub struct LoadedBundle {
    pub file: BundleFile,
    pub source: PathBuf,
    /// Asset name -> materialised prefab entity (may be stale)
    pub loaded: HashMap<String, Entity>,
}

/// Asset object materialised from a bundle.
#[derive(Component, Debug, Clone, Copy)]
pub struct Prefab {
    pub bundle: Entity,
    pub category: ObjectCategory,
}

/// Linear channel volumes keyed by the game's channel names.
#[derive(Resource, Debug, Clone)]
pub struct MixerChannels {
    volumes: HashMap<String, f32>,
}

impl Default for MixerChannels {
    fn default() -> Self {
        let volumes = ["master", "music", "sfx", "ambience", "interface"]
            .iter()
            .map(|name| (name.to_string(), 1.0))
            .collect();
        Self { volumes }
    }
}

impl MixerChannels {
    pub fn volume(&self, channel: &str) -> Option<f32> {
        self.volumes.get(channel).copied()
    }

    /// Only existing channels can be set.
    pub fn set_volume(&mut self, channel: &str, volume: f32) -> bool {
        match self.volumes.get_mut(channel) {
            Some(slot) => {
                *slot = volume.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct MusicPlayer {
    pub now_playing: Option<String>,
}

impl MusicPlayer {
    /// Returns whether anything was playing.
    pub fn stop(&mut self) -> bool {
        self.now_playing.take().is_some()
    }
}

// ============================================================================
// Scene Building
// ============================================================================

/// Spawn a node tree; returns the root entity.
pub fn spawn_tree(world: &mut World, node: &PrefabNode, parent: Option<Entity>) -> Entity {
    let mut entity = world.spawn((Name::new(node.name.clone()), node.transform()));
    if !node.materials.is_empty() {
        entity.insert(MaterialSlots(node.materials.clone()));
    }
    if let Some(parent) = parent {
        entity.insert(ChildOf(parent));
    }
    let id = entity.id();

    for child in &node.children {
        spawn_tree(world, child, Some(id));
    }
    id
}

/// Direct children of an entity, in order.
pub fn children_of(world: &World, entity: Entity) -> Vec<Entity> {
    world
        .get::<Children>(entity)
        .map(|children| children.to_vec())
        .unwrap_or_default()
}

/// Depth-first search below `root` (inclusive) for an exact name.
pub fn find_by_name(world: &World, root: Entity, name: &str) -> Option<Entity> {
    if world.get::<Name>(root).is_some_and(|n| n.as_str() == name) {
        return Some(root);
    }
    children_of(world, root)
        .into_iter()
        .find_map(|child| find_by_name(world, child, name))
}

/// Spawn the local player's character.
pub fn spawn_local_character(world: &mut World, blueprint: &CharacterBlueprint) -> Entity {
    let root = world
        .spawn((
            Name::new(blueprint.name.clone()),
            Transform::default(),
            PlayerCharacter {
                display_name: blueprint.name.clone(),
            },
            LocalPlayer,
        ))
        .id();
    if blueprint.persistent {
        world.entity_mut(root).insert(PersistAcrossScenes);
    }

    let skeleton = spawn_tree(world, &blueprint.skeleton, Some(root));

    if blueprint.has_avatar {
        let head_bone = blueprint
            .head_bone
            .as_deref()
            .and_then(|name| find_by_name(world, skeleton, name));
        world.spawn((
            Name::new("Avatar"),
            Transform::default(),
            AvatarRig { head_bone },
            ChildOf(root),
        ));
    }

    root
}

pub fn spawn_camera(world: &mut World, camera: PlayerCamera) -> Entity {
    world.spawn((Name::new("PlayerCamera"), Transform::default(), camera)).id()
}

// ============================================================================
// Bundles
// ============================================================================

/// Read and decode a bundle file into a bundle entity.
pub fn load_bundle_file(world: &mut World, path: &Path) -> Result<Entity, EcsError> {
    let bytes = std::fs::read(path)?;
    let file = BundleFile::decode(&bytes)?;
    let name = Name::new(format!("Bundle:{}", file.name));

    Ok(world
        .spawn((
            name,
            LoadedBundle {
                file,
                source: path.to_path_buf(),
                loaded: HashMap::new(),
            },
        ))
        .id())
}

/// Materialise (or return the live copy of) a named asset.
pub fn load_asset(world: &mut World, bundle: Entity, name: &str) -> Result<Entity, EcsError> {
    let (object, existing) = {
        let loaded = world
            .get::<LoadedBundle>(bundle)
            .ok_or(EcsError::NotABundle(bundle))?;
        let object = loaded
            .file
            .object(name)
            .cloned()
            .ok_or_else(|| EcsError::AssetNotFound {
                bundle: loaded.file.name.clone(),
                name: name.to_string(),
            })?;
        (object, loaded.loaded.get(name).copied())
    };

    if let Some(entity) = existing {
        if world.get_entity(entity).is_ok() {
            return Ok(entity);
        }
    }

    let entity = match &object.root {
        Some(root) => spawn_tree(world, root, None),
        None => world
            .spawn((Name::new(object.name.clone()), Transform::default()))
            .id(),
    };
    world.entity_mut(entity).insert(Prefab {
        bundle,
        category: object.category,
    });

    if let Some(mut loaded) = world.get_mut::<LoadedBundle>(bundle) {
        loaded.loaded.insert(name.to_string(), entity);
    }
    Ok(entity)
}

pub fn asset_names(world: &World, bundle: Entity) -> Result<Vec<String>, EcsError> {
    world
        .get::<LoadedBundle>(bundle)
        .map(|loaded| loaded.file.names())
        .ok_or(EcsError::NotABundle(bundle))
}

pub fn load_all_assets(
    world: &mut World,
    bundle: Entity,
    category: ObjectCategory,
) -> Result<Vec<Entity>, EcsError> {
    let names: Vec<String> = world
        .get::<LoadedBundle>(bundle)
        .ok_or(EcsError::NotABundle(bundle))?
        .file
        .objects_of(category)
        .map(|o| o.name.clone())
        .collect();

    names
        .iter()
        .map(|name| load_asset(world, bundle, name))
        .collect()
}

pub fn unload_bundle(
    world: &mut World,
    bundle: Entity,
    unload_objects: bool,
) -> Result<(), EcsError> {
    let entity = bundle_entity(world, bundle)?;
    let loaded = world
        .entity_mut(entity)
        .take::<LoadedBundle>()
        .ok_or(EcsError::NotABundle(bundle))?;

    if unload_objects {
        for entity in loaded.loaded.values() {
            if world.get_entity(*entity).is_ok() {
                world.despawn(*entity);
            }
        }
    }
    world.despawn(bundle);
    Ok(())
}

fn bundle_entity(world: &World, bundle: Entity) -> Result<Entity, EcsError> {
    match world.get_entity(bundle) {
        Ok(_) if world.get::<LoadedBundle>(bundle).is_some() => Ok(bundle),
        Ok(_) => Err(EcsError::NotABundle(bundle)),
        Err(_) => Err(EcsError::NoSuchEntity(bundle)),
    }
}

/// Deep-copy a prefab into the live scene, unparented.
pub fn instantiate(world: &mut World, prefab: Entity) -> Result<Entity, EcsError> {
    if world.get_entity(prefab).is_err() {
        return Err(EcsError::NoSuchEntity(prefab));
    }
    if world.get::<Prefab>(prefab).is_none() {
        return Err(EcsError::NotAPrefab(prefab));
    }
    Ok(clone_tree(world, prefab, None))
}

fn clone_tree(world: &mut World, source: Entity, parent: Option<Entity>) -> Entity {
    let name = world
        .get::<Name>(source)
        .cloned()
        .unwrap_or_else(|| Name::new("Node"));
    let transform = world.get::<Transform>(source).copied().unwrap_or_default();
    let materials = world.get::<MaterialSlots>(source).cloned();
    let layers = world.get::<RenderLayers>(source).cloned();
    let children = children_of(world, source);

    let mut entity = world.spawn((name, transform));
    if let Some(materials) = materials {
        entity.insert(materials);
    }
    if let Some(layers) = layers {
        entity.insert(layers);
    }
    if let Some(parent) = parent {
        entity.insert(ChildOf(parent));
    }
    let id = entity.id();

    for child in children {
        clone_tree(world, child, Some(id));
    }
    id
}

// ============================================================================
// Engine Housekeeping
// ============================================================================

/// Despawn every scene root not marked persistent. Bundles and assets stay.
pub fn unload_scene(world: &mut World) -> usize {
    let mut roots = world.query_filtered::<Entity, (
        Without<ChildOf>,
        Without<PersistAcrossScenes>,
        Without<LoadedBundle>,
        Without<Prefab>,
    )>();
    let doomed: Vec<Entity> = roots.iter(world).collect();

    for entity in &doomed {
        world.despawn(*entity);
    }
    tracing::debug!("Scene unload despawned {} roots", doomed.len());
    doomed.len()
}

/// Despawn every materialised asset object, as the engine's unused-asset
/// sweep does. Bundle containers survive.
pub fn collect_unused_assets(world: &mut World) -> usize {
    let mut prefabs = world.query_filtered::<Entity, With<Prefab>>();
    let doomed: Vec<Entity> = prefabs.iter(world).collect();

    for entity in &doomed {
        if world.get_entity(*entity).is_ok() {
            world.despawn(*entity);
        }
    }
    doomed.len()
}
