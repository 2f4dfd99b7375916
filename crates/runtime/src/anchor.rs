//! # Anchor Resolution
//!
//! Picks the transform the device hangs from. Strategies, best first:
//!
//! 1. The avatar's designated head bone. If the bone has children, a child
//!    whose name contains a marker word (`ear`, `end`, `top`) wins, otherwise
//!    the child sitting highest (largest local y). That refinement is reported
//!    as [`AnchorStrategy::DistinguishedChild`].
//! 2. Depth-first search of the character hierarchy for a known head bone
//!    name, case-insensitive.
//! 3. The character root.
//!
//! Resolution only reads from the backend.

use headgear_common::{AnchorSettings, Backend, CharacterHandle, TransformHandle};
use std::fmt;

use crate::error::AnchorError;

/// How an anchor was found. Declaration order is the confidence ranking
/// reported in [`AnchorResolution`]; the resolver tries a distinguished child
/// of the head bone before a name search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnchorStrategy {
    SkeletalBone,
    NamePatternMatch,
    DistinguishedChild,
    RootFallback,
}

impl AnchorStrategy {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// 3 for a skeletal bone down to 0 for the root fallback.
    pub fn confidence(self) -> u8 {
        AnchorStrategy::RootFallback.ordinal() - self.ordinal()
    }
}

impl fmt::Display for AnchorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnchorStrategy::SkeletalBone => "SkeletalBone",
            AnchorStrategy::NamePatternMatch => "NamePatternMatch",
            AnchorStrategy::DistinguishedChild => "DistinguishedChild",
            AnchorStrategy::RootFallback => "RootFallback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorResolution {
    pub point: TransformHandle,
    pub strategy: AnchorStrategy,
    pub confidence: u8,
}

impl AnchorResolution {
    fn new(point: TransformHandle, strategy: AnchorStrategy) -> Self {
        Self {
            point,
            strategy,
            confidence: strategy.confidence(),
        }
    }
}

pub struct AnchorResolver {
    head_bone_names: Vec<String>,
    marker_words: Vec<String>,
}

impl AnchorResolver {
    pub fn new(settings: &AnchorSettings) -> Self {
        Self {
            head_bone_names: settings.head_bone_names.clone(),
            marker_words: settings
                .marker_words
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
        }
    }

    pub fn find_attachment_point(
        &self,
        backend: &dyn Backend,
        character: Option<CharacterHandle>,
    ) -> Result<AnchorResolution, AnchorError> {
        let character = character.ok_or(AnchorError::NoCharacter)?;
        if !backend.is_live(character.key()) {
            return Err(AnchorError::CharacterGone);
        }

        if let Some(bone) = backend
            .avatar(character)
            .and_then(|avatar| backend.head_bone(avatar))
        {
            let resolution = self.refine(backend, bone);
            tracing::debug!("Anchor via {}", resolution.strategy);
            return Ok(resolution);
        }

        let Some(root) = backend.character_root(character) else {
            tracing::error!("Character has no root transform to anchor to");
            return Err(AnchorError::NoAnchor);
        };

        if let Some(found) = self.search_by_name(backend, root) {
            tracing::info!("No avatar head bone; anchored by name match");
            return Ok(AnchorResolution::new(found, AnchorStrategy::NamePatternMatch));
        }

        tracing::warn!("No head bone found; anchoring to character root");
        Ok(AnchorResolution::new(root, AnchorStrategy::RootFallback))
    }

    /// Prefer a marked or topmost child of the head bone.
    fn refine(&self, backend: &dyn Backend, bone: TransformHandle) -> AnchorResolution {
        let children = backend.children(bone);
        if children.is_empty() {
            return AnchorResolution::new(bone, AnchorStrategy::SkeletalBone);
        }

        let marked = children.iter().copied().find(|child| {
            backend.node_name(*child).is_some_and(|name| {
                let name = name.to_lowercase();
                self.marker_words.iter().any(|word| name.contains(word.as_str()))
            })
        });
        if let Some(child) = marked {
            return AnchorResolution::new(child, AnchorStrategy::DistinguishedChild);
        }

        let highest = children
            .iter()
            .filter_map(|child| backend.local_position(*child).map(|p| (*child, p.y)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match highest {
            Some((child, _)) => AnchorResolution::new(child, AnchorStrategy::DistinguishedChild),
            None => AnchorResolution::new(bone, AnchorStrategy::SkeletalBone),
        }
    }

    fn search_by_name(
        &self,
        backend: &dyn Backend,
        root: TransformHandle,
    ) -> Option<TransformHandle> {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let Some(name) = backend.node_name(node) {
                if self
                    .head_bone_names
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(&name))
                {
                    return Some(node);
                }
            }
            // Reverse so the first child is visited first
            stack.extend(backend.children(node).into_iter().rev());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{select_backend, HostBindings};
    use bevy::prelude::World;
    use headgear_common::{PrefabNode, RuntimeVariant};
    use headgear_host::{ecs, retained, CharacterBlueprint};

    fn retained_with(blueprint: CharacterBlueprint) -> Box<dyn Backend> {
        let mut rt = retained::RetainedRuntime::new(2);
        rt.spawn_local_player(&blueprint).unwrap();
        select_backend(RuntimeVariant::Retained, HostBindings::retained(retained::share(rt)))
    }

    fn ecs_with(blueprint: CharacterBlueprint) -> Box<dyn Backend> {
        let mut world = World::new();
        ecs::spawn_local_character(&mut world, &blueprint);
        select_backend(RuntimeVariant::Ecs, HostBindings::ecs(ecs::share(world)))
    }

    fn resolve(backend: &dyn Backend) -> AnchorResolution {
        AnchorResolver::new(&AnchorSettings::default())
            .find_attachment_point(backend, backend.local_character())
            .unwrap()
    }

    #[test]
    fn test_confidence_follows_ordinal() {
        assert_eq!(AnchorStrategy::SkeletalBone.confidence(), 3);
        assert_eq!(AnchorStrategy::NamePatternMatch.confidence(), 2);
        assert_eq!(AnchorStrategy::DistinguishedChild.confidence(), 1);
        assert_eq!(AnchorStrategy::RootFallback.confidence(), 0);
    }

    #[test]
    fn test_head_bone_on_both_backends() {
        for backend in [
            retained_with(CharacterBlueprint::humanoid("P")),
            ecs_with(CharacterBlueprint::humanoid("P")),
        ] {
            let anchor = resolve(backend.as_ref());
            assert_eq!(anchor.strategy, AnchorStrategy::SkeletalBone);
            assert_eq!(anchor.confidence, 3);
            assert_eq!(backend.node_name(anchor.point).as_deref(), Some("Head"));
        }
    }

    #[test]
    fn test_marker_child_beats_higher_child() {
        let skeleton = PrefabNode::new("Hips").with_child(
            PrefabNode::new("Head")
                .with_child(PrefabNode::new("Crown").with_translation([0.0, 0.3, 0.0]))
                .with_child(PrefabNode::new("LeftEar").with_translation([0.0, 0.1, 0.0])),
        );
        let backend = retained_with(CharacterBlueprint::humanoid("P").with_skeleton(skeleton));

        let anchor = resolve(backend.as_ref());
        assert_eq!(anchor.strategy, AnchorStrategy::DistinguishedChild);
        assert_eq!(backend.node_name(anchor.point).as_deref(), Some("LeftEar"));
    }

    #[test]
    fn test_highest_child_without_marker() {
        let skeleton = PrefabNode::new("Hips").with_child(
            PrefabNode::new("Head")
                .with_child(PrefabNode::new("Jaw").with_translation([0.0, -0.1, 0.0]))
                .with_child(PrefabNode::new("Crown").with_translation([0.0, 0.2, 0.0])),
        );
        let backend = ecs_with(CharacterBlueprint::humanoid("P").with_skeleton(skeleton));

        let anchor = resolve(backend.as_ref());
        assert_eq!(anchor.strategy, AnchorStrategy::DistinguishedChild);
        assert_eq!(backend.node_name(anchor.point).as_deref(), Some("Crown"));
    }

    #[test]
    fn test_name_search_without_avatar() {
        let skeleton = PrefabNode::new("Root")
            .with_child(PrefabNode::new("Spine").with_child(PrefabNode::new("HEAD_M")));
        let blueprint = CharacterBlueprint::humanoid("P")
            .with_skeleton(skeleton)
            .without_avatar();

        for backend in [retained_with(blueprint.clone()), ecs_with(blueprint)] {
            let anchor = resolve(backend.as_ref());
            assert_eq!(anchor.strategy, AnchorStrategy::NamePatternMatch);
            assert_eq!(backend.node_name(anchor.point).as_deref(), Some("HEAD_M"));
        }
    }

    #[test]
    fn test_avatar_without_head_bone_falls_back_to_root() {
        let skeleton = PrefabNode::new("Root").with_child(PrefabNode::new("Torso"));
        let blueprint = CharacterBlueprint::humanoid("P")
            .with_skeleton(skeleton)
            .with_head_bone(None);
        let backend = retained_with(blueprint);

        let anchor = resolve(backend.as_ref());
        assert_eq!(anchor.strategy, AnchorStrategy::RootFallback);
        assert_eq!(anchor.confidence, 0);
        assert_eq!(backend.node_name(anchor.point).as_deref(), Some("P"));
    }

    #[test]
    fn test_missing_character_is_error() {
        let backend = retained_with(CharacterBlueprint::humanoid("P"));
        let resolver = AnchorResolver::new(&AnchorSettings::default());
        assert_eq!(
            resolver.find_attachment_point(backend.as_ref(), None),
            Err(AnchorError::NoCharacter)
        );
    }
}
