//! # First-Person Visibility
//!
//! The player must not see the device from inside their own head. The
//! machine polls the camera at a fixed interval and moves the instance
//! between the visible and hidden render layers when first-person status
//! flips. A poll that sees the same camera tuple as last time does nothing.

use headgear_common::{Backend, CameraSnapshot, DeviceHandle, VisibilitySettings};
use std::time::Duration;

pub struct VisibilityMachine {
    settings: VisibilitySettings,
    last_poll: Option<Duration>,
    last_snapshot: Option<CameraSnapshot>,
    first_person: Option<bool>,
    reassignments: u64,
}

impl VisibilityMachine {
    pub fn new(settings: VisibilitySettings) -> Self {
        Self {
            settings,
            last_poll: None,
            last_snapshot: None,
            first_person: None,
            reassignments: 0,
        }
    }

    pub fn settings(&self) -> &VisibilitySettings {
        &self.settings
    }

    /// Number of layer reassignment calls issued so far.
    pub fn reassignments(&self) -> u64 {
        self.reassignments
    }

    pub fn is_first_person(&self) -> Option<bool> {
        self.first_person
    }

    pub fn last_snapshot(&self) -> Option<CameraSnapshot> {
        self.last_snapshot
    }

    fn layer_for(&self, first_person: bool) -> u8 {
        if first_person {
            self.settings.hidden_layer
        } else {
            self.settings.visible_layer
        }
    }

    fn read_camera(backend: &dyn Backend) -> Option<CameraSnapshot> {
        let camera = backend.player_camera()?;
        backend.camera_snapshot(camera)
    }

    /// Poll if the interval has elapsed. Returns whether a layer call was
    /// made.
    pub fn tick(
        &mut self,
        backend: &mut dyn Backend,
        device: Option<DeviceHandle>,
        now: Duration,
    ) -> bool {
        if let Some(last) = self.last_poll {
            if now.saturating_sub(last) < self.settings.poll_interval() {
                return false;
            }
        }
        self.last_poll = Some(now);

        let Some(snapshot) = Self::read_camera(backend) else {
            return false;
        };
        if self.last_snapshot == Some(snapshot) {
            return false;
        }
        self.last_snapshot = Some(snapshot);

        let first_person = snapshot.is_first_person();
        if self.first_person == Some(first_person) {
            return false;
        }
        tracing::debug!("Camera changed: {}", snapshot);
        self.first_person = Some(first_person);

        match device {
            Some(device) => self.assign(backend, device, first_person),
            None => false,
        }
    }

    /// Apply the layer for the current camera right now, regardless of the
    /// poll interval or previous state.
    pub fn force_update(
        &mut self,
        backend: &mut dyn Backend,
        device: Option<DeviceHandle>,
    ) -> bool {
        let first_person = match Self::read_camera(backend) {
            Some(snapshot) => {
                self.last_snapshot = Some(snapshot);
                snapshot.is_first_person()
            }
            // No camera yet: keep what we knew, else show the device
            None => self.first_person.unwrap_or(false),
        };
        self.first_person = Some(first_person);

        match device {
            Some(device) => self.assign(backend, device, first_person),
            None => false,
        }
    }

    fn assign(
        &mut self,
        backend: &mut dyn Backend,
        device: DeviceHandle,
        first_person: bool,
    ) -> bool {
        let layer = self.layer_for(first_person);
        self.reassignments += 1;
        let ok = backend.set_render_layer_recursive(device.as_transform(), layer);
        if ok {
            tracing::debug!(
                "Device moved to layer {} ({})",
                layer,
                if first_person { "hidden" } else { "visible" }
            );
        }
        ok
    }

    /// One-line camera/visibility summary for debug overlays.
    pub fn debug_info(&self, backend: &dyn Backend, device: Option<DeviceHandle>) -> String {
        let camera = match Self::read_camera(backend) {
            Some(snapshot) => snapshot.to_string(),
            None => "no camera".to_string(),
        };
        let layer = device
            .and_then(|d| backend.render_layer(d.as_transform()))
            .map_or_else(|| "-".to_string(), |l| l.to_string());
        format!(
            "camera: {} | device layer: {} | reassignments: {}",
            camera, layer, self.reassignments
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{select_backend, HostBindings};
    use headgear_common::{PrefabNode, RuntimeVariant};
    use headgear_host::retained::{
        self, CameraState, ObjectId, RetainedRuntime, SharedRuntime, CAMERA_MODE_DEFAULT,
        CAMERA_MODE_VEHICLE,
    };
    use headgear_host::CharacterBlueprint;

    const MS: Duration = Duration::from_millis(1);

    struct Rig {
        rt: SharedRuntime,
        camera: ObjectId,
        backend: Box<dyn Backend>,
        device: DeviceHandle,
    }

    impl Rig {
        fn new() -> Self {
            let mut rt = RetainedRuntime::new(2);
            let skeleton = PrefabNode::new("Headphones").with_child(PrefabNode::new("Cup"));
            rt.spawn_local_player(&CharacterBlueprint::humanoid("P").with_skeleton(skeleton))
                .unwrap();
            let camera = rt.spawn_camera(CameraState::default()).unwrap();
            let rt = retained::share(rt);
            let bindings = HostBindings::retained(rt.clone());
            let backend = select_backend(RuntimeVariant::Retained, bindings);
            // Stand-in device: the skeleton root under the player
            let character = backend.local_character().unwrap();
            let root = backend.character_root(character).unwrap();
            let device = backend.children(root)[0].cast();
            Self {
                rt,
                camera,
                backend,
                device,
            }
        }

        fn set_camera(&self, mode: i32, free_cam: bool, viewing_avatar: bool) {
            self.rt
                .lock()
                .set_camera_state(
                    self.camera,
                    CameraState {
                        mode,
                        free_cam,
                        viewing_avatar,
                    },
                )
                .unwrap();
        }

        fn layer(&self) -> Option<u8> {
            self.backend.render_layer(self.device.as_transform())
        }
    }

    #[test]
    fn test_hidden_in_first_person() {
        let mut rig = Rig::new();
        let mut machine = VisibilityMachine::new(VisibilitySettings::default());

        assert!(machine.tick(rig.backend.as_mut(), Some(rig.device), Duration::ZERO));
        assert_eq!(rig.layer(), Some(30));
        let cup = rig.backend.children(rig.device.as_transform())[0];
        assert_eq!(rig.backend.render_layer(cup), Some(30));
    }

    #[test]
    fn test_flip_to_vehicle_and_back() {
        let mut rig = Rig::new();
        let mut machine = VisibilityMachine::new(VisibilitySettings::default());
        machine.tick(rig.backend.as_mut(), Some(rig.device), Duration::ZERO);

        rig.set_camera(CAMERA_MODE_VEHICLE, false, false);
        assert!(machine.tick(rig.backend.as_mut(), Some(rig.device), 100 * MS));
        assert_eq!(rig.layer(), Some(0));

        rig.set_camera(CAMERA_MODE_DEFAULT, false, false);
        assert!(machine.tick(rig.backend.as_mut(), Some(rig.device), 200 * MS));
        assert_eq!(rig.layer(), Some(30));
        assert_eq!(machine.reassignments(), 3);
    }

    #[test]
    fn test_polls_are_rate_limited() {
        let mut rig = Rig::new();
        let mut machine = VisibilityMachine::new(VisibilitySettings::default());
        machine.tick(rig.backend.as_mut(), Some(rig.device), Duration::ZERO);

        rig.set_camera(CAMERA_MODE_VEHICLE, false, false);
        assert!(!machine.tick(rig.backend.as_mut(), Some(rig.device), 50 * MS));
        assert_eq!(rig.layer(), Some(30));
        assert!(machine.tick(rig.backend.as_mut(), Some(rig.device), 150 * MS));
    }

    #[test]
    fn test_same_classification_no_call() {
        let mut rig = Rig::new();
        let mut machine = VisibilityMachine::new(VisibilitySettings::default());

        rig.set_camera(CAMERA_MODE_VEHICLE, false, false);
        machine.tick(rig.backend.as_mut(), Some(rig.device), Duration::ZERO);
        assert_eq!(machine.reassignments(), 1);

        // Tuple changes, first-person status doesn't
        rig.set_camera(CAMERA_MODE_DEFAULT, true, false);
        assert!(!machine.tick(rig.backend.as_mut(), Some(rig.device), 100 * MS));
        rig.set_camera(CAMERA_MODE_DEFAULT, false, true);
        assert!(!machine.tick(rig.backend.as_mut(), Some(rig.device), 200 * MS));
        assert!(!machine.tick(rig.backend.as_mut(), Some(rig.device), 300 * MS));
        assert_eq!(machine.reassignments(), 1);
    }

    #[test]
    fn test_force_update_ignores_interval() {
        let mut rig = Rig::new();
        let mut machine = VisibilityMachine::new(VisibilitySettings::default());
        machine.tick(rig.backend.as_mut(), Some(rig.device), Duration::ZERO);

        rig.set_camera(CAMERA_MODE_VEHICLE, false, false);
        assert!(machine.force_update(rig.backend.as_mut(), Some(rig.device)));
        assert_eq!(rig.layer(), Some(0));
        assert_eq!(machine.is_first_person(), Some(false));
    }

    #[test]
    fn test_debug_info_mentions_camera() {
        let rig = Rig::new();
        let machine = VisibilityMachine::new(VisibilitySettings::default());
        let info = machine.debug_info(rig.backend.as_ref(), Some(rig.device));
        assert!(info.contains("mode=Default"));
        assert!(info.contains("first_person=true"));
    }
}
