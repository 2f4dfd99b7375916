//! # Camera Mode Model
//!
//! Backend-neutral view of the player camera. Both runtimes expose the same
//! information in different shapes; adapters translate into [`CameraSnapshot`].

use std::fmt;

/// What the player camera is currently doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CameraMode {
    /// Normal on-foot camera (first person in this game)
    #[default]
    Default,
    Vehicle,
    Skateboard,
    FreeCam,
    ViewingAvatar,
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraMode::Default => "Default",
            CameraMode::Vehicle => "Vehicle",
            CameraMode::Skateboard => "Skateboard",
            CameraMode::FreeCam => "FreeCam",
            CameraMode::ViewingAvatar => "ViewingAvatar",
        };
        f.write_str(name)
    }
}

/// The full tuple the visibility machine compares between polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CameraSnapshot {
    pub mode: CameraMode,
    pub free_cam: bool,
    pub viewing_avatar: bool,
}

impl CameraSnapshot {
    pub fn new(mode: CameraMode, free_cam: bool, viewing_avatar: bool) -> Self {
        Self {
            mode,
            free_cam,
            viewing_avatar,
        }
    }

    /// Head-mounted devices must be hidden from the player's own view.
    pub fn is_first_person(&self) -> bool {
        self.mode == CameraMode::Default && !self.free_cam && !self.viewing_avatar
    }
}

impl fmt::Display for CameraSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode={} free_cam={} viewing_avatar={} first_person={}",
            self.mode,
            self.free_cam,
            self.viewing_avatar,
            self.is_first_person()
        )
    }
}
