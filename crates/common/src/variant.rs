//! # Runtime Environment Probe
//!
//! The host engine ships with one of two mutually incompatible scripting
//! runtimes. Which one is loaded is decided once per process and never
//! re-evaluated; every other part of Headgear only sees the adapter that was
//! built for it.
//!
//! Detection order:
//!
//! 1. `HEADGEAR_RUNTIME` explicit override (`ecs`/`a`, `retained`/`b`)
//! 2. Runtime name announced by the mod loader (`HEADGEAR_LOADER_RUNTIME`)
//! 3. Marker files in `<host dir>/runtime/` (`ecs.runtime`, `retained.runtime`)
//!
//! Anything ambiguous falls through to [`RuntimeVariant::Retained`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Explicit override, mostly for development builds.
pub const RUNTIME_ENV_VAR: &str = "HEADGEAR_RUNTIME";
/// Set by the mod loader before our entry point runs.
pub const LOADER_ENV_VAR: &str = "HEADGEAR_LOADER_RUNTIME";
/// Game install directory, when the loader exports it.
pub const HOST_DIR_ENV_VAR: &str = "HEADGEAR_HOST_DIR";

const MARKER_DIR: &str = "runtime";
const ECS_MARKER: &str = "ecs.runtime";
const RETAINED_MARKER: &str = "retained.runtime";

static RESOLVED: OnceLock<RuntimeVariant> = OnceLock::new();

/// Host scripting runtime variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeVariant {
    /// Runtime A: entity-component world.
    Ecs,
    /// Runtime B: retained object tree. Also the fallback on ambiguity.
    Retained,
}

impl Default for RuntimeVariant {
    fn default() -> Self {
        RuntimeVariant::Retained
    }
}

impl RuntimeVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeVariant::Ecs => "ecs",
            RuntimeVariant::Retained => "retained",
        }
    }
}

impl fmt::Display for RuntimeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeVariant {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ecs" | "a" => Ok(RuntimeVariant::Ecs),
            "retained" | "b" => Ok(RuntimeVariant::Retained),
            _ => Err(()),
        }
    }
}

/// Everything the probe looks at. Collected up front so detection itself is
/// a pure function.
#[derive(Debug, Clone, Default)]
pub struct ProbeInputs {
    pub override_name: Option<String>,
    pub loader_runtime: Option<String>,
    pub host_dir: Option<PathBuf>,
}

impl ProbeInputs {
    /// Gather inputs from the process environment.
    pub fn from_env() -> Self {
        let host_dir = std::env::var_os(HOST_DIR_ENV_VAR)
            .map(PathBuf::from)
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
            });

        Self {
            override_name: std::env::var(RUNTIME_ENV_VAR).ok(),
            loader_runtime: std::env::var(LOADER_ENV_VAR).ok(),
            host_dir,
        }
    }
}

/// Classify the environment. Never fails.
pub fn detect(inputs: &ProbeInputs) -> RuntimeVariant {
    if let Some(name) = inputs.override_name.as_deref() {
        match name.parse::<RuntimeVariant>() {
            Ok(variant) => {
                tracing::debug!("Runtime override {}={}", RUNTIME_ENV_VAR, variant);
                return variant;
            }
            Err(()) => {
                tracing::warn!("Ignoring unknown {} value '{}'", RUNTIME_ENV_VAR, name);
            }
        }
    }

    if let Some(name) = inputs.loader_runtime.as_deref() {
        if let Ok(variant) = name.parse::<RuntimeVariant>() {
            tracing::debug!("Loader announced runtime {}", variant);
            return variant;
        }
        tracing::debug!("Loader runtime '{}' not recognised", name);
    }

    if let Some(dir) = inputs.host_dir.as_deref() {
        if let Some(variant) = detect_from_markers(dir) {
            return variant;
        }
    }

    tracing::debug!("Runtime detection ambiguous, defaulting to {}", RuntimeVariant::default());
    RuntimeVariant::default()
}

fn detect_from_markers(host_dir: &Path) -> Option<RuntimeVariant> {
    let markers = host_dir.join(MARKER_DIR);
    let ecs = markers.join(ECS_MARKER).is_file();
    let retained = markers.join(RETAINED_MARKER).is_file();

    match (ecs, retained) {
        (true, false) => Some(RuntimeVariant::Ecs),
        (false, true) => Some(RuntimeVariant::Retained),
        (true, true) => {
            tracing::debug!("Both runtime markers present in {}", markers.display());
            None
        }
        (false, false) => None,
    }
}

/// Resolve the process-wide runtime variant from the environment.
///
/// The first call performs detection; every later call returns the cached
/// value.
pub fn resolve_variant() -> RuntimeVariant {
    resolve_variant_with(ProbeInputs::from_env)
}

/// Like [`resolve_variant`] but with caller-supplied inputs. Inputs are only
/// consulted if nothing has been resolved yet.
pub fn resolve_variant_with(inputs: impl FnOnce() -> ProbeInputs) -> RuntimeVariant {
    *RESOLVED.get_or_init(|| {
        let variant = detect(&inputs());
        tracing::info!("Host runtime resolved: {}", variant);
        variant
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let inputs = ProbeInputs {
            override_name: Some("A".into()),
            loader_runtime: Some("retained".into()),
            host_dir: None,
        };
        assert_eq!(detect(&inputs), RuntimeVariant::Ecs);
    }

    #[test]
    fn test_unknown_override_falls_through_to_loader() {
        let inputs = ProbeInputs {
            override_name: Some("mono".into()),
            loader_runtime: Some("ecs".into()),
            host_dir: None,
        };
        assert_eq!(detect(&inputs), RuntimeVariant::Ecs);
    }

    #[test]
    fn test_nothing_known_defaults_to_retained() {
        assert_eq!(detect(&ProbeInputs::default()), RuntimeVariant::Retained);
    }

    #[test]
    fn test_single_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(MARKER_DIR)).unwrap();
        std::fs::write(dir.path().join(MARKER_DIR).join(ECS_MARKER), b"").unwrap();

        let inputs = ProbeInputs {
            host_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(detect(&inputs), RuntimeVariant::Ecs);
    }

    #[test]
    fn test_both_markers_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let markers = dir.path().join(MARKER_DIR);
        std::fs::create_dir_all(&markers).unwrap();
        std::fs::write(markers.join(ECS_MARKER), b"").unwrap();
        std::fs::write(markers.join(RETAINED_MARKER), b"").unwrap();

        let inputs = ProbeInputs {
            host_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(detect(&inputs), RuntimeVariant::Retained);
    }

    #[test]
    fn test_resolution_is_cached() {
        let first = resolve_variant_with(|| ProbeInputs {
            override_name: Some("ecs".into()),
            ..Default::default()
        });
        let second = resolve_variant_with(|| ProbeInputs {
            override_name: Some("retained".into()),
            ..Default::default()
        });
        assert_eq!(first, second);
    }
}
