//! # Embedded Payload
//!
//! The device bundle ships inside the binary. Resource names follow the
//! `<namespace>.<file>` convention, and the namespace differs between build
//! setups, so lookups try several spellings of the configured name.

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name the built-in bundle is registered under.
pub const EMBEDDED_BUNDLE_NAME: &str = "Headgear.Assets.headphones.bundle";

static EMBEDDED_RESOURCES: &[(&str, &[u8])] = &[(
    EMBEDDED_BUNDLE_NAME,
    include_bytes!("../../assets/headphones.bundle.ron"),
)];

/// Named binary resources, sorted by name for binary search.
#[derive(Debug, Clone)]
pub struct ResourceTable {
    entries: Vec<(Cow<'static, str>, Cow<'static, [u8]>)>,
}

impl ResourceTable {
    /// Resources compiled into this binary.
    pub fn embedded() -> Self {
        Self::from_entries(
            EMBEDDED_RESOURCES
                .iter()
                .map(|(name, bytes)| (Cow::Borrowed(*name), Cow::Borrowed(*bytes))),
        )
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from arbitrary entries. Later duplicates replace earlier ones.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Cow<'static, str>, Cow<'static, [u8]>)>,
    {
        let mut table = Self::empty();
        for (name, bytes) in entries {
            table.insert(name, bytes);
        }
        table
    }

    pub fn insert(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        bytes: impl Into<Cow<'static, [u8]>>,
    ) {
        let name = name.into();
        let bytes = bytes.into();
        match self.position(&name) {
            Ok(index) => self.entries[index].1 = bytes,
            Err(index) => self.entries.insert(index, (name, bytes)),
        }
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|(entry, _)| entry.as_ref().cmp(name))
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.position(name)
            .ok()
            .map(|index| self.entries[index].1.as_ref())
    }

    /// First hit among `candidates`, in order.
    pub fn find_first<'a>(&'a self, candidates: &'a [String]) -> Option<(&'a str, &'a [u8])> {
        candidates
            .iter()
            .find_map(|name| self.get(name).map(|bytes| (name.as_str(), bytes)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::embedded()
    }
}

/// Write `bytes` to a uniquely named file in `dir`.
pub fn extract_to_temp(dir: &Path, resource_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let stem: String = resource_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    let path = dir.join(format!("headgear-{}-{}", Uuid::new_v4().simple(), stem));

    let mut file = std::fs::File::create(&path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(path)
}
