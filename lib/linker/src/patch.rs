//! Per-module patch overlays.
//!
//! A patches directory holds jars named `<moduleName>-patch.jar`. Every
//! entry of a patch jar replaces the same-named entry of its module at
//! emit time. Files that do not follow the naming convention are rejected.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use modlink_types::{LinkError, LinkResult};

use crate::artifact::Artifact;

const PATCH_SUFFIX: &str = "-patch.jar";

/// Patch entries indexed by module name, then pool name.
#[derive(Debug, Default)]
pub struct PatchOverlay {
    patches: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl PatchOverlay {
    /// An overlay with no patches.
    pub fn empty() -> Self {
        PatchOverlay::default()
    }

    /// Load every patch jar from a directory.
    pub fn load(dir: &Path) -> LinkResult<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|source| LinkError::Scan {
                dir: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut overlay = PatchOverlay::default();
        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let Some(module) = file_name.strip_suffix(PATCH_SUFFIX) else {
                return Err(LinkError::UnsupportedPatchFormat { path });
            };
            if module.is_empty() {
                return Err(LinkError::UnsupportedPatchFormat { path });
            }

            let artifact = Artifact::open(&path)?;
            let mut entries = BTreeMap::new();
            for entry in artifact.entries().map_err(|e| LinkError::PatchFormat {
                path: path.clone(),
                message: e.to_string(),
            })? {
                let bytes = artifact.read(&entry.name).map_err(|e| LinkError::PatchFormat {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                entries.insert(entry.pool_name, bytes);
            }
            debug!(module, patch = %file_name, entries = entries.len(), "loaded patch jar");
            if overlay.patches.insert(module.to_owned(), entries).is_some() {
                warn!(module, "multiple patch jars for one module; keeping the last");
            }
        }
        Ok(overlay)
    }

    /// The replacement bytes for an entry, if this module is patched.
    pub fn entry(&self, module: &str, pool_name: &str) -> Option<&[u8]> {
        self.patches
            .get(module)
            .and_then(|entries| entries.get(pool_name))
            .map(Vec::as_slice)
    }

    /// Whether any patch targets the module.
    pub fn has_module(&self, module: &str) -> bool {
        self.patches.contains_key(module)
    }
}
