//! Discovered module artifacts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::Descriptor;

/// Version token used when no version can be derived for an artifact.
pub const UNKNOWN_VERSION: &str = "unknown";

/// The on-disk shape of a module artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// An exploded directory of classes and resources.
    Dir,
    /// A plain jar file.
    Jar,
    /// A packaged-module (`.jmod`) file with sectioned contents.
    Packaged,
}

impl ArtifactKind {
    /// Internal path of the compiled descriptor entry for this kind.
    pub fn descriptor_entry(self) -> &'static str {
        match self {
            ArtifactKind::Packaged => "classes/module-info.class",
            ArtifactKind::Dir | ArtifactKind::Jar => "module-info.class",
        }
    }
}

/// A discovered module artifact plus its parsed metadata.
///
/// Created by the scanner; the descriptor is swapped exactly once at the end
/// of the rewrite pass, and the overlay map collects replacement entry bytes
/// that shadow same-named originals at emit time.
#[derive(Debug, Clone)]
pub struct ModuleRef {
    /// Module name, unique within a graph.
    pub name: String,
    /// Version token, or [`UNKNOWN_VERSION`].
    pub version: String,
    /// Filesystem location of the artifact.
    pub location: PathBuf,
    /// On-disk shape of the artifact.
    pub kind: ArtifactKind,
    /// Whether the descriptor was synthesized rather than declared.
    pub automatic: bool,
    /// Parsed module metadata.
    pub descriptor: Descriptor,
    /// The original compiled descriptor bytes, when one was present.
    pub origin_descriptor: Option<Vec<u8>>,
    /// `Main-Class` manifest attribute, for jars that carry one.
    pub main_class: Option<String>,
    /// Whether the artifact is a multi-release jar.
    pub multi_release: bool,
    /// Replacement entries emitted instead of (or in addition to) originals,
    /// keyed by internal entry name.
    pub overlay: BTreeMap<String, Vec<u8>>,
}

impl ModuleRef {
    /// A ref for a freshly parsed artifact with no overlay entries.
    pub fn new(
        descriptor: Descriptor,
        version: impl Into<String>,
        location: PathBuf,
        kind: ArtifactKind,
        automatic: bool,
    ) -> Self {
        ModuleRef {
            name: descriptor.name.clone(),
            version: version.into(),
            location,
            kind,
            automatic,
            descriptor,
            origin_descriptor: None,
            main_class: None,
            multi_release: false,
            overlay: BTreeMap::new(),
        }
    }

    /// File name of the artifact, lossily converted.
    pub fn file_name(&self) -> String {
        self.location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
