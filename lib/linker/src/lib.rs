//! The modlink linker core.
//!
//! Given an application artifact, its dependency artifacts, and a platform
//! runtime directory, the linker assembles a combined module graph across
//! two module dialects (strict and automatic), resolves package-export
//! conflicts, rewrites each module's compiled descriptor so the graph
//! resolves under the platform's strict resolver, and emits the result
//! through a pluggable image builder.
//!
//! The pipeline, phase by phase:
//!
//! ```text
//! scan ─▶ deps ─▶ graph ─▶ rewrite ─▶ beans ─▶ linker ─▶ (image builder)
//!           ▲                │
//!           └── conflict ◀───┘
//! ```
//!
//! [`Linker::link`] is the single entry point; everything else is exposed
//! for embedding and testing.

#![warn(missing_docs)]

pub mod artifact;
pub mod beans;
pub mod conflict;
pub mod context;
pub mod deps;
pub mod descriptor;
pub mod graph;
pub mod image;
pub mod linker;
mod manifest;
pub mod patch;
pub mod preload;
mod process;
pub mod rewrite;
pub mod scan;

#[cfg(test)]
pub(crate) mod testutil;

pub use context::LinkContext;
pub use linker::{LinkOutcome, Linker, LinkerConfig};
pub use manifest::{Manifest, AUTOMATIC_MODULE_NAME, MAIN_CLASS, MANIFEST_ENTRY, MULTI_RELEASE};

pub use modlink_types::{
    ArtifactKind, Descriptor, DescriptorError, EntryKind, Exports, IndexError, LinkError,
    LinkResult, Modifiers, ModuleRef, Opens, Provides, Requires, UNKNOWN_VERSION,
};
