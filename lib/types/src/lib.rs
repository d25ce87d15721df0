//! Common data model for the modlink runtime-image linker.
//!
//! This crate holds the value types shared by every linker phase: the parsed
//! module [`Descriptor`], the discovered-module [`ModuleRef`], artifact and
//! entry classification tags, and the typed error hierarchy. It performs no
//! I/O; everything here is plain data that the `modlink` crate produces and
//! consumes.

#![warn(missing_docs)]

mod descriptor;
mod entry;
mod error;
mod module;

pub use descriptor::{Descriptor, Exports, Modifiers, Opens, Provides, Requires};
pub use entry::EntryKind;
pub use error::{DescriptorError, IndexError, LinkError, LinkResult};
pub use module::{ArtifactKind, ModuleRef, UNKNOWN_VERSION};
