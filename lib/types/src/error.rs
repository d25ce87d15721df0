//! Typed errors for the linker core.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the linker.
pub type LinkResult<T> = Result<T, LinkError>;

/// Faults decoding or encoding a compiled module descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The constant pool contains a tag this codec does not understand.
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag {
        /// The unrecognized tag byte.
        tag: u8,
        /// Constant pool index at which it appeared.
        index: u16,
    },

    /// A constant pool reference points outside the pool or at the wrong
    /// kind of constant.
    #[error("constant pool index {0} is out of range or of the wrong kind")]
    BadConstantRef(u16),

    /// The blob ended before the structure it promised.
    #[error("descriptor blob truncated")]
    Truncated,

    /// Structurally invalid descriptor contents.
    #[error("malformed descriptor: {0}")]
    Malformed(String),

    /// The descriptor cannot be encoded as given.
    #[error("cannot encode descriptor: {0}")]
    Encode(String),
}

/// Faults building or reading a content index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index carries a version this reader does not support.
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u16),

    /// The index bytes are not a valid index.
    #[error("malformed index: {0}")]
    Malformed(String),

    /// A class file could not be digested into the index.
    #[error("class file rejected: {0}")]
    BadClassFile(String),
}

/// The error type surfaced by the linker entry point.
///
/// Recoverable conditions are logged at WARN inside the phases and never
/// reach this type; everything here aborts the link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// An artifact could not be opened or read.
    #[error("failed to open artifact `{path}`")]
    ArtifactOpen {
        /// Artifact location.
        path: PathBuf,
        /// Underlying I/O fault.
        #[source]
        source: io::Error,
    },

    /// An archive was readable as a file but not as an archive.
    #[error("archive `{path}` is not readable: {message}")]
    Archive {
        /// Artifact location.
        path: PathBuf,
        /// Archive-layer diagnostic.
        message: String,
    },

    /// A strict artifact carries no descriptor entry.
    #[error("module artifact `{path}` carries no module descriptor")]
    DescriptorMissing {
        /// Artifact location.
        path: PathBuf,
    },

    /// A descriptor failed to decode or encode.
    #[error("descriptor of `{module}` is invalid")]
    Descriptor {
        /// Owning module (or artifact file name during scanning).
        module: String,
        /// Underlying codec fault.
        #[source]
        source: DescriptorError,
    },

    /// The same module name was inserted into a graph twice.
    #[error("duplicate module `{0}` added to the graph")]
    DuplicateModule(String),

    /// A provided service's interface package has no exporting module.
    #[error("service `{service}` provided by `{module}` resolves to no exporting module")]
    UnresolvedServiceExport {
        /// Module declaring the provides.
        module: String,
        /// Service interface name.
        service: String,
    },

    /// The external dependency analyzer failed for a module.
    #[error("dependency analysis of `{module}` failed: {message}")]
    Analyzer {
        /// Module under analysis.
        module: String,
        /// Tool diagnostic.
        message: String,
    },

    /// A file in the patches directory does not follow the patch naming
    /// convention.
    #[error("unsupported patch file `{path}` (expected `<module>-patch.jar`)")]
    UnsupportedPatchFormat {
        /// Offending file.
        path: PathBuf,
    },

    /// A patch jar could not be read.
    #[error("patch file `{path}` is not readable as a jar: {message}")]
    PatchFormat {
        /// Offending file.
        path: PathBuf,
        /// Archive-layer diagnostic.
        message: String,
    },

    /// A directory scan failed for a reason other than a single bad artifact.
    #[error("scan of `{dir}` failed")]
    Scan {
        /// Directory being scanned.
        dir: PathBuf,
        /// Underlying I/O fault.
        #[source]
        source: io::Error,
    },

    /// A preload-driver run failed.
    #[error("preload driver failed: {0}")]
    Preload(String),

    /// Any other I/O fault.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LinkError {
    /// Wrap a descriptor fault with its owning module name.
    pub fn descriptor(module: impl Into<String>, source: DescriptorError) -> Self {
        LinkError::Descriptor {
            module: module.into(),
            source,
        }
    }
}
