//! Parsed module metadata.
//!
//! A [`Descriptor`] is the in-memory form of the compiled `module-info`
//! blob. Instances are immutable by contract: the rewriting phase builds a
//! replacement value rather than mutating one in place.

use std::collections::BTreeSet;

/// Module-level modifier flags.
///
/// `automatic` is never encoded back into a compiled descriptor; it only
/// exists on descriptors synthesized for modules without declared metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    /// Every package of the module is reflectively accessible.
    pub open: bool,
    /// The descriptor was synthesized from an artifact without metadata.
    pub automatic: bool,
    /// Not present in source code.
    pub synthetic: bool,
    /// Implicitly declared.
    pub mandated: bool,
}

/// A dependency edge on another named module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requires {
    /// Name of the required module.
    pub module: String,
    /// Readability is granted transitively to downstream modules.
    pub transitive: bool,
    /// Required at compile time only.
    pub static_phase: bool,
    /// Not present in source code.
    pub synthetic: bool,
    /// Implicitly declared.
    pub mandated: bool,
    /// Version of the required module recorded at compile time.
    pub compiled_version: Option<String>,
}

impl Requires {
    /// An unqualified requires edge with no flags and no recorded version.
    pub fn plain(module: impl Into<String>) -> Self {
        Requires {
            module: module.into(),
            transitive: false,
            static_phase: false,
            synthetic: false,
            mandated: false,
            compiled_version: None,
        }
    }
}

/// A package made visible to other modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exports {
    /// The exported package, in dotted form.
    pub source: String,
    /// Qualifying target modules; empty means unqualified.
    pub targets: BTreeSet<String>,
    /// Not present in source code.
    pub synthetic: bool,
    /// Implicitly declared.
    pub mandated: bool,
}

impl Exports {
    /// An unqualified export of `source`.
    pub fn unqualified(source: impl Into<String>) -> Self {
        Exports {
            source: source.into(),
            targets: BTreeSet::new(),
            synthetic: false,
            mandated: false,
        }
    }

    /// Whether the export names specific target modules.
    pub fn is_qualified(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// A package opened for deep reflective access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opens {
    /// The opened package, in dotted form.
    pub source: String,
    /// Qualifying target modules; empty means unqualified.
    pub targets: BTreeSet<String>,
    /// Not present in source code.
    pub synthetic: bool,
    /// Implicitly declared.
    pub mandated: bool,
}

impl Opens {
    /// An unqualified opens of `source`.
    pub fn unqualified(source: impl Into<String>) -> Self {
        Opens {
            source: source.into(),
            targets: BTreeSet::new(),
            synthetic: false,
            mandated: false,
        }
    }
}

/// A service implementation declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provides {
    /// Fully qualified name of the service interface.
    pub service: String,
    /// Provider classes, in declaration order.
    pub providers: Vec<String>,
}

/// Parsed module metadata, mirroring the compiled `module-info` blob.
///
/// Invariant: every [`Exports::source`] and [`Opens::source`] is a member of
/// [`Descriptor::packages`]. The codec refuses to encode descriptors that
/// break it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    /// Module name.
    pub name: String,
    /// Module version, if declared.
    pub version: Option<String>,
    /// Module-level modifier flags.
    pub modifiers: Modifiers,
    /// Fully qualified main class, if declared.
    pub main_class: Option<String>,
    /// Target platform token, when the module is platform-specific.
    pub target: Option<String>,
    /// All packages of the module, in dotted form.
    pub packages: BTreeSet<String>,
    /// Dependency edges, in declaration order.
    pub requires: Vec<Requires>,
    /// Exported packages, in declaration order.
    pub exports: Vec<Exports>,
    /// Opened packages, in declaration order.
    pub opens: Vec<Opens>,
    /// Consumed service interfaces.
    pub uses: BTreeSet<String>,
    /// Service implementations, in declaration order.
    pub provides: Vec<Provides>,
}

impl Descriptor {
    /// A descriptor with just a name and otherwise empty contents.
    pub fn named(name: impl Into<String>) -> Self {
        Descriptor {
            name: name.into(),
            ..Descriptor::default()
        }
    }

    /// Whether a requires edge on `module` is present.
    pub fn requires_module(&self, module: &str) -> bool {
        self.requires.iter().any(|r| r.module == module)
    }

    /// The distinct set of exported and opened package sources.
    pub fn exposed_packages(&self) -> BTreeSet<&str> {
        self.exports
            .iter()
            .map(|e| e.source.as_str())
            .chain(self.opens.iter().map(|o| o.source.as_str()))
            .collect()
    }
}
