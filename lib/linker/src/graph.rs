//! The combined application + platform module graph.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::warn;

use modlink_types::{LinkError, LinkResult, ModuleRef};

use crate::conflict::effective_exports;

/// Name of the platform base module; always present, always emitted first.
pub const PLATFORM_BASE: &str = "java.base";

/// Name-keyed module graph with a package export index.
///
/// Construction is monotone: modules are only ever added, and after the
/// resolution phase the graph is read-only.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: IndexMap<String, ModuleRef>,
    platform: BTreeSet<String>,
    export_index: IndexMap<String, String>,
}

impl ModuleGraph {
    /// An empty graph.
    pub fn new() -> Self {
        ModuleGraph::default()
    }

    /// Insert an application module.
    pub fn add(&mut self, mref: ModuleRef) -> LinkResult<()> {
        if self.modules.contains_key(&mref.name) {
            return Err(LinkError::DuplicateModule(mref.name));
        }
        for package in effective_exports(&mref) {
            self.export_index
                .entry(package.to_owned())
                .or_insert_with(|| mref.name.clone());
        }
        self.modules.insert(mref.name.clone(), mref);
        Ok(())
    }

    /// Insert a platform module.
    pub fn add_platform(&mut self, mref: ModuleRef) -> LinkResult<()> {
        let name = mref.name.clone();
        self.add(mref)?;
        self.platform.insert(name);
        Ok(())
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<&ModuleRef> {
        self.modules.get(name)
    }

    /// Whether `name` names a platform module in this graph.
    pub fn is_platform(&self, name: &str) -> bool {
        self.platform.contains(name)
    }

    /// The platform module name-set.
    pub fn platform_names(&self) -> &BTreeSet<String> {
        &self.platform
    }

    /// The module exporting `package`, if any.
    pub fn exporter_of(&self, package: &str) -> Option<&ModuleRef> {
        self.export_index
            .get(package)
            .and_then(|name| self.modules.get(name))
    }

    /// Number of modules in the graph.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterate modules in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRef> {
        self.modules.values()
    }

    /// Transitive closure of `requires` within the platform subgraph,
    /// seeded by the application's direct platform dependencies.
    ///
    /// The base module is always part of the closure. Requires edges that
    /// point outside the graph are reported and skipped; self-loops are
    /// ignored.
    pub fn close_over_platform(&self, seeds: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closed = BTreeSet::new();
        let mut work: Vec<&str> = Vec::new();

        if self.platform.contains(PLATFORM_BASE) {
            work.push(PLATFORM_BASE);
        }
        for seed in seeds {
            if self.platform.contains(seed) {
                work.push(seed);
            } else if !self.modules.contains_key(seed) {
                warn!(module = %seed, "direct platform dependency is not present in the runtime");
            }
        }

        while let Some(name) = work.pop() {
            if !closed.insert(name.to_owned()) {
                continue;
            }
            let Some(mref) = self.modules.get(name) else {
                continue;
            };
            for requires in &mref.descriptor.requires {
                let target = requires.module.as_str();
                if target == name {
                    continue;
                }
                if self.platform.contains(target) {
                    if !closed.contains(target) {
                        work.push(target);
                    }
                } else if !self.modules.contains_key(target) {
                    warn!(module = name, missing = target, "requires edge points outside the graph");
                }
            }
        }

        closed
    }

    /// Total emit order: the platform base module first, then every other
    /// module sorted by name.
    pub fn ordered(&self) -> Vec<&ModuleRef> {
        let mut names: Vec<&String> = self.modules.keys().collect();
        names.sort_by(|a, b| {
            let a_base = a.as_str() == PLATFORM_BASE;
            let b_base = b.as_str() == PLATFORM_BASE;
            b_base.cmp(&a_base).then_with(|| a.cmp(b))
        });
        names.into_iter().map(|name| &self.modules[name.as_str()]).collect()
    }
}
