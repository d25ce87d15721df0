//! Phase orchestration: scan, resolve, analyze, rewrite, augment, emit.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use modlink_types::{LinkResult, ModuleRef};

use crate::artifact::Artifact;
use crate::beans::{self, ClassIndexer, ClassNameIndexer};
use crate::conflict;
use crate::context::LinkContext;
use crate::deps::{self, DepTool, JdepsTool};
use crate::graph::ModuleGraph;
use crate::image::{DirImageBuilder, ImageBuilder};
use crate::patch::PatchOverlay;
use crate::preload::PreloadDriver;
use crate::rewrite;
use crate::scan;

/// Everything the linker needs to know about one run.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    /// The application artifact (usually a jar).
    pub app: PathBuf,
    /// Directory of application dependency artifacts.
    pub libs: Option<PathBuf>,
    /// Platform runtime directory (contains `jmods/` and `release`).
    pub platform_dir: PathBuf,
    /// Directory of `<module>-patch.jar` overlays.
    pub patches: Option<PathBuf>,
    /// Output image directory; must not exist yet.
    pub out: PathBuf,
    /// Forwarded to the image builder.
    pub strip_debug: bool,
    /// Produce the class-preload archive after assembly.
    pub cds: bool,
    /// Module-name prefix identifying the injection framework.
    pub framework_prefix: String,
    /// Module-name prefix identifying the framework's container API.
    pub container_prefix: String,
    /// Override for the bytecode-dependency tool binary.
    pub dep_tool: Option<PathBuf>,
}

impl LinkerConfig {
    /// A config with conventional defaults.
    pub fn new(app: PathBuf, platform_dir: PathBuf, out: PathBuf) -> Self {
        LinkerConfig {
            app,
            libs: None,
            platform_dir,
            patches: None,
            out,
            strip_debug: false,
            cds: true,
            framework_prefix: "weld".to_owned(),
            container_prefix: "jakarta.enterprise".to_owned(),
            dep_tool: None,
        }
    }
}

/// Result of a successful link.
#[derive(Debug)]
pub struct LinkOutcome {
    /// Location of the built image.
    pub image: PathBuf,
    /// Metadata computed during the run.
    pub context: LinkContext,
}

/// The runtime-image linker.
pub struct Linker {
    config: LinkerConfig,
}

impl Linker {
    /// A linker over one configuration.
    pub fn new(config: LinkerConfig) -> Self {
        Linker { config }
    }

    /// Link with the production collaborators and, when enabled, drive the
    /// preload-archive passes against the finished image.
    pub fn link(&self) -> LinkResult<LinkOutcome> {
        let mut builder = DirImageBuilder::new(&self.config.out, self.config.strip_debug)?;
        let tool = match &self.config.dep_tool {
            Some(path) => JdepsTool::new(path.clone()),
            None => JdepsTool::from_platform_dir(&self.config.platform_dir),
        };
        let mut outcome = self.link_with(&mut builder, &tool, &ClassNameIndexer)?;

        if self.config.cds {
            let driver = PreloadDriver::new(&outcome.image);
            match driver.record_class_list(&outcome.context.app_module) {
                Ok(list) => {
                    driver.dump_archive(&list)?;
                    outcome.context.preload_list = Some(list);
                }
                Err(error) => {
                    // The archive is a startup optimization; a failed
                    // recording pass downgrades to an image without one.
                    warn!("skipping class-preload archive: {error}");
                }
            }
        }
        Ok(outcome)
    }

    /// Link with caller-supplied collaborators. Runs every phase through
    /// entry emission and `build()`, but never the preload passes.
    pub fn link_with(
        &self,
        image: &mut dyn ImageBuilder,
        tool: &dyn DepTool,
        indexer: &dyn ClassIndexer,
    ) -> LinkResult<LinkOutcome> {
        // Phase 1: discovery.
        let main = scan::read_module(&self.config.app)?;
        let main_name = main.name.clone();
        let mut app = match &self.config.libs {
            Some(libs) => scan::scan_directory(libs, true)?,
            None => IndexMap::new(),
        };
        if !app.contains_key(&main_name) {
            app.insert(main_name.clone(), main);
        }
        app.sort_keys();
        info!(modules = app.len(), main = %main_name, "application modules discovered");

        let platform_scan_dir = platform_modules_dir(&self.config.platform_dir);
        let platform = scan::scan_directory(&platform_scan_dir, true)?;
        info!(modules = platform.len(), "platform modules discovered");

        let platform_exports = declared_exports(&platform);

        // Phase 2: conflict resolution over the application set.
        let resolution = conflict::resolve(&mut app, &platform_exports)?;

        // Phase 3: context for the emission plugins.
        let (uses_framework, uses_container) = beans::detect_framework(
            &app,
            &self.config.framework_prefix,
            &self.config.container_prefix,
        );
        let mut context = LinkContext {
            app_module: main_name.clone(),
            archives_by_package: resolution.archives_by_package.clone(),
            preload_list: None,
            uses_framework,
            uses_container,
        };
        if self.config.cds {
            context.preload_list = Some(self.config.out.join(crate::preload::CLASS_LIST));
        }

        // Phase 4: dependency analysis, fanned out per module and merged
        // back in name order.
        let feature = feature_version(&self.config.platform_dir);
        let exporter = |package: &str| -> Option<String> {
            resolution
                .archives_by_package
                .get(package)
                .or_else(|| platform_exports.get(package))
                .map(|name| resolution.substitute(name).to_owned())
        };
        let analyzed: Vec<(String, LinkResult<BTreeSet<String>>)> = app
            .values()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|mref| {
                let deps = deps::collect_dependencies(mref, feature, tool, &exporter);
                (mref.name.clone(), deps)
            })
            .collect();
        let mut deps_by_module: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, result) in analyzed {
            deps_by_module.insert(name, result?);
        }

        // Phase 5: transitive platform closure.
        let platform_names: BTreeSet<String> = platform.keys().cloned().collect();
        let direct_platform: BTreeSet<String> = deps_by_module
            .values()
            .flatten()
            .filter(|name| platform_names.contains(*name))
            .cloned()
            .collect();
        let mut platform_graph = ModuleGraph::new();
        for mref in platform.values() {
            platform_graph.add_platform(mref.clone())?;
        }
        let closed_platform = platform_graph.close_over_platform(&direct_platform);
        debug!(
            direct = direct_platform.len(),
            closed = closed_platform.len(),
            "platform dependency closure computed"
        );

        // Phase 6: descriptor rewriting.
        let mut extras = deps_by_module;
        for (module, requires) in &resolution.service_requires {
            extras.entry(module.clone()).or_default().extend(requires.iter().cloned());
        }
        if app.get(&main_name).is_some_and(|m| m.automatic) {
            let others: Vec<String> = app
                .keys()
                .filter(|name| *name != &main_name)
                .cloned()
                .collect();
            extras.entry(main_name.clone()).or_default().extend(others);
        }
        for (name, mref) in app.iter_mut() {
            let extra = extras.remove(name).unwrap_or_default();
            rewrite::apply(mref, &resolution.substitutions, &extra)?;
        }

        // Phase 7: bean-archive indexes.
        if uses_framework && uses_container {
            beans::augment(&mut app, indexer)?;
        }

        // Phase 8: emission.
        let patches = match &self.config.patches {
            Some(dir) => PatchOverlay::load(dir)?,
            None => PatchOverlay::empty(),
        };
        let mut emit_graph = ModuleGraph::new();
        for name in &closed_platform {
            if let Some(mref) = platform.get(name) {
                emit_graph.add_platform(mref.clone())?;
            }
        }
        for mref in app.values() {
            emit_graph.add(mref.clone())?;
        }

        for mref in emit_graph.ordered() {
            emit_module(mref, &patches, image)?;
        }
        let image_path = image.build()?;
        info!(image = %image_path.display(), "runtime image assembled");

        Ok(LinkOutcome {
            image: image_path,
            context,
        })
    }
}

/// Emit one module's entries: everything that is not a class or resource
/// first, then the class/resource bulk, with patch and overlay substitution
/// applied per entry.
fn emit_module(
    mref: &ModuleRef,
    patches: &PatchOverlay,
    image: &mut dyn ImageBuilder,
) -> LinkResult<()> {
    let artifact = Artifact::open(&mref.location)?;
    let mut entries = artifact.entries()?;
    for (name, bytes) in &mref.overlay {
        if !entries.iter().any(|e| &e.name == name) {
            entries.push(artifact.synthetic_entry(name.clone(), bytes.len() as u64));
        }
    }
    entries.sort_by_key(|e| e.kind.emit_rank());

    for entry in entries {
        let bytes = match patches.entry(&mref.name, &entry.pool_name) {
            Some(patched) => patched.to_vec(),
            None => match mref.overlay.get(&entry.name) {
                Some(staged) => staged.clone(),
                None => artifact.read(&entry.name)?,
            },
        };
        let size = bytes.len() as u64;
        image.add_entry(
            &mref.name,
            &entry.pool_name,
            entry.kind,
            &mut Cursor::new(bytes),
            size,
        )?;
    }
    Ok(())
}

/// Map package → exporting module over declared (strict) exports.
fn declared_exports(modules: &IndexMap<String, ModuleRef>) -> BTreeMap<String, String> {
    let mut exports = BTreeMap::new();
    for (name, mref) in modules {
        for export in &mref.descriptor.exports {
            exports.entry(export.source.clone()).or_insert_with(|| name.clone());
        }
    }
    exports
}

/// Platform jmods live under `jmods/` in a full runtime directory; a
/// directory that is itself full of jmods is accepted as-is.
fn platform_modules_dir(platform_dir: &Path) -> PathBuf {
    let jmods = platform_dir.join("jmods");
    if jmods.is_dir() {
        jmods
    } else {
        platform_dir.to_path_buf()
    }
}

/// Feature version of the target platform, read from its `release` file.
fn feature_version(platform_dir: &Path) -> u32 {
    const DEFAULT: u32 = 17;
    let release = platform_dir.join("release");
    let Ok(text) = std::fs::read_to_string(&release) else {
        return DEFAULT;
    };
    for line in text.lines() {
        let Some(value) = line.strip_prefix("JAVA_VERSION=") else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        let mut parts = value.split('.');
        let first = parts.next().unwrap_or_default();
        let feature = if first == "1" {
            parts.next().unwrap_or_default()
        } else {
            first
        };
        if let Ok(parsed) = feature.parse() {
            return parsed;
        }
    }
    DEFAULT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_version_parses_release_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("release"), "JAVA_VERSION=\"21.0.2\"\nOS_ARCH=\"amd64\"\n")
            .unwrap();
        assert_eq!(feature_version(dir.path()), 21);
    }

    #[test]
    fn feature_version_handles_legacy_scheme() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("release"), "JAVA_VERSION=\"1.8.0\"\n").unwrap();
        assert_eq!(feature_version(dir.path()), 8);
    }

    #[test]
    fn feature_version_defaults_without_release() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(feature_version(dir.path()), 17);
    }
}
