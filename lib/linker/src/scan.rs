//! Module discovery over a directory of artifacts.
//!
//! Scanning produces one [`ModuleRef`] per artifact: strict modules from
//! their compiled descriptor, automatic modules from a synthesized one. Jars
//! whose name derivation fails are given a second chance through the rescue
//! table, which patches an `Automatic-Module-Name` into the jar manifest in
//! place (write a sibling temp file, then rename over the original).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use tracing::{debug, warn};

use modlink_types::{
    ArtifactKind, Descriptor, LinkError, LinkResult, Modifiers, ModuleRef, UNKNOWN_VERSION,
};

use crate::artifact::Artifact;
use crate::descriptor;
use crate::manifest::{Manifest, AUTOMATIC_MODULE_NAME, MAIN_CLASS, MANIFEST_ENTRY};

/// An automatic-module name plus canonical version supplied for artifacts
/// whose file name defeats derivation.
struct RescueEntry {
    file_prefix: &'static str,
    module_name: &'static str,
    version: &'static str,
}

/// File-name-prefix keyed rescue table. The `_<n>.<m>_spec` suffix family
/// produces digit-led name segments that no derivation accepts.
static NAME_RESCUE: &[RescueEntry] = &[
    RescueEntry {
        file_prefix: "jboss-interceptors-api_1.2_spec",
        module_name: "jboss.interceptors.api",
        version: "1.2",
    },
    RescueEntry {
        file_prefix: "jboss-annotations-api_1.3_spec",
        module_name: "jboss.annotations.api",
        version: "1.3",
    },
    RescueEntry {
        file_prefix: "jboss-el-api_3.0_spec",
        module_name: "jboss.el.api",
        version: "3.0",
    },
    RescueEntry {
        file_prefix: "jboss-transaction-api_1.2_spec",
        module_name: "jboss.transaction.api",
        version: "1.2",
    },
];

/// Packages stripped from specific modules during package collection. The
/// classfilewriter jar ships a directory literally named `enum`, which is not
/// a legal package segment; removing this exclusion is a known regression.
static EXCLUDED_PACKAGES: Lazy<BTreeMap<&'static str, BTreeSet<&'static str>>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    map.insert("jboss.classfilewriter", ["enum"].into_iter().collect());
    map
});

#[derive(Debug)]
enum ScanIssue {
    /// The artifact yields no derivable module name; recoverable via rescue.
    Derivation(String),
    /// Anything else; fatal under `strict`.
    Fatal(LinkError),
}

impl From<LinkError> for ScanIssue {
    fn from(e: LinkError) -> Self {
        ScanIssue::Fatal(e)
    }
}

/// Scan a directory of artifacts into a name-keyed module map.
///
/// With `strict`, any discovery failure that is not a name-derivation
/// problem aborts the scan; otherwise offending artifacts are skipped with a
/// warning. Duplicated module names are resolved by the deduplication
/// policy (jakarta over javax, implementation over api, then file name).
pub fn scan_directory(dir: &Path, strict: bool) -> LinkResult<IndexMap<String, ModuleRef>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| LinkError::Scan {
            dir: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_artifact(path))
        .collect();
    paths.sort();

    let read: Vec<(PathBuf, Result<ModuleRef, ScanIssue>)> = paths
        .into_par_iter()
        .map(|path| {
            let result = read_module_with_rescue(&path);
            (path, result)
        })
        .collect();

    let mut modules = Vec::new();
    for (path, result) in read {
        match result {
            Ok(mref) => modules.push(mref),
            Err(ScanIssue::Derivation(message)) => {
                warn!(
                    artifact = %path.display(),
                    "skipping artifact with underivable module name: {message}"
                );
            }
            Err(ScanIssue::Fatal(error)) if strict => return Err(error),
            Err(ScanIssue::Fatal(error)) => {
                warn!(artifact = %path.display(), "skipping unreadable artifact: {error}");
            }
        }
    }

    Ok(deduplicate(modules))
}

/// Read a single artifact into a [`ModuleRef`], applying the rescue-and-retry
/// state machine on derivation failure.
pub fn read_module(path: &Path) -> LinkResult<ModuleRef> {
    match read_module_with_rescue(path) {
        Ok(mref) => Ok(mref),
        Err(ScanIssue::Derivation(message)) => Err(LinkError::Archive {
            path: path.to_path_buf(),
            message,
        }),
        Err(ScanIssue::Fatal(error)) => Err(error),
    }
}

fn read_module_with_rescue(path: &Path) -> Result<ModuleRef, ScanIssue> {
    match try_read_module(path) {
        Err(ScanIssue::Derivation(first)) => {
            if rescue_jar(path).map_err(ScanIssue::Fatal)? {
                try_read_module(path)
            } else {
                Err(ScanIssue::Derivation(first))
            }
        }
        other => other,
    }
}

fn try_read_module(path: &Path) -> Result<ModuleRef, ScanIssue> {
    let artifact = Artifact::open(path)?;
    let manifest = artifact.manifest()?;
    let file_name = artifact.file_name();

    if let Some(bytes) = artifact.descriptor_bytes()? {
        let parsed = descriptor::decode(&bytes)
            .map_err(|source| LinkError::descriptor(file_name.clone(), source))?;
        let version = parsed
            .version
            .clone()
            .or_else(|| version_from_file_name(&file_name))
            .unwrap_or_else(|| UNKNOWN_VERSION.to_owned());
        let mut mref = ModuleRef::new(parsed, version, path.to_path_buf(), artifact.kind(), false);
        mref.origin_descriptor = Some(bytes);
        apply_manifest(&mut mref, manifest.as_ref());
        debug!(module = %mref.name, artifact = %file_name, "discovered strict module");
        return Ok(mref);
    }

    if artifact.kind() == ArtifactKind::Packaged {
        return Err(ScanIssue::Fatal(LinkError::DescriptorMissing {
            path: path.to_path_buf(),
        }));
    }

    // No declared descriptor: synthesize an automatic module.
    let declared = manifest
        .as_ref()
        .and_then(|m| m.get(AUTOMATIC_MODULE_NAME))
        .map(str::to_owned);
    let (name, version) = match declared {
        Some(name) if is_valid_module_name(&name) => {
            (name, version_from_file_name(&file_name))
        }
        Some(name) => {
            return Err(ScanIssue::Derivation(format!(
                "manifest declares invalid automatic module name `{name}`"
            )))
        }
        None => {
            let stem = file_name
                .strip_suffix(".jar")
                .unwrap_or(file_name.as_str());
            let (derived, version) = derive_automatic_name(stem);
            if !is_valid_module_name(&derived) {
                return Err(ScanIssue::Derivation(format!(
                    "file name `{file_name}` derives invalid module name `{derived}`"
                )));
            }
            (derived, version)
        }
    };

    let packages = collect_packages(&artifact, &name)?;
    let mut synthesized = Descriptor::named(&name);
    synthesized.modifiers = Modifiers {
        automatic: true,
        ..Modifiers::default()
    };
    synthesized.version = version.clone();
    synthesized.packages = packages;

    let mut mref = ModuleRef::new(
        synthesized,
        version.unwrap_or_else(|| UNKNOWN_VERSION.to_owned()),
        path.to_path_buf(),
        artifact.kind(),
        true,
    );
    apply_manifest(&mut mref, manifest.as_ref());
    debug!(module = %mref.name, artifact = %file_name, "discovered automatic module");
    Ok(mref)
}

fn apply_manifest(mref: &mut ModuleRef, manifest: Option<&Manifest>) {
    if let Some(manifest) = manifest {
        mref.multi_release = manifest.is_multi_release();
        mref.main_class = manifest.get(MAIN_CLASS).map(str::to_owned);
    }
}

fn is_artifact(path: &Path) -> bool {
    if path.is_dir() {
        return path.join("module-info.class").is_file();
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jar") | Some("jmod")
    )
}

/// Collect the package set of an automatic module from its class entries.
/// `META-INF` contents (including versioned trees) are not packages.
fn collect_packages(artifact: &Artifact, module: &str) -> LinkResult<BTreeSet<String>> {
    let excluded = EXCLUDED_PACKAGES.get(module);
    let mut packages = BTreeSet::new();
    for entry in artifact.entries()? {
        if !entry.name.ends_with(".class") || entry.name == "module-info.class" {
            continue;
        }
        if entry.name.starts_with("META-INF/") {
            continue;
        }
        if let Some((dir, _)) = entry.name.rsplit_once('/') {
            let package = dir.replace('/', ".");
            if excluded.is_some_and(|set| set.contains(package.as_str())) {
                debug!(module, package = %package, "dropping excluded package");
                continue;
            }
            packages.insert(package);
        }
    }
    Ok(packages)
}

/// Derive an automatic module name (and maybe a version) from a jar file
/// stem: split a trailing `-<digit-led>` version off, map non-alphanumeric
/// runs to dots, and trim.
fn derive_automatic_name(stem: &str) -> (String, Option<String>) {
    let mut name_part = stem;
    let mut version = None;
    let bytes = stem.as_bytes();
    for (index, _) in stem.match_indices('-') {
        if bytes
            .get(index + 1)
            .is_some_and(|b| b.is_ascii_digit())
        {
            name_part = &stem[..index];
            let token = &stem[index + 1..];
            if !token.is_empty() {
                version = Some(token.to_owned());
            }
            break;
        }
    }

    let mut name = String::with_capacity(name_part.len());
    let mut last_dot = true;
    for c in name_part.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
            last_dot = false;
        } else if !last_dot {
            name.push('.');
            last_dot = true;
        }
    }
    while name.ends_with('.') {
        name.pop();
    }
    (name, version)
}

/// A module name is valid when every dot-separated segment is non-empty and
/// starts with a letter.
fn is_valid_module_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphabetic() => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
                }
                _ => false,
            }
        })
}

fn version_from_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".jar").unwrap_or(file_name);
    let (_, version) = derive_automatic_name(stem);
    version.filter(|v| {
        semver::Version::parse(v).is_ok() || v.chars().next().is_some_and(|c| c.is_ascii_digit())
    })
}

/// Patch an `Automatic-Module-Name` into a jar whose file name matches the
/// rescue table. Returns whether the artifact was (or already is) rescued.
///
/// The rewrite is atomic: a sibling temp jar is written, then renamed over
/// the original path. A jar that already declares a valid name is left
/// untouched.
pub fn rescue_jar(path: &Path) -> LinkResult<bool> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(entry) = NAME_RESCUE
        .iter()
        .find(|entry| file_name.starts_with(entry.file_prefix))
    else {
        return Ok(false);
    };

    let artifact = Artifact::open(path)?;
    let mut manifest = artifact.manifest()?.unwrap_or_default();
    if manifest
        .get(AUTOMATIC_MODULE_NAME)
        .is_some_and(is_valid_module_name)
    {
        return Ok(true);
    }
    manifest.set(AUTOMATIC_MODULE_NAME, entry.module_name);

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".rescue-")
        .suffix(".jar")
        .tempfile_in(parent)?;
    let mut overlay = BTreeMap::new();
    overlay.insert(MANIFEST_ENTRY.to_owned(), manifest.to_bytes());
    artifact.write_as(temp.path(), &overlay, &BTreeSet::new())?;
    temp.persist(path).map_err(|e| LinkError::ArtifactOpen {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    warn!(
        artifact = %file_name,
        module = entry.module_name,
        version = entry.version,
        "patched automatic module name into jar manifest"
    );
    Ok(true)
}

/// Resolve several artifacts claiming the same module name down to one.
///
/// Preference order: a `jakarta`-prefixed file name over a `javax` one, then
/// a file name without `-api-`, then the lexicographically first file name.
fn deduplicate(modules: Vec<ModuleRef>) -> IndexMap<String, ModuleRef> {
    let mut by_name: BTreeMap<String, Vec<ModuleRef>> = BTreeMap::new();
    for mref in modules {
        by_name.entry(mref.name.clone()).or_default().push(mref);
    }

    let mut result = IndexMap::new();
    for (name, mut candidates) in by_name {
        candidates.sort_by_key(ModuleRef::file_name);
        let winner = pick_duplicate(&candidates);
        for (index, candidate) in candidates.iter().enumerate() {
            if index != winner {
                warn!(
                    module = %name,
                    kept = %candidates[winner].file_name(),
                    discarded = %candidate.file_name(),
                    "discarding duplicate module artifact"
                );
            }
        }
        result.insert(name, candidates.swap_remove(winner));
    }
    result
}

fn pick_duplicate(candidates: &[ModuleRef]) -> usize {
    if candidates.len() == 1 {
        return 0;
    }
    let names: Vec<String> = candidates.iter().map(ModuleRef::file_name).collect();
    let any_javax = names.iter().any(|n| n.starts_with("javax"));
    if any_javax {
        if let Some(index) = names.iter().position(|n| n.starts_with("jakarta")) {
            return index;
        }
    }
    if let Some(index) = names.iter().position(|n| !n.contains("-api-")) {
        if names.iter().any(|n| n.contains("-api-")) {
            return index;
        }
    }
    // Candidates are sorted by file name; first is the lexicographic pick.
    0
}
