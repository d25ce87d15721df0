//! Dependency analysis for application modules.
//!
//! Strict modules carry their dependencies in the descriptor. Automatic
//! modules have none, so their class files are fed through an external
//! bytecode-dependency tool and its textual report is interpreted into a
//! set of module names.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use modlink_types::{LinkError, LinkResult, ModuleRef};

use crate::process::run_tool;

/// Packages bound at run time through a dynamic lookup (logging binding
/// style); references to them are expected to dangle and are not turned
/// into requires edges.
static DYNAMIC_PACKAGES: Lazy<BTreeSet<&'static str>> =
    Lazy::new(|| ["org.slf4j.impl", "org.apache.logging.slf4j"].into_iter().collect());

/// The external bytecode-dependency analyzer.
pub trait DepTool: Sync {
    /// Analyze one artifact, returning the tool's raw textual report.
    fn analyze(&self, artifact: &Path, multi_release: Option<u32>) -> LinkResult<String>;
}

/// Production analyzer: spawns the platform's `jdeps` binary.
pub struct JdepsTool {
    tool: PathBuf,
}

impl JdepsTool {
    /// Use an explicit tool binary.
    pub fn new(tool: PathBuf) -> Self {
        JdepsTool { tool }
    }

    /// Locate the tool inside a platform runtime directory.
    pub fn from_platform_dir(platform: &Path) -> Self {
        JdepsTool {
            tool: platform.join("bin").join("jdeps"),
        }
    }
}

impl DepTool for JdepsTool {
    fn analyze(&self, artifact: &Path, multi_release: Option<u32>) -> LinkResult<String> {
        let mut command = Command::new(&self.tool);
        if let Some(feature) = multi_release {
            command.arg("--multi-release").arg(feature.to_string());
        }
        command.arg(artifact);

        let module = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = run_tool(&mut command, false).map_err(|e| LinkError::Analyzer {
            module: module.clone(),
            message: format!("failed to spawn `{}`: {e}", self.tool.display()),
        })?;
        if !output.success() {
            return Err(LinkError::Analyzer {
                module,
                message: format!(
                    "`{}` exited with {}: {}",
                    self.tool.display(),
                    output.status,
                    output.stderr.trim()
                ),
            });
        }
        Ok(output.stdout)
    }
}

/// Interpret the analyzer's report into a set of module names.
///
/// Recognized line shape: `<origin> -> <package> <provider-or-"not found">`.
/// Unrecognized lines are logged and skipped.
pub fn parse_report(
    mref: &ModuleRef,
    report: &str,
    exporter_of: &dyn Fn(&str) -> Option<String>,
) -> BTreeSet<String> {
    let own_file = mref.file_name();
    let mut dependencies = BTreeSet::new();

    for line in report.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((_, rhs)) = line.split_once("->") else {
            debug!(module = %mref.name, line, "ignoring analyzer line");
            continue;
        };
        let rhs = rhs.trim();
        let Some((package, provider)) = rhs.split_once(char::is_whitespace) else {
            debug!(module = %mref.name, line, "ignoring analyzer line without provider");
            continue;
        };
        let provider = provider.trim();

        if DYNAMIC_PACKAGES.contains(package) {
            debug!(module = %mref.name, package, "skipping dynamically bound package");
            continue;
        }

        let target = if provider == "not found" {
            match exporter_of(package) {
                Some(exporter) => exporter,
                None => {
                    warn!(
                        module = %mref.name,
                        package,
                        "no module exports package referenced by analyzer"
                    );
                    continue;
                }
            }
        } else if let Some(inner) = parenthesized_token(provider) {
            inner
        } else if !provider.contains(char::is_whitespace) {
            provider.to_owned()
        } else {
            debug!(module = %mref.name, line, "ignoring analyzer line with odd provider");
            continue;
        };

        // References back into the module's own artifact are not edges.
        if target == own_file || target == mref.name {
            continue;
        }
        dependencies.insert(target);
    }

    dependencies
}

/// Extract `name` from a provider note like `JDK internal API (name)`,
/// provided the parenthesized part is a single token.
fn parenthesized_token(provider: &str) -> Option<String> {
    let open = provider.find('(')?;
    let close = provider[open..].find(')')? + open;
    let inner = provider[open + 1..close].trim();
    if inner.is_empty() || inner.contains(char::is_whitespace) {
        return None;
    }
    Some(inner.to_owned())
}

/// Dependency set of one application module.
///
/// Automatic modules go through the external tool; strict modules read
/// their declared requires. Behavior is parameterized on the flag, not on
/// the artifact shape.
pub fn collect_dependencies(
    mref: &ModuleRef,
    feature_version: u32,
    tool: &dyn DepTool,
    exporter_of: &dyn Fn(&str) -> Option<String>,
) -> LinkResult<BTreeSet<String>> {
    if !mref.automatic {
        return Ok(mref
            .descriptor
            .requires
            .iter()
            .map(|r| r.module.clone())
            .collect());
    }
    let multi_release = mref.multi_release.then_some(feature_version);
    let report = tool.analyze(&mref.location, multi_release)?;
    Ok(parse_report(mref, &report, exporter_of))
}
