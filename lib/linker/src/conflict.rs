//! Package-export conflict resolution.
//!
//! Several application modules may claim the same package (an api jar and
//! its impl jar, a `javax` artifact and its `jakarta` successor). Exactly
//! one module may export a package in the final graph, so a winner is
//! chosen per package, the losers are dropped, and a substitution map
//! records how requires edges must be redirected.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use tracing::{debug, warn};

use modlink_types::{LinkError, LinkResult, ModuleRef};

/// Outcome of conflict resolution.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Loser module name → winner module name.
    pub substitutions: BTreeMap<String, String>,
    /// Package → exporting module, over all surviving application modules.
    pub archives_by_package: BTreeMap<String, String>,
    /// Per-module dependencies added by service-export resolution.
    pub service_requires: BTreeMap<String, BTreeSet<String>>,
    /// Names of dropped modules, for diagnostics.
    pub dropped: Vec<String>,
}

impl Resolution {
    /// Follow the substitution map; names without a substitution pass
    /// through unchanged.
    pub fn substitute<'a>(&'a self, name: &'a str) -> &'a str {
        self.substitutions.get(name).map(String::as_str).unwrap_or(name)
    }
}

/// Packages a module makes visible: the declared exports for strict
/// modules, the full package set for automatic ones.
pub fn effective_exports(mref: &ModuleRef) -> BTreeSet<&str> {
    if mref.automatic {
        mref.descriptor.packages.iter().map(String::as_str).collect()
    } else {
        mref.descriptor.exports.iter().map(|e| e.source.as_str()).collect()
    }
}

/// Detect and resolve export conflicts over the application module set.
///
/// Losers are removed from `app`. Service interfaces of the survivors are
/// then resolved to their exporting module (application first, then
/// platform); an unresolvable service is fatal.
pub fn resolve(
    app: &mut IndexMap<String, ModuleRef>,
    platform_exports: &BTreeMap<String, String>,
) -> LinkResult<Resolution> {
    let mut resolution = Resolution::default();

    let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut names: Vec<&String> = app.keys().collect();
    names.sort();
    for name in names {
        for package in effective_exports(&app[name.as_str()]) {
            claims.entry(package.to_owned()).or_default().push(name.clone());
        }
    }

    for (package, claimants) in &claims {
        if claimants.len() < 2 {
            continue;
        }
        let winner = pick_winner(app, claimants);
        for loser in claimants {
            if loser == &winner {
                continue;
            }
            warn!(
                package = %package,
                winner = %winner,
                loser = %loser,
                "package exported by multiple modules; substituting"
            );
            resolution
                .substitutions
                .entry(loser.clone())
                .or_insert_with(|| winner.clone());
        }
    }

    // A loser may have been picked as another package's winner before it
    // lost; compress chains so substitution always lands on a survivor.
    let keys: Vec<String> = resolution.substitutions.keys().cloned().collect();
    for key in keys {
        let mut target = resolution.substitutions[&key].clone();
        let mut hops = 0;
        while let Some(next) = resolution.substitutions.get(&target) {
            target = next.clone();
            hops += 1;
            if hops > resolution.substitutions.len() {
                break;
            }
        }
        resolution.substitutions.insert(key, target);
    }

    let losers: Vec<String> = resolution.substitutions.keys().cloned().collect();
    for loser in losers {
        if app.shift_remove(&loser).is_some() {
            resolution.dropped.push(loser);
        }
    }

    for (name, mref) in app.iter() {
        for package in effective_exports(mref) {
            resolution
                .archives_by_package
                .entry(package.to_owned())
                .or_insert_with(|| name.clone());
        }
    }

    resolve_service_exports(app, platform_exports, &mut resolution)?;
    debug!(
        substitutions = resolution.substitutions.len(),
        packages = resolution.archives_by_package.len(),
        "conflict resolution complete"
    );
    Ok(resolution)
}

/// Winner priority: `jakarta` prefix, then `javax`, then `java`, then an
/// implementation artifact over its `-api` counterpart, then the first
/// non-automatic module, then the lexicographically first claimant.
/// Claimants arrive name-sorted, which doubles as the tiebreaker.
fn pick_winner(app: &IndexMap<String, ModuleRef>, claimants: &[String]) -> String {
    for prefix in ["jakarta", "javax", "java"] {
        if let Some(name) = claimants.iter().find(|n| n.starts_with(prefix)) {
            return name.clone();
        }
    }
    let is_api = |name: &str| app[name].file_name().contains("-api");
    if claimants.iter().any(|n| is_api(n)) {
        if let Some(name) = claimants.iter().find(|n| !is_api(n)) {
            return name.clone();
        }
    }
    if let Some(name) = claimants.iter().find(|n| !app[n.as_str()].automatic) {
        return name.clone();
    }
    claimants[0].clone()
}

fn resolve_service_exports(
    app: &IndexMap<String, ModuleRef>,
    platform_exports: &BTreeMap<String, String>,
    resolution: &mut Resolution,
) -> LinkResult<()> {
    let mut service_requires: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, mref) in app.iter() {
        for provides in &mref.descriptor.provides {
            let Some((package, _)) = provides.service.rsplit_once('.') else {
                return Err(LinkError::UnresolvedServiceExport {
                    module: name.clone(),
                    service: provides.service.clone(),
                });
            };
            let exporter = resolution
                .archives_by_package
                .get(package)
                .or_else(|| platform_exports.get(package));
            let Some(exporter) = exporter else {
                return Err(LinkError::UnresolvedServiceExport {
                    module: name.clone(),
                    service: provides.service.clone(),
                });
            };
            let exporter = resolution.substitute(exporter).to_owned();
            if exporter != *name {
                service_requires.entry(name.clone()).or_default().insert(exporter);
            }
        }
    }
    resolution.service_requires = service_requires;
    Ok(())
}
