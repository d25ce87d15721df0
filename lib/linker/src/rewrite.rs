//! Descriptor rewriting.
//!
//! Every application module gets a replacement descriptor that makes the
//! mixed strict/automatic graph resolvable: automatic modules are turned
//! into open modules exporting everything, strict modules are opened, and
//! requires edges are redirected through the substitution map.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::debug;

use modlink_types::{Descriptor, Exports, LinkError, LinkResult, Modifiers, ModuleRef, Requires};

use crate::descriptor;
use crate::graph::PLATFORM_BASE;

/// Zero-byte marker entry added to every rewritten once-automatic module.
/// Image-assembly plugins use it to recognize such modules at load time.
pub const AUTOMATIC_SENTINEL: &str = "META-INF/an.automatic.module";

/// Build the replacement descriptor for one application module.
///
/// `extra_requires` carries the dependencies discovered by earlier phases
/// (bytecode analysis and service-export resolution), already substituted.
pub fn rewrite_descriptor(
    mref: &ModuleRef,
    substitutions: &BTreeMap<String, String>,
    extra_requires: &BTreeSet<String>,
) -> Descriptor {
    let source = &mref.descriptor;
    let mut rewritten;

    if mref.automatic {
        rewritten = Descriptor::named(&source.name);
        rewritten.modifiers = Modifiers {
            open: true,
            ..Modifiers::default()
        };
        rewritten.version = source.version.clone();
        rewritten.main_class = source.main_class.clone();
        rewritten.target = source.target.clone();
        rewritten.packages = source.packages.clone();
        rewritten.uses = source.uses.clone();
        rewritten.provides = source.provides.clone();
        // Everything is exported; opens would be redundant on an open module.
        for package in &source.packages {
            rewritten.exports.push(Exports::unqualified(package.clone()));
        }
    } else {
        rewritten = source.clone();
        rewritten.modifiers.open = true;
    }

    // Redirect requires through the substitution map, dropping edges that
    // collapse onto the module itself.
    let mut seen = BTreeSet::new();
    let mut requires = Vec::new();
    for mut edge in rewritten.requires {
        if let Some(replacement) = substitutions.get(&edge.module) {
            edge.module = replacement.clone();
            edge.compiled_version = None;
        }
        if edge.module == rewritten.name {
            debug!(
                module = %rewritten.name,
                "dropping requires edge substituted onto the module itself"
            );
            continue;
        }
        if seen.insert(edge.module.clone()) {
            requires.push(edge);
        }
    }
    for extra in extra_requires {
        let target = substitutions.get(extra).unwrap_or(extra);
        if target == &rewritten.name || !seen.insert(target.clone()) {
            continue;
        }
        requires.push(Requires::plain(target.clone()));
    }
    if mref.automatic && seen.insert(PLATFORM_BASE.to_owned()) {
        requires.push(Requires::plain(PLATFORM_BASE));
    }
    rewritten.requires = requires;

    rewritten
}

/// Rewrite a module in place: swap the descriptor and stage the compiled
/// replacement (plus the automatic sentinel) in the overlay map.
pub fn apply(
    mref: &mut ModuleRef,
    substitutions: &BTreeMap<String, String>,
    extra_requires: &BTreeSet<String>,
) -> LinkResult<()> {
    let rewritten = rewrite_descriptor(mref, substitutions, extra_requires);
    let bytes = descriptor::encode(&rewritten)
        .map_err(|source| LinkError::descriptor(mref.name.clone(), source))?;

    let entry = mref.kind.descriptor_entry();
    mref.overlay.insert(entry.to_owned(), bytes);
    if mref.automatic {
        mref.overlay.insert(AUTOMATIC_SENTINEL.to_owned(), Vec::new());
    }

    // The single atomic descriptor swap of the ref's lifecycle.
    mref.descriptor = rewritten;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modlink_types::{ArtifactKind, Opens};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn automatic_ref(name: &str, packages: &[&str]) -> ModuleRef {
        let mut d = Descriptor::named(name);
        d.modifiers.automatic = true;
        for p in packages {
            d.packages.insert((*p).to_owned());
        }
        ModuleRef::new(d, "1.0", PathBuf::from("/libs/a.jar"), ArtifactKind::Jar, true)
    }

    fn strict_ref(name: &str) -> ModuleRef {
        let mut d = Descriptor::named(name);
        d.packages.insert("p.api".into());
        d.exports.push(Exports::unqualified("p.api"));
        d.requires.push(Requires::plain("java.base"));
        ModuleRef::new(d, "1.0", PathBuf::from("/libs/s.jar"), ArtifactKind::Jar, false)
    }

    #[test]
    fn automatic_module_becomes_open_and_exports_everything() {
        let mut mref = automatic_ref("acme.app", &["p.one", "p.two"]);
        mref.descriptor.opens.push(Opens::unqualified("p.one"));
        let extra = ["java.logging".to_owned()].into();
        let rewritten = rewrite_descriptor(&mref, &BTreeMap::new(), &extra);

        assert!(rewritten.modifiers.open);
        assert!(!rewritten.modifiers.automatic);
        assert!(rewritten.opens.is_empty());
        let exported: Vec<&str> = rewritten.exports.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(exported, vec!["p.one", "p.two"]);
        assert!(rewritten.requires_module("java.logging"));
        assert!(rewritten.requires_module("java.base"));
    }

    #[test]
    fn strict_module_is_opened_without_touching_exports() {
        let mref = strict_ref("acme.api");
        let rewritten = rewrite_descriptor(&mref, &BTreeMap::new(), &BTreeSet::new());
        assert!(rewritten.modifiers.open);
        assert_eq!(rewritten.exports, mref.descriptor.exports);
    }

    #[test]
    fn substitution_redirects_and_self_edges_drop() {
        let mut mref = strict_ref("acme.impl");
        mref.descriptor.requires.push(Requires::plain("acme.api"));
        let mut substitutions = BTreeMap::new();
        substitutions.insert("acme.api".to_owned(), "acme.impl".to_owned());
        let rewritten = rewrite_descriptor(&mref, &substitutions, &BTreeSet::new());

        assert!(!rewritten.requires_module("acme.api"));
        assert!(!rewritten.requires_module("acme.impl"));
        assert!(rewritten.requires_module("java.base"));
    }

    #[test]
    fn extra_requires_are_substituted_and_deduplicated() {
        let mref = strict_ref("acme.impl");
        let mut substitutions = BTreeMap::new();
        substitutions.insert("old.dep".to_owned(), "new.dep".to_owned());
        let extra = ["old.dep".to_owned(), "new.dep".to_owned(), "java.base".to_owned()].into();
        let rewritten = rewrite_descriptor(&mref, &substitutions, &extra);

        let count = rewritten.requires.iter().filter(|r| r.module == "new.dep").count();
        assert_eq!(count, 1);
        let count = rewritten.requires.iter().filter(|r| r.module == "java.base").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn apply_stages_overlay_and_sentinel() {
        let mut mref = automatic_ref("acme.app", &["p.one"]);
        apply(&mut mref, &BTreeMap::new(), &BTreeSet::new()).unwrap();

        let blob = &mref.overlay["module-info.class"];
        let decoded = descriptor::decode(blob).unwrap();
        assert_eq!(decoded, mref.descriptor);
        assert!(mref.overlay.contains_key(AUTOMATIC_SENTINEL));
        assert_eq!(mref.overlay[AUTOMATIC_SENTINEL], Vec::<u8>::new());
    }

    #[test]
    fn strict_module_gets_no_sentinel() {
        let mut mref = strict_ref("acme.api");
        apply(&mut mref, &BTreeMap::new(), &BTreeSet::new()).unwrap();
        assert!(!mref.overlay.contains_key(AUTOMATIC_SENTINEL));
    }

    #[test]
    fn rewritten_descriptor_never_requires_itself() {
        let mut mref = automatic_ref("acme.app", &["p.one"]);
        let extra = ["acme.app".to_owned(), "java.base".to_owned()].into();
        apply(&mut mref, &BTreeMap::new(), &extra).unwrap();
        assert!(!mref.descriptor.requires_module("acme.app"));
    }
}
