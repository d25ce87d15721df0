//! End-to-end pipeline tests over synthetic application and platform
//! artifacts, with the external collaborators stubbed.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use modlink::beans::{ClassIndexer, ClassNameIndexer};
use modlink::deps::DepTool;
use modlink::image::ImageBuilder;
use modlink::rewrite::AUTOMATIC_SENTINEL;
use modlink::{descriptor, Linker, LinkerConfig};
use modlink_types::{Descriptor, EntryKind, Exports, LinkResult, Requires};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

fn class_bytes(internal_name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&53u16.to_be_bytes());
    out.extend_from_slice(&3u16.to_be_bytes());
    out.push(1);
    out.extend_from_slice(&(internal_name.len() as u16).to_be_bytes());
    out.extend_from_slice(internal_name.as_bytes());
    out.push(7);
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0x0021u16.to_be_bytes());
    out.extend_from_slice(&2u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out
}

fn strict_descriptor(module: &str, exports: &[&str], requires: &[&str]) -> Descriptor {
    let mut d = Descriptor::named(module);
    for package in exports {
        d.packages.insert((*package).to_owned());
        d.exports.push(Exports::unqualified(*package));
    }
    for target in requires {
        d.requires.push(Requires::plain(*target));
    }
    d
}

fn platform_jmod(jmods: &Path, module: &str, exports: &[&str], requires: &[&str]) {
    let blob = descriptor::encode(&strict_descriptor(module, exports, requires)).unwrap();
    let class = class_bytes("x/X");
    let mut entries: Vec<(String, &[u8])> = vec![("classes/module-info.class".to_owned(), &blob)];
    let class_paths: Vec<String> = exports
        .iter()
        .map(|p| format!("classes/{}/C.class", p.replace('.', "/")))
        .collect();
    for path in &class_paths {
        entries.push((path.clone(), &class));
    }
    // A native launcher stub so non-class entries exist.
    entries.push(("bin/java".to_owned(), b"#!launcher"));
    let borrowed: Vec<(&str, &[u8])> = entries.iter().map(|(n, b)| (n.as_str(), *b)).collect();
    write_jar(&jmods.join(format!("{module}.jmod")), &borrowed);
}

fn strict_jar(path: &Path, module: &str, exports: &[&str], requires: &[&str]) {
    let blob = descriptor::encode(&strict_descriptor(module, exports, requires)).unwrap();
    let mut entries: Vec<(String, Vec<u8>)> = vec![("module-info.class".to_owned(), blob)];
    for package in exports {
        entries.push((
            format!("{}/C.class", package.replace('.', "/")),
            class_bytes(&format!("{}/C", package.replace('.', "/"))),
        ));
    }
    let borrowed: Vec<(&str, &[u8])> =
        entries.iter().map(|(n, b)| (n.as_str(), b.as_slice())).collect();
    write_jar(path, &borrowed);
}

/// Canned analyzer reports keyed by artifact file name.
struct StubTool {
    reports: HashMap<String, String>,
}

impl DepTool for StubTool {
    fn analyze(&self, artifact: &Path, _multi_release: Option<u32>) -> LinkResult<String> {
        let file = artifact.file_name().unwrap().to_string_lossy().into_owned();
        Ok(self.reports.get(&file).cloned().unwrap_or_default())
    }
}

/// Records every emitted entry in order.
#[derive(Default)]
struct MemoryImage {
    entries: Vec<(String, String, EntryKind, Vec<u8>)>,
}

impl ImageBuilder for MemoryImage {
    fn add_entry(
        &mut self,
        module: &str,
        pool_name: &str,
        kind: EntryKind,
        content: &mut dyn Read,
        _size: u64,
    ) -> LinkResult<()> {
        let mut bytes = Vec::new();
        content.read_to_end(&mut bytes)?;
        self.entries
            .push((module.to_owned(), pool_name.to_owned(), kind, bytes));
        Ok(())
    }

    fn build(&mut self) -> LinkResult<PathBuf> {
        Ok(PathBuf::from("<memory>"))
    }
}

impl MemoryImage {
    fn modules(&self) -> Vec<&str> {
        let mut order = Vec::new();
        for (module, _, _, _) in &self.entries {
            if order.last() != Some(&module.as_str()) {
                order.push(module.as_str());
            }
        }
        order
    }

    fn entry(&self, module: &str, pool_name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(m, p, _, _)| m == module && p == pool_name)
            .map(|(_, _, _, bytes)| bytes.as_slice())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: LinkerConfig,
    tool: StubTool,
}

/// An automatic main jar, an automatic util jar, an api/impl export
/// conflict, and a five-module platform.
fn standard_fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let jmods = root.join("jdk/jmods");
    std::fs::create_dir_all(&jmods).unwrap();
    platform_jmod(&jmods, "java.base", &["java.lang", "java.util"], &[]);
    platform_jmod(&jmods, "java.logging", &["java.util.logging"], &["java.base"]);
    platform_jmod(&jmods, "java.xml", &["javax.xml"], &["java.base"]);
    platform_jmod(
        &jmods,
        "java.sql",
        &["java.sql"],
        &["java.base", "java.logging", "java.xml"],
    );
    platform_jmod(&jmods, "jdk.unsupported", &["sun.misc"], &["java.base"]);
    std::fs::write(root.join("jdk/release"), "JAVA_VERSION=\"17.0.2\"\n").unwrap();

    let libs = root.join("libs");
    std::fs::create_dir_all(&libs).unwrap();
    write_jar(
        &libs.join("acme-util-1.0.jar"),
        &[(
            "com/acme/util/Strings.class",
            class_bytes("com/acme/util/Strings").as_slice(),
        )],
    );
    strict_jar(
        &libs.join("com.acme.x-api-1.0.jar"),
        "com.acme.x.api",
        &["com.acme.x"],
        &["java.base"],
    );
    strict_jar(
        &libs.join("com.acme.x-impl-1.0.jar"),
        "com.acme.x.impl",
        &["com.acme.x"],
        &["java.base"],
    );

    let app = root.join("acme-app-1.0.jar");
    write_jar(
        &app,
        &[(
            "com/acme/app/Main.class",
            class_bytes("com/acme/app/Main").as_slice(),
        )],
    );

    let mut reports = HashMap::new();
    reports.insert(
        "acme-app-1.0.jar".to_owned(),
        "\
acme-app-1.0.jar -> java.base
   com.acme.app -> java.util java.base
   com.acme.app -> java.sql java.sql
   com.acme.app -> com.acme.util not found
   com.acme.app -> com.acme.x not found
   com.acme.app -> org.slf4j.impl not found
"
        .to_owned(),
    );
    reports.insert(
        "acme-util-1.0.jar".to_owned(),
        "   com.acme.util -> java.util java.base\n".to_owned(),
    );

    let mut config = LinkerConfig::new(app, root.join("jdk"), root.join("image"));
    config.libs = Some(libs);
    config.cds = false;
    Fixture {
        _dir: dir,
        config,
        tool: StubTool { reports },
    }
}

fn run(fixture: &Fixture) -> MemoryImage {
    let mut image = MemoryImage::default();
    Linker::new(fixture.config.clone())
        .link_with(&mut image, &fixture.tool, &ClassNameIndexer)
        .unwrap();
    image
}

#[test]
fn emits_base_first_then_modules_by_name() {
    let fixture = standard_fixture();
    let image = run(&fixture);
    assert_eq!(
        image.modules(),
        vec![
            "java.base",
            "acme.app",
            "acme.util",
            "com.acme.x.impl",
            "java.logging",
            "java.sql",
            "java.xml",
        ]
    );
}

#[test]
fn platform_closure_covers_transitive_requires_only() {
    let fixture = standard_fixture();
    let image = run(&fixture);
    let modules = image.modules();
    // java.sql pulls logging and xml; nothing pulls jdk.unsupported.
    assert!(modules.contains(&"java.logging"));
    assert!(modules.contains(&"java.xml"));
    assert!(!modules.contains(&"jdk.unsupported"));
}

#[test]
fn automatic_main_requires_discovered_and_sibling_modules() {
    let fixture = standard_fixture();
    let image = run(&fixture);

    let blob = image.entry("acme.app", "module-info.class").unwrap();
    let rewritten = descriptor::decode(blob).unwrap();

    assert!(rewritten.modifiers.open);
    assert!(!rewritten.modifiers.automatic);
    assert!(rewritten.requires_module("java.base"));
    assert!(rewritten.requires_module("java.sql"));
    assert!(rewritten.requires_module("acme.util"));
    // The conflict loser never appears; the winner substitutes it.
    assert!(rewritten.requires_module("com.acme.x.impl"));
    assert!(!rewritten.requires_module("com.acme.x.api"));
    // The dynamically bound logging package produced no edge.
    assert!(!rewritten.requires.iter().any(|r| r.module.contains("slf4j")));
    // Every package of the once-automatic module is exported.
    assert!(rewritten
        .exports
        .iter()
        .any(|e| e.source == "com.acme.app"));
}

#[test]
fn conflict_loser_is_not_emitted() {
    let fixture = standard_fixture();
    let image = run(&fixture);
    assert!(image.modules().iter().all(|m| *m != "com.acme.x.api"));
    assert!(image.entry("com.acme.x.impl", "module-info.class").is_some());
}

#[test]
fn rewritten_strict_module_is_opened() {
    let fixture = standard_fixture();
    let image = run(&fixture);
    let blob = image.entry("com.acme.x.impl", "module-info.class").unwrap();
    let rewritten = descriptor::decode(blob).unwrap();
    assert!(rewritten.modifiers.open);
    assert_eq!(rewritten.exports.len(), 1);
}

#[test]
fn automatic_modules_carry_the_sentinel() {
    let fixture = standard_fixture();
    let image = run(&fixture);
    assert_eq!(image.entry("acme.app", AUTOMATIC_SENTINEL), Some(&[][..]));
    assert_eq!(image.entry("acme.util", AUTOMATIC_SENTINEL), Some(&[][..]));
    assert_eq!(image.entry("com.acme.x.impl", AUTOMATIC_SENTINEL), None);
}

#[test]
fn non_class_entries_precede_classes_within_a_module() {
    let fixture = standard_fixture();
    let image = run(&fixture);
    let kinds: Vec<EntryKind> = image
        .entries
        .iter()
        .filter(|(m, _, _, _)| m == "java.base")
        .map(|(_, _, kind, _)| *kind)
        .collect();
    let first_class = kinds
        .iter()
        .position(|k| *k == EntryKind::ClassOrResource)
        .unwrap();
    assert!(kinds[..first_class]
        .iter()
        .all(|k| *k != EntryKind::ClassOrResource));
    assert!(kinds[first_class..]
        .iter()
        .all(|k| *k == EntryKind::ClassOrResource));
}

#[test]
fn two_runs_emit_identical_sequences() {
    let fixture = standard_fixture();
    let first = run(&fixture);
    let second = run(&fixture);
    assert_eq!(first.entries, second.entries);
}

#[test]
fn requires_of_emitted_modules_stay_inside_the_image() {
    let fixture = standard_fixture();
    let image = run(&fixture);
    let emitted: Vec<&str> = image.modules();
    for module in ["acme.app", "acme.util", "com.acme.x.impl"] {
        let blob = image.entry(module, "module-info.class").unwrap();
        let rewritten = descriptor::decode(blob).unwrap();
        for requires in &rewritten.requires {
            if requires.module.starts_with("java.") || requires.module.starts_with("jdk.") {
                assert!(
                    emitted.contains(&requires.module.as_str()),
                    "{module} requires {} which is not emitted",
                    requires.module
                );
            }
        }
    }
}

#[test]
fn patches_substitute_entries_at_emit_time() {
    let mut fixture = standard_fixture();
    let patches = fixture.config.platform_dir.parent().unwrap().join("patches");
    std::fs::create_dir_all(&patches).unwrap();
    write_jar(
        &patches.join("acme.util-patch.jar"),
        &[("com/acme/util/Strings.class", b"patched bytes")],
    );
    fixture.config.patches = Some(patches);

    let image = run(&fixture);
    assert_eq!(
        image.entry("acme.util", "com/acme/util/Strings.class"),
        Some(b"patched bytes".as_slice())
    );
}

#[test]
fn bean_archive_gets_an_index_when_framework_present() {
    let fixture = standard_fixture();
    let libs = fixture.config.libs.clone().unwrap();

    // Framework + container markers, and a bean archive without an index.
    write_jar(
        &libs.join("weld-se-core-4.0.jar"),
        &[
            (
                "META-INF/MANIFEST.MF",
                b"Automatic-Module-Name: weld.se.core\r\n\r\n".as_slice(),
            ),
            (
                "org/jboss/weld/Weld.class",
                class_bytes("org/jboss/weld/Weld").as_slice(),
            ),
        ],
    );
    write_jar(
        &libs.join("jakarta.enterprise.cdi-api-3.0.jar"),
        &[
            (
                "META-INF/MANIFEST.MF",
                b"Automatic-Module-Name: jakarta.enterprise.cdi\r\n\r\n".as_slice(),
            ),
            (
                "jakarta/enterprise/inject/Any.class",
                class_bytes("jakarta/enterprise/inject/Any").as_slice(),
            ),
        ],
    );
    write_jar(
        &libs.join("acme-beans-1.0.jar"),
        &[
            ("META-INF/beans.xml", b"<beans/>".as_slice()),
            (
                "com/acme/beans/Widget.class",
                class_bytes("com/acme/beans/Widget").as_slice(),
            ),
        ],
    );

    let image = run(&fixture);
    let index = image.entry("acme.beans", "META-INF/jandex.idx").unwrap();
    let names = ClassNameIndexer.read(index).unwrap();
    assert_eq!(names, vec!["com.acme.beans.Widget".to_owned()]);
}
