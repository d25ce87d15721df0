//! Uniform access to module artifacts.
//!
//! An artifact is a directory of classes, a plain jar, or a packaged-module
//! file. All three are presented behind [`Artifact`]; behavior differences
//! hang off the [`ArtifactKind`] tag rather than separate wrapper types.
//! Underlying handles are opened per operation and released on every exit
//! path.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use modlink_types::{ArtifactKind, EntryKind, LinkError, LinkResult};

use crate::manifest::{Manifest, MANIFEST_ENTRY};

/// A single bytes-producing item inside an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Internal path, normalized with forward slashes.
    pub name: String,
    /// Name under which the entry lands in the image pool. For packaged
    /// modules the section prefix (`classes/` and friends) is stripped.
    pub pool_name: String,
    /// Content classification.
    pub kind: EntryKind,
    /// Uncompressed size in bytes.
    pub size: u64,
}

/// A module artifact on disk.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
    kind: ArtifactKind,
}

impl Artifact {
    /// Open an artifact, deriving its kind from the path.
    pub fn open(path: &Path) -> LinkResult<Self> {
        let metadata = std::fs::metadata(path).map_err(|source| LinkError::ArtifactOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let kind = if metadata.is_dir() {
            ArtifactKind::Dir
        } else {
            match path.extension().and_then(|e| e.to_str()) {
                Some("jmod") => ArtifactKind::Packaged,
                _ => ArtifactKind::Jar,
            }
        };
        Ok(Artifact {
            path: path.to_path_buf(),
            kind,
        })
    }

    /// The artifact location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The artifact kind.
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// File name of the artifact, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn archive(&self) -> LinkResult<ZipArchive<File>> {
        let file = File::open(&self.path).map_err(|source| LinkError::ArtifactOpen {
            path: self.path.clone(),
            source,
        })?;
        ZipArchive::new(file).map_err(|e| LinkError::Archive {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// List entries. The sequence is finite and restartable; iteration order
    /// is the archive's own order (directory artifacts are walked in sorted
    /// order to keep runs deterministic).
    pub fn entries(&self) -> LinkResult<Vec<Entry>> {
        match self.kind {
            ArtifactKind::Dir => {
                let mut entries = Vec::new();
                let walk = walkdir::WalkDir::new(&self.path)
                    .sort_by_file_name()
                    .into_iter();
                for step in walk {
                    let step = step.map_err(|e| LinkError::Scan {
                        dir: self.path.clone(),
                        source: e.into(),
                    })?;
                    if !step.file_type().is_file() {
                        continue;
                    }
                    let relative = step
                        .path()
                        .strip_prefix(&self.path)
                        .expect("walked path is under its root");
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    let size = step.metadata().map(|m| m.len()).unwrap_or(0);
                    entries.push(self.entry_for(name, size));
                }
                Ok(entries)
            }
            ArtifactKind::Jar | ArtifactKind::Packaged => {
                let mut archive = self.archive()?;
                let mut entries = Vec::with_capacity(archive.len());
                for index in 0..archive.len() {
                    let file = archive.by_index(index).map_err(|e| LinkError::Archive {
                        path: self.path.clone(),
                        message: e.to_string(),
                    })?;
                    if file.is_dir() {
                        continue;
                    }
                    let name = file.name().replace('\\', "/");
                    let size = file.size();
                    entries.push(self.entry_for(name, size));
                }
                Ok(entries)
            }
        }
    }

    fn entry_for(&self, name: String, size: u64) -> Entry {
        let (kind, pool_name) = classify(self.kind, &name);
        Entry {
            name,
            pool_name,
            kind,
            size,
        }
    }

    /// An entry descriptor for overlay content that has no same-named
    /// original in the artifact.
    pub(crate) fn synthetic_entry(&self, name: String, size: u64) -> Entry {
        self.entry_for(name, size)
    }

    /// Whether an entry with the given internal name exists.
    pub fn has_entry(&self, name: &str) -> bool {
        match self.kind {
            ArtifactKind::Dir => self.path.join(name).is_file(),
            ArtifactKind::Jar | ArtifactKind::Packaged => match self.archive() {
                Ok(mut archive) => archive.by_name(name).is_ok(),
                Err(_) => false,
            },
        }
    }

    /// Read a whole entry.
    pub fn read(&self, name: &str) -> LinkResult<Vec<u8>> {
        match self.kind {
            ArtifactKind::Dir => {
                std::fs::read(self.path.join(name)).map_err(|source| LinkError::ArtifactOpen {
                    path: self.path.join(name),
                    source,
                })
            }
            ArtifactKind::Jar | ArtifactKind::Packaged => {
                let mut archive = self.archive()?;
                let mut file = archive.by_name(name).map_err(|e| LinkError::Archive {
                    path: self.path.clone(),
                    message: format!("entry `{name}`: {e}"),
                })?;
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    /// Read the compiled descriptor entry, if present.
    pub fn descriptor_bytes(&self) -> LinkResult<Option<Vec<u8>>> {
        let entry = self.kind.descriptor_entry();
        if !self.has_entry(entry) {
            return Ok(None);
        }
        self.read(entry).map(Some)
    }

    /// Read and parse the jar manifest, if present.
    pub fn manifest(&self) -> LinkResult<Option<Manifest>> {
        if !self.has_entry(MANIFEST_ENTRY) {
            return Ok(None);
        }
        let bytes = self.read(MANIFEST_ENTRY)?;
        Ok(Some(Manifest::parse(&bytes)))
    }

    /// Rewrite the artifact as a jar at `target`.
    ///
    /// Entries named in `overlay` are written with the replacement bytes;
    /// entries named in `skip` are left out; overlay entries with no
    /// same-named original are appended in sorted order. Output is
    /// deterministic: fixed timestamps and source entry order.
    pub fn write_as(
        &self,
        target: &Path,
        overlay: &std::collections::BTreeMap<String, Vec<u8>>,
        skip: &std::collections::BTreeSet<String>,
    ) -> LinkResult<()> {
        let file = File::create(target).map_err(|source| LinkError::ArtifactOpen {
            path: target.to_path_buf(),
            source,
        })?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let mut written = std::collections::BTreeSet::new();
        for entry in self.entries()? {
            if skip.contains(&entry.name) {
                continue;
            }
            let bytes = match overlay.get(&entry.name) {
                Some(replacement) => replacement.clone(),
                None => self.read(&entry.name)?,
            };
            writer
                .start_file(entry.name.as_str(), options)
                .map_err(|e| LinkError::Archive {
                    path: target.to_path_buf(),
                    message: e.to_string(),
                })?;
            std::io::Write::write_all(&mut writer, &bytes)?;
            written.insert(entry.name);
        }
        for (name, bytes) in overlay {
            if written.contains(name) || skip.contains(name) {
                continue;
            }
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| LinkError::Archive {
                    path: target.to_path_buf(),
                    message: e.to_string(),
                })?;
            std::io::Write::write_all(&mut writer, bytes)?;
        }
        writer.finish().map_err(|e| LinkError::Archive {
            path: target.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Classify an entry and compute its image-pool name.
fn classify(kind: ArtifactKind, name: &str) -> (EntryKind, String) {
    if kind != ArtifactKind::Packaged {
        return (EntryKind::ClassOrResource, name.to_owned());
    }
    let (section, rest) = match name.split_once('/') {
        Some(split) => split,
        None => return (EntryKind::ClassOrResource, name.to_owned()),
    };
    let kind = match section {
        "classes" => EntryKind::ClassOrResource,
        "conf" => EntryKind::Config,
        "lib" => EntryKind::NativeLib,
        "bin" => EntryKind::NativeCmd,
        "include" => EntryKind::Header,
        "legal" => EntryKind::Legal,
        "man" => EntryKind::Man,
        _ => return (EntryKind::ClassOrResource, name.to_owned()),
    };
    (kind, rest.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_jar;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn jar_entries_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("demo.jar");
        write_jar(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n\r\n"),
                ("com/acme/Foo.class", b"\xca\xfe\xba\xbe"),
            ],
        );
        let artifact = Artifact::open(&jar).unwrap();
        assert_eq!(artifact.kind(), ArtifactKind::Jar);
        let entries = artifact.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "com/acme/Foo.class");
        assert_eq!(entries[1].pool_name, "com/acme/Foo.class");
        assert_eq!(artifact.read("com/acme/Foo.class").unwrap(), b"\xca\xfe\xba\xbe");
    }

    #[test]
    fn packaged_sections_classify_and_strip() {
        let dir = tempfile::tempdir().unwrap();
        let jmod = dir.path().join("java.base.jmod");
        write_jar(
            &jmod,
            &[
                ("classes/java/lang/Object.class", b"x"),
                ("bin/java", b"elf"),
                ("lib/libjvm.so", b"elf"),
                ("conf/net.properties", b"k=v"),
                ("legal/LICENSE", b"gpl2+ce"),
            ],
        );
        let artifact = Artifact::open(&jmod).unwrap();
        assert_eq!(artifact.kind(), ArtifactKind::Packaged);
        let entries = artifact.entries().unwrap();
        let by_name: BTreeMap<&str, &Entry> =
            entries.iter().map(|e| (e.name.as_str(), e)).collect();
        let classes = by_name["classes/java/lang/Object.class"];
        assert_eq!(classes.kind, EntryKind::ClassOrResource);
        assert_eq!(classes.pool_name, "java/lang/Object.class");
        assert_eq!(by_name["bin/java"].kind, EntryKind::NativeCmd);
        assert_eq!(by_name["lib/libjvm.so"].kind, EntryKind::NativeLib);
        assert_eq!(by_name["conf/net.properties"].kind, EntryKind::Config);
        assert_eq!(by_name["legal/LICENSE"].kind, EntryKind::Legal);
    }

    #[test]
    fn dir_entries_walk_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("exploded");
        std::fs::create_dir_all(root.join("com/acme")).unwrap();
        std::fs::write(root.join("com/acme/B.class"), b"b").unwrap();
        std::fs::write(root.join("com/acme/A.class"), b"a").unwrap();
        let artifact = Artifact::open(&root).unwrap();
        let names: Vec<String> = artifact.entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["com/acme/A.class", "com/acme/B.class"]);
    }

    #[test]
    fn write_as_applies_overlay_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("demo.jar");
        write_jar(&jar, &[("a.txt", b"old"), ("b.txt", b"keep"), ("c.txt", b"drop")]);
        let artifact = Artifact::open(&jar).unwrap();

        let mut overlay = BTreeMap::new();
        overlay.insert("a.txt".to_owned(), b"new".to_vec());
        overlay.insert("added.txt".to_owned(), b"extra".to_vec());
        let skip: BTreeSet<String> = ["c.txt".to_owned()].into();

        let out = dir.path().join("out.jar");
        artifact.write_as(&out, &overlay, &skip).unwrap();

        let rewritten = Artifact::open(&out).unwrap();
        assert_eq!(rewritten.read("a.txt").unwrap(), b"new");
        assert_eq!(rewritten.read("b.txt").unwrap(), b"keep");
        assert!(!rewritten.has_entry("c.txt"));
        assert_eq!(rewritten.read("added.txt").unwrap(), b"extra");
    }

    #[test]
    fn write_as_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("demo.jar");
        write_jar(&jar, &[("a.txt", b"one"), ("b.txt", b"two")]);
        let artifact = Artifact::open(&jar).unwrap();
        let overlay = BTreeMap::new();
        let skip = BTreeSet::new();
        let out1 = dir.path().join("out1.jar");
        let out2 = dir.path().join("out2.jar");
        artifact.write_as(&out1, &overlay, &skip).unwrap();
        artifact.write_as(&out2, &overlay, &skip).unwrap();
        assert_eq!(std::fs::read(out1).unwrap(), std::fs::read(out2).unwrap());
    }

    #[test]
    fn missing_artifact_is_an_open_error() {
        let err = Artifact::open(Path::new("/nonexistent/nowhere.jar")).unwrap_err();
        assert!(matches!(err, LinkError::ArtifactOpen { .. }));
    }
}
