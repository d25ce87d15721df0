//! Bean-archive content indexing.
//!
//! Applications built on the dependency-injection framework expect every
//! bean archive (a jar carrying `META-INF/beans.xml`) to ship a prebuilt
//! content index. Modules that lack one get an index synthesized at link
//! time and staged as an overlay entry.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};

use tracing::{debug, warn};

use modlink_types::{IndexError, LinkResult, ModuleRef};

use crate::artifact::Artifact;
use crate::descriptor::class_name_of;

/// Marker entry identifying a bean archive.
pub const BEANS_ENTRY: &str = "META-INF/beans.xml";

/// Entry under which the content index is stored.
pub const INDEX_ENTRY: &str = "META-INF/jandex.idx";

/// Incremental builder for one module's content index.
pub trait IndexSink {
    /// Digest one class file into the index.
    fn add_class(&mut self, bytes: &[u8]) -> Result<(), IndexError>;
    /// Finish and serialize the index.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, IndexError>;
}

/// Content-index collaborator.
pub trait ClassIndexer {
    /// Start building an index.
    fn begin(&self) -> Box<dyn IndexSink>;
    /// Parse an existing index, returning the indexed class names.
    fn read(&self, bytes: &[u8]) -> Result<Vec<String>, IndexError>;
}

const INDEX_MAGIC: u32 = 0x4D4C_4958; // "MLIX"
const INDEX_VERSION: u16 = 1;

/// Default indexer: records the fully qualified name of every digested
/// class behind a small versioned framing.
#[derive(Debug, Default)]
pub struct ClassNameIndexer;

struct ClassNameSink {
    names: BTreeSet<String>,
}

impl IndexSink for ClassNameSink {
    fn add_class(&mut self, bytes: &[u8]) -> Result<(), IndexError> {
        let name = class_name_of(bytes).map_err(|e| IndexError::BadClassFile(e.to_string()))?;
        self.names.insert(name);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, IndexError> {
        let mut out = Vec::new();
        out.write_u32::<BigEndian>(INDEX_MAGIC).unwrap();
        out.write_u16::<BigEndian>(INDEX_VERSION).unwrap();
        out.write_u32::<BigEndian>(self.names.len() as u32).unwrap();
        for name in &self.names {
            out.write_u16::<BigEndian>(name.len() as u16).unwrap();
            out.write_all(name.as_bytes()).unwrap();
        }
        Ok(out)
    }
}

impl ClassIndexer for ClassNameIndexer {
    fn begin(&self) -> Box<dyn IndexSink> {
        Box::new(ClassNameSink {
            names: BTreeSet::new(),
        })
    }

    fn read(&self, bytes: &[u8]) -> Result<Vec<String>, IndexError> {
        let mut cursor = Cursor::new(bytes);
        let magic = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| IndexError::Malformed("index truncated".into()))?;
        if magic != INDEX_MAGIC {
            return Err(IndexError::Malformed("bad index magic".into()));
        }
        let version = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| IndexError::Malformed("index truncated".into()))?;
        if version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let count = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| IndexError::Malformed("index truncated".into()))?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = cursor
                .read_u16::<BigEndian>()
                .map_err(|_| IndexError::Malformed("index truncated".into()))?
                as usize;
            let mut raw = vec![0u8; len];
            cursor
                .read_exact(&mut raw)
                .map_err(|_| IndexError::Malformed("index truncated".into()))?;
            names.push(
                String::from_utf8(raw)
                    .map_err(|_| IndexError::Malformed("non-UTF-8 class name".into()))?,
            );
        }
        Ok(names)
    }
}

/// Whether the application uses the dependency-injection framework: one
/// module carrying the framework prefix and another carrying the container
/// prefix must both be present.
pub fn detect_framework(
    app: &IndexMap<String, ModuleRef>,
    framework_prefix: &str,
    container_prefix: &str,
) -> (bool, bool) {
    let uses_framework = app.keys().any(|name| name.starts_with(framework_prefix));
    let uses_container = app.keys().any(|name| name.starts_with(container_prefix));
    (uses_framework, uses_container)
}

/// Ensure every bean archive among the application modules carries a valid
/// content index, synthesizing one where it is absent or unreadable.
///
/// Per-class indexing failures are logged and skipped; a bean archive never
/// aborts the link.
pub fn augment(app: &mut IndexMap<String, ModuleRef>, indexer: &dyn ClassIndexer) -> LinkResult<()> {
    for (name, mref) in app.iter_mut() {
        let artifact = Artifact::open(&mref.location)?;
        if !artifact.has_entry(BEANS_ENTRY) {
            continue;
        }
        if artifact.has_entry(INDEX_ENTRY) {
            match artifact.read(INDEX_ENTRY).map(|bytes| indexer.read(&bytes)) {
                Ok(Ok(_)) => {
                    debug!(module = %name, "bean archive already carries a valid index");
                    continue;
                }
                Ok(Err(error)) => {
                    warn!(module = %name, "replacing unreadable bean index: {error}");
                }
                Err(error) => return Err(error),
            }
        }

        let mut sink = indexer.begin();
        let mut indexed = 0usize;
        for entry in artifact.entries()? {
            if !entry.name.ends_with(".class") || entry.name == "module-info.class" {
                continue;
            }
            let bytes = artifact.read(&entry.name)?;
            match sink.add_class(&bytes) {
                Ok(()) => indexed += 1,
                Err(error) => {
                    warn!(module = %name, entry = %entry.name, "not indexing class: {error}");
                }
            }
        }
        let index = sink
            .finish()
            .map_err(|e| modlink_types::LinkError::Archive {
                path: mref.location.clone(),
                message: format!("index serialization failed: {e}"),
            })?;
        debug!(module = %name, classes = indexed, "synthesized bean-archive index");
        mref.overlay.insert(INDEX_ENTRY.to_owned(), index);
    }
    Ok(())
}
