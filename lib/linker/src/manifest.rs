//! Jar manifest reading and writing.
//!
//! Only the main attribute section is interpreted; any per-entry sections
//! are carried through opaquely so a rewrite does not lose them.

use indexmap::IndexMap;

/// Manifest entry path inside a jar.
pub const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

/// Main attribute naming an automatic module.
pub const AUTOMATIC_MODULE_NAME: &str = "Automatic-Module-Name";

/// Main attribute flagging a multi-release jar.
pub const MULTI_RELEASE: &str = "Multi-Release";

/// Main attribute naming the launch class.
pub const MAIN_CLASS: &str = "Main-Class";

/// A parsed jar manifest: the main section as ordered attributes, plus the
/// raw remainder (per-entry sections) preserved verbatim.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    attributes: IndexMap<String, String>,
    tail: Vec<u8>,
}

impl Manifest {
    /// Parse manifest bytes. Attribute lines longer than 72 bytes are folded
    /// with leading-space continuation lines; folding is undone here.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut attributes = IndexMap::new();
        let mut logical = String::new();
        let mut consumed = 0usize;

        let mut flush = |logical: &mut String, attributes: &mut IndexMap<String, String>| {
            if let Some((key, value)) = logical.split_once(':') {
                attributes.insert(key.trim().to_owned(), value.trim().to_owned());
            }
            logical.clear();
        };

        for line in text.split_inclusive('\n') {
            let stripped = line.trim_end_matches(['\n', '\r']);
            if stripped.is_empty() {
                flush(&mut logical, &mut attributes);
                consumed += line.len();
                break;
            }
            if let Some(continuation) = stripped.strip_prefix(' ') {
                logical.push_str(continuation);
            } else {
                flush(&mut logical, &mut attributes);
                logical.push_str(stripped);
            }
            consumed += line.len();
        }
        flush(&mut logical, &mut attributes);

        let tail = bytes.get(consumed..).unwrap_or_default().to_vec();
        Manifest { attributes, tail }
    }

    /// Look up a main attribute.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether the jar declares itself multi-release.
    pub fn is_multi_release(&self) -> bool {
        self.get(MULTI_RELEASE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Set (or replace) a main attribute.
    pub fn set(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_owned(), value.to_owned());
    }

    /// Serialize back to manifest bytes, folding long lines at 72 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if !self.attributes.contains_key("Manifest-Version") {
            out.extend_from_slice(b"Manifest-Version: 1.0\r\n");
        }
        for (key, value) in &self.attributes {
            let line = format!("{key}: {value}");
            let mut bytes = line.as_bytes();
            let mut first = true;
            while !bytes.is_empty() {
                let width = if first { 72 } else { 71 };
                let take = bytes.len().min(width);
                if !first {
                    out.push(b' ');
                }
                out.extend_from_slice(&bytes[..take]);
                out.extend_from_slice(b"\r\n");
                bytes = &bytes[take..];
                first = false;
            }
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.tail);
        out
    }
}
