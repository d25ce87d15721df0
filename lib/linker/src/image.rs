//! Image assembly seam.
//!
//! The linker core produces entries; an [`ImageBuilder`] owns layout and
//! atomicity of the output directory. The default builder writes a runtime
//! directory tree and keeps the write-to-temp-then-rename contract: on any
//! failure no partial image is left at the output path.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use modlink_types::{EntryKind, LinkError, LinkResult};

/// Consumer of emitted module entries.
pub trait ImageBuilder {
    /// Add one entry to the image.
    fn add_entry(
        &mut self,
        module: &str,
        pool_name: &str,
        kind: EntryKind,
        content: &mut dyn Read,
        size: u64,
    ) -> LinkResult<()>;

    /// Finalize the image and return its location.
    fn build(&mut self) -> LinkResult<PathBuf>;
}

/// Default builder: stages a runtime directory next to the output path and
/// renames it into place on success.
pub struct DirImageBuilder {
    out: PathBuf,
    staging: Option<TempDir>,
    strip_debug: bool,
}

impl DirImageBuilder {
    /// Stage an image that will be renamed to `out` by [`ImageBuilder::build`].
    pub fn new(out: &Path, strip_debug: bool) -> LinkResult<Self> {
        if out.exists() {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("output path `{}` already exists", out.display()),
            )));
        }
        let parent = out.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".modlink-image-")
            .tempdir_in(parent)?;
        Ok(DirImageBuilder {
            out: out.to_path_buf(),
            staging: Some(staging),
            strip_debug,
        })
    }

    /// Whether debug attributes should be stripped from emitted classes.
    pub fn strip_debug(&self) -> bool {
        self.strip_debug
    }

    fn dest_for(&self, module: &str, pool_name: &str, kind: EntryKind) -> PathBuf {
        let staging = self.staging.as_ref().expect("image already built").path();
        match kind {
            EntryKind::ClassOrResource => staging.join("modules").join(module).join(pool_name),
            EntryKind::Config => staging.join("conf").join(pool_name),
            EntryKind::NativeLib => staging.join("lib").join(pool_name),
            EntryKind::NativeCmd => staging.join("bin").join(pool_name),
            EntryKind::Header => staging.join("include").join(pool_name),
            EntryKind::Legal => staging.join("legal").join(module).join(pool_name),
            EntryKind::Man => staging.join("man").join(pool_name),
        }
    }
}

impl ImageBuilder for DirImageBuilder {
    fn add_entry(
        &mut self,
        module: &str,
        pool_name: &str,
        kind: EntryKind,
        content: &mut dyn Read,
        size: u64,
    ) -> LinkResult<()> {
        let dest = self.dest_for(module, pool_name, kind);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&dest)?;
        let copied = std::io::copy(content, &mut file)?;
        if copied != size {
            debug!(
                module,
                entry = pool_name,
                expected = size,
                actual = copied,
                "entry size differed from its declared size"
            );
        }
        Ok(())
    }

    fn build(&mut self) -> LinkResult<PathBuf> {
        let staging = self
            .staging
            .take()
            .expect("build may only be called once")
            .into_path();
        fs::rename(&staging, &self.out)?;
        Ok(self.out.clone())
    }
}
