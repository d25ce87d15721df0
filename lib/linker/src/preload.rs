//! Class-preload archive production.
//!
//! Two passes over the freshly built image: run the application once with
//! class-load recording to produce a class list, then run the runtime's
//! archive dumper to compile that list into a shared archive. Both runs
//! suppress stdout; stderr is drained for diagnostics.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use modlink_types::{LinkError, LinkResult};

use crate::process::run_tool;

/// Relative location of the recorded class list inside the image.
pub const CLASS_LIST: &str = "lib/modlink.classlist";

/// Relative location of the compiled preload archive inside the image.
pub const ARCHIVE: &str = "lib/modlink.jsa";

/// Drives the image's own launcher to record and compile preload state.
pub struct PreloadDriver {
    image: PathBuf,
}

impl PreloadDriver {
    /// A driver over a built image directory.
    pub fn new(image: &Path) -> Self {
        PreloadDriver {
            image: image.to_path_buf(),
        }
    }

    fn launcher(&self) -> PathBuf {
        self.image.join("bin").join("java")
    }

    /// Path of the class list inside the image.
    pub fn class_list_path(&self) -> PathBuf {
        self.image.join(CLASS_LIST)
    }

    /// Path of the archive inside the image.
    pub fn archive_path(&self) -> PathBuf {
        self.image.join(ARCHIVE)
    }

    /// First pass: run the application main module with class-load
    /// recording, producing the class list.
    pub fn record_class_list(&self, main_module: &str) -> LinkResult<PathBuf> {
        let list = self.class_list_path();
        let mut command = Command::new(self.launcher());
        command
            .arg(format!("-XX:DumpLoadedClassList={}", list.display()))
            .arg("-m")
            .arg(main_module);
        debug!(module = main_module, list = %list.display(), "recording class-preload list");

        let output = run_tool(&mut command, true)
            .map_err(|e| LinkError::Preload(format!("failed to spawn launcher: {e}")))?;
        if !output.success() {
            return Err(LinkError::Preload(format!(
                "class-list recording exited with {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }
        info!(list = %list.display(), "class-preload list recorded");
        Ok(list)
    }

    /// Second pass: compile the class list into the shared archive.
    pub fn dump_archive(&self, class_list: &Path) -> LinkResult<PathBuf> {
        let archive = self.archive_path();
        let mut command = Command::new(self.launcher());
        command
            .arg("-Xshare:dump")
            .arg(format!("-XX:SharedClassListFile={}", class_list.display()))
            .arg(format!("-XX:SharedArchiveFile={}", archive.display()));
        debug!(archive = %archive.display(), "compiling class-preload archive");

        let output = run_tool(&mut command, true)
            .map_err(|e| LinkError::Preload(format!("failed to spawn launcher: {e}")))?;
        if !output.success() {
            return Err(LinkError::Preload(format!(
                "archive dump exited with {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }
        info!(archive = %archive.display(), "class-preload archive written");
        Ok(archive)
    }
}
