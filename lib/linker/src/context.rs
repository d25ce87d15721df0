//! Link-wide context shared with cooperating emission plugins.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Metadata computed by the resolution phases and consumed during entry
/// emission.
///
/// Built exactly once by the linker before emission begins and passed by
/// reference from there on; there is no process-wide mutable state.
#[derive(Debug, Clone, Default)]
pub struct LinkContext {
    /// Name of the application's main module.
    pub app_module: String,
    /// Package → exporting module, over the surviving application modules.
    pub archives_by_package: BTreeMap<String, String>,
    /// Location of the recorded class-preload list, when one is produced.
    pub preload_list: Option<PathBuf>,
    /// Whether the dependency-injection framework was detected.
    pub uses_framework: bool,
    /// Whether the framework's container API module was detected.
    pub uses_container: bool,
}
