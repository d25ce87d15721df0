//! Build a runtime image from an application artifact.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use modlink::{Linker, LinkerConfig};

/// The options for the `modlink link` subcommand.
#[derive(Parser, Debug)]
pub struct Link {
    /// The application artifact to link.
    #[arg(value_name = "APP")]
    app: PathBuf,

    /// Directory of application dependency jars.
    #[arg(long, value_name = "DIR")]
    libs: Option<PathBuf>,

    /// Platform runtime directory (contains jmods/ and release).
    #[arg(long, value_name = "DIR")]
    jdk: PathBuf,

    /// Directory of `<module>-patch.jar` overlays.
    #[arg(long, value_name = "DIR")]
    patches: Option<PathBuf>,

    /// Output image directory. Must not exist yet.
    #[arg(long, value_name = "DIR", default_value = "image")]
    out: PathBuf,

    /// Ask the image builder to strip debug attributes.
    #[arg(long)]
    strip_debug: bool,

    /// Produce a class-preload archive after assembly.
    #[arg(
        long,
        value_name = "BOOL",
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true"
    )]
    cds: bool,
}

impl Link {
    #[cfg(test)]
    pub(crate) fn cds(&self) -> bool {
        self.cds
    }

    /// Runs logic for the `link` subcommand.
    pub fn execute(&self) -> Result<(), anyhow::Error> {
        let mut config = LinkerConfig::new(self.app.clone(), self.jdk.clone(), self.out.clone());
        config.libs = self.libs.clone();
        config.patches = self.patches.clone();
        config.strip_debug = self.strip_debug;
        config.cds = self.cds;

        let outcome = Linker::new(config)
            .link()
            .with_context(|| format!("failed to link `{}`", self.app.display()))?;

        println!(
            "Image for module `{}` written to `{}`.",
            outcome.context.app_module,
            outcome.image.display()
        );
        Ok(())
    }
}
