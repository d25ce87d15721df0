//! Argument parsing and exit-code mapping.

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use crate::commands::Link;
use crate::logging;

/// The options for the modlink command line interface.
#[derive(Parser)]
#[command(
    name = "modlink",
    about = "Link a modular application and a platform runtime into a self-contained image.",
    version
)]
struct ModlinkCli {
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a runtime image from an application artifact.
    Link(Link),
}

impl ModlinkCli {
    fn execute(&self) -> Result<(), anyhow::Error> {
        match &self.command {
            Command::Link(link) => link.execute(),
        }
    }
}

/// The main function for the modlink CLI tool.
///
/// Exit codes: 0 on success, 2 on usage errors (via clap), 1 on link
/// failures.
pub fn modlink_main() {
    let options = ModlinkCli::parse();
    logging::initialize_logging(&options.verbosity);

    if let Err(error) = options.execute() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        ModlinkCli::command().debug_assert();
    }

    #[test]
    fn cds_accepts_equals_form() {
        let cli = ModlinkCli::parse_from(["modlink", "link", "app.jar", "--jdk", "/jdk"]);
        let Command::Link(link) = cli.command;
        assert!(link.cds());

        let cli = ModlinkCli::parse_from([
            "modlink",
            "link",
            "app.jar",
            "--jdk",
            "/jdk",
            "--cds=false",
        ]);
        let Command::Link(link) = cli.command;
        assert!(!link.cds());
    }
}
