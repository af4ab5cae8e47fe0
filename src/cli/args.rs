use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "recast")]
#[command(about = "Video converting chat bot", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the default location
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the bot (default)
    Run,
    /// Decode a file identifier and show what it contains
    Inspect(InspectCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct InspectCliArgs {
    /// Bot-interface file identifier
    pub identifier: String,
    /// Print the analysis as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::parse_from(["recast"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_inspect_args() {
        let cli = Cli::parse_from(["recast", "inspect", "BQACAgI", "--json", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Some(CliCommand::Inspect(args)) => {
                assert_eq!(args.identifier, "BQACAgI");
                assert!(args.json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["recast", "run", "--config", "/etc/recast.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/recast.toml")));
        assert!(matches!(cli.command, Some(CliCommand::Run)));
    }
}
