use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "omni", version, about = "Incremental media library scanner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML, YAML or JSON); defaults to config.toml in
    /// the platform configuration directory
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Fingerprint database; overrides the configuration
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// More logging (-v for debug, -vv for trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan a library directory and record what changed
    Scan(ScanArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Library root
    pub path: PathBuf,

    /// Owner of the fingerprints
    #[arg(long)]
    pub user: String,

    /// Category the library belongs to
    #[arg(long)]
    pub category: String,

    /// Only scan files directly inside PATH
    #[arg(long)]
    pub no_recursive: bool,

    /// Worker count (1-16)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub parallel: Option<u8>,

    /// Hash every file in full instead of trusting size and modification time
    #[arg(long)]
    pub verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_arguments() {
        let cli = Cli::try_parse_from([
            "omni", "-vv", "scan", "/srv/tv", "--user", "u1", "--category", "tv", "--parallel", "8", "--no-recursive",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Scan(args) = cli.command;
        assert_eq!(args.path, PathBuf::from("/srv/tv"));
        assert_eq!(args.parallel, Some(8));
        assert!(args.no_recursive);
        assert!(!args.verify);
    }

    #[rstest]
    #[case("0", false)]
    #[case("1", true)]
    #[case("16", true)]
    #[case("17", false)]
    fn test_parallel_is_bounded(#[case] parallel: &str, #[case] accepted: bool) {
        let parsed = Cli::try_parse_from(["omni", "scan", "/srv", "--user", "u", "--category", "c", "--parallel", parallel]);
        assert_eq!(parsed.is_ok(), accepted);
    }
}
