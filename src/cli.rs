mod help_text;

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::Level;

/// Track file identity across two trees and replay renames on the stale side
#[derive(Parser, Debug)]
#[command(name = "renametree", version, about, long_about = help_text::ROOT_LONG_ABOUT)]
pub struct Cli {
    /// First root
    #[arg(value_name = "ROOT_A")]
    pub root_a: PathBuf,

    /// Second root
    #[arg(value_name = "ROOT_B")]
    pub root_b: PathBuf,

    /// Report renames without performing them (indices are still updated)
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Treat a new inode at a tracked path as the same file, replaced in place
    #[arg(long)]
    pub associate_changed_inodes: bool,

    /// Leave entries untracked instead of generating a new identity for them
    #[arg(long)]
    pub no_generate: bool,

    /// Do not take identities from the other root for entries at the same path
    #[arg(long)]
    pub no_bootstrap: bool,

    /// Exit with status 1 when conflicts or recoverable errors were found
    #[arg(long)]
    pub strict: bool,

    /// Increase logging (-v info, -vv debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "log_level")]
    pub verbose: u8,

    /// Set the log level explicitly. Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<Level>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
