//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

/// Prune DOM elements from a page and every frame reachable within it
#[derive(Parser, Debug)]
#[command(name = "domprune")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Directory with a local .domprune.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pruning session over a page bundle
    Run {
        /// Bundle directory containing bundle.toml
        #[arg(value_hint = ValueHint::DirPath)]
        bundle: PathBuf,

        /// Selector to prune (repeatable; default: read from the store)
        #[arg(short, long = "selector")]
        selectors: Vec<String>,

        /// Selector store file (default: store_path setting)
        #[arg(long, value_hint = ValueHint::FilePath)]
        store: Option<PathBuf>,

        /// Write pruned documents to this directory
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        output: Option<PathBuf>,

        /// Use virtual time instead of waiting in real time
        #[arg(long)]
        fast: bool,

        /// Do not dispatch to the remote executor
        #[arg(long)]
        no_remote: bool,

        /// Passive path: only documents matching passive_prefixes prune themselves
        #[arg(long)]
        passive: bool,
    },

    /// Show how selectors are parsed
    Parse {
        /// Raw selectors (default: read from the store)
        selectors: Vec<String>,

        /// Selector store file (default: store_path setting)
        #[arg(long, value_hint = ValueHint::FilePath)]
        store: Option<PathBuf>,
    },

    /// Show the frame tree of a page bundle
    Tree {
        /// Bundle directory containing bundle.toml
        #[arg(value_hint = ValueHint::DirPath)]
        bundle: PathBuf,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Show config file locations
    Path,
    /// Write a config template
    Init {
        /// Write the global config instead of the local one
        #[arg(short, long)]
        global: bool,
    },
}
