// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// argtree: inspect and evaluate saved launch-argument trees.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a saved project file as an ASCII tree.
    Tree {
        /// Path to a `*.argtree.json` project file.
        file: PathBuf,
    },
    /// Print the launch configuration the checked items aggregate to.
    Eval {
        /// Path to a `*.argtree.json` project file.
        file: PathBuf,
        /// Project properties for `$(Name)` macro expansion, as NAME=VALUE.
        #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
        defines: Vec<String>,
        /// Skip macro expansion and print raw values.
        #[arg(long)]
        no_macros: bool,
    },
}
