//! CLI definitions using clap.

use crate::model::House;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Roster - people records with live queries
#[derive(Parser, Debug)]
#[command(name = "roster", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: platform data dir, roster.db)
    #[arg(long, global = true, env = "ROSTER_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,

    /// Apply pending schema migrations
    Migrate,

    /// Add a person
    Add {
        /// Full name
        name: String,

        /// Age in years
        #[arg(long, default_value_t = 30)]
        age: i64,

        /// House (gryffindor, hufflepuff, ravenclaw, slytherin)
        #[arg(long)]
        house: Option<House>,
    },

    /// List people
    List {
        /// Only people in this house
        #[arg(long, conflicts_with = "older_than")]
        house: Option<House>,

        /// Only people older than this age
        #[arg(long)]
        older_than: Option<i64>,
    },

    /// Show one person
    Show {
        /// Person ID
        id: i64,
    },

    /// Change a person's age
    SetAge {
        /// Person ID
        id: i64,

        /// New age
        age: i64,
    },

    /// Delete a person
    Delete {
        /// Person ID
        id: i64,
    },

    /// Apply person commands from stdin, printing the list each time it changes
    ///
    /// Lines: `add <name> [age] [house]`, `set-age <id> <age>`, `delete <id>`.
    Watch {
        /// Stop after this many seconds (default: end of input or Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
}
