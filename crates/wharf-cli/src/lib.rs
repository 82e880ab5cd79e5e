//! Wharf CLI Library
//!
//! Command-line interface for warehouse administration and bulk transfers:
//!
//! - **Transfers**: stage a source table or query in object storage and bulk
//!   load it into the warehouse (`wharf transfer`)
//! - **Field mappings**: generate a jsonpaths document from a sample JSON
//!   file (`wharf jsonpaths`)
//! - **User administration**: emit or execute CREATE USER batches
//!   (`wharf create-user`)

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Wharf - warehouse admin and bulk-transfer tool
#[derive(Parser, Debug)]
#[command(name = "wharf")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transfer a source table or query result into the warehouse
    Transfer(TransferArgs),

    /// Generate a field-mapping document from a sample JSON file
    Jsonpaths {
        /// Path to a JSON file holding one sample document
        file: PathBuf,

        /// Array index to use for every array encountered
        #[arg(long)]
        index: Option<usize>,
    },

    /// Emit (or execute) a CREATE USER statement batch
    CreateUser(CreateUserArgs),
}

/// Arguments for `wharf transfer`
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Source table to export (mutually exclusive with --query)
    #[arg(long)]
    pub table: Option<String>,

    /// Source query to export (mutually exclusive with --table)
    #[arg(long)]
    pub query: Option<String>,

    /// Destination table in the warehouse; must already exist
    #[arg(long)]
    pub destination: String,

    /// Object-storage bucket for staged chunks
    #[arg(long, env = "WHARF_BUCKET")]
    pub bucket: String,

    /// Key prefix under the bucket
    #[arg(long, env = "WHARF_KEY_PREFIX", default_value = "")]
    pub prefix: String,

    /// Number of chunks to stage for parallel loading
    #[arg(long, default_value_t = 32)]
    pub slices: usize,

    /// Directory for local staging artifacts
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Keep staged storage objects when the transfer fails
    #[arg(long)]
    pub keep_storage_on_failure: bool,

    /// Keep local staging artifacts after the transfer
    #[arg(long)]
    pub keep_local: bool,

    /// Source database connection URL
    #[arg(long, env = "SOURCE_DATABASE_URL")]
    pub source_url: String,

    /// Cap on source objects referenced by a single load statement
    #[arg(long, default_value_t = 64)]
    pub manifest_max_entries: usize,
}

/// Arguments for `wharf create-user`
#[derive(Args, Debug)]
pub struct CreateUserArgs {
    /// Name of the user account
    pub name: String,

    /// Password for the account; a strong one is generated when omitted
    #[arg(long)]
    pub password: Option<String>,

    /// Allow the new account to create databases
    #[arg(long)]
    pub createdb: bool,

    /// Create a superuser with all database privileges
    #[arg(long)]
    pub createuser: bool,

    /// Existing group the user will belong to (repeatable)
    #[arg(long = "group")]
    pub groups: Vec<String>,

    /// Absolute time after which the password is no longer valid
    #[arg(long)]
    pub valid_until: Option<String>,

    /// Execute the batch against the warehouse instead of printing it
    #[arg(long)]
    pub execute: bool,
}
