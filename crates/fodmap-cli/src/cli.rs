use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fodmap_core::Outcome;

#[derive(Parser)]
#[command(name = "myfodmap")]
#[command(about = "Track which foods you tolerate, with Google Drive backup")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Directory holding the local document (overrides MYFODMAP_DATA_DIR)
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Treat the network as unavailable; nothing is sent to Google Drive
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage food categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Manage foods and record outcomes
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Show every food with its tolerance rating
    List {
        /// Only show this category
        #[arg(long, value_name = "NAME")]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the whole document as JSON
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Replace local data with a previously exported document
    Import {
        /// Path to the JSON document
        path: PathBuf,
    },
    /// Connect to Google Drive
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Reconcile local data with Google Drive now
    Sync {
        /// Run the first-connection variant that favours remote data
        #[arg(long)]
        initial: bool,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Delete local data and stored credentials for the profile
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutcomeArg {
    /// Ate it without symptoms
    Tolerated,
    /// Ate it and reacted
    Reaction,
}

impl From<OutcomeArg> for Outcome {
    fn from(value: OutcomeArg) -> Self {
        match value {
            OutcomeArg::Tolerated => Self::Tolerated,
            OutcomeArg::Reaction => Self::Reaction,
        }
    }
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Add a category
    Add { name: String },
    /// Rename a category
    Rename { old_name: String, new_name: String },
    /// Delete a category and every food in it
    Delete { name: String },
    /// List categories
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum FoodCommands {
    /// Add a food to a category
    Add {
        name: String,
        /// Category the food belongs to
        #[arg(short, long, value_name = "NAME")]
        category: String,
    },
    /// Rename a food
    Rename { old_name: String, new_name: String },
    /// Delete a food
    Delete { name: String },
    /// Record one outcome of eating a food
    Log {
        name: String,
        #[arg(value_enum)]
        outcome: OutcomeArg,
    },
    /// Overwrite a food's counts
    Set {
        name: String,
        /// Times eaten
        #[arg(long)]
        total: u32,
        /// Times eaten without a reaction
        #[arg(long)]
        tolerated: u32,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Google OAuth client id (MYFODMAP_CLIENT_ID takes precedence)
        #[arg(long, value_name = "ID")]
        client_id: Option<String>,
        /// Upload after every local change
        #[arg(long, value_name = "BOOL")]
        push_on_mutation: Option<bool>,
        /// Seconds before expiry at which a token is renewed (minimum 60)
        #[arg(long, value_name = "SECONDS")]
        expiry_buffer_seconds: Option<i64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with Google and run the first sync
    Login,
    /// Show connection status
    Status,
    /// Disconnect and clear stored tokens
    Logout,
}
