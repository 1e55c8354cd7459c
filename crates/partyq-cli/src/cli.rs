use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use partyq_core::position::Direction;

#[derive(Parser)]
#[command(name = "partyq")]
#[command(about = "Share a watch-party queue from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the queue database file
    #[arg(long = "db", global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the engine config file (JSON)
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// Act as this session instead of the persisted one
    #[arg(long = "session", global = true, value_name = "ID")]
    pub session_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or join a party
    Party {
        #[command(subcommand)]
        command: PartyCommands,
    },
    /// Add an item to a party queue
    Add {
        /// Party ID
        party: String,
        #[command(subcommand)]
        item: AddCommands,
    },
    /// List a party queue
    List {
        /// Party ID
        party: String,
        /// Include items that were already shown
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move an item past its pending neighbour
    Move {
        /// Party ID
        party: String,
        /// Item ID or unique ID prefix
        item: String,
        #[arg(value_enum)]
        direction: MoveDirection,
    },
    /// Delete an item
    Delete {
        /// Party ID
        party: String,
        /// Item ID or unique ID prefix
        item: String,
    },
    /// Finish the showing item and start the next one
    Advance {
        /// Party ID
        party: String,
    },
    /// Play an item right after the one showing now
    ShowNext {
        /// Party ID
        party: String,
        /// Item ID or unique ID prefix
        item: String,
    },
    /// Replace the text of one of your notes
    EditNote {
        /// Party ID
        party: String,
        /// Item ID or unique ID prefix
        item: String,
        /// New note text
        content: Vec<String>,
    },
    /// Mark a note complete, or reopen it
    Toggle {
        /// Party ID
        party: String,
        /// Item ID or unique ID prefix
        item: String,
    },
    /// Reassign evenly spaced positions to a party queue
    Renormalize {
        /// Party ID
        party: String,
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

#[derive(Subcommand)]
pub enum PartyCommands {
    /// Start a new party and join it
    Create {
        /// Party name
        name: String,
        /// Name shown to other members
        #[arg(long, value_name = "NAME", default_value = "Host")]
        display_name: String,
    },
    /// Join an existing party
    Join {
        /// Party ID
        party: String,
        /// Name shown to other members
        #[arg(long, value_name = "NAME", default_value = "Guest")]
        display_name: String,
    },
}

#[derive(Subcommand)]
pub enum AddCommands {
    /// Free-form note
    Note {
        /// Note text
        content: Vec<String>,
    },
    /// Link to a video
    Video {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long, value_name = "URL")]
        thumbnail: Option<String>,
    },
    /// Short text post
    Post {
        url: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Forum thread
    Forum {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        community: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Image by URL
    Image {
        url: String,
        #[arg(long)]
        caption: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum MoveDirection {
    Up,
    Down,
}

impl From<MoveDirection> for Direction {
    fn from(direction: MoveDirection) -> Self {
        match direction {
            MoveDirection::Up => Self::Up,
            MoveDirection::Down => Self::Down,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Self::Bash,
            CompletionShell::Zsh => Self::Zsh,
            CompletionShell::Fish => Self::Fish,
        }
    }
}
