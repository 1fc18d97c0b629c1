use clap::{Parser, Subcommand, ValueEnum};

use crate::records::ItemKind;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory (defaults to ~/.local/share/findfuse)
    #[clap(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum KindArg {
    Lost,
    Found,
}

impl From<KindArg> for ItemKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Lost => ItemKind::Lost,
            KindArg::Found => ItemKind::Found,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum VerdictArg {
    /// Confirm the match
    Up,
    /// Dismiss the match
    Down,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account and log in
    Signup {
        #[clap(long)]
        name: String,

        #[clap(long)]
        email: String,

        #[clap(long)]
        password: String,
    },

    /// Log in with an existing account
    Login {
        #[clap(long)]
        email: String,

        #[clap(long)]
        password: String,
    },

    /// Log out
    Logout {},

    /// Show the logged-in user
    Whoami {},

    /// Report a lost or found item
    Report {
        /// Whether the item was lost or found
        kind: KindArg,

        /// Item name
        #[clap(short, long)]
        name: String,

        /// Free-text description
        #[clap(short, long, default_value = "")]
        description: String,

        /// Category, e.g. "Bags" or "Electronics"
        #[clap(short, long, default_value = "")]
        category: String,

        /// Brand, if known
        #[clap(short, long)]
        brand: Option<String>,

        /// Date the item was lost/found
        #[clap(long, default_value = "")]
        date: String,

        /// Approximate time
        #[clap(long, default_value = "")]
        time: String,

        /// Where the item was lost/found
        #[clap(short, long, default_value = "")]
        location: String,

        /// Path to a photo of the item
        #[clap(long)]
        image: Option<String>,

        /// Distinctive marks only the owner would know
        #[clap(long)]
        identifying_features: Option<String>,

        /// A reward is offered
        #[clap(long, default_value = "false")]
        reward: bool,

        /// Comma-separated keywords
        #[clap(short, long)]
        keywords: Option<String>,
    },

    /// Search reports by text or image
    Search {
        /// Free-text query
        query: Option<String>,

        /// Path to an image to search by instead
        #[clap(long)]
        image: Option<String>,

        /// Anchor item id: narrows the scope to the opposite collection and
        /// persists displayed hits as pending matches
        #[clap(long)]
        item: Option<String>,
    },

    /// Scan for match candidates for an existing report
    Candidates {
        item_id: String,
    },

    /// List matches referencing an item
    Matches {
        item_id: String,
    },

    /// Confirm or dismiss a proposed match
    Feedback {
        match_id: String,
        verdict: VerdictArg,
    },

    /// Message the other party of a match (implicitly approves it)
    Contact {
        match_id: String,
        item_id: String,
        message: String,
    },

    /// List notifications for the logged-in user, newest first
    Notifications {},

    /// Mark a notification as read
    MarkRead {
        id: String,
    },

    /// Start findfuse as a service
    Daemon {},
}
