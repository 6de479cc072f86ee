use clap::{Parser, Subcommand, ValueEnum};
use lifesync_core::EventKind;

#[derive(Parser)]
#[command(name = "lifesync")]
#[command(about = "Inspect and drive the local-first sync core", version)]
pub struct Cli {
    /// SQLite file holding local storage and entity snapshots.
    #[arg(long, global = true, default_value = "lifesync.db")]
    pub db: String,
    /// JSON config file; defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// Absolute directory for rolling log files.
    #[arg(long, global = true)]
    pub log_dir: Option<String>,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pending events per queue namespace and the consent state.
    Status,
    /// Record one progress event through a fresh client context.
    Track {
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// Deliver pending events, adopting orphaned namespaces first.
    Flush,
    /// Run one pull/merge/push cycle.
    Sync {
        /// `device:<id>` or `account:<id>`.
        #[arg(long)]
        owner: String,
    },
    /// Move device-owned snapshots to a signed-in account.
    Adopt {
        #[arg(long)]
        device: String,
        #[arg(long)]
        account: String,
    },
    Consent {
        #[command(subcommand)]
        cmd: ConsentCmd,
    },
    Version,
}

#[derive(Subcommand)]
pub enum ConsentCmd {
    Enable,
    Decline,
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    View,
    Start,
    Complete,
    Bookmark,
    Unbookmark,
}

impl From<KindArg> for EventKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::View => EventKind::View,
            KindArg::Start => EventKind::Start,
            KindArg::Complete => EventKind::Complete,
            KindArg::Bookmark => EventKind::Bookmark,
            KindArg::Unbookmark => EventKind::Unbookmark,
        }
    }
}
