use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ogresync::handlers::{self, SyncFlags};
use ogresync::logger;

#[derive(Parser)]
#[command(name = "ogresync")]
#[command(about = "Offline-aware git synchronization for note vaults", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a vault for syncing and write the configuration
    Init {
        /// Vault directory
        #[arg(short, long)]
        vault: PathBuf,

        /// Remote git URL
        #[arg(short, long)]
        remote: Option<String>,

        /// Branch to synchronize
        #[arg(short, long, default_value = "main")]
        branch: String,
    },

    /// Pull, open the editor, then commit and push
    Sync {
        /// Do not launch the editor
        #[arg(long)]
        no_editor: bool,

        /// Never prompt; conflict decisions are treated as cancelled
        #[arg(long)]
        non_interactive: bool,
    },

    /// Show repository, network and session status
    Status,

    /// Resolve conflicts with the remote, continuing an unfinished resolution
    Resolve,

    /// Manage safety backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Inspect and clean up sync sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// List backups, newest first
    List {
        /// Maximum number of backups to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Snapshot the whole vault now
    Create {
        /// What the backup is for
        #[arg(short, long, default_value = "Manual backup")]
        description: String,
    },

    /// Delete backups beyond the retention policy
    Cleanup {
        /// Delete every backup regardless of age or count
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List recorded sessions
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Remove resolved sessions
    Cleanup {
        /// Also purge recent resolved sessions
        #[arg(long)]
        aggressive: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logger::init_logger() {
        eprintln!("Warning: could not initialize logging: {:#}", e);
    }

    match cli.command {
        Commands::Init {
            vault,
            remote,
            branch,
        } => handlers::handle_init(&vault, remote.as_deref(), &branch),
        Commands::Sync {
            no_editor,
            non_interactive,
        } => handlers::handle_sync(SyncFlags {
            no_editor,
            non_interactive,
        }),
        Commands::Status => handlers::handle_status(),
        Commands::Resolve => handlers::handle_resolve(),
        Commands::Backup { action } => match action {
            BackupAction::List { limit } => handlers::handle_backup_list(limit),
            BackupAction::Create { description } => handlers::handle_backup_create(&description),
            BackupAction::Cleanup { force } => handlers::handle_backup_cleanup(force),
        },
        Commands::Sessions { action } => match action {
            SessionsAction::List { json } => handlers::handle_sessions_list(json),
            SessionsAction::Cleanup { aggressive } => handlers::handle_sessions_cleanup(aggressive),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => handlers::handle_config_show(),
        },
    }
}
