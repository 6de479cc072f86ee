mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command, ConsentCmd};
use std::fmt::Display;

/// Failure surfaced to the shell as `<code>: <message>` with exit status 1.
pub struct CliError {
    pub code: &'static str,
    pub message: String,
}

impl CliError {
    pub fn new(code: &'static str, err: impl Display) -> Self {
        Self {
            code,
            message: err.to_string(),
        }
    }
}

pub type CliResult = Result<(), CliError>;

fn main() {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        if let Err(err) = lifesync_core::init_logging(lifesync_core::default_log_level(), log_dir) {
            eprintln!("logging_init_failed: {err}");
        }
    }

    if let Command::Version = cli.cmd {
        println!("lifesync_core version={}", lifesync_core::core_version());
        return;
    }

    let session = match commands::Session::open(&cli.db, cli.config.as_deref()) {
        Ok(session) => session,
        Err(err) => exit_with(err),
    };

    let result = match cli.cmd {
        Command::Status => session.status(),
        Command::Track {
            kind,
            subject,
            path,
        } => session.track(kind.into(), subject, path),
        Command::Flush => session.flush(),
        Command::Sync { owner } => session.sync(&owner),
        Command::Adopt { device, account } => session.adopt(&device, &account),
        Command::Consent { cmd } => match cmd {
            ConsentCmd::Enable => session.consent_enable(),
            ConsentCmd::Decline => session.consent_decline(),
            ConsentCmd::Show => session.consent_show(),
        },
        Command::Version => Ok(()),
    };

    if let Err(err) = result {
        exit_with(err);
    }
}

fn exit_with(err: CliError) -> ! {
    eprintln!("{}: {}", err.code, err.message);
    std::process::exit(1);
}
