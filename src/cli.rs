use anyhow::Result;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::crontab::{SystemCrontab, TaskStore};
use crate::error::CronVcError;
use crate::identity::Identity;
use crate::models::Action;
use crate::prompt::TerminalPrompter;
use crate::rcs::RcsTool;
use crate::session::Session;
use crate::storage::SnapshotStore;

#[derive(Parser, Debug)]
#[command(name = "crontab-vc")]
#[command(about = "Maintain your crontab with every change kept under revision control")]
#[command(group(ArgGroup::new("action").required(true)))]
struct Cli {
    #[arg(
        short = 'u',
        value_name = "USER",
        help = "Operate on another user's crontab (not supported)"
    )]
    user: Option<String>,

    #[arg(
        short = 'e',
        group = "action",
        help = "Edit the crontab, reconciling with the versioned copy first"
    )]
    edit: bool,

    #[arg(short = 'l', group = "action", help = "Display the crontab")]
    list: bool,

    #[arg(short = 'r', group = "action", help = "Remove the crontab and record the removal")]
    remove: bool,

    #[arg(
        group = "action",
        value_name = "FILE",
        help = "Install FILE as the crontab ('-' reads stdin)"
    )]
    file: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Config file (default: ~/.config/crontab-vc/config.json)"
    )]
    config: Option<PathBuf>,
}

impl Cli {
    fn action(&self) -> Action {
        if self.edit {
            Action::Edit
        } else if self.list {
            Action::List
        } else if self.remove {
            Action::Remove
        } else {
            // the group is required, so a file is the only thing left
            Action::Install(self.file.clone().unwrap_or_else(|| PathBuf::from("-")))
        }
    }
}

pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    if cli.user.is_some() {
        return Err(CronVcError::UnsupportedUser.into());
    }

    let config = config::load(cli.config.as_deref())?;
    let mut crontab = system_crontab(&config)?;
    let action = cli.action();

    // listing never touches the snapshot tree
    if action == Action::List {
        return crontab.show();
    }

    let identity = Identity::detect(&config)?;
    let store = SnapshotStore::new(
        &config.snapshot_root,
        &identity.host,
        &identity.user,
        &config.extension,
    );
    let mut session = Session::new(
        crontab,
        RcsTool::new(&config.co, &config.ci),
        TerminalPrompter::new(&config.negative_prefix),
        store,
        identity,
    );
    session.run(&action)
}

fn system_crontab(config: &Config) -> Result<SystemCrontab> {
    Ok(SystemCrontab::new(
        &config.crontab,
        config.no_crontab_regex()?,
        config.no_changes_regex()?,
    ))
}
