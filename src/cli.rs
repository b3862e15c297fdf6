use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::scope::TaskSlug;

#[derive(Debug, Parser)]
#[command(
    name = "jogobot",
    about = "Checks whether the bot, or one of its tasks, is allowed to run.",
    long_about = "Before a task runs, jogobot checks the wiki account's block state, the local disable markers and the on-wiki status pages. Negative results are mailed to the operators and exit non-zero; with `check`, a command given after `--` only runs when the check passes.\n\nExit codes: 0 permitted, 1 error, 2 disabled, 3 blocked.",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    /// Load configuration from PATH instead of ~/.config/jogobot.yml.
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        value_name = "PATH",
        help = "Load configuration from PATH instead of ~/.config/jogobot.yml."
    )]
    pub(crate) config: Option<PathBuf>,

    /// Task slug to check in addition to the whole bot.
    #[arg(
        short = 't',
        long = "task",
        global = true,
        value_name = "TASK",
        help = "Task slug to check in addition to the whole bot."
    )]
    pub(crate) task: Option<String>,

    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    #[command(about = "Check the bot (and task) and optionally run a command when permitted.")]
    /// Check the bot (and task) and optionally run a command when permitted.
    Check(CheckArgs),
    #[command(about = "Show marker, status page and block state without escalating.")]
    /// Show marker, status page and block state without escalating.
    Status,
    #[command(about = "Create the disable marker for the bot or the given task.")]
    /// Create the disable marker for the bot or the given task.
    Disable,
}

#[derive(Debug, Default, Args)]
pub(crate) struct CheckArgs {
    /// Skip the account block check (for runs that do not edit).
    #[arg(long = "readonly")]
    pub(crate) readonly: bool,

    /// Command to run once the check passes.
    #[arg(value_name = "COMMAND", last = true)]
    pub(crate) run: Vec<String>,
}

pub(crate) fn parse_task(raw: Option<&str>) -> Result<Option<TaskSlug>, String> {
    raw.map(|value| {
        TaskSlug::try_from(value).map_err(|err| format!("Invalid -t/--task value: {}.", err))
    })
    .transpose()
}
