use std::path::Path;
use std::process::ExitCode;

use crate::checker::{CheckError, Permit};
use crate::logger::{sanitize_log_value, Level, Logger};
use crate::shell::{run_shell_command_status, CommandEnv};

pub(crate) const EXIT_FAILURE: i32 = 1;
pub(crate) const EXIT_DISABLED: i32 = 2;
pub(crate) const EXIT_BLOCKED: i32 = 3;

/// Runs the argv handed to it verbatim.
const EXEC_ARGS: &str = "exec \"$@\"";

#[derive(Debug)]
pub(crate) struct Quit {
    pub(crate) code: i32,
    #[allow(dead_code)]
    pub(crate) reason: String,
}

impl Quit {
    pub(crate) fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code as u8)
    }
}

pub(crate) fn quit(logger: &Logger, reason: &str, code: i32) -> Quit {
    let sanitized = if reason.trim().is_empty() {
        "unknown".to_string()
    } else {
        sanitize_log_value(reason)
    };
    logger.log_transition(&format!("quit reason={}", sanitized));
    Quit {
        code,
        reason: reason.to_string(),
    }
}

pub(crate) fn exit_code_for(err: &CheckError) -> i32 {
    match err {
        CheckError::Blocked { .. } => EXIT_BLOCKED,
        CheckError::DisabledByFile { .. } | CheckError::DisabledOnWiki { .. } => EXIT_DISABLED,
        CheckError::MissingStatusPage { .. }
        | CheckError::Wiki(_)
        | CheckError::Persistence(_) => EXIT_FAILURE,
    }
}

pub(crate) fn check_failed(logger: &Logger, err: &CheckError) -> Quit {
    let kind = if err.is_disablement() {
        "denied"
    } else {
        "check_failed"
    };
    quit(logger, &format!("{}:{}", kind, err), exit_code_for(err))
}

pub(crate) fn build_command_env(config_path: &Path, base_dir: &Path, permit: &Permit) -> CommandEnv {
    CommandEnv {
        config_path: config_path.display().to_string(),
        base_dir: base_dir.display().to_string(),
        task: permit.task().map(|slug| slug.to_string()),
    }
}

/// Runs the task command once the check has passed. The permit is consumed so
/// a single check covers a single run.
pub(crate) fn run_task(
    permit: Permit,
    command: &[String],
    env: &CommandEnv,
    logger: &Logger,
) -> Result<(), Quit> {
    let label = match permit.task() {
        Some(slug) => format!("task \"{}\"", slug),
        None => "bot".to_string(),
    };
    if command.is_empty() {
        logger.output(Level::Info, &format!("{} is active", label));
        return Ok(());
    }

    let task_token = permit
        .task()
        .map(|slug| slug.to_string())
        .unwrap_or_else(|| "none".to_string());
    logger.output(Level::Info, &format!("{} is active; starting", label));
    let exit = run_shell_command_status(EXEC_ARGS, "task", &task_token, command, env, logger)
        .map_err(|err| {
            logger.output(Level::Error, &format!("Error while trying to run {}: {}", label, err));
            quit(logger, &format!("task_launch_failed:{}", err), EXIT_FAILURE)
        })?;

    if exit != 0 {
        logger.output(
            Level::Error,
            &format!("{} failed with exit code {}", label, exit),
        );
        return Err(quit(logger, &format!("task_failed:{}", exit), exit));
    }
    logger.output(Level::Info, &format!("{} finished successfully", label));
    Ok(())
}
