use shell_escape::unix::escape;
use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::logger::{sanitize_log_value, Logger};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) fn render_args(args: &[String]) -> String {
    let mut rendered = String::new();
    for arg in args {
        rendered.push_str(escape(arg.into()).as_ref());
        rendered.push(' ');
    }
    rendered
}

#[derive(Debug, Clone)]
pub(crate) struct CommandEnv {
    pub(crate) config_path: String,
    pub(crate) base_dir: String,
    pub(crate) task: Option<String>,
}

impl CommandEnv {
    pub(crate) fn apply(&self, cmd: &mut Command) {
        cmd.env("JOGOBOT_CONFIG_PATH", &self.config_path);
        cmd.env("JOGOBOT_BASE_DIR", &self.base_dir);
        match &self.task {
            Some(task) => {
                cmd.env("JOGOBOT_TASK", task);
            }
            None => {
                cmd.env_remove("JOGOBOT_TASK");
            }
        }
    }
}

pub(crate) fn run_shell_command_status(
    command: &str,
    log_label: &str,
    task_token: &str,
    args: &[String],
    env: &CommandEnv,
    logger: &Logger,
) -> Result<i32, String> {
    let args_render = render_args(args);
    logger.log_transition(&format!(
        "cmd start label={} task={} mode=bash_lc command={} args={}",
        log_label,
        task_token,
        sanitize_log_value(command),
        sanitize_log_value(&args_render)
    ));

    let mut cmd = Command::new("bash");
    cmd.arg("-lc").arg(command);
    if !args.is_empty() {
        cmd.arg("--");
        cmd.args(args);
    }
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());
    env.apply(&mut cmd);
    let status = cmd
        .status()
        .map_err(|err| format!("Failed to run command '{}': {}", command, err))?;

    let exit_code = status.code().unwrap_or(1);
    logger.log_transition(&format!(
        "cmd exit label={} task={} exit={}",
        log_label, task_token, exit_code
    ));

    Ok(exit_code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BoundedExit {
    Exited(i32),
    /// The child exited cleanly without taking all of its input.
    InputUnread(String),
    TimedOut,
}

/// Runs `command` with `input` on stdin and waits at most `timeout` from spawn
/// for it to finish. A child still running at the deadline is killed.
pub(crate) fn run_with_input_bounded(
    command: &str,
    log_label: &str,
    input: &str,
    timeout: Duration,
    logger: &Logger,
) -> Result<BoundedExit, String> {
    logger.log_transition(&format!(
        "cmd start label={} mode=bash_lc command={} timeout_secs={}",
        log_label,
        sanitize_log_value(command),
        timeout.as_secs()
    ));

    let started = Instant::now();
    let mut child = Command::new("bash")
        .arg("-lc")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|err| format!("Failed to run command '{}': {}", command, err))?;

    // Writing on this thread would block past the deadline once the pipe is full.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_string();
        thread::spawn(move || stdin.write_all(input.as_bytes()))
    });

    let code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(1),
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                logger.log_transition(&format!("cmd exit label={} result=timed_out", log_label));
                return Ok(BoundedExit::TimedOut);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                let _ = child.kill();
                return Err(format!("Failed to wait for command '{}': {}", command, err));
            }
        }
    };

    let exit = match writer {
        Some(handle) if code == 0 => match await_writer(handle, started, timeout) {
            Ok(()) => BoundedExit::Exited(0),
            Err(err) => BoundedExit::InputUnread(err.to_string()),
        },
        _ => BoundedExit::Exited(code),
    };
    logger.log_transition(&format!("cmd exit label={} result={:?}", log_label, exit));
    Ok(exit)
}

// A grandchild may still hold the pipe, so the writer gets the same deadline.
fn await_writer(
    handle: thread::JoinHandle<io::Result<()>>,
    started: Instant,
    timeout: Duration,
) -> io::Result<()> {
    loop {
        if handle.is_finished() {
            return handle.join().unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::Other, "stdin writer panicked"))
            });
        }
        if started.elapsed() >= timeout {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "input not consumed before the deadline",
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

pub(crate) fn command_exists(name: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|path| is_executable(&path.join(name)))
}

/// Whether the program named by the first word of `command` can be launched.
pub(crate) fn program_available(command: &str) -> bool {
    let Some(program) = command.split_whitespace().next() else {
        return false;
    };
    if program.contains('/') {
        return is_executable(Path::new(program));
    }
    command_exists(program)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    // `metadata` follows symlinks, so dangling links read as missing.
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
