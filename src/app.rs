use clap::Parser;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::checker::{StatusChecker, StatusView};
use crate::cli::{parse_task, CheckArgs, Cli, CliCommand};
use crate::config::{load_config, Config};
use crate::logger::{Level, Logger};
use crate::mediawiki::MediaWikiSite;
use crate::notify::{MailNotifier, Notify, Recipients};
use crate::runner::{build_command_env, check_failed, quit, run_task, Quit, EXIT_FAILURE};
use crate::scope::{Scope, TaskSlug};
use crate::store::DisableStore;
use crate::wiki::{WikiSite, WikiStatusSource};

const DEFAULT_CONFIG_REL: &str = ".config/jogobot.yml";

fn home_dir() -> Result<PathBuf, String> {
    env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| "Missing HOME environment variable".to_string())
}

fn usage_error(message: String) -> Quit {
    eprintln!("{}", message);
    Quit {
        code: EXIT_FAILURE,
        reason: message,
    }
}

pub(crate) fn build_checker<'a, S: WikiSite, N: Notify>(
    config: &Config,
    site: S,
    notifier: N,
    logger: &'a Logger,
) -> StatusChecker<'a, S, N> {
    StatusChecker::new(
        &config.wiki.username,
        WikiStatusSource::new(site, &config.wiki),
        DisableStore::new(&config.base_dir),
        notifier,
        Recipients::from_config(&config.mail),
        logger,
    )
}

pub(crate) fn build_status_view<S: WikiSite>(config: &Config, site: S) -> StatusView<S> {
    StatusView::new(
        WikiStatusSource::new(site, &config.wiki),
        DisableStore::new(&config.base_dir),
    )
}

pub(crate) fn run_check<S: WikiSite, N: Notify>(
    checker: &StatusChecker<'_, S, N>,
    config_path: &Path,
    base_dir: &Path,
    task: Option<&TaskSlug>,
    args: &CheckArgs,
    logger: &Logger,
) -> Result<(), Quit> {
    let permit = checker
        .check(task, !args.readonly)
        .map_err(|err| check_failed(logger, &err))?;
    let env = build_command_env(config_path, base_dir, &permit);
    run_task(permit, &args.run, &env, logger)
}

/// One line per fact; the flag is set when any of them could not be determined.
pub(crate) fn render_status<S: WikiSite>(
    view: &StatusView<S>,
    task: Option<&TaskSlug>,
) -> (String, bool) {
    let mut out = String::new();
    let mut failed = false;

    match view.is_blocked() {
        Ok(true) => out.push_str("account: blocked\n"),
        Ok(false) => out.push_str("account: not blocked\n"),
        Err(err) => {
            failed = true;
            out.push_str(&format!("account: error: {}\n", err));
        }
    }
    for scope in Scope::chain(task) {
        match view.inspect(&scope) {
            Ok(status) => out.push_str(&format!("{}: {}\n", scope, status.as_str())),
            Err(err) => {
                failed = true;
                out.push_str(&format!("{}: error: {}\n", scope, err));
            }
        }
    }
    (out, failed)
}

pub(crate) fn run_disable(
    config: &Config,
    task: Option<&TaskSlug>,
    logger: &Logger,
) -> Result<(), Quit> {
    let store = DisableStore::new(&config.base_dir);
    let scope = Scope::for_task(task);
    let marker = store.marker_path(&scope);
    match store.create_disable_file(&scope) {
        Ok(true) => {
            logger.output(
                Level::Info,
                &format!("{} disabled by file {}", scope, marker.display()),
            );
            Ok(())
        }
        Ok(false) => {
            logger.output(
                Level::Info,
                &format!("{} was already disabled by file {}", scope, marker.display()),
            );
            Ok(())
        }
        Err(err) => {
            logger.output(Level::Error, &err.to_string());
            Err(quit(logger, &format!("disable_failed:{}", err), EXIT_FAILURE))
        }
    }
}

pub(crate) fn run_with_cli(cli: Cli) -> Result<(), Quit> {
    let task = parse_task(cli.task.as_deref()).map_err(usage_error)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => home_dir().map_err(usage_error)?.join(DEFAULT_CONFIG_REL),
    };
    if !config_path.is_file() {
        return Err(usage_error(format!(
            "Missing config file: {}",
            config_path.display()
        )));
    }
    let loaded = load_config(&config_path).map_err(usage_error)?;
    let config = loaded.config;
    let logger = Logger::new(config.log_path.clone());
    for key in &loaded.warnings {
        logger.log_transition(&format!("config_unknown_key key={}", key));
    }

    match cli
        .command
        .unwrap_or_else(|| CliCommand::Check(CheckArgs::default()))
    {
        CliCommand::Disable => run_disable(&config, task.as_ref(), &logger),
        CliCommand::Status => {
            let view = build_status_view(&config, MediaWikiSite::new(&config.wiki));
            let (report, failed) = render_status(&view, task.as_ref());
            print!("{}", report);
            if failed {
                return Err(quit(&logger, "status_incomplete", EXIT_FAILURE));
            }
            Ok(())
        }
        CliCommand::Check(args) => {
            let notifier = MailNotifier::new(&config.mail, &logger);
            let checker =
                build_checker(&config, MediaWikiSite::new(&config.wiki), notifier, &logger);
            run_check(
                &checker,
                &config_path,
                &config.base_dir,
                task.as_ref(),
                &args,
                &logger,
            )
        }
    }
}

pub(crate) fn run_with_args(args: Vec<OsString>) -> Result<(), Quit> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            // Rendering clap's error ourselves keeps it capture-friendly in tests.
            eprintln!("{err}");
            return Err(Quit {
                code: err.exit_code(),
                reason: "cli_parse".to_string(),
            });
        }
    };
    run_with_cli(cli)
}

pub(crate) fn main_with_args(args: Vec<OsString>) -> ExitCode {
    match run_with_args(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(quit) => quit.exit_code(),
    }
}

pub(crate) fn main() -> ExitCode {
    main_with_args(env::args_os().collect())
}
