use clap::Parser;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

use crate::app::{
    build_checker, build_status_view, render_status, run_check, run_with_args, run_with_cli,
};
use crate::checker::StatusChecker;
use crate::cli::{parse_task, CheckArgs, Cli, CliCommand};
use crate::config::{load_config, Config};
use crate::logger::Logger;
use crate::notify::fake::RecordingNotifier;
use crate::runner::{EXIT_BLOCKED, EXIT_DISABLED, EXIT_FAILURE};
use crate::scope::{Scope, TaskSlug};
use crate::shell::{command_exists, program_available};
use crate::store::DisableStore;
use crate::wiki::fake::FakeWiki;

pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());
static ORIGINAL_PATH: OnceLock<Option<std::ffi::OsString>> = OnceLock::new();

const GLOBAL_PAGE: &str = "Benutzer:JogoBot/active";
const SORT_PAGE: &str = "Benutzer:JogoBot/sort/active.js";

pub(crate) fn reset_test_env() {
    let original_path = ORIGINAL_PATH.get_or_init(|| env::var_os("PATH"));
    match original_path {
        Some(value) => env::set_var("PATH", value),
        None => env::remove_var("PATH"),
    }
    for key in ["JOGOBOT_CONFIG_PATH", "JOGOBOT_BASE_DIR", "JOGOBOT_TASK"] {
        env::remove_var(key);
    }
}

fn write_config(dir: &Path) -> PathBuf {
    let base_dir = dir.join("base");
    fs::create_dir_all(base_dir.join("sort")).expect("create base dirs");
    let config = format!(
        r#"
base_dir: "{base}"
log_path: "{log}"
wiki:
  api_url: "https://wiki.invalid/w/api.php"
  username: "JogoBot"
mail:
  command: "{dir}/no-such-sendmail"
  fallback_log: "{dir}/undelivered.log"
  to: ["ops@example.org"]
"#,
        base = base_dir.display(),
        log = dir.join("jogobot.log").display(),
        dir = dir.display()
    );
    let path = dir.join("jogobot.yml");
    fs::write(&path, config).expect("write config");
    path
}

fn load(path: &Path) -> Config {
    load_config(path).expect("load config").config
}

fn slug(value: &str) -> TaskSlug {
    TaskSlug::try_from(value).expect("valid slug")
}

fn cli(config: &Path, task: Option<&str>, command: Option<CliCommand>) -> Cli {
    Cli {
        config: Some(config.to_path_buf()),
        task: task.map(|value| value.to_string()),
        command,
    }
}

fn checker<'a>(
    config: &Config,
    wiki: &'a FakeWiki,
    notifier: &'a RecordingNotifier,
    logger: &'a Logger,
) -> StatusChecker<'a, &'a FakeWiki, &'a RecordingNotifier> {
    build_checker(config, wiki, notifier, logger)
}

#[test]
fn clap_parses_check_with_trailing_command() {
    let cli = Cli::try_parse_from([
        "jogobot",
        "-t",
        "sort",
        "check",
        "--readonly",
        "--",
        "python3",
        "sort.py",
        "-always",
    ])
    .expect("parse check");
    assert_eq!(cli.task.as_deref(), Some("sort"));
    match cli.command {
        Some(CliCommand::Check(args)) => {
            assert!(args.readonly);
            assert_eq!(args.run, vec!["python3", "sort.py", "-always"]);
        }
        other => panic!("expected check subcommand, got {other:?}"),
    }

    let cli = Cli::try_parse_from(["jogobot", "disable", "--task", "sort"]).expect("parse");
    assert!(matches!(cli.command, Some(CliCommand::Disable)));
    assert_eq!(cli.task.as_deref(), Some("sort"));

    let cli = Cli::try_parse_from(["jogobot"]).expect("parse bare");
    assert!(cli.command.is_none());
}

#[test]
fn parse_task_rejects_blank_and_nested_slugs() {
    assert_eq!(parse_task(None).expect("none"), None);
    assert_eq!(parse_task(Some(" sort ")).expect("slug"), Some(slug("sort")));
    let err = parse_task(Some("  ")).expect_err("blank slug");
    assert!(err.contains("-t/--task"), "unexpected error: {err}");
    assert!(parse_task(Some("a/b")).is_err());
}

#[test]
fn run_with_args_returns_quit_on_cli_parse_failure() {
    let err = run_with_args(vec!["jogobot".into(), "--bogus".into()])
        .expect_err("expected parse failure");
    assert_eq!(err.reason, "cli_parse");
    assert_ne!(err.code, 0);
}

#[test]
fn missing_config_file_is_reported() {
    let temp = TempDir::new().expect("temp dir");
    let missing = temp.path().join("nope.yml");
    let err = run_with_cli(cli(&missing, None, Some(CliCommand::Disable)))
        .expect_err("expected missing config");
    assert_eq!(err.code, EXIT_FAILURE);
    assert!(err.reason.contains("Missing config file"));
}

#[test]
fn disable_subcommand_creates_marker_idempotently() {
    let temp = TempDir::new().expect("temp dir");
    let config_path = write_config(temp.path());
    let config = load(&config_path);
    let store = DisableStore::new(&config.base_dir);

    run_with_cli(cli(&config_path, Some("sort"), Some(CliCommand::Disable)))
        .expect("disable task");
    assert!(store.is_disabled_by_file(&Scope::Task(slug("sort"))));
    assert!(!store.is_disabled_by_file(&Scope::Global));

    run_with_cli(cli(&config_path, Some("sort"), Some(CliCommand::Disable)))
        .expect("second disable is a no-op");

    let err = run_with_cli(cli(&config_path, Some("unknown"), Some(CliCommand::Disable)))
        .expect_err("task dir missing");
    assert_eq!(err.code, EXIT_FAILURE);
    assert!(err.reason.starts_with("disable_failed:"));

    let log = fs::read_to_string(temp.path().join("jogobot.log")).expect("read log");
    assert!(log.contains("quit reason=disable_failed:"));
}

#[test]
fn denied_check_maps_to_exit_codes_and_skips_command() {
    let _guard = ENV_MUTEX.lock().unwrap();
    reset_test_env();

    let temp = TempDir::new().expect("temp dir");
    let config_path = write_config(temp.path());
    let config = load(&config_path);
    let logger = Logger::new(None);
    let notifier = RecordingNotifier::default();
    let witness = temp.path().join("ran");
    let args = CheckArgs {
        readonly: false,
        run: vec!["touch".to_string(), witness.display().to_string()],
    };

    let wiki = FakeWiki::default()
        .with_page(GLOBAL_PAGE, "true")
        .with_page(SORT_PAGE, "false");
    let err = run_check(
        &checker(&config, &wiki, &notifier, &logger),
        &config_path,
        &config.base_dir,
        Some(&slug("sort")),
        &args,
        &logger,
    )
    .expect_err("disabled task");
    assert_eq!(err.code, EXIT_DISABLED);
    assert!(err.reason.starts_with("denied:"), "got {}", err.reason);

    let wiki = FakeWiki {
        blocked: true,
        ..FakeWiki::default()
    };
    let err = run_check(
        &checker(&config, &wiki, &notifier, &logger),
        &config_path,
        &config.base_dir,
        None,
        &args,
        &logger,
    )
    .expect_err("blocked account");
    assert_eq!(err.code, EXIT_BLOCKED);

    let wiki = FakeWiki::default();
    let err = run_check(
        &checker(&config, &wiki, &notifier, &logger),
        &config_path,
        &config.base_dir,
        None,
        &args,
        &logger,
    )
    .expect_err("missing status page");
    assert_eq!(err.code, EXIT_FAILURE);
    assert!(err.reason.starts_with("check_failed:"), "got {}", err.reason);

    assert!(!witness.exists(), "command must not run without a permit");
    assert_eq!(notifier.sent.borrow().len(), 2);
}

#[cfg(unix)]
#[test]
fn permitted_check_runs_command_with_task_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    reset_test_env();

    let temp = TempDir::new().expect("temp dir");
    let config_path = write_config(temp.path());
    let config = load(&config_path);
    let logger = Logger::new(None);
    let notifier = RecordingNotifier::default();
    let out = temp.path().join("task.out");
    let wiki = FakeWiki::default()
        .with_page(GLOBAL_PAGE, "true")
        .with_page(SORT_PAGE, "TRUE");

    let args = CheckArgs {
        readonly: false,
        run: vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf '%s|%s' \"$JOGOBOT_TASK\" \"$1\" > \"$2\"".to_string(),
            "sh".to_string(),
            "with space".to_string(),
            out.display().to_string(),
        ],
    };
    run_check(
        &checker(&config, &wiki, &notifier, &logger),
        &config_path,
        &config.base_dir,
        Some(&slug("sort")),
        &args,
        &logger,
    )
    .expect("permitted run");
    assert_eq!(fs::read_to_string(&out).expect("read output"), "sort|with space");

    let failing = CheckArgs {
        readonly: true,
        run: vec!["sh".to_string(), "-c".to_string(), "exit 4".to_string()],
    };
    let err = run_check(
        &checker(&config, &wiki, &notifier, &logger),
        &config_path,
        &config.base_dir,
        Some(&slug("sort")),
        &failing,
        &logger,
    )
    .expect_err("task exit code propagates");
    assert_eq!(err.code, 4);
    assert_eq!(err.reason, "task_failed:4");
    assert!(notifier.sent.borrow().is_empty());
}

#[test]
fn status_report_lists_every_scope_without_side_effects() {
    let temp = TempDir::new().expect("temp dir");
    let config_path = write_config(temp.path());
    let config = load(&config_path);
    let wiki = FakeWiki::default().with_page(GLOBAL_PAGE, "false");

    let (report, failed) = render_status(&build_status_view(&config, &wiki), Some(&slug("sort")));
    assert!(failed);
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "account: not blocked");
    assert_eq!(lines[1], "global: disabled on wiki");
    assert!(
        lines[2].starts_with("task:sort: error: status page"),
        "unexpected line: {}",
        lines[2]
    );

    let store = DisableStore::new(&config.base_dir);
    assert!(!store.is_disabled_by_file(&Scope::Global));
    assert_eq!(wiki.block_queries.get(), 1);
}

#[cfg(unix)]
#[test]
fn command_lookup_requires_executable_files() {
    use std::os::unix::fs::{symlink, PermissionsExt};

    let _guard = ENV_MUTEX.lock().unwrap();
    reset_test_env();

    let temp = TempDir::new().expect("temp dir");
    let bin = temp.path().join("bin");
    fs::create_dir_all(&bin).expect("create bin dir");

    let real = bin.join("sendmail");
    fs::write(&real, "#!/bin/sh\nexit 0\n").expect("write real");
    fs::set_permissions(&real, fs::Permissions::from_mode(0o755)).expect("chmod real");
    let link = bin.join("link");
    symlink(&real, &link).expect("symlink");
    let not_exec = bin.join("not_exec");
    fs::write(&not_exec, "#!/bin/sh\nexit 0\n").expect("write not_exec");
    fs::set_permissions(&not_exec, fs::Permissions::from_mode(0o644)).expect("chmod");
    fs::create_dir_all(bin.join("dircmd")).expect("create dircmd");
    symlink(bin.join("missing-target"), bin.join("dangling")).expect("symlink dangling");

    env::set_var("PATH", bin.display().to_string());
    assert!(command_exists("sendmail"));
    assert!(command_exists("link"));
    assert!(!command_exists("not_exec"));
    assert!(!command_exists("dircmd"));
    assert!(!command_exists("dangling"));

    assert!(program_available("sendmail -t -oi"));
    assert!(program_available(&format!("{} -t", real.display())));
    assert!(!program_available(&format!("{} -t", not_exec.display())));
    assert!(!program_available("   "));

    env::remove_var("PATH");
    assert!(!command_exists("sendmail"));

    reset_test_env();
}

#[test]
fn sample_config_loads_and_validates() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("sample_configuration")
        .join("jogobot.yml");
    let loaded = load_config(&path).expect("sample config should load");
    assert!(loaded.warnings.is_empty());
    assert_eq!(loaded.config.wiki.username, "JogoBot");
    assert_eq!(loaded.config.mail.timeout_secs, 30);
}
