use super::shared::{confirm_with, render_progress_bar, tracking_label};
use super::sync_cmd::sync_options;
use super::*;
use fleet_core::lockfile::{lock_path_for, read_holder};
use fleet_core::model::{Head, Tracking};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args.iter().copied()).unwrap()
}

#[test]
fn sync_flags_parse() {
    let cli = parse(&[
        "fleet",
        "sync",
        "--dry-run",
        "--local-update",
        "--autostash",
        "--fail-fast",
        "--jobs",
        "3",
        "--timeout",
        "30",
    ]);
    match cli.command {
        Commands::Sync(args) => {
            assert!(args.dry_run);
            assert!(args.local_update);
            assert!(args.autostash);
            assert!(args.fail_fast);
            assert!(!args.yes);
            assert_eq!(args.run.jobs, Some(3));
            assert_eq!(args.run.timeout, Some(30));
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn global_flags_parse_after_subcommand() {
    let cli = parse(&["fleet", "status", "--json", "--inventory", "/tmp/inv.json", "--dirty"]);
    assert!(cli.global.json);
    assert_eq!(cli.global.inventory, Some(PathBuf::from("/tmp/inv.json")));
    match cli.command {
        Commands::Status(args) => assert!(args.dirty),
        _ => panic!("expected status command"),
    }
}

#[test]
fn remotes_apply_mode_parses() {
    let cli = parse(&["fleet", "remotes", "apply", "--mode", "git", "--yes"]);
    match cli.command {
        Commands::Remotes(RemotesArgs {
            command: RemotesCommands::Apply(args),
        }) => {
            assert_eq!(args.target.mode, ReconcileModeValue::Git);
            assert!(args.yes);
        }
        _ => panic!("expected remotes apply command"),
    }
    let cli = parse(&["fleet", "remotes", "plan"]);
    match cli.command {
        Commands::Remotes(RemotesArgs {
            command: RemotesCommands::Plan(args),
        }) => assert_eq!(args.mode, ReconcileModeValue::Registry),
        _ => panic!("expected remotes plan command"),
    }
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(Cli::try_parse_from(["fleet", "remotes", "plan", "--mode", "both"]).is_err());
}

#[test]
fn config_init_requires_root() {
    assert!(Cli::try_parse_from(["fleet", "config", "init"]).is_err());
    let cli = parse(&["fleet", "config", "init", "--root", "/src", "--root", "/work"]);
    match cli.command {
        Commands::Config(ConfigArgs {
            command: ConfigCommands::Init(args),
        }) => assert_eq!(args.root.len(), 2),
        _ => panic!("expected config init command"),
    }
}

#[test]
fn flags_widen_config_defaults() {
    let cli = parse(&["fleet", "sync", "--push", "--allow-protected", "--clone-missing"]);
    let Commands::Sync(args) = cli.command else {
        panic!("expected sync command");
    };
    let options = sync_options(&FleetConfig::default(), &args);
    assert!(options.push_when_ahead);
    assert!(options.allow_protected);
    assert!(options.clone_missing);
    assert!(!options.local_update);
    assert!(!options.force);
    assert!(options.protected_branches.iter().any(|pattern| pattern == "main"));
}

#[test]
fn prompt_accepts_only_yes() {
    let lines = vec!["example.com/app (/src/app): rebase onto origin/main".to_string()];
    let mut out = Vec::new();
    assert!(confirm_with(&lines, &mut "y\n".as_bytes(), &mut out).unwrap());
    let mut out = Vec::new();
    assert!(!confirm_with(&lines, &mut "\n".as_bytes(), &mut out).unwrap());
    let mut out = Vec::new();
    assert!(!confirm_with(&lines, &mut "".as_bytes(), &mut out).unwrap());
    let mut out = Vec::new();
    assert!(confirm_with(&lines, &mut "maybe\nyes\n".as_bytes(), &mut out).unwrap());
    let shown = String::from_utf8(out).unwrap();
    assert!(shown.contains("rebase onto origin/main"));
    assert!(shown.contains("Please enter y or n."));
}

#[test]
fn progress_bar_fills_proportionally() {
    assert_eq!(render_progress_bar(0, 0, 10), "[]");
    assert_eq!(render_progress_bar(1, 2, 4), "[##--]");
    assert_eq!(render_progress_bar(5, 5, 4), "[####]");
}

#[test]
fn tracking_labels() {
    let mut status = RepositoryStatus::empty("example.com/app", "/src/app");
    assert_eq!(tracking_label(&status), "-");
    status.tracking = Some(Tracking::none());
    assert_eq!(tracking_label(&status), "no upstream");
    status.tracking = Some(Tracking::gone("origin/old"));
    assert_eq!(tracking_label(&status), "gone (origin/old)");
    status.tracking = Some(Tracking::from_counts("origin/main", 1, 2));
    assert_eq!(tracking_label(&status), "diverged +1/-2 (origin/main)");
}

#[test]
fn status_table_marks_detached_and_errors() {
    let mut detached = RepositoryStatus::empty("example.com/a", "/src/a");
    detached.head = Some(Head {
        branch: None,
        detached: true,
    });
    let failed = RepositoryStatus::empty("example.com/b", "/src/b").with_error(
        &fleet_core::error::VcsError::new(fleet_core::error::ErrorClass::Corrupt, "not a repository"),
    );
    let lines = status_table(&[detached, failed]);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("REPO"));
    assert!(lines[1].contains("(detached)"));
    assert!(lines[2].ends_with("[corrupt] not a repository"));
}

#[test]
fn epoch_label_formats_utc() {
    assert_eq!(epoch_to_label(0), "1970-01-01 00:00");
}

#[test]
fn session_honours_path_overrides() {
    let tmp = tempfile::TempDir::new().unwrap();
    let global = GlobalArgs {
        config: Some(tmp.path().join("config.json")),
        inventory: Some(tmp.path().join("inventory.json")),
        json: false,
    };
    let session = Session::open(&global).unwrap();
    assert_eq!(session.config, FleetConfig::default());
    assert_eq!(session.store.path(), tmp.path().join("inventory.json"));
    assert!(session.load_inventory().unwrap().is_empty());

    let lock = session.lock("scan").unwrap();
    let lock_path = lock_path_for(session.store.path());
    assert_eq!(lock.path(), lock_path);
    assert!(RunLock::try_acquire(&lock_path, "status").unwrap().is_none());
    assert!(read_holder(&lock_path).is_some_and(|holder| holder.ends_with(" scan")));
    drop(lock);
}
