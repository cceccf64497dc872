use super::status_cmd::collect_status;
use super::*;
pub(super) fn handle_sync(
    args: SyncArgs,
    global: &GlobalArgs,
    audit: &AuditLogger,
) -> anyhow::Result<Severity> {
    let result: anyhow::Result<Severity> = (|| {
        let session = Session::open(global)?;
        let options = sync_options(&session.config, &args);
        let _lock = session.lock("sync")?;
        let mut inventory = session.load_inventory()?;
        let fleet = session.fleet(&args.run);

        let report = collect_status(&fleet, &mut inventory, &args.filter.to_filter(), &args.run, global)?;
        let plan = fleet.plan_sync(&inventory, &report, &options)?;

        if args.dry_run {
            session.save_inventory(&inventory)?;
            audit.record(
                "sync.plan",
                AuditStatus::Ok,
                Some("sync"),
                Some(serde_json::json!({
                    "repos": plan.len(),
                    "mutating": plan.mutating().count(),
                })),
                None,
            )?;
            print_plan(&plan, global)?;
            return Ok(fleet.context().severity());
        }

        let show = args.run.progress && !global.json;
        let last_len = Cell::new(0usize);
        let mut progress = |progress: Progress<'_, SyncResult>| {
            if show {
                render_progress(
                    "sync",
                    &last_len,
                    progress.done,
                    progress.total,
                    &progress.result.repo_id,
                    progress.result.outcome.as_str(),
                );
            }
        };
        let mut prompt = |lines: &[String]| confirm(lines);
        let mut approval = if args.yes {
            Approval::Assume
        } else {
            Approval::Prompt(&mut prompt)
        };
        let run = match fleet.execute_sync(&plan, &options, &mut approval, &mut progress) {
            Ok(run) => run,
            Err(FleetError::ConfirmationDeclined) => {
                session.save_inventory(&inventory)?;
                audit.record(
                    "sync.execute",
                    AuditStatus::Skipped,
                    Some("sync"),
                    None,
                    Some("confirmation declined"),
                )?;
                anyhow::bail!("sync declined; no repository was changed");
            }
            Err(err) => return Err(err.into()),
        };

        let now = epoch_now();
        for result in &run.results {
            if result.outcome == SyncOutcome::Cloned {
                inventory.touch(&result.path, now);
            }
        }
        session.save_inventory(&inventory)?;

        for result in &run.results {
            audit_repo_result(audit, result);
        }
        let severity = fleet.context().severity();
        let audit_id = audit.record(
            "sync.execute",
            audit_status(severity),
            Some("sync"),
            Some(serde_json::to_value(&run.summary)?),
            None,
        )?;
        print_run(&run, global)?;
        if !global.json {
            println!("Audit ID: {audit_id}");
        }
        Ok(severity)
    })();

    if let Err(err) = &result {
        let _ = audit.record(
            "sync.run",
            AuditStatus::Failed,
            Some("sync"),
            None,
            Some(&err.to_string()),
        );
    }
    result
}

/// Config defaults with the command-line switches layered on top. Flags
/// only ever widen what the config allows.
pub(super) fn sync_options(config: &FleetConfig, args: &SyncArgs) -> SyncOptions {
    let mut options = SyncOptions::from_config(config);
    options.local_update |= args.local_update;
    options.autostash |= args.autostash;
    options.push_when_ahead |= args.push;
    options.force |= args.force;
    options.allow_protected |= args.allow_protected;
    options.clone_missing |= args.clone_missing;
    options.stop_on_failure |= args.fail_fast;
    options
}

fn audit_repo_result(audit: &AuditLogger, result: &SyncResult) {
    let status = match result.outcome {
        SyncOutcome::Failed => AuditStatus::Failed,
        SyncOutcome::Aborted => AuditStatus::Skipped,
        outcome if outcome.as_str().starts_with("skipped_") => AuditStatus::Warning,
        _ => AuditStatus::Ok,
    };
    let repo = AuditRepo {
        repo_id: &result.repo_id,
        path: &result.path,
    };
    let details = serde_json::json!({
        "outcome": result.outcome.as_str(),
        "action": result.action,
        "error_class": result.error_class.map(|class| class.as_str()),
    });
    if let Err(err) = audit.record_for_repo(
        "sync.repo",
        status,
        Some("sync"),
        Some(repo),
        Some(details),
        result.error.as_deref(),
    ) {
        warn!(error = %err, "failed to write audit entry");
    }
}

fn print_plan(plan: &SyncPlan, global: &GlobalArgs) -> anyhow::Result<()> {
    if global.json {
        return print_json(plan);
    }
    for repo in &plan.repos {
        println!(
            "{:<26} {} ({}): {}",
            repo.outcome.as_str(),
            repo.repo_id,
            repo.path.display(),
            repo.action()
        );
    }
    println!(
        "Plan: repos={} mutating={} (dry run, nothing executed)",
        plan.len(),
        plan.mutating().count()
    );
    Ok(())
}

fn print_run(run: &SyncRun, global: &GlobalArgs) -> anyhow::Result<()> {
    if global.json {
        return print_json(run);
    }
    for result in &run.results {
        let mut line = format!(
            "{:<26} {} ({})",
            result.outcome.as_str(),
            result.repo_id,
            result.path.display()
        );
        if let Some(error) = &result.error {
            let class = result.error_class.map(|class| class.as_str()).unwrap_or("unknown");
            line.push_str(&format!(" [{class}] {error}"));
        }
        println!("{line}");
    }
    let counts = run
        .summary
        .by_outcome
        .iter()
        .map(|(outcome, count)| format!("{outcome}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "Sync: total={} ok={} failed={} aborted={} {counts}",
        run.summary.total, run.summary.ok, run.summary.failed, run.summary.aborted
    );
    Ok(())
}
