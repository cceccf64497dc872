use super::*;
pub(super) fn handle_status(
    args: StatusArgs,
    global: &GlobalArgs,
    audit: &AuditLogger,
) -> anyhow::Result<Severity> {
    let result: anyhow::Result<Severity> = (|| {
        let session = Session::open(global)?;
        let _lock = session.lock("status")?;
        let mut inventory = session.load_inventory()?;
        let fleet = session.fleet(&args.run);
        let filter = StatusFilter {
            dirty_only: args.dirty,
            problems_only: args.problems,
            ..args.filter.to_filter()
        };
        let report = collect_status(&fleet, &mut inventory, &filter, &args.run, global)?;
        session.save_inventory(&inventory)?;

        let severity = fleet.context().severity();
        audit.record(
            "status.run",
            audit_status(severity),
            Some("status"),
            Some(serde_json::json!({
                "repos": report.repos.len(),
                "warnings": report.warnings,
                "failures": report.failures,
            })),
            None,
        )?;

        if global.json {
            print_json(&report)?;
            return Ok(severity);
        }
        if report.repos.is_empty() {
            println!("No matching repositories.");
        } else {
            for line in status_table(&report.repos) {
                println!("{line}");
            }
        }
        println!(
            "Status: repos={} warnings={} failures={}",
            report.repos.len(),
            report.warnings,
            report.failures
        );
        Ok(severity)
    })();

    if let Err(err) = &result {
        let _ = audit.record(
            "status.run",
            AuditStatus::Failed,
            Some("status"),
            None,
            Some(&err.to_string()),
        );
    }
    result
}

/// Shared by `status`, `sync` and `remotes`: one inspection pass with
/// optional progress output.
pub(super) fn collect_status(
    fleet: &Fleet,
    inventory: &mut Inventory,
    filter: &StatusFilter,
    run: &RunArgs,
    global: &GlobalArgs,
) -> anyhow::Result<StatusReport> {
    if inventory.is_empty() {
        warn!("inventory is empty; run `fleet scan` first");
    }
    let show = run.progress && !global.json;
    let last_len = Cell::new(0usize);
    let mut progress = |progress: Progress<'_, RepositoryStatus>| {
        if show {
            render_progress(
                "status",
                &last_len,
                progress.done,
                progress.total,
                &progress.result.repo_id,
                status_state(progress.result),
            );
        }
    };
    Ok(fleet.status(inventory, filter, &mut progress))
}
