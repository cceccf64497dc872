use super::status_cmd::collect_status;
use super::*;
pub(super) fn handle_remotes(
    args: RemotesArgs,
    global: &GlobalArgs,
    audit: &AuditLogger,
) -> anyhow::Result<Severity> {
    let (target, apply, yes) = match args.command {
        RemotesCommands::Plan(target) => (target, false, false),
        RemotesCommands::Apply(args) => (args.target, true, args.yes),
    };
    let mode: ReconcileMode = target.mode.into();
    let event = if apply { "remotes.apply" } else { "remotes.plan" };

    let result: anyhow::Result<Severity> = (|| {
        let session = Session::open(global)?;
        let _lock = session.lock("remotes")?;
        let mut inventory = session.load_inventory()?;
        let run = RunArgs::default();
        let fleet = session.fleet(&run);
        let report = collect_status(&fleet, &mut inventory, &target.filter.to_filter(), &run, global)?;
        let plans = fleet.plan_remote_reconcile(&inventory, &report, mode);

        if !apply {
            session.save_inventory(&inventory)?;
            audit.record(
                event,
                AuditStatus::Ok,
                Some("remotes"),
                Some(serde_json::json!({ "mode": mode.as_str(), "mismatches": plans.len() })),
                None,
            )?;
            print_plans(&plans, mode, global)?;
            return Ok(fleet.context().severity());
        }

        let mut prompt = |lines: &[String]| confirm(lines);
        let mut approval = if yes {
            Approval::Assume
        } else {
            Approval::Prompt(&mut prompt)
        };
        let results = match fleet.apply_remote_reconcile(&plans, mode, &mut approval, &mut inventory) {
            Ok(results) => results,
            Err(FleetError::ConfirmationDeclined) => {
                session.save_inventory(&inventory)?;
                audit.record(
                    event,
                    AuditStatus::Skipped,
                    Some("remotes"),
                    None,
                    Some("confirmation declined"),
                )?;
                anyhow::bail!("remote reconciliation declined; nothing was changed");
            }
            Err(err) => return Err(err.into()),
        };
        session.save_inventory(&inventory)?;

        let severity = fleet.context().severity();
        audit.record(
            event,
            audit_status(severity),
            Some("remotes"),
            Some(serde_json::json!({
                "mode": mode.as_str(),
                "applied": results.iter().filter(|result| result.ok).count(),
                "failed": results.iter().filter(|result| !result.ok).count(),
            })),
            None,
        )?;
        print_results(&results, global)?;
        Ok(severity)
    })();

    if let Err(err) = &result {
        let _ = audit.record(
            event,
            AuditStatus::Failed,
            Some("remotes"),
            None,
            Some(&err.to_string()),
        );
    }
    result
}

fn print_plans(plans: &[RemotePlan], mode: ReconcileMode, global: &GlobalArgs) -> anyhow::Result<()> {
    if global.json {
        return print_json(plans);
    }
    if plans.is_empty() {
        println!("Recorded and live remotes agree.");
        return Ok(());
    }
    for plan in plans {
        println!("{} ({})", plan.repo_id, plan.path.display());
        println!("  current: {}", display_url(&plan.current_value));
        println!("  target:  {}", plan.target_value);
        println!("  action:  {}", plan.action);
    }
    println!("Remotes: mismatches={} mode={mode}", plans.len());
    Ok(())
}

fn print_results(results: &[ReconcileResult], global: &GlobalArgs) -> anyhow::Result<()> {
    if global.json {
        return print_json(results);
    }
    for result in results {
        let state = if result.ok { "ok" } else { "failed" };
        let mut line = format!("{state:<7} {} ({}): {}", result.repo_id, result.path.display(), result.action);
        if let Some(error) = &result.error {
            line.push_str(&format!(" [{}] {error}", result.error_class.map(|class| class.as_str()).unwrap_or("unknown")));
        }
        println!("{line}");
    }
    Ok(())
}

fn display_url(value: &str) -> &str {
    if value.is_empty() { "(none recorded)" } else { value }
}
