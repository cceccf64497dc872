use super::*;
pub(super) fn handle_prune(
    args: PruneArgs,
    global: &GlobalArgs,
    audit: &AuditLogger,
) -> anyhow::Result<Severity> {
    let result: anyhow::Result<Severity> = (|| {
        let session = Session::open(global)?;
        let threshold = match args.older_than_days {
            Some(days) => Duration::from_secs(days.saturating_mul(86_400)),
            None => session.config.stale_after(),
        };
        let _lock = session.lock("prune")?;
        let mut inventory = session.load_inventory()?;
        let fleet = session.fleet(&RunArgs::default());

        let removed = if args.dry_run {
            let mut preview = inventory.clone();
            fleet.prune(&mut preview, threshold)
        } else {
            let removed = fleet.prune(&mut inventory, threshold);
            session.save_inventory(&inventory)?;
            removed
        };

        audit.record(
            "prune.run",
            AuditStatus::Ok,
            Some("prune"),
            Some(serde_json::json!({
                "removed": removed.len(),
                "dry_run": args.dry_run,
                "threshold_secs": threshold.as_secs(),
            })),
            None,
        )?;

        if global.json {
            print_json(&removed)?;
            return Ok(Severity::Ok);
        }
        let verb = if args.dry_run { "would remove" } else { "removed" };
        for entry in &removed {
            println!(
                "{verb} {} ({}) last seen {}",
                entry.repo_id,
                entry.path.display(),
                epoch_to_label(entry.last_seen)
            );
        }
        println!("Prune: {verb}={} remaining={}", removed.len(), inventory.len());
        Ok(Severity::Ok)
    })();

    if let Err(err) = &result {
        let _ = audit.record(
            "prune.run",
            AuditStatus::Failed,
            Some("prune"),
            None,
            Some(&err.to_string()),
        );
    }
    result
}
