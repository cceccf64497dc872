use super::*;
pub(super) fn handle_scan(
    args: ScanArgs,
    global: &GlobalArgs,
    audit: &AuditLogger,
) -> anyhow::Result<Severity> {
    let result: anyhow::Result<Severity> = (|| {
        let session = Session::open(global)?;
        let roots = if args.root.is_empty() {
            session.config.roots.clone()
        } else {
            args.root.clone()
        };
        if roots.is_empty() {
            anyhow::bail!("no scan roots configured; run `fleet config init --root <dir>` or pass --root");
        }
        let mut exclude = session.config.exclude.clone();
        exclude.extend(args.exclude.iter().cloned());
        let options = DiscoveryOptions {
            roots,
            exclude,
            follow_symlinks: args.follow_symlinks || session.config.follow_symlinks,
        };

        let _lock = session.lock("scan")?;
        let mut inventory = session.load_inventory()?;
        let fleet = session.fleet(&args.run);
        let show = args.run.progress && !global.json;
        let last_len = Cell::new(0usize);
        let mut progress = |progress: Progress<'_, RepositoryStatus>| {
            if show {
                render_progress(
                    "scan",
                    &last_len,
                    progress.done,
                    progress.total,
                    &progress.result.repo_id,
                    status_state(progress.result),
                );
            }
        };
        let report = fleet.scan(&mut inventory, &options, &mut progress)?;
        session.save_inventory(&inventory)?;

        let severity = fleet.context().severity();
        let details = serde_json::json!({
            "found": report.repos.len(),
            "added": report.changes.added.len(),
            "refreshed": report.changes.refreshed.len(),
            "moved": report.changes.moved.len(),
            "missing": report.changes.missing.len(),
            "inventory": inventory.len(),
        });
        let audit_id = audit.record(
            "scan.run",
            audit_status(severity),
            Some("scan"),
            Some(details),
            None,
        )?;

        if global.json {
            print_json(&report)?;
            return Ok(severity);
        }
        for status in report.repos.iter().filter(|status| status.is_failed()) {
            let class = status.error_class.map(|class| class.as_str()).unwrap_or("unknown");
            println!(
                "skipped {} [{class}] {}",
                status.path.display(),
                status.error.as_deref().unwrap_or("")
            );
        }
        for path in &report.changes.added {
            println!("added   {}", path.display());
        }
        for path in &report.changes.moved {
            println!("moved   {}", path.display());
        }
        for path in &report.changes.missing {
            println!("missing {}", path.display());
        }
        println!(
            "Scan: found={} added={} refreshed={} moved={} missing={} inventory={}",
            report.repos.len(),
            report.changes.added.len(),
            report.changes.refreshed.len(),
            report.changes.moved.len(),
            report.changes.missing.len(),
            inventory.len()
        );
        println!("Audit ID: {audit_id}");
        Ok(severity)
    })();

    if let Err(err) = &result {
        let _ = audit.record(
            "scan.run",
            AuditStatus::Failed,
            Some("scan"),
            None,
            Some(&err.to_string()),
        );
    }
    result
}
