use super::*;
pub(super) fn handle_config(
    args: ConfigArgs,
    global: &GlobalArgs,
    audit: &AuditLogger,
) -> anyhow::Result<Severity> {
    match args.command {
        ConfigCommands::Init(args) => handle_init(args, global, audit),
        ConfigCommands::Show => handle_show(global),
    }
}

pub(super) fn handle_init(
    args: InitArgs,
    global: &GlobalArgs,
    audit: &AuditLogger,
) -> anyhow::Result<Severity> {
    let result: anyhow::Result<PathBuf> = (|| {
        let session = Session::open(global)?;
        let mut config = session.config;
        for root in args.root {
            let root = std::fs::canonicalize(&root)
                .with_context(|| format!("resolve root {}", root.display()))?;
            if !config.roots.contains(&root) {
                config.roots.push(root);
            }
        }
        for pattern in args.exclude {
            if !config.exclude.contains(&pattern) {
                config.exclude.push(pattern);
            }
        }
        config.save(&session.config_path)?;
        Ok(session.config_path)
    })();

    match &result {
        Ok(path) => {
            let audit_id = audit.record(
                "config.init",
                AuditStatus::Ok,
                Some("config.init"),
                Some(serde_json::json!({ "path": path.display().to_string() })),
                None,
            )?;
            if global.json {
                print_json(&serde_json::json!({ "path": path, "audit_id": audit_id }))?;
            } else {
                println!("Config saved to {}", path.display());
                println!("Audit ID: {audit_id}");
            }
        }
        Err(err) => {
            let _ = audit.record(
                "config.init",
                AuditStatus::Failed,
                Some("config.init"),
                None,
                Some(&err.to_string()),
            );
        }
    }
    result.map(|_| Severity::Ok)
}

fn handle_show(global: &GlobalArgs) -> anyhow::Result<Severity> {
    let session = Session::open(global)?;
    if global.json {
        print_json(&session.config)?;
        return Ok(Severity::Ok);
    }
    println!("config: {}", session.config_path.display());
    println!("inventory: {}", session.store.path().display());
    println!("{}", serde_json::to_string_pretty(&session.config)?);
    Ok(Severity::Ok)
}
