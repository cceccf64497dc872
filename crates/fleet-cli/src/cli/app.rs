use super::*;
pub(super) fn run() -> anyhow::Result<u8> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let audit = AuditLogger::new()?;
    info!(command = command_label(&cli.command), "Running command");

    let result = match cli.command {
        Commands::Config(args) => handle_config(args, &cli.global, &audit),
        Commands::Scan(args) => handle_scan(args, &cli.global, &audit),
        Commands::Status(args) => handle_status(args, &cli.global, &audit),
        Commands::Sync(args) => handle_sync(args, &cli.global, &audit),
        Commands::Remotes(args) => handle_remotes(args, &cli.global, &audit),
        Commands::Prune(args) => handle_prune(args, &cli.global, &audit),
    };

    if let Err(err) = &result {
        let _ = audit.record(
            "app.error",
            AuditStatus::Failed,
            None,
            None,
            Some(&err.to_string()),
        );
    }

    result.map(exit_code)
}

fn exit_code(severity: Severity) -> u8 {
    u8::try_from(severity.exit_code()).unwrap_or(1)
}

pub(super) fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Config(_) => "config",
        Commands::Scan(_) => "scan",
        Commands::Status(_) => "status",
        Commands::Sync(_) => "sync",
        Commands::Remotes(_) => "remotes",
        Commands::Prune(_) => "prune",
    }
}
