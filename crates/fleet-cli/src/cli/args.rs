use super::*;
#[derive(Parser)]
#[command(name = "fleet", author, version, about)]
pub(super) struct Cli {
    #[command(flatten)]
    pub(super) global: GlobalArgs,
    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub(super) struct GlobalArgs {
    #[arg(long, global = true, help = "Config file (defaults to the platform config dir)")]
    pub(super) config: Option<PathBuf>,
    #[arg(long, global = true, help = "Inventory file (overrides the config)")]
    pub(super) inventory: Option<PathBuf>,
    #[arg(long, global = true, help = "Emit machine-readable JSON")]
    pub(super) json: bool,
}

#[derive(clap::Subcommand)]
pub(super) enum Commands {
    #[command(about = "Manage config")]
    Config(ConfigArgs),
    #[command(about = "Discover repositories under the configured roots")]
    Scan(ScanArgs),
    #[command(about = "Inspect inventoried repositories")]
    Status(StatusArgs),
    #[command(about = "Fetch and optionally update inventoried repositories")]
    Sync(SyncArgs),
    #[command(about = "Reconcile recorded and live remote URLs")]
    Remotes(RemotesArgs),
    #[command(about = "Drop inventory entries missing for longer than the stale threshold")]
    Prune(PruneArgs),
}

#[derive(Parser)]
pub(super) struct ConfigArgs {
    #[command(subcommand)]
    pub(super) command: ConfigCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum ConfigCommands {
    #[command(about = "Initialize config with one or more scan roots")]
    Init(InitArgs),
    #[command(about = "Print the effective config")]
    Show,
}

#[derive(Parser)]
pub(super) struct InitArgs {
    #[arg(long, required = true)]
    pub(super) root: Vec<PathBuf>,
    #[arg(long)]
    pub(super) exclude: Vec<String>,
}

#[derive(Parser)]
pub(super) struct ScanArgs {
    #[arg(long, help = "Scan root (repeatable; replaces the configured roots)")]
    pub(super) root: Vec<PathBuf>,
    #[arg(long, help = "Extra exclusion glob (repeatable)")]
    pub(super) exclude: Vec<String>,
    #[arg(long)]
    pub(super) follow_symlinks: bool,
    #[command(flatten)]
    pub(super) run: RunArgs,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub(super) struct RunArgs {
    #[arg(long, help = "Worker count (defaults to the config, then CPU count capped at 8)")]
    pub(super) jobs: Option<usize>,
    #[arg(long, help = "Per-repository timeout in seconds; 0 disables it")]
    pub(super) timeout: Option<u64>,
    #[arg(long, help = "Print per-repository progress")]
    pub(super) progress: bool,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub(super) struct FilterArgs {
    #[arg(long, help = "Repo id substring")]
    pub(super) repo: Option<String>,
    #[arg(long, help = "Path prefix")]
    pub(super) path: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub(super) kind: Option<RepoKindValue>,
}

#[derive(Parser)]
pub(super) struct StatusArgs {
    #[command(flatten)]
    pub(super) filter: FilterArgs,
    #[arg(long, help = "Only repositories with local changes")]
    pub(super) dirty: bool,
    #[arg(long, help = "Only repositories with warnings or failures")]
    pub(super) problems: bool,
    #[command(flatten)]
    pub(super) run: RunArgs,
}

#[derive(Parser)]
pub(super) struct SyncArgs {
    #[command(flatten)]
    pub(super) filter: FilterArgs,
    #[arg(long, help = "Show the plan without running it")]
    pub(super) dry_run: bool,
    #[arg(long, help = "Skip the confirmation prompt")]
    pub(super) yes: bool,
    #[arg(long, help = "Rebase checked-out branches onto their upstream")]
    pub(super) local_update: bool,
    #[arg(long, help = "Stash local changes around a rebase")]
    pub(super) autostash: bool,
    #[arg(long, help = "Push branches that are only ahead of their upstream")]
    pub(super) push: bool,
    #[arg(long, help = "Rebase diverged branches")]
    pub(super) force: bool,
    #[arg(long, help = "Update protected branches")]
    pub(super) allow_protected: bool,
    #[arg(long, help = "Clone inventory entries whose path is gone")]
    pub(super) clone_missing: bool,
    #[arg(long, help = "Stop starting new repositories after the first failure")]
    pub(super) fail_fast: bool,
    #[command(flatten)]
    pub(super) run: RunArgs,
}

#[derive(Parser)]
pub(super) struct RemotesArgs {
    #[command(subcommand)]
    pub(super) command: RemotesCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum RemotesCommands {
    #[command(about = "List repositories whose recorded and live remote URLs differ")]
    Plan(RemotesModeArgs),
    #[command(about = "Apply the remote reconciliation")]
    Apply(RemotesApplyArgs),
}

#[derive(Parser)]
pub(super) struct RemotesModeArgs {
    #[arg(long, value_enum, default_value = "registry")]
    pub(super) mode: ReconcileModeValue,
    #[command(flatten)]
    pub(super) filter: FilterArgs,
}

#[derive(Parser)]
pub(super) struct RemotesApplyArgs {
    #[command(flatten)]
    pub(super) target: RemotesModeArgs,
    #[arg(long, help = "Skip the confirmation prompt")]
    pub(super) yes: bool,
}

#[derive(Parser)]
pub(super) struct PruneArgs {
    #[arg(long, help = "Override the configured stale threshold")]
    pub(super) older_than_days: Option<u64>,
    #[arg(long, help = "List what would be removed")]
    pub(super) dry_run: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(super) enum RepoKindValue {
    Checkout,
    Mirror,
}

impl From<RepoKindValue> for RepoKind {
    fn from(value: RepoKindValue) -> Self {
        match value {
            RepoKindValue::Checkout => RepoKind::Checkout,
            RepoKindValue::Mirror => RepoKind::Mirror,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(super) enum ReconcileModeValue {
    Registry,
    Git,
}

impl From<ReconcileModeValue> for ReconcileMode {
    fn from(value: ReconcileModeValue) -> Self {
        match value {
            ReconcileModeValue::Registry => ReconcileMode::Registry,
            ReconcileModeValue::Git => ReconcileMode::Git,
        }
    }
}

impl FilterArgs {
    pub(super) fn to_filter(&self) -> StatusFilter {
        StatusFilter {
            repo_id: self.repo.clone(),
            path_prefix: self
                .path
                .as_ref()
                .map(|path| std::fs::canonicalize(path).unwrap_or_else(|_| path.clone())),
            kind: self.kind.map(Into::into),
            ..StatusFilter::default()
        }
    }
}
