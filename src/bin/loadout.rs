use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use loadout::config::GlobalConfig;
use loadout::engine::{InstallOptions, Manager};
use loadout::outcome::{CancelToken, InstallOutcome, ManualUpdateReason};
use loadout::tracker::{InstallMethod, PackageKind};

#[derive(Parser)]
#[command(name = "loadout", about = "addon and plugin manager for game client installations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Managed installation root (overrides config)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Reduce log output (show warnings/errors only)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Auto,
    Addon,
    Plugin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Clone,
    Release,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package from a git repository or GitHub release
    Install {
        /// Repository URL
        url: String,

        /// Package kind (auto probes the source)
        #[arg(long, value_enum, default_value = "auto")]
        kind: KindArg,

        /// Fetch strategy
        #[arg(long, value_enum, default_value = "clone")]
        method: MethodArg,

        /// Branch to clone
        #[arg(long)]
        branch: Option<String>,

        /// Skip conflict checking
        #[arg(long)]
        force: bool,

        /// Plugin variant name (answer to a variant checkpoint)
        #[arg(long)]
        variant: Option<String>,

        /// Preferred release asset name
        #[arg(long)]
        asset: Option<String>,

        /// Direct release asset URL (answer to an asset checkpoint)
        #[arg(long)]
        asset_url: Option<String>,

        /// Entrypoint lua stem (answer to an entrypoint checkpoint)
        #[arg(long)]
        entrypoint: Option<String>,

        /// Specific package to extract from a multi-package tree
        #[arg(long)]
        name: Option<String>,
    },
    /// Update an installed package
    Update {
        /// Package name
        name: String,

        #[arg(long, value_enum)]
        kind: PackageKindArg,
    },
    /// Update every installed package of a kind (or all)
    UpdateAll {
        #[arg(long, value_enum)]
        kind: Option<PackageKindArg>,
    },
    /// Remove an installed package
    Remove {
        /// Package name
        name: String,

        #[arg(long, value_enum)]
        kind: PackageKindArg,
    },
    /// Adopt packages already present under the managed root
    Scan,
    /// List tracked packages
    List,
    /// List remote branches of a repository
    Branches {
        /// Repository URL
        url: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PackageKindArg {
    Addon,
    Plugin,
}

impl From<PackageKindArg> for PackageKind {
    fn from(value: PackageKindArg) -> Self {
        match value {
            PackageKindArg::Addon => PackageKind::Addon,
            PackageKindArg::Plugin => PackageKind::Plugin,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut filter = if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("info")
    };
    if cli.verbose > 0 {
        filter = EnvFilter::new("debug");
    }
    if cli.verbose > 1 {
        filter = EnvFilter::new("trace");
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = GlobalConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(root) = cli.root {
        config.general.root = root;
    }

    let mut manager = Manager::new(config).context("failed to open managed root")?;

    match cli.command {
        Commands::Install {
            url,
            kind,
            method,
            branch,
            force,
            variant,
            asset,
            asset_url,
            entrypoint,
            name,
        } => {
            let kind = resolve_kind(&manager, &url, kind, method)?;
            let opts = InstallOptions {
                target_name: name,
                branch,
                force,
                plugin_variant: variant,
                selected_entrypoint: entrypoint,
                asset_url,
                asset_name: asset,
            };
            let outcome = match method {
                MethodArg::Clone => manager.install_from_git(&url, kind, &opts),
                MethodArg::Release => manager.install_from_release(&url, kind, &opts),
            };
            finish(outcome)
        }
        Commands::Update { name, kind } => {
            let outcome = manager.update_package(&name, kind.into(), None, None, None);
            finish(outcome)
        }
        Commands::UpdateAll { kind } => {
            let cancel = CancelToken::new();
            let mut updated = 0;
            let mut failed = 0;
            let mut skipped = 0;
            let kinds: Vec<PackageKind> = match kind {
                Some(k) => vec![k.into()],
                None => vec![PackageKind::Addon, PackageKind::Plugin],
            };
            for kind in kinds {
                let names: Vec<String> = match kind {
                    PackageKind::Addon => manager.tracker().addons().keys().cloned().collect(),
                    PackageKind::Plugin => manager.tracker().plugins().keys().cloned().collect(),
                };
                let report = manager.batch_update(&names, kind, &cancel);
                for name in &report.updated {
                    println!("{} {}", "updated:".green(), name);
                }
                for (name, reason) in &report.skipped {
                    println!("{} {} ({})", "skipped:".yellow(), name, reason);
                }
                for (name, reason) in &report.failed {
                    eprintln!("{} {} ({})", "failed:".red(), name, reason);
                }
                updated += report.updated.len();
                skipped += report.skipped.len();
                failed += report.failed.len();
            }
            println!("{} updated, {} skipped, {} failed", updated, skipped, failed);
            if failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Remove { name, kind } => {
            match manager.remove_package(&name, kind.into()) {
                Ok(message) => {
                    println!("{}", message.green());
                    Ok(())
                }
                Err(e) => {
                    eprintln!("{} {}", "error:".red(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Scan => {
            let report = manager.scan_existing_packages()?;
            println!(
                "found {} addon(s), {} plugin(s)",
                report.addons_found, report.plugins_found
            );
            if !report.catalog_ok {
                println!(
                    "{} official catalog unavailable ({}); everything classified as pre-installed",
                    "note:".yellow(),
                    report.catalog_error.as_deref().unwrap_or("unknown error")
                );
            }
            for flag in &report.manual_flags {
                println!("{} {}", "note:".yellow(), flag);
            }
            Ok(())
        }
        Commands::List => {
            for (label, map) in [
                ("addons", manager.tracker().addons()),
                ("plugins", manager.tracker().plugins()),
            ] {
                println!("{} ({}):", label.bold(), map.len());
                for (name, record) in map {
                    let method = match record.install_method {
                        InstallMethod::PreInstalled => "pre-installed",
                        InstallMethod::Git => "git",
                        InstallMethod::Release => "release",
                        InstallMethod::Manual => "manual",
                    };
                    println!("  {}  [{}]  {}", name, method, record.source.dimmed());
                }
            }
            Ok(())
        }
        Commands::Branches { url } => {
            let branches = manager.list_remote_branches(&url)?;
            for branch in branches {
                println!("{}", branch);
            }
            Ok(())
        }
    }
}

/// Resolve `auto` to a concrete kind by probing the source.
fn resolve_kind(manager: &Manager, url: &str, kind: KindArg, method: MethodArg) -> Result<PackageKind> {
    match kind {
        KindArg::Addon => Ok(PackageKind::Addon),
        KindArg::Plugin => Ok(PackageKind::Plugin),
        KindArg::Auto => {
            let probed = match method {
                MethodArg::Clone => manager.detect_package_type(url)?,
                MethodArg::Release => manager.detect_package_type_from_release(url)?,
            };
            match probed {
                Some(kind) => Ok(kind),
                None => bail!("could not determine package kind for {}; pass --kind", url),
            }
        }
    }
}

/// Render an outcome. Checkpoints print their choices and exit non-zero
/// so scripts can tell "needs a decision" from success.
fn finish(outcome: InstallOutcome) -> Result<()> {
    match outcome {
        InstallOutcome::Success { message } | InstallOutcome::UpToDate { message } => {
            println!("{}", message.green());
            Ok(())
        }
        InstallOutcome::Failure { error } => {
            eprintln!("{} {}", "error:".red(), error);
            std::process::exit(1);
        }
        InstallOutcome::RequiresConfirmation { conflicts } => {
            eprintln!("{}", "file conflicts detected:".yellow());
            for (package, report) in &conflicts {
                for lib in &report.libs {
                    eprintln!(
                        "  {}: libs/{} is owned by {} ({})",
                        package,
                        lib.file,
                        lib.owner,
                        lib.owner_source.as_deref().unwrap_or("unknown source")
                    );
                }
                if report.docs {
                    eprintln!("  {}: a docs folder already exists", package);
                }
                if report.resources {
                    eprintln!("  {}: a resources folder already exists", package);
                }
            }
            eprintln!("re-run with --force to overwrite");
            std::process::exit(1);
        }
        InstallOutcome::RequiresVariantSelection { variants, .. } => {
            eprintln!("{}", "multiple variants available:".yellow());
            for variant in &variants {
                match &variant.url {
                    Some(url) => eprintln!("  {}  {}", variant.name, url.dimmed()),
                    None => eprintln!("  {}", variant.name),
                }
            }
            eprintln!("re-run with --variant <name> (or --asset-url for release assets)");
            std::process::exit(1);
        }
        InstallOutcome::RequiresEntrypointSelection { lua_files, .. } => {
            eprintln!("{}", "multiple entrypoint candidates:".yellow());
            for stem in &lua_files {
                eprintln!("  {}", stem);
            }
            eprintln!("re-run with --entrypoint <name>");
            std::process::exit(1);
        }
        InstallOutcome::RequiresManualUpdate { package, reason, .. } => {
            let detail = match reason {
                ManualUpdateReason::ManualInstall => "it was installed manually",
                ManualUpdateReason::UnknownSource => "its source URL is unknown",
            };
            eprintln!(
                "{} \"{}\" cannot be auto-updated: {}",
                "error:".red(),
                package,
                detail
            );
            std::process::exit(1);
        }
    }
}
