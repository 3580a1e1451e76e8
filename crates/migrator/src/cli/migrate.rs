use anyhow::Result;
use clap::Args;
use console::style;
use std::path::{Path, PathBuf};

use migrator::{DatabaseKind, MigrationConfig, Migrations, EXIT_FAILURE, EXIT_SUCCESS};

/// Where to connect and which scripts to apply.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Configuration file path.
    #[arg(short, long, env = "MIGRATOR_CONFIG", default_value = "migrator.toml", global = true)]
    pub config: String,

    /// Database engine (postgresql, sqlserver).
    #[arg(long, env = "MIGRATOR_KIND", global = true)]
    pub kind: Option<String>,

    /// Connection string.
    #[arg(long, env = "MIGRATOR_URL", global = true, hide_env_values = true)]
    pub url: Option<String>,

    /// Scripts directory.
    #[arg(short, long, env = "MIGRATOR_PATH", global = true)]
    pub path: Option<PathBuf>,
}

/// Build the run configuration from the config file and command-line overrides.
///
/// Without a config file, `--kind` and `--url` are required and scripts are
/// read from `--path` (default `migrations`).
pub fn load_config(args: &ConnectionArgs) -> Result<MigrationConfig> {
    let config_path = Path::new(&args.config);

    let mut config = if config_path.exists() {
        MigrationConfig::from_file(config_path)?
    } else {
        let (Some(kind), Some(url)) = (&args.kind, &args.url) else {
            anyhow::bail!(
                "Configuration file not found: {}\nCreate one or pass --kind and --url.",
                args.config
            );
        };
        let path = args
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("migrations"));
        return Ok(MigrationConfig::new(kind.parse()?, url.clone(), path));
    };

    if let Some(kind) = &args.kind {
        config.database.kind = kind.parse::<DatabaseKind>()?;
    }
    if let Some(url) = &args.url {
        config.database.url = url.clone();
    }
    if let Some(path) = &args.path {
        config.scripts.path = path.clone();
    }

    Ok(config)
}

fn banner(title: &str) {
    println!();
    println!("  {} {}", style("MIGRATOR").bold().cyan(), title);
    println!();
}

/// Apply pending scripts.
pub async fn up(config: MigrationConfig) -> Result<i32> {
    banner("Migrations");
    println!(
        "  {} {} scripts from {}",
        style("→").dim(),
        config.database.kind,
        style(config.scripts.path.display()).cyan()
    );

    let mut migrations = Migrations::new(config)?;
    let result = migrations.run().await;

    if let Some(e) = result.error() {
        eprintln!("  {} {}", style("✗").red().bold(), style(e).red());
        eprintln!(
            "  {} Transaction rolled back, no scripts from this run were kept",
            style("ℹ").blue()
        );
        println!();
        return Ok(EXIT_FAILURE);
    }

    if result.applied().is_empty() {
        println!("  {} Database is up to date", style("✓").green());
    } else {
        for name in result.applied() {
            println!("    {} {}", style("✓").green(), name);
        }
        println!();
        println!(
            "  {} Applied {} migration(s)",
            style("✓").green(),
            result.applied().len()
        );
    }
    println!();

    Ok(EXIT_SUCCESS)
}

/// Print applied and pending scripts.
pub async fn status(config: MigrationConfig) -> Result<i32> {
    banner("Migration Status");

    let migrations = Migrations::new(config)?;
    let status = match migrations.status().await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("  {} {}", style("✗").red().bold(), style(e).red());
            println!();
            return Ok(EXIT_FAILURE);
        }
    };

    if status.applied.is_empty() && status.pending.is_empty() {
        println!("  {} No migrations found", style("ℹ").blue());
        println!();
        return Ok(EXIT_SUCCESS);
    }

    if !status.applied.is_empty() {
        println!("  {} Applied:", style("✓").green());
        for m in &status.applied {
            println!(
                "    {} {} ({})",
                style(&m.name).cyan(),
                style("at").dim(),
                m.applied_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    if !status.pending.is_empty() {
        if !status.applied.is_empty() {
            println!();
        }
        println!("  {} Pending:", style("○").yellow());
        for name in &status.pending {
            println!("    {} {}", style("→").dim(), style(name).yellow());
        }
    }

    println!();
    println!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        status.applied.len(),
        status.pending.len()
    );
    println!();

    Ok(EXIT_SUCCESS)
}
