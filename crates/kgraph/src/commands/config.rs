//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use kgraph_config::{AUTH_TOKEN_ENV, secrets};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved connection settings
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Store the auth token in the system keyring (read from stdin)
    SetToken,

    /// Remove the auth token from the system keyring
    DeleteToken,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./kgraph.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::SetToken => cmd_set_token(),
        ConfigCommand::DeleteToken => cmd_delete_token(),
        ConfigCommand::Init { local } => cmd_init(local, ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = ctx.connection_config()?;

    println!("# kgraph Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    if !loaded.env_overrides.is_empty() {
        println!("Environment overrides:");
        for var in &loaded.env_overrides {
            println!("  {}", var);
        }
        println!();
    }

    println!("Database:");
    println!(
        "  url:             {}",
        config.url.as_deref().unwrap_or("(not set)")
    );
    println!("  mode:            {}", config.mode());
    if let Some(ref path) = config.local_replica_path {
        println!("  replica:         {}", path.display());
    }
    println!("  relation policy: {}", config.relation_policy);
    if let Some(timeout) = config.timeout {
        println!("  timeout:         {}s", timeout.as_secs());
    }
    println!("  auth token:      {}", token_status(ctx));
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = loaded.config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'kgraph config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_set_token() -> Result<()> {
    println!("Enter auth token:");

    let mut token = String::new();
    std::io::stdin().read_line(&mut token)?;
    let token = token.trim();

    if token.is_empty() {
        println!("No token provided, aborting.");
        return Ok(());
    }

    match secrets::store_in_keyring(token) {
        Ok(()) => println!("✓ Auth token stored in system keyring"),
        Err(e) => {
            eprintln!("Failed to store in keyring: {}", e);
            eprintln!(
                "Fallback: set the {} environment variable instead.",
                AUTH_TOKEN_ENV
            );
        }
    }

    Ok(())
}

fn cmd_delete_token() -> Result<()> {
    match secrets::delete_from_keyring() {
        Ok(()) => println!("✓ Auth token removed from keyring"),
        Err(e) => eprintln!("Failed to delete from keyring: {}", e),
    }
    Ok(())
}

fn cmd_init(local: bool, ctx: &Context) -> Result<()> {
    let path = if local {
        kgraph_config::project_config_path()
    } else {
        let dir = user_config_dir(ctx)?;
        std::fs::create_dir_all(&dir)?;
        dir.join("config.toml")
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    let template = r#"# kgraph Configuration

[database]
# Remote libSQL server, or file:<path> / :memory: for a local SQLite store
url = "file:kgraph.db"

# Keep a local replica and synchronize after every write (uncomment to use)
# local_replica_path = "/var/lib/kgraph/replica.db"

# "loose" accepts relations to entities that do not exist yet; "strict" rejects them
relation_policy = "loose"

# HTTP timeout for remote stores
# timeout_secs = 30

# Prefer `kgraph config set-token` or TURSO_AUTH_TOKEN over a plaintext token
# auth_token = ""

[logging]
# JSON logs in <config dir>/logs
file = true
"#;

    std::fs::write(&path, template)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  kgraph config set-token   # store auth token in keyring");
    println!("  kgraph config show        # verify configuration");

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    println!("{}", user_config_dir(ctx)?.join("config.toml").display());
    Ok(())
}

fn user_config_dir(ctx: &Context) -> Result<PathBuf> {
    ctx.config_dir
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

fn token_status(ctx: &Context) -> String {
    if ctx.auth_token.is_some() {
        return format!("set ({})", secrets::SecretSource::CommandLine);
    }
    let file_value = ctx.loaded.config.database().auth_token;
    match secrets::resolve_auth_token(file_value.as_deref()) {
        Some(secret) => format!("set ({})", secret.source),
        None => "not set".to_string(),
    }
}
