use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "jugsite-controller")]
pub struct Args {
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Specify path to configuration file"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    cmd: Option<SubCommand>,
}

#[derive(Subcommand, Debug, Clone)]
enum SubCommand {
    /// Migrate the db. This is done automatically during start of the controller,
    /// but can be done without starting the controller using this command.
    MigrateDb,
}

impl Args {
    /// Returns true if we want to startup the controller after we finished the cli part
    pub fn controller_should_start(&self) -> bool {
        self.cmd.is_none()
    }
}

/// Parses the CLI-Arguments into [`Args`]
///
/// Also runs (optional) cli commands if necessary
pub async fn parse_args() -> Result<Args> {
    let args = Args::parse();

    if let Some(sub_command) = args.cmd.clone() {
        let settings = Settings::load(&args.config)?;
        match sub_command {
            SubCommand::MigrateDb => {
                db_storage::migrations::migrate_from_url(&settings.database.url)
                    .await
                    .context("Failed to migrate database")?;
            }
        }
    }

    Ok(args)
}
