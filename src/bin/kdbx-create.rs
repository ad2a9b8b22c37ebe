/// Create a new, empty database file, protected by a password and/or keyfile.
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use kdbx_core::{
    config::{DatabaseConfig, KdfConfig},
    Database, DatabaseKey,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the database to create
    database: PathBuf,

    /// Prompt for a database password
    #[arg(short = 'p', long)]
    set_password: bool,

    /// Set the key file for the database
    #[arg(short = 'k', long, value_name = "PATH")]
    set_key_file: Option<PathBuf>,

    /// Target decryption time in milliseconds; the key derivation function is
    /// benchmarked to match it
    #[arg(short = 't', long, value_name = "MS")]
    decryption_time: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();

    if args.database.exists() {
        return Err(anyhow!("File {} already exists.", args.database.display()));
    }

    // validate the decryption time before asking for a password
    if let Some(ms) = args.decryption_time {
        if !(KdfConfig::MIN_DECRYPTION_TIME_MS..=KdfConfig::MAX_DECRYPTION_TIME_MS).contains(&ms) {
            return Err(anyhow!(
                "Target decryption time must be between {} and {}.",
                KdfConfig::MIN_DECRYPTION_TIME_MS,
                KdfConfig::MAX_DECRYPTION_TIME_MS
            ));
        }
    }

    let mut key = DatabaseKey::new();

    if args.set_password {
        let password = rpassword::prompt_password("Enter password: ")?;
        let repeated = rpassword::prompt_password("Repeat password: ")?;
        if password != repeated {
            return Err(anyhow!("The passwords do not match."));
        }
        key = key.with_password(&password);
    }

    if let Some(ref keyfile_path) = args.set_key_file {
        let mut keyfile = File::open(keyfile_path)
            .with_context(|| format!("Cannot open keyfile {}", keyfile_path.display()))?;
        key = key.with_keyfile(&mut keyfile)?;
    }

    if key.is_empty() {
        return Err(anyhow!("No key is set. Aborting database creation."));
    }

    let mut config = DatabaseConfig::default();

    if let Some(ms) = args.decryption_time {
        println!("Benchmarking key derivation function for {} ms delay.", ms);
        config.kdf_config = config
            .kdf_config
            .benchmarked(Duration::from_millis(ms))
            .map_err(|e| anyhow!("Benchmarking failed: {}", e))?;
    }

    let db = Database::new(config);

    // write to a temporary file first so that a failed save never leaves a
    // partial database behind
    let file_name = args
        .database
        .file_name()
        .ok_or_else(|| anyhow!("Invalid database path"))?;
    let mut temp_path = args.database.clone();
    temp_path.set_file_name(format!("{}.tmp", file_name.to_string_lossy()));

    {
        let mut temp_file = File::create(&temp_path)
            .with_context(|| format!("Cannot create {}", temp_path.display()))?;
        if let Err(e) = db.save(&mut temp_file, key) {
            drop(temp_file);
            let _ = std::fs::remove_file(&temp_path);
            return Err(anyhow!("Failed to save the database: {}", e));
        }
    }

    std::fs::rename(&temp_path, &args.database)
        .with_context(|| format!("Cannot move the database into {}", args.database.display()))?;

    println!("Successfully created new database.");
    Ok(())
}
