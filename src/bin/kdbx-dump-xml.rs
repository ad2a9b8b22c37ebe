/// Utility to dump the decrypted inner XML document of a database.
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use kdbx_core::{Database, DatabaseKey};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Provide a .kdbx database
    in_kdbx: PathBuf,

    /// Provide a keyfile
    #[arg(short = 'k', long)]
    keyfile: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();

    let mut source = File::open(args.in_kdbx)?;

    let mut key = DatabaseKey::new();

    if let Some(keyfile_path) = args.keyfile {
        let mut keyfile = File::open(keyfile_path)?;
        key = key.with_keyfile(&mut keyfile)?;
    }

    let password = rpassword::prompt_password("Password (or blank for none): ")?;
    if !password.is_empty() {
        key = key.with_password(&password);
    }

    let xml = Database::get_xml(&mut source, key)?;

    std::io::stdout().write_all(&xml)?;

    Ok(())
}
