/// Utility to get the format version of a database file without decrypting it.
use std::fs::File;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use kdbx_core::Database;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Provide a .kdbx database
    in_kdbx: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut source = File::open(args.in_kdbx)?;
    let version = Database::get_version(&mut source)?;

    println!("{}", version);

    Ok(())
}
