/// Utility to decrypt a database and show its contents as a tree.
use std::fs::File;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use kdbx_core::{Database, DatabaseKey, NodeRef};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Provide a .kdbx database
    in_kdbx: PathBuf,

    /// Provide a keyfile
    #[arg(short = 'k', long)]
    keyfile: Option<PathBuf>,

    /// Print the protected field values in the clear
    #[arg(long)]
    show_protected: bool,
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

    let db = Database::open(&mut source, key)?;

    if let Some(ref name) = db.meta.database_name {
        println!("Database: {}", name);
    }

    for node in &db.root {
        match node {
            NodeRef::Group(g) => {
                println!("[{}]", g.name);
            }
            NodeRef::Entry(e) => {
                let title = e.get_title().unwrap_or("(no title)");
                let user = e.get_username().unwrap_or("(no username)");
                let password = if args.show_protected {
                    e.get_password().unwrap_or("(no password)")
                } else {
                    "***"
                };
                println!("  {}: {} / {}", title, user, password);
            }
        }
    }

    Ok(())
}
