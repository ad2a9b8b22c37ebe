/// Utility to benchmark the key derivation functions on this machine.
use std::time::Duration;

use clap::Parser;

use kdbx_core::config::KdfConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Target duration for each KDF in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    msecs: u64,
}

fn main() {
    let args = Args::parse();
    let duration = Duration::from_millis(args.msecs);

    let aes = KdfConfig::Aes { rounds: 0 };
    println!("Benchmarking AES KDF for {} ms...", args.msecs);
    match aes.benchmarked(duration) {
        Ok(KdfConfig::Aes { rounds }) => println!("AES KDF: {} rounds in {} ms", rounds, args.msecs),
        _ => eprintln!("AES KDF benchmark failed"),
    }

    let argon2 = KdfConfig::Argon2 {
        iterations: 0,
        memory: 64 * 1024 * 1024,
        parallelism: 4,
        version: argon2::Version::Version13,
    };
    println!("Benchmarking Argon2d KDF for {} ms...", args.msecs);
    match argon2.benchmarked(duration) {
        Ok(KdfConfig::Argon2 { iterations, .. }) => {
            println!("Argon2d KDF: {} iterations in {} ms", iterations, args.msecs)
        }
        _ => eprintln!("Argon2d KDF benchmark failed"),
    }
}
