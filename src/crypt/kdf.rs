use std::time::{Duration, Instant};

use aes::Aes256;
use cipher::{
    generic_array::{typenum::U32, GenericArray},
    BlockEncrypt, KeyInit,
};
use sha2::{Digest, Sha256};

use crate::error::CryptographyError;

/// A key derivation function that stretches the composite key into the
/// transformed key.
pub trait Kdf {
    fn transform_key(
        &self,
        composite_key: &GenericArray<u8, U32>,
    ) -> Result<GenericArray<u8, U32>, CryptographyError>;

    /// Estimate a work parameter (rounds or iterations) so that one
    /// transformation takes approximately `target` on this machine.
    ///
    /// The work parameter is doubled until a timed transformation exceeds an
    /// eighth of the target, then extrapolated linearly.
    fn benchmark(&self, target: Duration) -> u64;
}

pub struct AesKdf {
    pub seed: Vec<u8>,
    pub rounds: u64,
}

impl Kdf for AesKdf {
    fn transform_key(
        &self,
        composite_key: &GenericArray<u8, U32>,
    ) -> Result<GenericArray<u8, U32>, CryptographyError> {
        let cipher = Aes256::new(&GenericArray::clone_from_slice(&self.seed));
        let mut block1 = GenericArray::clone_from_slice(&composite_key[..16]);
        let mut block2 = GenericArray::clone_from_slice(&composite_key[16..]);
        for _ in 0..self.rounds {
            cipher.encrypt_block(&mut block1);
            cipher.encrypt_block(&mut block2);
        }

        let mut digest = Sha256::new();

        digest.update(block1);
        digest.update(block2);

        Ok(digest.finalize())
    }

    fn benchmark(&self, target: Duration) -> u64 {
        let probe_key = GenericArray::default();
        let mut rounds: u64 = 10_000;

        loop {
            let kdf = AesKdf {
                seed: self.seed.clone(),
                rounds,
            };

            let start = Instant::now();
            if kdf.transform_key(&probe_key).is_err() {
                return rounds;
            }
            let elapsed = start.elapsed();

            if elapsed * 8 >= target {
                let scale = target.as_secs_f64() / elapsed.as_secs_f64();
                return (rounds as f64 * scale) as u64;
            }

            rounds *= 2;
        }
    }
}

pub struct Argon2Kdf {
    pub memory: u64,
    pub salt: Vec<u8>,
    pub iterations: u64,
    pub parallelism: u32,
    pub version: argon2::Version,
    pub variant: argon2::Variant,
}

impl Argon2Kdf {
    fn config(&self) -> argon2::Config<'_> {
        argon2::Config {
            ad: &[],
            hash_length: 32,
            lanes: self.parallelism,
            mem_cost: (self.memory / 1024) as u32,
            secret: &[],
            time_cost: self.iterations as u32,
            variant: self.variant,
            version: self.version,
            ..Default::default()
        }
    }
}

impl Kdf for Argon2Kdf {
    fn transform_key(
        &self,
        composite_key: &GenericArray<u8, U32>,
    ) -> Result<GenericArray<u8, U32>, CryptographyError> {
        let key = argon2::hash_raw(composite_key, &self.salt, &self.config())?;

        Ok(*GenericArray::from_slice(&key))
    }

    /// Memory and parallelism are benchmarked as configured; only the
    /// iteration count is adjusted.
    fn benchmark(&self, target: Duration) -> u64 {
        let probe_key = GenericArray::default();
        let mut iterations: u64 = 1;

        loop {
            let kdf = Argon2Kdf {
                memory: self.memory,
                salt: self.salt.clone(),
                iterations,
                parallelism: self.parallelism,
                version: self.version,
                variant: self.variant,
            };

            let start = Instant::now();
            if kdf.transform_key(&probe_key).is_err() {
                return iterations;
            }
            let elapsed = start.elapsed();

            if elapsed * 8 >= target {
                let scale = target.as_secs_f64() / elapsed.as_secs_f64();
                return (iterations as f64 * scale).max(1.0) as u64;
            }

            iterations *= 2;
        }
    }
}
