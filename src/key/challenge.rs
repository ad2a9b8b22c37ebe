//! Challenge-response key factors.
//!
//! A challenge-response factor does not contribute static bytes to the
//! composite key. Instead it is handed a challenge seed at transform time and
//! computes its contribution from that, e.g. with HMAC-SHA1 on a hardware
//! token.

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(feature = "challenge_response")]
use challenge_response::{
    config::{Config, Mode, Slot},
    error::ChallengeResponseError,
    ChallengeResponse,
};

use crate::error::CryptographyError;
use crate::key::KeyElement;

#[derive(Debug, Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub enum ChallengeResponseKey {
    /// HMAC-SHA1 over the challenge, computed in software from a hex-encoded
    /// secret
    LocalChallenge(String),

    /// HMAC-SHA1 challenge-response against a slot of a hardware token
    #[cfg(feature = "challenge_response")]
    YubikeyChallenge(Yubikey, String),
}

impl ChallengeResponseKey {
    /// Answer a challenge with this factor.
    ///
    /// Fails when the backing device is not available, which the caller
    /// surfaces as an authentication error.
    pub fn perform_challenge(&self, challenge: &[u8]) -> Result<KeyElement, KeyChallengeError> {
        match self {
            ChallengeResponseKey::LocalChallenge(secret) => {
                let secret_bytes = hex::decode(secret)?;
                let response = crate::crypt::calculate_hmac_sha1(&[challenge], &secret_bytes)?.to_vec();
                Ok(response)
            }

            #[cfg(feature = "challenge_response")]
            ChallengeResponseKey::YubikeyChallenge(yubikey, slot_number) => {
                let mut challenge_response_client =
                    ChallengeResponse::new().map_err(KeyChallengeError::CannotListKeys)?;

                let slot = parse_yubikey_slot(slot_number)?;

                let yubikey_device = challenge_response_client
                    .find_device_from_serial(yubikey.serial_number)
                    .map_err(|e| KeyChallengeError::KeyNotFound {
                        inner_error: e,
                        serial_number: yubikey.serial_number,
                    })?;

                let mut config = Config::new_from(yubikey_device);
                config = config.set_variable_size(true);
                config = config.set_mode(Mode::Sha1);
                config = config.set_slot(slot);

                let hmac = challenge_response_client
                    .challenge_response_hmac(challenge, config)
                    .map_err(KeyChallengeError::KeyChallenge)?;

                Ok(hmac.to_vec())
            }
        }
    }

    #[cfg(feature = "challenge_response")]
    pub fn get_available_yubikeys() -> Result<Vec<Yubikey>, ChallengeResponseError> {
        let mut challenge_response_client = ChallengeResponse::new()?;
        let mut response: Vec<Yubikey> = vec![];

        let yubikeys = challenge_response_client.find_all_devices()?;
        for yubikey in yubikeys {
            let serial_number = match yubikey.serial {
                Some(n) => n,
                None => continue,
            };

            response.push(Yubikey {
                serial_number,
                name: yubikey.name,
            });
        }
        Ok(response)
    }

    #[cfg(feature = "challenge_response")]
    pub fn get_yubikey(serial_number: Option<u32>) -> Result<Yubikey, GetKeyError> {
        let all_yubikeys =
            ChallengeResponseKey::get_available_yubikeys().map_err(GetKeyError::CannotListKeys)?;

        if all_yubikeys.is_empty() {
            return Err(GetKeyError::NoKeys);
        }

        if let Some(n) = serial_number {
            all_yubikeys
                .into_iter()
                .find(|k| k.serial_number == n)
                .ok_or(GetKeyError::KeyNotFound { serial_number: n })
        } else if all_yubikeys.len() == 1 {
            Ok(all_yubikeys[0].clone())
        } else {
            Err(GetKeyError::AmbiguousKey)
        }
    }
}

#[cfg(feature = "challenge_response")]
#[derive(Debug, Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Yubikey {
    pub serial_number: u32,
    pub name: Option<String>,
}

#[cfg(feature = "challenge_response")]
pub fn parse_yubikey_slot(slot_number: &str) -> Result<Slot, ParseYubikeySlotError> {
    Slot::from_str(slot_number).ok_or_else(|| ParseYubikeySlotError(slot_number.to_string()))
}

#[cfg(feature = "challenge_response")]
#[derive(Error, Debug)]
#[error("Invalid slot number: '{0}'")]
pub struct ParseYubikeySlotError(pub String);

#[derive(Error, Debug)]
pub enum KeyChallengeError {
    #[error("Invalid local challenge key secret")]
    InvalidLocalSecret(#[from] hex::FromHexError),

    #[error("Local challenge key secret is valid hex data, but incorrect length")]
    InvalidLocalSecretLength(#[from] CryptographyError),

    #[cfg(feature = "challenge_response")]
    #[error("Cannot list challenge-response keys: {0}")]
    CannotListKeys(ChallengeResponseError),

    #[cfg(feature = "challenge_response")]
    #[error(transparent)]
    KeySlot(#[from] ParseYubikeySlotError),

    #[cfg(feature = "challenge_response")]
    #[error("Cannot find key with serial number {serial_number} - {inner_error}")]
    KeyNotFound {
        serial_number: u32,
        inner_error: ChallengeResponseError,
    },

    #[cfg(feature = "challenge_response")]
    #[error("Cannot perform challenge: {0}")]
    KeyChallenge(ChallengeResponseError),
}

#[cfg(feature = "challenge_response")]
#[derive(Error, Debug)]
pub enum GetKeyError {
    #[error("Cannot list challenge-response keys: {0}")]
    CannotListKeys(ChallengeResponseError),

    #[error("No keys connected to the system")]
    NoKeys,

    #[error("Multiple keys are connected - need to provide a serial number")]
    AmbiguousKey,

    #[error("Cannot find key with serial number {serial_number}")]
    KeyNotFound { serial_number: u32 },
}

#[cfg(test)]
mod challenge_tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn local_challenge_matches_hmac_sha1() -> Result<(), KeyChallengeError> {
        // RFC 2202 test case 2: key "Jefe", data "what do ya want for nothing?"
        let key = ChallengeResponseKey::LocalChallenge(hex::encode(b"Jefe"));
        let response = key.perform_challenge(b"what do ya want for nothing?")?;

        assert_eq!(response, hex!("effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"));
        Ok(())
    }

    #[test]
    fn invalid_hex_secret_is_rejected() {
        let key = ChallengeResponseKey::LocalChallenge("not hex!".to_string());
        let res = key.perform_challenge(b"challenge");
        assert!(matches!(res, Err(KeyChallengeError::InvalidLocalSecret(_))));
    }
}
