//! Composite database keys.
//!
//! A composite key is an ordered list of static key factors (password,
//! keyfile), optionally followed by challenge-response factors. The static
//! factors are hashed in the order they were added; re-ordering them yields
//! a different key.

pub mod challenge;

pub use challenge::ChallengeResponseKey;

use std::io::{Cursor, Read};

use base64::{engine::general_purpose as base64_engine, Engine as _};
use byteorder::{LittleEndian, ReadBytesExt};
use cipher::generic_array::{typenum::U32, GenericArray};
use hex_literal::hex;
use thiserror::Error;
use xml::name::OwnedName;
use xml::reader::{EventReader, XmlEvent};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypt::calculate_sha256;
use crate::error::DatabaseKeyError;
use crate::io::WriteLengthTaggedExt;

pub type KeyElement = Vec<u8>;

// Tags identifying the factor types in serialized key blobs
const COMPOSITE_KEY_TAG: [u8; 16] = hex!("76a7ae25a5424add98497c06be945b94");
const PASSWORD_FACTOR_TAG: [u8; 16] = hex!("a63d1c4cbb3a4b27a9b4f1ad72856c21");
const KEYFILE_FACTOR_TAG: [u8; 16] = hex!("c3dbfae05b2f4b2f8cfa63013cb9f4e6");
const CHALLENGE_FACTOR_TAG: [u8; 16] = hex!("e2a3ab2746d04b93ae5c0be63781d6d4");

fn parse_xml_keyfile(xml: &[u8]) -> Result<KeyElement, ParseXmlKeyfileError> {
    let parser = EventReader::new(xml);

    let mut tag_stack = Vec::new();

    let mut key_version: Option<String> = None;
    let mut key_value: Option<String> = None;

    for ev in parser {
        match ev? {
            XmlEvent::StartElement {
                name: OwnedName { ref local_name, .. },
                ..
            } => {
                tag_stack.push(local_name.clone());
            }
            XmlEvent::EndElement { .. } => {
                tag_stack.pop();
            }
            XmlEvent::Characters(s) => {
                if tag_stack == ["KeyFile", "Meta", "Version"] {
                    key_version = Some(s);
                    continue;
                }

                if tag_stack == ["KeyFile", "Key", "Data"] {
                    key_value = Some(s);
                    continue;
                }
            }
            _ => {}
        }
    }

    let key_value = key_value.ok_or(ParseXmlKeyfileError::EmptyKey)?;

    let key_bytes = key_value.as_bytes().to_vec();

    if key_version == Some("2.0".to_string()) {
        // TODO we should also validate the integrity of a v2 keyfile using the hash value

        let trimmed_key = key_value
            .trim()
            .replace(' ', "")
            .replace('\n', "")
            .replace('\r', "");

        return if let Ok(key) = hex::decode(&trimmed_key) {
            Ok(key)
        } else {
            Ok(key_bytes)
        };
    }

    // Check if the key is base64-encoded. If yes, return decoded bytes
    if let Ok(key) = base64_engine::STANDARD.decode(&key_bytes) {
        Ok(key)
    } else {
        Ok(key_bytes)
    }
}

#[derive(Error, Debug)]
pub enum ParseXmlKeyfileError {
    #[error("Error parsing keyfile XML: {0}")]
    Xml(#[from] xml::reader::Error),

    #[error("Empty key in XML keyfile")]
    EmptyKey,
}

fn parse_keyfile(buffer: &[u8]) -> Result<KeyElement, ParseXmlKeyfileError> {
    // try to parse the buffer as XML, if successful, use that data instead of full file
    if let Ok(v) = parse_xml_keyfile(buffer) {
        Ok(v)
    } else if buffer.len() == 32 {
        // legacy binary key format
        Ok(buffer.to_vec())
    } else {
        Ok(calculate_sha256(&[buffer]).as_slice().to_vec())
    }
}

/// A single static factor of a composite key
#[derive(Debug, Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub enum KeyFactor {
    /// A password; contributes its SHA-256
    Password(String),
    /// The contents of a keyfile; contributes the key parsed from it
    Keyfile(Vec<u8>),
}

impl KeyFactor {
    fn key_element(&self) -> Result<KeyElement, DatabaseKeyError> {
        match self {
            KeyFactor::Password(password) => Ok(calculate_sha256(&[password.as_bytes()]).to_vec()),
            KeyFactor::Keyfile(contents) => {
                parse_keyfile(contents).map_err(|_| DatabaseKeyError::InvalidKeyFile)
            }
        }
    }
}

/// A KeePass key, composed of password, keyfile and challenge-response
/// factors
#[derive(Debug, Clone, Default, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct DatabaseKey {
    factors: Vec<KeyFactor>,
    challenge_response_keys: Vec<ChallengeResponseKey>,
}

impl DatabaseKey {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.factors.push(KeyFactor::Password(password.to_string()));
        self
    }

    #[cfg(feature = "utilities")]
    pub fn with_password_from_prompt(mut self, prompt_message: &str) -> Result<Self, std::io::Error> {
        self.factors
            .push(KeyFactor::Password(rpassword::prompt_password(prompt_message)?));
        Ok(self)
    }

    pub fn with_keyfile(mut self, keyfile: &mut dyn Read) -> Result<Self, std::io::Error> {
        let mut buf = Vec::new();
        keyfile.read_to_end(&mut buf)?;

        self.factors.push(KeyFactor::Keyfile(buf));

        Ok(self)
    }

    pub fn with_challenge_response_key(mut self, challenge_response_key: ChallengeResponseKey) -> Self {
        self.challenge_response_keys.push(challenge_response_key);
        self
    }

    #[cfg(feature = "utilities")]
    pub fn with_hmac_sha1_secret_from_prompt(mut self, prompt_message: &str) -> Result<Self, std::io::Error> {
        self.challenge_response_keys
            .push(ChallengeResponseKey::LocalChallenge(rpassword::prompt_password(
                prompt_message,
            )?));
        Ok(self)
    }

    /// Returns true if the database key is not associated with any key factor.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty() && self.challenge_response_keys.is_empty()
    }

    /// Compute the composite key hash.
    ///
    /// The static factors are hashed in order. When `challenge_seed` is given
    /// and challenge-response factors are present, their combined response is
    /// folded into the hash as well; without a seed the result matches the
    /// legacy construction in which hardware tokens participate only after
    /// key transformation.
    pub(crate) fn raw_key(
        &self,
        challenge_seed: Option<&[u8]>,
    ) -> Result<GenericArray<u8, U32>, DatabaseKeyError> {
        if self.is_empty() {
            return Err(DatabaseKeyError::EmptyKey);
        }

        let elements = self
            .factors
            .iter()
            .map(|f| f.key_element())
            .collect::<Result<Vec<KeyElement>, DatabaseKeyError>>()?;

        let mut element_refs: Vec<&[u8]> = elements.iter().map(|v| &v[..]).collect();

        let challenge_result;
        if let Some(seed) = challenge_seed {
            challenge_result = self.challenge(seed)?;
            if !challenge_result.is_empty() {
                element_refs.push(&challenge_result);
            }
        }

        Ok(calculate_sha256(&element_refs))
    }

    /// Compute the combined challenge-response contribution for a seed.
    ///
    /// Returns an empty buffer when no challenge-response factors exist, so
    /// that databases without tokens keep their key unchanged.
    pub(crate) fn challenge(&self, seed: &[u8]) -> Result<Vec<u8>, DatabaseKeyError> {
        if self.challenge_response_keys.is_empty() {
            return Ok(Vec::new());
        }

        let responses = self
            .challenge_response_keys
            .iter()
            .map(|key| key.perform_challenge(seed))
            .collect::<Result<Vec<KeyElement>, _>>()?;

        let response_refs: Vec<&[u8]> = responses.iter().map(|v| &v[..]).collect();

        Ok(calculate_sha256(&response_refs).to_vec())
    }

    /// Serialize the key factors into a tagged binary blob.
    ///
    /// The blob contains the raw factor material and must only ever be handed
    /// to an encrypting store, such as a quick-unlock keystore.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(&COMPOSITE_KEY_TAG);

        for factor in &self.factors {
            match factor {
                KeyFactor::Password(password) => {
                    out.extend_from_slice(&PASSWORD_FACTOR_TAG);
                    let _ = out.write_with_len(password.as_bytes());
                }
                KeyFactor::Keyfile(contents) => {
                    out.extend_from_slice(&KEYFILE_FACTOR_TAG);
                    let _ = out.write_with_len(contents);
                }
            }
        }

        for key in &self.challenge_response_keys {
            #[allow(irrefutable_let_patterns)]
            if let ChallengeResponseKey::LocalChallenge(secret) = key {
                out.extend_from_slice(&CHALLENGE_FACTOR_TAG);
                let _ = out.write_with_len(secret.as_bytes());
            }
            // hardware tokens are device-bound and are not serialized
        }

        out
    }

    /// Reconstruct a key from a blob produced by [`DatabaseKey::serialize`].
    /// Factors with an unknown tag are skipped.
    pub fn deserialize(data: &[u8]) -> Result<Self, DatabaseKeyError> {
        let mut cursor = Cursor::new(data);

        let mut tag = [0u8; 16];
        cursor.read_exact(&mut tag).map_err(|_| DatabaseKeyError::InvalidKeyData)?;
        if tag != COMPOSITE_KEY_TAG {
            return Err(DatabaseKeyError::InvalidKeyData);
        }

        let mut key = DatabaseKey::new();

        while (cursor.position() as usize) < data.len() {
            cursor.read_exact(&mut tag).map_err(|_| DatabaseKeyError::InvalidKeyData)?;

            let len = cursor
                .read_u32::<LittleEndian>()
                .map_err(|_| DatabaseKeyError::InvalidKeyData)? as usize;

            let mut payload = vec![0u8; len];
            cursor
                .read_exact(&mut payload)
                .map_err(|_| DatabaseKeyError::InvalidKeyData)?;

            if tag == PASSWORD_FACTOR_TAG {
                let password =
                    String::from_utf8(payload).map_err(|_| DatabaseKeyError::InvalidKeyData)?;
                key.factors.push(KeyFactor::Password(password));
            } else if tag == KEYFILE_FACTOR_TAG {
                key.factors.push(KeyFactor::Keyfile(payload));
            } else if tag == CHALLENGE_FACTOR_TAG {
                let secret =
                    String::from_utf8(payload).map_err(|_| DatabaseKeyError::InvalidKeyData)?;
                key.challenge_response_keys
                    .push(ChallengeResponseKey::LocalChallenge(secret));
            }
        }

        Ok(key)
    }
}
