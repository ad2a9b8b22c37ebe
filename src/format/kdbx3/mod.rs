mod dump;
mod parse;

pub(crate) use crate::format::kdbx3::dump::dump_kdbx3;
pub(crate) use crate::format::kdbx3::parse::{decrypt_kdbx3, parse_kdbx3};

use crate::{
    config::{CompressionConfig, InnerCipherConfig, OuterCipherConfig},
    format::DatabaseVersion,
};

/// Size for a master seed in bytes
pub const HEADER_MASTER_SEED_SIZE: usize = 32;
/// Size of the sentinel bytes that prefix the decrypted payload
pub const HEADER_STREAM_START_SIZE: usize = 32;

/// Header entry denoting the end of the header
pub const HEADER_END: u8 = 0;
/// Header entry denoting a comment
pub const HEADER_COMMENT: u8 = 1;
/// A UUID specifying which cipher suite should be used to encrypt the payload
pub const HEADER_OUTER_ENCRYPTION_ID: u8 = 2;
/// First byte determines compression of payload
pub const HEADER_COMPRESSION_ID: u8 = 3;
/// Master seed for deriving the master key
pub const HEADER_MASTER_SEED: u8 = 4;
/// Seed of the AES key derivation function
pub const HEADER_TRANSFORM_SEED: u8 = 5;
/// Round count of the AES key derivation function
pub const HEADER_TRANSFORM_ROUNDS: u8 = 6;
/// Initialization Vector for decrypting the payload
pub const HEADER_ENCRYPTION_IV: u8 = 7;
/// Key for decrypting the inner protected values
pub const HEADER_PROTECTED_STREAM_KEY: u8 = 8;
/// First bytes of the decrypted payload, to detect a wrong key
pub const HEADER_STREAM_START_BYTES: u8 = 9;
/// Which cipher to use for decrypting the inner protected values
pub const HEADER_INNER_RANDOM_STREAM_ID: u8 = 10;

// KDBX4-only header ids; their presence in a KDBX3 header means the file is
// mislabelled, so they are rejected rather than skipped
pub(crate) const KDBX4_ONLY_HEADER_IDS: [u8; 2] = [11, 12];

/// The end-of-header marker value
pub(crate) const END_OF_HEADER: [u8; 4] = [0x0d, 0x0a, 0x0d, 0x0a];

pub(crate) struct KDBX3Header {
    version: DatabaseVersion,
    outer_cipher_config: OuterCipherConfig,
    compression_config: CompressionConfig,
    master_seed: Vec<u8>,
    transform_seed: Vec<u8>,
    transform_rounds: u64,
    outer_iv: Vec<u8>,
    protected_stream_key: Vec<u8>,
    stream_start: Vec<u8>,
    inner_cipher_config: InnerCipherConfig,
    /// Offset of the first ciphertext byte
    body_start: usize,
}

#[cfg(test)]
mod kdbx3_tests {
    use super::*;

    use crate::{
        config::{DatabaseConfig, KdfConfig},
        db::{fields, Database, Entry, Group, NodeRef},
        error::{DatabaseOpenError, DatabaseSaveError},
        format::KDBX3_CURRENT_MINOR_VERSION,
        key::DatabaseKey,
    };

    fn kdbx3_config(
        outer_cipher_config: OuterCipherConfig,
        compression_config: CompressionConfig,
    ) -> DatabaseConfig {
        DatabaseConfig {
            version: DatabaseVersion::KDB3(KDBX3_CURRENT_MINOR_VERSION),
            outer_cipher_config,
            compression_config,
            inner_cipher_config: InnerCipherConfig::Salsa20,
            kdf_config: KdfConfig::Aes { rounds: 120 },
            public_custom_data: None,
        }
    }

    fn test_with_config(config: DatabaseConfig) {
        let mut db = Database::new(config);

        let mut entry = Entry::new();
        entry.set_unprotected(fields::TITLE, "Demo Entry");
        entry.set_protected(fields::PASSWORD, "secret");
        db.root.add_child(entry);

        let db_key = DatabaseKey::new().with_password("test-password");

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &db_key, &mut encrypted_db).unwrap();

        let decrypted_db = parse_kdbx3(&encrypted_db, &db_key).unwrap();

        assert_eq!(decrypted_db, db);

        let entry = match decrypted_db.root.get(&["Demo Entry"]) {
            Some(NodeRef::Entry(e)) => e,
            _ => panic!("could not find the entry"),
        };
        assert_eq!(entry.get_password(), Some("secret"));
    }

    #[test]
    fn test_config_matrix() {
        let outer_cipher_configs = [
            OuterCipherConfig::AES256,
            OuterCipherConfig::Twofish,
            OuterCipherConfig::ChaCha20,
        ];

        let compression_configs = [CompressionConfig::None, CompressionConfig::GZip];

        for outer_cipher_config in &outer_cipher_configs {
            for compression_config in &compression_configs {
                test_with_config(kdbx3_config(
                    outer_cipher_config.clone(),
                    compression_config.clone(),
                ));
            }
        }
    }

    // "empty database with AES/GZip and a one-letter password"
    #[test]
    fn empty_aes_gzip_database_roundtrip() {
        let mut config = kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::GZip);
        config.kdf_config = KdfConfig::Aes { rounds: 6000 };

        let db = Database::new(config);
        let db_key = DatabaseKey::new().with_password("a");

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &db_key, &mut encrypted_db).unwrap();

        let decrypted_db = parse_kdbx3(&encrypted_db, &db_key).unwrap();

        assert_eq!(decrypted_db.root.name, "Root");
        assert!(decrypted_db.root.children.is_empty());
    }

    #[test]
    fn header_hash_element_matches_written_header() {
        let db = Database::new(kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::GZip));
        let db_key = DatabaseKey::new().with_password("a");

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &db_key, &mut encrypted_db).unwrap();

        // decrypt to get at the XML and the header bounds
        let (header, _inner_cipher_key, xml) = decrypt_kdbx3(&encrypted_db, &db_key).unwrap();

        let xml_text = String::from_utf8_lossy(&xml);
        let hash_b64 = xml_text
            .split("<HeaderHash>")
            .nth(1)
            .and_then(|s| s.split("</HeaderHash>").next())
            .expect("the XML must contain a HeaderHash element");

        use base64::{engine::general_purpose as base64_engine, Engine as _};
        let stored_hash = base64_engine::STANDARD.decode(hash_b64).unwrap();

        let actual_hash = crate::crypt::calculate_sha256(&[&encrypted_db[..header.body_start]]);
        assert_eq!(stored_hash, actual_hash.as_slice());
    }

    #[test]
    fn tampered_header_hash_is_rejected() {
        let db = Database::new(kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::None));
        let db_key = DatabaseKey::new().with_password("a");

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &db_key, &mut encrypted_db).unwrap();

        // flip a byte inside the protected stream key header field; the file
        // still decrypts, so only the header hash check can catch this
        encrypted_db[150] ^= 0x01;

        let res = parse_kdbx3(&encrypted_db, &db_key);
        assert!(matches!(
            res,
            Err(DatabaseOpenError::DatabaseIntegrity(
                crate::error::DatabaseIntegrityError::HeaderHashMismatch
            ))
        ));
    }

    #[test]
    fn wrong_password_fails_on_stream_start() {
        let db = Database::new(kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::GZip));

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &DatabaseKey::new().with_password("right"), &mut encrypted_db).unwrap();

        let res = parse_kdbx3(&encrypted_db, &DatabaseKey::new().with_password("wrong"));
        assert!(matches!(
            res,
            Err(DatabaseOpenError::Key(crate::error::DatabaseKeyError::IncorrectKey))
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let db = Database::new(kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::GZip));
        let db_key = DatabaseKey::new().with_password("a");

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &db_key, &mut encrypted_db).unwrap();

        // flip a byte in the middle of the encrypted payload, far behind the
        // stream start sentinel
        let index = encrypted_db.len() - 64;
        encrypted_db[index] ^= 0x01;

        let res = parse_kdbx3(&encrypted_db, &db_key);
        assert!(res.is_err());
    }

    #[test]
    fn kdbx3_cannot_store_argon2() {
        let mut config = kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::GZip);
        config.kdf_config = KdfConfig::Argon2 {
            iterations: 2,
            memory: 65536,
            parallelism: 2,
            version: argon2::Version::Version13,
        };

        let db = Database::new(config);
        let db_key = DatabaseKey::new().with_password("a");

        let mut encrypted_db = Vec::new();
        let res = dump_kdbx3(&db, &db_key, &mut encrypted_db);
        assert!(matches!(res, Err(DatabaseSaveError::InvalidConfig { .. })));
    }

    #[test]
    fn attachments_roundtrip_through_the_xml_pool() {
        let mut db = Database::new(kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::GZip));

        let ref_id = db.add_binary(b"attachment contents".to_vec(), false);

        let mut entry = Entry::new();
        entry.set_unprotected(fields::TITLE, "With attachment");
        entry.attachments.push(crate::db::Attachment {
            key: "hello.txt".to_string(),
            ref_id,
        });
        db.root.add_child(entry);

        let db_key = DatabaseKey::new().with_password("a");

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &db_key, &mut encrypted_db).unwrap();

        let decrypted_db = parse_kdbx3(&encrypted_db, &db_key).unwrap();

        assert_eq!(decrypted_db.get_binary(ref_id), Some(&b"attachment contents"[..]));

        let entry = match decrypted_db.root.get(&["With attachment"]) {
            Some(NodeRef::Entry(e)) => e,
            _ => panic!("could not find the entry"),
        };
        assert_eq!(entry.attachments.len(), 1);
        assert_eq!(entry.attachments[0].key, "hello.txt");
        assert_eq!(entry.attachments[0].ref_id, ref_id);
    }

    #[test]
    fn group_tree_is_preserved() {
        let mut db = Database::new(kdbx3_config(OuterCipherConfig::AES256, CompressionConfig::GZip));

        let mut subgroup = Group::new("Bank accounts");
        let mut entry = Entry::new();
        entry.set_unprotected(fields::TITLE, "Checking");
        entry.set_protected(fields::PASSWORD, "hunter2");
        subgroup.add_child(entry);
        db.root.add_child(subgroup);

        let db_key = DatabaseKey::new().with_password("a");

        let mut encrypted_db = Vec::new();
        dump_kdbx3(&db, &db_key, &mut encrypted_db).unwrap();

        let decrypted_db = parse_kdbx3(&encrypted_db, &db_key).unwrap();

        let entry = match decrypted_db.root.get(&["Bank accounts", "Checking"]) {
            Some(NodeRef::Entry(e)) => e,
            _ => panic!("could not find the entry"),
        };
        assert_eq!(entry.get_password(), Some("hunter2"));
    }
}
