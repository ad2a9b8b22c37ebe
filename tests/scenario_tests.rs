use kdbx_core::{
    config::{CompressionConfig, DatabaseConfig, DatabaseVersion, InnerCipherConfig, KdfConfig, OuterCipherConfig},
    error::{DatabaseIntegrityError, DatabaseKeyError, DatabaseOpenError},
    fields, Database, DatabaseKey, Entry, NodeRef,
};

/// Build the standard demo database: one entry with title/user/password, the
/// password protected, saved as KDBX4 with Argon2d and ChaCha20.
fn demo_v4_bytes() -> (DatabaseKey, Vec<u8>) {
    let config = DatabaseConfig {
        version: DatabaseVersion::KDB4(1),
        outer_cipher_config: OuterCipherConfig::ChaCha20,
        compression_config: CompressionConfig::GZip,
        inner_cipher_config: InnerCipherConfig::ChaCha20,
        kdf_config: KdfConfig::Argon2 {
            iterations: 2,
            memory: 65536,
            parallelism: 2,
            version: argon2::Version::Version13,
        },
        public_custom_data: None,
    };

    let mut db = Database::new(config);

    let mut entry = Entry::new();
    entry.set_unprotected(fields::TITLE, "t");
    entry.set_unprotected(fields::USERNAME, "u");
    entry.set_protected(fields::PASSWORD, "p");
    db.root.add_child(entry);

    let key = DatabaseKey::new().with_password("demopass");

    let mut buffer = Vec::new();
    db.save(&mut buffer, key.clone()).expect("save should succeed");

    (key, buffer)
}

#[test]
fn empty_v3_database_with_single_letter_password() {
    let config = DatabaseConfig {
        version: DatabaseVersion::KDB3(1),
        outer_cipher_config: OuterCipherConfig::AES256,
        compression_config: CompressionConfig::GZip,
        inner_cipher_config: InnerCipherConfig::Salsa20,
        kdf_config: KdfConfig::Aes { rounds: 6000 },
        public_custom_data: None,
    };

    let db = Database::new(config);
    let key = DatabaseKey::new().with_password("a");

    let mut buffer = Vec::new();
    db.save(&mut buffer, key.clone()).expect("save should succeed");

    let loaded = Database::parse(&buffer, key).expect("load should succeed");

    assert_eq!(loaded.root.name, "Root");
    assert!(loaded.root.children.is_empty());
}

#[test]
fn v4_argon2_chacha20_protected_password_roundtrip() {
    let (key, buffer) = demo_v4_bytes();

    let loaded = Database::parse(&buffer, key).expect("load should succeed");

    let entry = match loaded.root.get(&["t"]) {
        Some(NodeRef::Entry(e)) => e,
        _ => panic!("entry not found"),
    };

    assert_eq!(entry.get(fields::PASSWORD), Some("p"));
}

#[test]
fn loading_with_a_wrong_key_exposes_nothing() {
    let (_key, buffer) = demo_v4_bytes();

    let res = Database::parse(&buffer, DatabaseKey::new().with_password("a"));

    match res {
        Err(DatabaseOpenError::Key(DatabaseKeyError::IncorrectKey)) => {}
        other => panic!("expected an authentication failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn tampering_with_the_outer_header_fails_the_load() {
    let (key, mut buffer) = demo_v4_bytes();

    // offset 200 lies within the outer header
    buffer[200] ^= 0x01;

    let res = Database::parse(&buffer, key);

    assert!(matches!(
        res,
        Err(DatabaseOpenError::Key(DatabaseKeyError::IncorrectKey))
            | Err(DatabaseOpenError::DatabaseIntegrity(
                DatabaseIntegrityError::HeaderHashMismatch
            ))
    ));
}

#[test]
fn tampering_with_the_body_is_an_integrity_failure() {
    let (key, mut buffer) = demo_v4_bytes();

    // flip the very last byte, inside the final HMAC block
    let index = buffer.len() - 1;
    buffer[index] ^= 0x01;

    let res = Database::parse(&buffer, key);

    assert!(matches!(
        res,
        Err(DatabaseOpenError::DatabaseIntegrity(DatabaseIntegrityError::BlockStream(_)))
    ));
}

#[test]
fn truncated_files_are_rejected_as_malformed() {
    let (key, buffer) = demo_v4_bytes();

    for length in [0, 4, 11, 64, 200] {
        let res = Database::parse(&buffer[..length], key.clone());
        assert!(res.is_err(), "truncation to {} bytes was not detected", length);
    }
}

#[test]
fn kdb1_files_are_unsupported() {
    // KDB1 magic: the shared identifier followed by the KeePass 1 signature
    let mut data = vec![0x03, 0xd9, 0xa2, 0x9a, 0x65, 0xfb, 0x4b, 0xb5];
    data.extend_from_slice(&[0x00; 4]);
    data.extend_from_slice(&[0u8; 100]);

    let res = Database::parse(&data, DatabaseKey::new().with_password("x"));
    assert!(matches!(res, Err(DatabaseOpenError::UnsupportedVersion)));
}

#[test]
fn version_probe_does_not_need_a_key() {
    let (_key, buffer) = demo_v4_bytes();

    let version = Database::get_version(&mut buffer.as_slice()).expect("version should parse");
    assert_eq!(format!("{}", version), "KDBX4.1");
}
