use std::convert::TryInto;

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    crypt::{self, kdf::Kdf},
    db::Database,
    error::DatabaseSaveError,
    format::kdbx3::{
        END_OF_HEADER, HEADER_COMPRESSION_ID, HEADER_ENCRYPTION_IV, HEADER_END,
        HEADER_INNER_RANDOM_STREAM_ID, HEADER_MASTER_SEED, HEADER_MASTER_SEED_SIZE,
        HEADER_OUTER_ENCRYPTION_ID, HEADER_PROTECTED_STREAM_KEY, HEADER_STREAM_START_BYTES,
        HEADER_STREAM_START_SIZE, HEADER_TRANSFORM_ROUNDS, HEADER_TRANSFORM_SEED,
    },
    hashed_block_stream::write_hashed_block_stream,
    key::DatabaseKey,
    xml_db::dump::DumpContext,
};

/// Dump a KeePass KDBX3 database using the key
pub(crate) fn dump_kdbx3(
    db: &Database,
    key: &DatabaseKey,
    writer: &mut dyn std::io::Write,
) -> Result<(), DatabaseSaveError> {
    if !matches!(db.config.version, crate::format::DatabaseVersion::KDB3(_)) {
        return Err(DatabaseSaveError::UnsupportedVersion);
    }

    // the legacy header carries the AES-KDF parameters directly; other KDFs
    // cannot be expressed in this version
    let transform_rounds = match db.config.kdf_config {
        crate::config::KdfConfig::Aes { rounds } => rounds,
        _ => {
            return Err(DatabaseSaveError::InvalidConfig {
                setting: "key derivation function",
            })
        }
    };

    // generate fresh random material for this save
    let mut master_seed = vec![0; HEADER_MASTER_SEED_SIZE];
    getrandom::getrandom(&mut master_seed)?;

    let mut transform_seed = vec![0; 32];
    getrandom::getrandom(&mut transform_seed)?;

    let mut outer_iv = vec![0; db.config.outer_cipher_config.get_iv_size()];
    getrandom::getrandom(&mut outer_iv)?;

    let mut protected_stream_key = vec![0; db.config.inner_cipher_config.get_key_size()];
    getrandom::getrandom(&mut protected_stream_key)?;

    let mut stream_start = vec![0; HEADER_STREAM_START_SIZE];
    getrandom::getrandom(&mut stream_start)?;

    // build the header before touching the payload, so that its hash can be
    // embedded into the XML document
    let mut header_data: Vec<u8> = Vec::new();
    db.config.version.dump(&mut header_data)?;

    write_header_field(
        &mut header_data,
        HEADER_OUTER_ENCRYPTION_ID,
        &db.config.outer_cipher_config.dump(),
    );
    write_header_field(
        &mut header_data,
        HEADER_COMPRESSION_ID,
        &db.config.compression_config.dump(),
    );
    write_header_field(&mut header_data, HEADER_MASTER_SEED, &master_seed);
    write_header_field(&mut header_data, HEADER_TRANSFORM_SEED, &transform_seed);

    let mut transform_rounds_data = [0u8; 8];
    LittleEndian::write_u64(&mut transform_rounds_data, transform_rounds);
    write_header_field(&mut header_data, HEADER_TRANSFORM_ROUNDS, &transform_rounds_data);

    write_header_field(&mut header_data, HEADER_ENCRYPTION_IV, &outer_iv);
    write_header_field(&mut header_data, HEADER_PROTECTED_STREAM_KEY, &protected_stream_key);
    write_header_field(&mut header_data, HEADER_STREAM_START_BYTES, &stream_start);

    let mut inner_stream_id = [0u8; 4];
    LittleEndian::write_u32(&mut inner_stream_id, db.config.inner_cipher_config.dump());
    write_header_field(&mut header_data, HEADER_INNER_RANDOM_STREAM_ID, &inner_stream_id);

    write_header_field(&mut header_data, HEADER_END, &END_OF_HEADER);

    let header_hash = crypt::calculate_sha256(&[&header_data]);

    // challenge the hardware tokens with the master seed, then derive the
    // final key; the challenge response is not part of the KDF input in this
    // version
    let challenge_response = key.challenge(&master_seed)?;

    let composite_key = key.raw_key(None)?;
    let transformed_key = crypt::kdf::AesKdf {
        seed: transform_seed,
        rounds: transform_rounds,
    }
    .transform_key(&composite_key)?;

    let master_key =
        crypt::calculate_sha256(&[&master_seed, &challenge_response, &transformed_key]);

    // emit the XML document, masking protected values along the way
    let mut inner_cipher = db
        .config
        .inner_cipher_config
        .get_cipher(&protected_stream_key)?;

    let mut xml = Vec::new();
    let mut ctx = DumpContext {
        inner_cipher: &mut *inner_cipher,
        version: db.config.version.clone(),
        header_hash: Some(header_hash.to_vec()),
        binaries: &db.header_attachments,
    };
    crate::xml_db::dump::dump(db, &mut ctx, &mut xml)?;

    let payload_compressed = db.config.compression_config.get_compression().compress(&xml)?;

    // frame the plaintext, prefix the sentinel bytes, encrypt everything
    let mut payload = stream_start.clone();
    payload.extend_from_slice(&write_hashed_block_stream(&payload_compressed));

    let payload_encrypted = db
        .config
        .outer_cipher_config
        .get_cipher(&master_key, &outer_iv)?
        .encrypt(&payload);

    writer.write_all(&header_data)?;
    writer.write_all(&payload_encrypted)?;

    Ok(())
}

fn write_header_field(header_data: &mut Vec<u8>, field_id: u8, field_value: &[u8]) {
    header_data.push(field_id);
    let pos = header_data.len();
    header_data.resize(pos + 2, 0);
    LittleEndian::write_u16(
        &mut header_data[pos..pos + 2],
        field_value.len().try_into().unwrap_or(u16::MAX),
    );
    header_data.extend_from_slice(field_value);
}
