use std::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

use crate::{
    config::{CompressionConfig, DatabaseConfig, InnerCipherConfig, KdfConfig, OuterCipherConfig},
    crypt::{self, kdf::Kdf},
    db::{Database, HeaderAttachment},
    error::{DatabaseIntegrityError, DatabaseKeyError, DatabaseOpenError},
    format::{
        kdbx3::{
            KDBX3Header, HEADER_COMMENT, HEADER_COMPRESSION_ID, HEADER_ENCRYPTION_IV, HEADER_END,
            HEADER_INNER_RANDOM_STREAM_ID, HEADER_MASTER_SEED, HEADER_OUTER_ENCRYPTION_ID,
            HEADER_PROTECTED_STREAM_KEY, HEADER_STREAM_START_BYTES, HEADER_TRANSFORM_ROUNDS,
            HEADER_TRANSFORM_SEED, KDBX4_ONLY_HEADER_IDS,
        },
        DatabaseVersion,
    },
    hashed_block_stream::read_hashed_block_stream,
    key::DatabaseKey,
};

fn take<'a>(
    data: &'a [u8],
    pos: &mut usize,
    count: usize,
    context: &'static str,
) -> Result<&'a [u8], DatabaseIntegrityError> {
    let end = pos
        .checked_add(count)
        .ok_or(DatabaseIntegrityError::Truncated { context })?;
    let out = data
        .get(*pos..end)
        .ok_or(DatabaseIntegrityError::Truncated { context })?;
    *pos = end;
    Ok(out)
}

/// Open, decrypt and parse a KeePass KDBX3 database from a source and a key
pub(crate) fn parse_kdbx3(data: &[u8], key: &DatabaseKey) -> Result<Database, DatabaseOpenError> {
    let (header, protected_stream_key, xml) = decrypt_kdbx3(data, key)?;

    // derive the key for the inner stream and decrypt the protected values
    // while walking the XML document
    let mut inner_decryptor = header
        .inner_cipher_config
        .get_cipher(&protected_stream_key)
        .map_err(DatabaseIntegrityError::from)?;

    let database_content = crate::xml_db::parse::parse(&xml, &mut *inner_decryptor)?;

    let mut meta = database_content.meta;

    // the header is not authenticated by a MAC; the hash embedded in the XML
    // detects accidental corruption of the header
    if let Some(stored_hash) = meta.header_hash.take() {
        let actual_hash = crypt::calculate_sha256(&[&data[..header.body_start]]);
        if stored_hash != actual_hash.as_slice() {
            return Err(DatabaseIntegrityError::HeaderHashMismatch.into());
        }
    }

    // KDBX3 stores the binary pool inside the XML document; move it into the
    // shared pool, ordered by its ID attributes
    let mut binaries = std::mem::take(&mut meta.binaries).binaries;
    binaries.sort_by_key(|b| {
        b.identifier
            .as_deref()
            .and_then(|id| id.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
    });
    let header_attachments = binaries
        .into_iter()
        .map(|b| HeaderAttachment {
            flags: 0,
            content: b.content,
        })
        .collect();

    let config = DatabaseConfig {
        version: header.version,
        outer_cipher_config: header.outer_cipher_config,
        compression_config: header.compression_config,
        inner_cipher_config: header.inner_cipher_config,
        kdf_config: KdfConfig::Aes {
            rounds: header.transform_rounds,
        },
        public_custom_data: None,
    };

    let db = Database {
        uuid: Uuid::new_v4(),
        config,
        header_attachments,
        root: database_content.root.group,
        deleted_objects: database_content.root.deleted_objects,
        meta,
    };

    Ok(db)
}

/// Open and decrypt a KeePass KDBX3 database, yielding the header, the
/// protected stream key and the raw XML document
pub(crate) fn decrypt_kdbx3(
    data: &[u8],
    key: &DatabaseKey,
) -> Result<(KDBX3Header, Vec<u8>, Vec<u8>), DatabaseOpenError> {
    let header = parse_header(data)?;

    // the KDF input never contains challenge-response contributions here; the
    // challenge response is mixed into the final key afterwards instead
    let composite_key = key.raw_key(None)?;
    let transformed_key = crypt::kdf::AesKdf {
        seed: header.transform_seed.clone(),
        rounds: header.transform_rounds,
    }
    .transform_key(&composite_key)
    .map_err(DatabaseIntegrityError::from)?;

    let challenge_response = key.challenge(&header.master_seed)?;

    let master_key = crypt::calculate_sha256(&[
        header.master_seed.as_ref(),
        &challenge_response,
        &transformed_key,
    ]);

    let payload_encrypted = data
        .get(header.body_start..)
        .ok_or(DatabaseIntegrityError::Truncated { context: "payload" })?;

    let payload = header
        .outer_cipher_config
        .get_cipher(&master_key, header.outer_iv.as_ref())
        .map_err(DatabaseIntegrityError::from)?
        .decrypt(payload_encrypted)
        .map_err(|_| DatabaseKeyError::IncorrectKey)?;

    // the first bytes of the plaintext reveal a wrong key before parsing
    // anything else
    let stream_start_len = header.stream_start.len();
    match payload.get(0..stream_start_len) {
        Some(stream_start) if stream_start == header.stream_start.as_slice() => {}
        _ => return Err(DatabaseKeyError::IncorrectKey.into()),
    }

    let payload_blocks = payload
        .get(stream_start_len..)
        .ok_or(DatabaseIntegrityError::Truncated { context: "payload" })?;

    let buf = read_hashed_block_stream(payload_blocks).map_err(DatabaseIntegrityError::from)?;

    let xml = header
        .compression_config
        .get_compression()
        .decompress(&buf)
        .map_err(DatabaseIntegrityError::from)?;

    let protected_stream_key = header.protected_stream_key.clone();
    Ok((header, protected_stream_key, xml))
}

fn read_u32_field(buf: &[u8]) -> Result<u32, DatabaseIntegrityError> {
    if buf.len() < 4 {
        return Err(DatabaseIntegrityError::Truncated {
            context: "outer header field",
        });
    }
    Ok(LittleEndian::read_u32(buf))
}

fn read_u64_field(buf: &[u8]) -> Result<u64, DatabaseIntegrityError> {
    if buf.len() < 8 {
        return Err(DatabaseIntegrityError::Truncated {
            context: "outer header field",
        });
    }
    Ok(LittleEndian::read_u64(buf))
}

fn parse_header(data: &[u8]) -> Result<KDBX3Header, DatabaseOpenError> {
    let version = DatabaseVersion::parse(data)?;

    if !matches!(version, DatabaseVersion::KDB3(_)) {
        return Err(DatabaseOpenError::UnsupportedVersion);
    }

    let mut outer_cipher_config: Option<OuterCipherConfig> = None;
    let mut compression_config: Option<CompressionConfig> = None;
    let mut master_seed: Option<Vec<u8>> = None;
    let mut transform_seed: Option<Vec<u8>> = None;
    let mut transform_rounds: Option<u64> = None;
    let mut outer_iv: Option<Vec<u8>> = None;
    let mut protected_stream_key: Option<Vec<u8>> = None;
    let mut stream_start: Option<Vec<u8>> = None;
    let mut inner_cipher_config: Option<InnerCipherConfig> = None;

    // skip over the version header
    let mut pos = DatabaseVersion::get_version_header_size();

    // parse header
    loop {
        // parse header blocks.
        //
        // every block is a triplet of (3 + entry_length) bytes with this structure:
        //
        // (
        //   entry_type: u8,                        // a numeric entry type identifier
        //   entry_length: u16,                     // length of the entry buffer
        //   entry_buffer: [u8; entry_length]       // the entry buffer
        // )

        let entry_type = *take(data, &mut pos, 1, "outer header")?
            .first()
            .ok_or(DatabaseIntegrityError::Truncated { context: "outer header" })?;
        let entry_length = LittleEndian::read_u16(take(data, &mut pos, 2, "outer header")?) as usize;
        let entry_buffer = take(data, &mut pos, entry_length, "outer header field")?;

        match entry_type {
            HEADER_END => {
                break;
            }

            HEADER_COMMENT => {}

            HEADER_OUTER_ENCRYPTION_ID => {
                outer_cipher_config = Some(
                    OuterCipherConfig::try_from(entry_buffer).map_err(DatabaseIntegrityError::from)?,
                );
            }

            HEADER_COMPRESSION_ID => {
                compression_config = Some(
                    CompressionConfig::try_from(read_u32_field(entry_buffer)?)
                        .map_err(DatabaseIntegrityError::from)?,
                );
            }

            HEADER_MASTER_SEED => master_seed = Some(entry_buffer.to_vec()),

            HEADER_TRANSFORM_SEED => transform_seed = Some(entry_buffer.to_vec()),

            HEADER_TRANSFORM_ROUNDS => transform_rounds = Some(read_u64_field(entry_buffer)?),

            HEADER_ENCRYPTION_IV => outer_iv = Some(entry_buffer.to_vec()),

            HEADER_PROTECTED_STREAM_KEY => protected_stream_key = Some(entry_buffer.to_vec()),

            HEADER_STREAM_START_BYTES => stream_start = Some(entry_buffer.to_vec()),

            HEADER_INNER_RANDOM_STREAM_ID => {
                inner_cipher_config = Some(
                    InnerCipherConfig::try_from(read_u32_field(entry_buffer)?)
                        .map_err(DatabaseIntegrityError::from)?,
                );
            }

            _ if KDBX4_ONLY_HEADER_IDS.contains(&entry_type) => {
                return Err(DatabaseIntegrityError::InvalidOuterHeaderEntry { entry_type }.into());
            }

            _ => {
                tracing::warn!("Skipping unknown KDBX3 outer header field: {}", entry_type);
            }
        };
    }

    // at this point, the header needs to be fully defined - unwrap options and return errors if
    // something is missing

    fn get_or_err<T>(v: Option<T>, err: &str) -> Result<T, DatabaseIntegrityError> {
        v.ok_or_else(|| DatabaseIntegrityError::IncompleteOuterHeader {
            missing_field: err.into(),
        })
    }

    let outer_cipher_config = get_or_err(outer_cipher_config, "Outer Cipher ID")?;
    let compression_config = get_or_err(compression_config, "Compression ID")?;
    let master_seed = get_or_err(master_seed, "Master seed")?;
    let transform_seed = get_or_err(transform_seed, "Transform seed")?;
    let transform_rounds = get_or_err(transform_rounds, "Number of transformation rounds")?;
    let outer_iv = get_or_err(outer_iv, "Outer cipher IV")?;
    let protected_stream_key = get_or_err(protected_stream_key, "Protected stream key")?;
    let stream_start = get_or_err(stream_start, "Stream start bytes")?;
    let inner_cipher_config = get_or_err(inner_cipher_config, "Inner cipher ID")?;

    Ok(KDBX3Header {
        version,
        outer_cipher_config,
        compression_config,
        master_seed,
        transform_seed,
        transform_rounds,
        outer_iv,
        protected_stream_key,
        stream_start,
        inner_cipher_config,
        body_start: pos,
    })
}
