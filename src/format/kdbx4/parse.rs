use std::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

use crate::{
    config::{CompressionConfig, DatabaseConfig, InnerCipherConfig, KdfConfig, OuterCipherConfig},
    crypt::{self, kdf::Kdf},
    db::{Database, HeaderAttachment},
    error::{DatabaseIntegrityError, DatabaseKeyError, DatabaseOpenError},
    format::{
        kdbx4::{
            KDBX4InnerHeader, KDBX4OuterHeader, HEADER_COMMENT, HEADER_COMPRESSION_ID,
            HEADER_ENCRYPTION_IV, HEADER_END, HEADER_KDF_PARAMS, HEADER_MASTER_SEED,
            HEADER_OUTER_ENCRYPTION_ID, HEADER_PUBLIC_CUSTOM_DATA, INNER_HEADER_BINARY_ATTACHMENTS,
            INNER_HEADER_END, INNER_HEADER_RANDOM_STREAM_ID, INNER_HEADER_RANDOM_STREAM_KEY,
            KDBX3_ONLY_HEADER_IDS,
        },
        DatabaseVersion,
    },
    hmac_block_stream,
    key::DatabaseKey,
    variant_dictionary::VariantDictionary,
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

impl From<&[u8]> for HeaderAttachment {
    fn from(data: &[u8]) -> Self {
        let flags = data.first().copied().unwrap_or_default();
        let content = data.get(1..).unwrap_or_default().to_vec();

        HeaderAttachment { flags, content }
    }
}

/// Open, decrypt and parse a KeePass KDBX4 database from a source and a key
pub(crate) fn parse_kdbx4(data: &[u8], key: &DatabaseKey) -> Result<Database, DatabaseOpenError> {
    let (header, inner_header, header_attachments, xml) = decrypt_kdbx4(data, key)?;

    // Initialize inner decryptor from inner header params
    let mut inner_decryptor = inner_header
        .inner_random_stream
        .get_cipher(&inner_header.inner_random_stream_key)
        .map_err(DatabaseIntegrityError::from)?;

    let database_content = crate::xml_db::parse::parse(&xml, &mut *inner_decryptor)?;

    let config = DatabaseConfig {
        version: header.version,
        outer_cipher_config: header.outer_cipher_config,
        compression_config: header.compression_config,
        inner_cipher_config: inner_header.inner_random_stream,
        kdf_config: header.kdf_config,
        public_custom_data: header.public_custom_data,
    };

    let db = Database {
        uuid: Uuid::new_v4(),
        config,
        header_attachments,
        root: database_content.root.group,
        deleted_objects: database_content.root.deleted_objects,
        meta: database_content.meta,
    };

    Ok(db)
}

/// Open and decrypt a KeePass KDBX4 database, yielding the headers, the
/// binary pool and the raw XML document
pub(crate) fn decrypt_kdbx4(
    data: &[u8],
    key: &DatabaseKey,
) -> Result<(KDBX4OuterHeader, KDBX4InnerHeader, Vec<HeaderAttachment>, Vec<u8>), DatabaseOpenError> {
    // parse header
    let header = parse_outer_header(data)?;
    let pos = header.body_start;

    // split file into segments:
    //      header_data         - The outer header data
    //      header_sha256       - A Sha256 hash of header_data (for verification of header integrity)
    //      header_hmac         - A HMAC of the header_data (for verification of the key)
    //      hmac_block_stream   - A HMAC-verified block stream of encrypted and compressed blocks
    let header_data = data
        .get(0..pos)
        .ok_or(DatabaseIntegrityError::Truncated { context: "header" })?;
    let header_sha256 = data
        .get(pos..(pos + 32))
        .ok_or(DatabaseIntegrityError::Truncated { context: "header hash" })?;
    let header_hmac = data
        .get((pos + 32)..(pos + 64))
        .ok_or(DatabaseIntegrityError::Truncated { context: "header HMAC" })?;
    let hmac_block_stream_data = data
        .get((pos + 64)..)
        .ok_or(DatabaseIntegrityError::Truncated { context: "payload" })?;

    // the challenge-response factors participate in the KDF input in this
    // version, challenged with the KDF seed
    let composite_key = key.raw_key(Some(&header.kdf_seed))?;
    let transformed_key = header
        .kdf_config
        .get_kdf_seeded(&header.kdf_seed)
        .transform_key(&composite_key)
        .map_err(DatabaseIntegrityError::from)?;

    let master_key = crypt::calculate_sha256(&[header.master_seed.as_ref(), &transformed_key]);

    // verify header accuracy before anything else
    if header_sha256 != crypt::calculate_sha256(&[header_data]).as_slice() {
        return Err(DatabaseIntegrityError::HeaderHashMismatch.into());
    }

    // verify credentials; a mismatch is indistinguishable from header
    // tampering, so both are reported as an authentication failure
    let hmac_key = crypt::calculate_sha512(&[
        &header.master_seed,
        &transformed_key,
        &hmac_block_stream::HMAC_KEY_END,
    ]);
    let header_hmac_key =
        hmac_block_stream::get_hmac_block_key(hmac_block_stream::HEADER_BLOCK_INDEX, &hmac_key)
            .map_err(DatabaseIntegrityError::from)?;
    let computed_hmac = crypt::calculate_hmac(&[header_data], &header_hmac_key)
        .map_err(DatabaseIntegrityError::from)?;
    if header_hmac != computed_hmac.as_slice() {
        return Err(DatabaseKeyError::IncorrectKey.into());
    }

    // read the encrypted payload from the hmac-verified block stream
    let payload_encrypted = hmac_block_stream::read_hmac_block_stream(hmac_block_stream_data, &hmac_key)
        .map_err(DatabaseIntegrityError::from)?;

    // Decrypt and decompress encrypted payload
    let payload_compressed = header
        .outer_cipher_config
        .get_cipher(&master_key, header.outer_iv.as_ref())
        .map_err(DatabaseIntegrityError::from)?
        .decrypt(&payload_encrypted)
        .map_err(crate::error::CryptographyError::from)
        .map_err(DatabaseIntegrityError::from)?;
    let payload = header
        .compression_config
        .get_compression()
        .decompress(&payload_compressed)
        .map_err(DatabaseIntegrityError::from)?;

    // KDBX4 has inner header, too - parse it
    let (inner_header, header_attachments, body_start) = parse_inner_header(&payload)?;

    // after inner header is one XML document
    let xml = payload
        .get(body_start..)
        .ok_or(DatabaseIntegrityError::Truncated { context: "XML document" })?;

    Ok((header, inner_header, header_attachments, xml.to_vec()))
}

fn read_u32_field(buf: &[u8]) -> Result<u32, DatabaseIntegrityError> {
    if buf.len() < 4 {
        return Err(DatabaseIntegrityError::Truncated {
            context: "header field",
        });
    }
    Ok(LittleEndian::read_u32(buf))
}

fn parse_outer_header(data: &[u8]) -> Result<KDBX4OuterHeader, DatabaseOpenError> {
    let version = DatabaseVersion::parse(data)?;

    if !matches!(version, DatabaseVersion::KDB4(_)) {
        return Err(DatabaseOpenError::UnsupportedVersion);
    }

    // skip over the version header
    let mut pos = DatabaseVersion::get_version_header_size();

    let mut outer_cipher_config: Option<OuterCipherConfig> = None;
    let mut compression_config: Option<CompressionConfig> = None;
    let mut master_seed: Option<Vec<u8>> = None;
    let mut outer_iv: Option<Vec<u8>> = None;
    let mut kdf: Option<(KdfConfig, Vec<u8>)> = None;
    let mut public_custom_data: Option<VariantDictionary> = None;

    // parse header
    loop {
        // parse header blocks.
        //
        // every block is a triplet of (5 + entry_length) bytes with this structure:
        //
        // (
        //   entry_type: u8,                        // a numeric entry type identifier
        //   entry_length: u32,                     // length of the entry buffer
        //   entry_buffer: [u8; entry_length]       // the entry buffer
        // )

        let entry_type = *take(data, &mut pos, 1, "outer header")?
            .first()
            .ok_or(DatabaseIntegrityError::Truncated { context: "outer header" })?;
        let entry_length = LittleEndian::read_u32(take(data, &mut pos, 4, "outer header")?) as usize;
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

            HEADER_ENCRYPTION_IV => outer_iv = Some(entry_buffer.to_vec()),

            HEADER_KDF_PARAMS => {
                let vd = VariantDictionary::parse(entry_buffer).map_err(DatabaseIntegrityError::from)?;
                kdf = Some(
                    <(KdfConfig, Vec<u8>)>::try_from(vd).map_err(DatabaseIntegrityError::from)?,
                );
            }

            HEADER_PUBLIC_CUSTOM_DATA => {
                public_custom_data =
                    Some(VariantDictionary::parse(entry_buffer).map_err(DatabaseIntegrityError::from)?);
            }

            _ if KDBX3_ONLY_HEADER_IDS.contains(&entry_type) => {
                return Err(DatabaseIntegrityError::InvalidOuterHeaderEntry { entry_type }.into());
            }

            _ => {
                tracing::warn!("Skipping unknown KDBX4 outer header field: {}", entry_type);
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
    let outer_iv = get_or_err(outer_iv, "Outer IV")?;
    let (kdf_config, kdf_seed) = get_or_err(kdf, "Key Derivation Function Parameters")?;

    Ok(KDBX4OuterHeader {
        version,
        outer_cipher_config,
        compression_config,
        master_seed,
        outer_iv,
        kdf_config,
        kdf_seed,
        public_custom_data,
        body_start: pos,
    })
}

fn parse_inner_header(
    data: &[u8],
) -> Result<(KDBX4InnerHeader, Vec<HeaderAttachment>, usize), DatabaseOpenError> {
    let mut pos = 0;

    let mut inner_random_stream = None;
    let mut inner_random_stream_key = None;
    let mut header_attachments = Vec::new();

    loop {
        let entry_type = *take(data, &mut pos, 1, "inner header")?
            .first()
            .ok_or(DatabaseIntegrityError::Truncated { context: "inner header" })?;
        let entry_length = LittleEndian::read_u32(take(data, &mut pos, 4, "inner header")?) as usize;
        let entry_buffer = take(data, &mut pos, entry_length, "inner header field")?;

        match entry_type {
            INNER_HEADER_END => break,

            INNER_HEADER_RANDOM_STREAM_ID => {
                inner_random_stream = Some(
                    InnerCipherConfig::try_from(read_u32_field(entry_buffer)?)
                        .map_err(DatabaseIntegrityError::from)?,
                );
            }

            INNER_HEADER_RANDOM_STREAM_KEY => inner_random_stream_key = Some(entry_buffer.to_vec()),

            INNER_HEADER_BINARY_ATTACHMENTS => {
                let attachment = HeaderAttachment::from(entry_buffer);
                header_attachments.push(attachment);
            }

            _ => {
                return Err(DatabaseIntegrityError::InvalidInnerHeaderEntry { entry_type }.into());
            }
        }
    }

    fn get_or_err<T>(v: Option<T>, err: &str) -> Result<T, DatabaseIntegrityError> {
        v.ok_or_else(|| DatabaseIntegrityError::IncompleteInnerHeader {
            missing_field: err.into(),
        })
    }

    let inner_random_stream = get_or_err(inner_random_stream, "Inner random stream UUID")?;
    let inner_random_stream_key = get_or_err(inner_random_stream_key, "Inner random stream key")?;

    let inner_header = KDBX4InnerHeader {
        inner_random_stream,
        inner_random_stream_key,
    };

    Ok((inner_header, header_attachments, pos))
}
