use std::convert::TryInto;

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    crypt::{self, kdf::Kdf},
    db::{Database, HeaderAttachment},
    error::DatabaseSaveError,
    format::kdbx4::{
        KDBX4InnerHeader, END_OF_HEADER, HEADER_COMPRESSION_ID, HEADER_ENCRYPTION_IV, HEADER_END,
        HEADER_KDF_PARAMS, HEADER_MASTER_SEED, HEADER_MASTER_SEED_SIZE, HEADER_OUTER_ENCRYPTION_ID,
        HEADER_PUBLIC_CUSTOM_DATA, INNER_HEADER_BINARY_ATTACHMENTS, INNER_HEADER_END,
        INNER_HEADER_RANDOM_STREAM_ID, INNER_HEADER_RANDOM_STREAM_KEY, INNER_RANDOM_STREAM_KEY_SIZE,
    },
    hmac_block_stream,
    key::DatabaseKey,
    xml_db::dump::DumpContext,
};

/// Dump a KeePass KDBX4 database using the key
pub(crate) fn dump_kdbx4(
    db: &Database,
    key: &DatabaseKey,
    writer: &mut dyn std::io::Write,
) -> Result<(), DatabaseSaveError> {
    if !matches!(db.config.version, crate::format::DatabaseVersion::KDB4(_)) {
        return Err(DatabaseSaveError::UnsupportedVersion);
    }

    // generate fresh random material for this save
    let mut master_seed = vec![0; HEADER_MASTER_SEED_SIZE];
    getrandom::getrandom(&mut master_seed)?;

    let mut outer_iv = vec![0; db.config.outer_cipher_config.get_iv_size()];
    getrandom::getrandom(&mut outer_iv)?;

    let mut inner_random_stream_key = vec![0; INNER_RANDOM_STREAM_KEY_SIZE];
    getrandom::getrandom(&mut inner_random_stream_key)?;

    let (kdf, kdf_seed) = db.config.kdf_config.get_kdf_and_seed()?;

    // the challenge-response factors are challenged with the KDF seed, so
    // that their contribution participates in the key transformation
    let composite_key = key.raw_key(Some(&kdf_seed))?;
    let transformed_key = kdf.transform_key(&composite_key)?;

    let master_key = crypt::calculate_sha256(&[&master_seed, &transformed_key]);

    // write header
    let header_data = dump_outer_header(db, &master_seed, &outer_iv, &kdf_seed)?;
    writer.write_all(&header_data)?;

    let header_sha256 = crypt::calculate_sha256(&[&header_data]);
    writer.write_all(&header_sha256)?;

    // write header HMAC to authenticate the header against the key
    let hmac_key = crypt::calculate_sha512(&[
        &master_seed,
        &transformed_key,
        &hmac_block_stream::HMAC_KEY_END,
    ]);
    let header_hmac_key =
        hmac_block_stream::get_hmac_block_key(hmac_block_stream::HEADER_BLOCK_INDEX, &hmac_key)?;
    let header_hmac = crypt::calculate_hmac(&[&header_data], &header_hmac_key)?;
    writer.write_all(&header_hmac)?;

    // compose the payload: inner header, then the XML document
    let inner_header = KDBX4InnerHeader {
        inner_random_stream: db.config.inner_cipher_config.clone(),
        inner_random_stream_key,
    };

    let mut payload: Vec<u8> = Vec::new();
    dump_inner_header(&inner_header, &db.header_attachments, &mut payload);

    let mut inner_cipher = inner_header
        .inner_random_stream
        .get_cipher(&inner_header.inner_random_stream_key)?;

    let mut ctx = DumpContext {
        inner_cipher: &mut *inner_cipher,
        version: db.config.version.clone(),
        header_hash: None,
        binaries: &db.header_attachments,
    };
    crate::xml_db::dump::dump(db, &mut ctx, &mut payload)?;

    let payload_compressed = db
        .config
        .compression_config
        .get_compression()
        .compress(&payload)?;

    let payload_encrypted = db
        .config
        .outer_cipher_config
        .get_cipher(&master_key, &outer_iv)?
        .encrypt(&payload_compressed);

    let payload_hmac = hmac_block_stream::write_hmac_block_stream(&payload_encrypted, &hmac_key)?;
    writer.write_all(&payload_hmac)?;

    Ok(())
}

impl HeaderAttachment {
    fn dump(&self) -> Vec<u8> {
        let mut attachment: Vec<u8> = vec![self.flags];
        attachment.extend_from_slice(&self.content);
        attachment
    }
}

fn write_header_field(header_data: &mut Vec<u8>, field_id: u8, field_value: &[u8]) {
    header_data.push(field_id);
    let pos = header_data.len();
    header_data.resize(pos + 4, 0);
    LittleEndian::write_u32(
        &mut header_data[pos..pos + 4],
        field_value.len().try_into().unwrap_or(u32::MAX),
    );
    header_data.extend_from_slice(field_value);
}

fn dump_outer_header(
    db: &Database,
    master_seed: &[u8],
    outer_iv: &[u8],
    kdf_seed: &[u8],
) -> Result<Vec<u8>, DatabaseSaveError> {
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

    write_header_field(&mut header_data, HEADER_ENCRYPTION_IV, outer_iv);

    write_header_field(&mut header_data, HEADER_MASTER_SEED, master_seed);

    let vd = db.config.kdf_config.to_variant_dictionary(kdf_seed);
    let mut vd_data = Vec::new();
    vd.dump(&mut vd_data)?;
    write_header_field(&mut header_data, HEADER_KDF_PARAMS, &vd_data);

    if let Some(ref public_custom_data) = db.config.public_custom_data {
        let mut pcd_data = Vec::new();
        public_custom_data.dump(&mut pcd_data)?;
        write_header_field(&mut header_data, HEADER_PUBLIC_CUSTOM_DATA, &pcd_data);
    }

    write_header_field(&mut header_data, HEADER_END, &END_OF_HEADER);

    Ok(header_data)
}

fn dump_inner_header(
    inner_header: &KDBX4InnerHeader,
    header_attachments: &[HeaderAttachment],
    payload: &mut Vec<u8>,
) {
    let mut random_stream_data = [0u8; 4];
    LittleEndian::write_u32(&mut random_stream_data, inner_header.inner_random_stream.dump());
    write_header_field(payload, INNER_HEADER_RANDOM_STREAM_ID, &random_stream_data);

    write_header_field(
        payload,
        INNER_HEADER_RANDOM_STREAM_KEY,
        &inner_header.inner_random_stream_key,
    );

    for attachment in header_attachments {
        write_header_field(payload, INNER_HEADER_BINARY_ATTACHMENTS, &attachment.dump());
    }

    write_header_field(payload, INNER_HEADER_END, &[]);
}
