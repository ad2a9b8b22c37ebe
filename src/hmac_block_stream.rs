//! The HMAC-authenticated block framing used by KDBX4 payloads.

use byteorder::{ByteOrder, LittleEndian};
use cipher::generic_array::{typenum::U64, GenericArray};
use hex_literal::hex;

use crate::error::{BlockStreamError, CryptographyError};

/// Domain separator appended when deriving the base HMAC key
pub const HMAC_KEY_END: [u8; 1] = hex!("01");

/// Maximum amount of plaintext framed into one block
pub(crate) const HMAC_BLOCK_SIZE: usize = 1024 * 1024;

/// The block index used to authenticate the outer header
pub(crate) const HEADER_BLOCK_INDEX: u64 = u64::MAX;

fn take<'a>(data: &'a [u8], pos: &mut usize, count: usize) -> Result<&'a [u8], BlockStreamError> {
    let end = pos.checked_add(count).ok_or(BlockStreamError::Truncated)?;
    let out = data.get(*pos..end).ok_or(BlockStreamError::Truncated)?;
    *pos = end;
    Ok(out)
}

/// Read from a HMAC block stream into a raw buffer
pub(crate) fn read_hmac_block_stream(
    data: &[u8],
    key: &GenericArray<u8, U64>,
) -> Result<Vec<u8>, BlockStreamError> {
    let mut out = Vec::new();

    let mut pos = 0;
    let mut block_index: u64 = 0;

    loop {
        let hmac = take(data, &mut pos, 32)?;
        let size_bytes = take(data, &mut pos, 4)?;
        let size = LittleEndian::read_u32(size_bytes) as usize;

        let mut size_buf = [0u8; 4];
        size_buf.copy_from_slice(size_bytes);

        let block = take(data, &mut pos, size)?;

        // verify the block hmac; the zero-length end marker is authenticated too
        let hmac_block_key = get_hmac_block_key(block_index, key)?;
        let mut block_index_buf = [0u8; 8];
        LittleEndian::write_u64(&mut block_index_buf, block_index);

        if hmac
            != crate::crypt::calculate_hmac(&[&block_index_buf, &size_buf, block], &hmac_block_key)?
                .as_slice()
        {
            return Err(BlockStreamError::BlockHashMismatch { block_index });
        }

        block_index += 1;

        if size == 0 {
            break;
        }

        out.extend_from_slice(block);
    }

    Ok(out)
}

/// Write a raw buffer as a HMAC block stream
pub(crate) fn write_hmac_block_stream(
    data: &[u8],
    key: &GenericArray<u8, U64>,
) -> Result<Vec<u8>, CryptographyError> {
    let mut out = Vec::new();

    let mut block_index: u64 = 0;

    for block in data.chunks(HMAC_BLOCK_SIZE) {
        let mut size_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut size_bytes, block.len() as u32);

        let hmac_block_key = get_hmac_block_key(block_index, key)?;
        let mut block_index_buf = [0u8; 8];
        LittleEndian::write_u64(&mut block_index_buf, block_index);

        let hmac = crate::crypt::calculate_hmac(&[&block_index_buf, &size_bytes, block], &hmac_block_key)?;

        out.extend_from_slice(&hmac);
        out.extend_from_slice(&size_bytes);
        out.extend_from_slice(block);

        block_index += 1;
    }

    // the end of the HMAC block stream is an empty block with a valid HMAC
    let hmac_block_key = get_hmac_block_key(block_index, key)?;
    let mut block_index_buf = [0u8; 8];
    LittleEndian::write_u64(&mut block_index_buf, block_index);

    let size_bytes = [0u8; 4];
    let hmac = crate::crypt::calculate_hmac(&[&block_index_buf, &size_bytes, &[]], &hmac_block_key)?;

    out.extend_from_slice(&hmac);
    out.extend_from_slice(&size_bytes);

    Ok(out)
}

/// Derive the per-block HMAC key: `SHA-512(u64_le(block_index) || base_key)`
pub(crate) fn get_hmac_block_key(
    block_index: u64,
    key: &GenericArray<u8, U64>,
) -> Result<GenericArray<u8, U64>, CryptographyError> {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, block_index);
    Ok(crate::crypt::calculate_sha512(&[&buf, key]))
}
