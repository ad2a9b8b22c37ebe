//! The SHA-256-verified block framing used by KDBX3 payloads.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::BlockStreamError;

/// Maximum amount of plaintext framed into one block
pub(crate) const HASHED_BLOCK_SIZE: usize = 1024 * 1024;

fn take<'a>(data: &'a [u8], pos: &mut usize, count: usize) -> Result<&'a [u8], BlockStreamError> {
    let end = pos.checked_add(count).ok_or(BlockStreamError::Truncated)?;
    let out = data.get(*pos..end).ok_or(BlockStreamError::Truncated)?;
    *pos = end;
    Ok(out)
}

/// Read from a hashed block stream into a raw buffer.
///
/// Every block carries its index and the SHA-256 over its contents. Indices
/// must be contiguous starting at 0; the stream ends with a zero-size block
/// whose hash field is all zeroes.
pub(crate) fn read_hashed_block_stream(data: &[u8]) -> Result<Vec<u8>, BlockStreamError> {
    let mut out = Vec::new();

    let mut pos = 0;
    let mut block_index: u32 = 0;

    loop {
        let index = LittleEndian::read_u32(take(data, &mut pos, 4)?);
        if index != block_index {
            return Err(BlockStreamError::BlockIndexMismatch {
                expected: block_index,
                actual: index,
            });
        }

        let hash = take(data, &mut pos, 32)?.to_vec();
        let size = LittleEndian::read_u32(take(data, &mut pos, 4)?) as usize;

        if size == 0 {
            // the end marker carries an all-zero hash
            if hash.iter().any(|b| *b != 0) {
                return Err(BlockStreamError::BlockHashMismatch {
                    block_index: block_index as u64,
                });
            }
            break;
        }

        let block = take(data, &mut pos, size)?;

        if hash != crate::crypt::calculate_sha256(&[block]).as_slice() {
            return Err(BlockStreamError::BlockHashMismatch {
                block_index: block_index as u64,
            });
        }

        out.extend_from_slice(block);
        block_index += 1;
    }

    Ok(out)
}

/// Write a raw buffer as a hashed block stream
pub(crate) fn write_hashed_block_stream(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();

    let mut block_index: u32 = 0;

    for block in data.chunks(HASHED_BLOCK_SIZE) {
        let mut index_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut index_bytes, block_index);

        let mut size_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut size_bytes, block.len() as u32);

        let hash = crate::crypt::calculate_sha256(&[block]);

        out.extend_from_slice(&index_bytes);
        out.extend_from_slice(&hash);
        out.extend_from_slice(&size_bytes);
        out.extend_from_slice(block);

        block_index += 1;
    }

    // end marker: index, all-zero hash, zero size
    let mut index_bytes = [0u8; 4];
    LittleEndian::write_u32(&mut index_bytes, block_index);
    out.extend_from_slice(&index_bytes);
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&[0u8; 4]);

    out
}

#[cfg(test)]
mod hashed_block_stream_tests {
    use super::*;

    #[test]
    fn roundtrip() -> Result<(), BlockStreamError> {
        let data = b"block framed data for the legacy format".to_vec();

        let stream = write_hashed_block_stream(&data);
        let read_back = read_hashed_block_stream(&stream)?;

        assert_eq!(read_back, data);
        Ok(())
    }

    #[test]
    fn empty_payload_roundtrip() -> Result<(), BlockStreamError> {
        let stream = write_hashed_block_stream(&[]);
        assert_eq!(stream.len(), 40);
        assert_eq!(read_hashed_block_stream(&stream)?, Vec::<u8>::new());
        Ok(())
    }

    #[test]
    fn large_payloads_are_chunked() -> Result<(), BlockStreamError> {
        let data = vec![0xA5u8; HASHED_BLOCK_SIZE + 17];

        let stream = write_hashed_block_stream(&data);
        let expected_len = (40 + HASHED_BLOCK_SIZE) + (40 + 17) + 40;
        assert_eq!(stream.len(), expected_len);

        assert_eq!(read_hashed_block_stream(&stream)?, data);
        Ok(())
    }

    #[test]
    fn any_flipped_data_byte_is_detected() {
        let data = b"tamper detection data".to_vec();
        let stream = write_hashed_block_stream(&data);

        for i in 0..stream.len() {
            let mut tampered = stream.clone();
            tampered[i] ^= 0x01;

            let res = read_hashed_block_stream(&tampered);
            assert!(res.is_err(), "flipping byte {} was not detected", i);
        }
    }

    #[test]
    fn non_monotonic_indices_are_rejected() {
        let data = b"data".to_vec();
        let mut stream = write_hashed_block_stream(&data);

        // overwrite the first block index with 1
        stream[0] = 1;

        let res = read_hashed_block_stream(&stream);
        assert!(matches!(
            res,
            Err(BlockStreamError::BlockIndexMismatch {
                expected: 0,
                actual: 1
            })
        ));
    }
}
