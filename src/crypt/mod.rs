use cipher::generic_array::{
    typenum::{U20, U32, U64},
    GenericArray,
};

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::CryptographyError;

pub(crate) mod ciphers;
pub(crate) mod kdf;

pub(crate) fn calculate_hmac(
    elements: &[&[u8]],
    key: &[u8],
) -> Result<GenericArray<u8, U32>, CryptographyError> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key)?;

    for element in elements {
        mac.update(element);
    }

    let result = mac.finalize();
    Ok(result.into_bytes())
}

pub(crate) fn calculate_hmac_sha1(
    elements: &[&[u8]],
    key: &[u8],
) -> Result<GenericArray<u8, U20>, CryptographyError> {
    type HmacSha1 = Hmac<Sha1>;
    let mut mac = HmacSha1::new_from_slice(key)?;

    for element in elements {
        mac.update(element);
    }

    let result = mac.finalize();
    Ok(result.into_bytes())
}

pub(crate) fn calculate_sha256(elements: &[&[u8]]) -> GenericArray<u8, U32> {
    let mut digest = Sha256::new();

    for element in elements {
        digest.update(element);
    }

    digest.finalize()
}

pub(crate) fn calculate_sha512(elements: &[&[u8]]) -> GenericArray<u8, U64> {
    let mut digest = Sha512::new();

    for element in elements {
        digest.update(element);
    }

    digest.finalize()
}

#[cfg(test)]
mod crypt_tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = calculate_sha256(&[b"a", b"bc"]);
        assert_eq!(
            digest.as_slice(),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn sha512_known_vector() {
        // SHA-512("abc")
        let digest = calculate_sha512(&[b"abc"]);
        assert_eq!(
            digest.as_slice(),
            hex!(
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a"
                "2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
            )
        );
    }

    #[test]
    fn hmac_sha256_known_vector() -> Result<(), crate::error::CryptographyError> {
        // RFC 4231 test case 2
        let digest = calculate_hmac(&[b"what do ya want ", b"for nothing?"], b"Jefe")?;
        assert_eq!(
            digest.as_slice(),
            hex!("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
        Ok(())
    }
}
