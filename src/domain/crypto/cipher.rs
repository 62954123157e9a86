//! Kuznyechik content encryption and key wrapping.
//!
//! - CTR-ACPKM: counter mode whose key is re-derived every 256 KiB section.
//! - KDF_TREE_GOSTR3411_2012_256: splits a shared secret into wrap keys.
//! - KExp15 / KImp15: authenticated key export (CMAC then CTR).

use crate::domain::constants::{ACPKM_SECTION_LEN, GOST_KEY_LEN, KUZNYECHIK_BLOCK_LEN};
use crate::domain::crypto::hash::HashAlgorithm;
use crate::infra::error::{CspError, CspResult};
use cmac::{Cmac, Mac};
use ctr::cipher::generic_array::GenericArray;
use ctr::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher, StreamCipherSeek};
use kuznyechik::Kuznyechik;

type KuznyechikCtr = ctr::Ctr128BE<Kuznyechik>;

/// IV length for Kuznyechik CTR (half a block)
pub const CTR_IV_LEN: usize = KUZNYECHIK_BLOCK_LEN / 2;

/// Length of a KExp15 output: key plus CMAC tag
pub const KEXP15_LEN: usize = GOST_KEY_LEN + KUZNYECHIK_BLOCK_LEN;

fn counter_block(iv: &[u8]) -> CspResult<[u8; KUZNYECHIK_BLOCK_LEN]> {
    if iv.len() != CTR_IV_LEN {
        return Err(CspError::InvalidInput(format!(
            "CTR IV must be {CTR_IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    let mut block = [0u8; KUZNYECHIK_BLOCK_LEN];
    block[..CTR_IV_LEN].copy_from_slice(iv);
    Ok(block)
}

fn check_key(key: &[u8]) -> CspResult<()> {
    if key.len() != GOST_KEY_LEN {
        return Err(CspError::InvalidInput(format!(
            "Kuznyechik key must be {GOST_KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}

/// Next section key: `E_K(D1) || E_K(D2)` with `D = 80 81 .. 9F`.
fn acpkm_next_key(key: &[u8]) -> CspResult<Vec<u8>> {
    let cipher = Kuznyechik::new_from_slice(key)
        .map_err(|e| CspError::CryptoFailure(format!("ACPKM key: {e}")))?;
    let mut out = Vec::with_capacity(GOST_KEY_LEN);
    for half in 0..2u8 {
        let start = 0x80 + half * KUZNYECHIK_BLOCK_LEN as u8;
        let d: Vec<u8> = (start..start + KUZNYECHIK_BLOCK_LEN as u8).collect();
        let mut block = GenericArray::clone_from_slice(&d);
        cipher.encrypt_block(&mut block);
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Apply the CTR-ACPKM keystream in place. Encryption and decryption are
/// the same operation.
///
/// # Errors
/// Returns `InvalidInput` for a wrong key or IV length.
pub fn ctr_acpkm_apply(key: &[u8], iv: &[u8], data: &mut [u8]) -> CspResult<()> {
    ctr_acpkm_sections(key, iv, data, ACPKM_SECTION_LEN as usize)
}

fn ctr_acpkm_sections(key: &[u8], iv: &[u8], data: &mut [u8], section_len: usize) -> CspResult<()> {
    check_key(key)?;
    let block = counter_block(iv)?;
    let mut section_key = key.to_vec();
    let mut offset: u64 = 0;
    for section in data.chunks_mut(section_len) {
        let mut cipher = KuznyechikCtr::new_from_slices(&section_key, &block)
            .map_err(|e| CspError::CryptoFailure(format!("CTR init: {e}")))?;
        cipher.seek(offset);
        cipher.apply_keystream(section);
        offset += section.len() as u64;
        section_key = acpkm_next_key(&section_key)?;
    }
    Ok(())
}

fn ctr_apply(key: &[u8], iv: &[u8], data: &mut [u8]) -> CspResult<()> {
    check_key(key)?;
    let block = counter_block(iv)?;
    let mut cipher = KuznyechikCtr::new_from_slices(key, &block)
        .map_err(|e| CspError::CryptoFailure(format!("CTR init: {e}")))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn cmac(key: &[u8], parts: &[&[u8]]) -> CspResult<Vec<u8>> {
    let mut mac = <Cmac<Kuznyechik> as Mac>::new_from_slice(key)
        .map_err(|e| CspError::CryptoFailure(format!("CMAC key: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// KDF_TREE_GOSTR3411_2012_256 with `L = 512` and `R = 1`, returning the
/// first and second 32-byte blocks.
///
/// # Errors
/// Returns `CryptoFailure` if HMAC setup fails.
pub fn kdf_tree_256(key: &[u8], label: &[u8], seed: &[u8]) -> CspResult<(Vec<u8>, Vec<u8>)> {
    let block = |i: u8| -> CspResult<Vec<u8>> {
        let mut input = Vec::with_capacity(1 + label.len() + 1 + seed.len() + 2);
        input.push(i);
        input.extend_from_slice(label);
        input.push(0x00);
        input.extend_from_slice(seed);
        // L = 512 bits
        input.extend_from_slice(&[0x02, 0x00]);
        HashAlgorithm::Streebog256.hmac(key, &input)
    };
    Ok((block(1)?, block(2)?))
}

/// KExp15: `CTR_Kenc(IV, K || CMAC_Kmac(IV || K))`.
///
/// # Errors
/// Returns `InvalidInput` for wrong key or IV lengths.
pub fn kexp15(cek: &[u8], k_enc: &[u8], k_mac: &[u8], iv: &[u8]) -> CspResult<Vec<u8>> {
    check_key(cek)?;
    check_key(k_mac)?;
    let tag = cmac(k_mac, &[iv, cek])?;
    let mut out = Vec::with_capacity(KEXP15_LEN);
    out.extend_from_slice(cek);
    out.extend_from_slice(&tag);
    ctr_apply(k_enc, iv, &mut out)?;
    Ok(out)
}

/// KImp15, the inverse of [`kexp15`], checking the CMAC tag.
///
/// # Errors
/// Returns `CryptoFailure` when the tag does not match and `FormatError`
/// for a wrapped key of the wrong length.
pub fn kimp15(wrapped: &[u8], k_enc: &[u8], k_mac: &[u8], iv: &[u8]) -> CspResult<Vec<u8>> {
    if wrapped.len() != KEXP15_LEN {
        return Err(CspError::FormatError(format!(
            "Wrapped key must be {KEXP15_LEN} bytes, got {}",
            wrapped.len()
        )));
    }
    let mut plain = wrapped.to_vec();
    ctr_apply(k_enc, iv, &mut plain)?;
    let (cek, tag) = plain.split_at(GOST_KEY_LEN);
    let expected = cmac(k_mac, &[iv, cek])?;
    let diff = expected
        .iter()
        .zip(tag)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    if diff != 0 {
        return Err(CspError::CryptoFailure(
            "Key unwrap failed: integrity check mismatch".to_string(),
        ));
    }
    Ok(cek.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctr_acpkm_round_trip_across_sections() {
        let key = [0x42u8; 32];
        let iv = [0x01u8; 8];
        let original: Vec<u8> = (0..(ACPKM_SECTION_LEN as usize + 1000))
            .map(|i| (i % 251) as u8)
            .collect();
        let mut data = original.clone();
        ctr_acpkm_apply(&key, &iv, &mut data).unwrap();
        assert_ne!(data, original);
        ctr_acpkm_apply(&key, &iv, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_acpkm_rekeys_after_first_section() {
        let key = [0x42u8; 32];
        let iv = [0x01u8; 8];
        let len = ACPKM_SECTION_LEN as usize + 64;

        let mut acpkm = vec![0u8; len];
        ctr_acpkm_apply(&key, &iv, &mut acpkm).unwrap();
        let mut plain_ctr = vec![0u8; len];
        ctr_apply(&key, &iv, &mut plain_ctr).unwrap();

        let section = ACPKM_SECTION_LEN as usize;
        assert_eq!(acpkm[..section], plain_ctr[..section]);
        assert_ne!(acpkm[section..], plain_ctr[section..]);
    }

    #[test]
    fn test_kexp15_round_trip_and_tamper() {
        let cek = [0x10u8; 32];
        let k_enc = [0x20u8; 32];
        let k_mac = [0x30u8; 32];
        let iv = [0x40u8; 8];
        let wrapped = kexp15(&cek, &k_enc, &k_mac, &iv).unwrap();
        assert_eq!(wrapped.len(), KEXP15_LEN);
        assert_eq!(kimp15(&wrapped, &k_enc, &k_mac, &iv).unwrap(), cek);

        let mut bad = wrapped.clone();
        bad[3] ^= 0x01;
        assert!(matches!(
            kimp15(&bad, &k_enc, &k_mac, &iv),
            Err(CspError::CryptoFailure(_))
        ));
        assert!(kimp15(&wrapped, &k_enc, &[0x31u8; 32], &iv).is_err());
    }

    #[test]
    fn test_kdf_tree_outputs_distinct_keys() {
        let (a, b) = kdf_tree_256(&[0x55u8; 32], b"kdf tree", &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(a.len(), 32);
        assert_eq!(b.len(), 32);
        assert_ne!(a, b);
        let (c, _) = kdf_tree_256(&[0x55u8; 32], b"kdf tree", &[0u8; 8]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let mut data = [0u8; 4];
        assert!(ctr_acpkm_apply(&[0u8; 16], &[0u8; 8], &mut data).is_err());
        assert!(ctr_acpkm_apply(&[0u8; 32], &[0u8; 16], &mut data).is_err());
        assert!(kimp15(&[0u8; 40], &[0u8; 32], &[0u8; 32], &[0u8; 8]).is_err());
    }

    fn unhex(h: &str) -> Vec<u8> {
        hex::decode(h).unwrap()
    }

    const KEY: &str = "8899aabbccddeeff0011223344556677fedcba98765432100123456789abcdef";
    const PLAIN: &str = "1122334455667700ffeeddccbbaa998800112233445566778899aabbcceeff0a\
                         112233445566778899aabbcceeff0a002233445566778899aabbcceeff0a0011\
                         33445566778899aabbcceeff0a001122445566778899aabbcceeff0a00112233\
                         5566778899aabbcceeff0a0011223344";

    #[test]
    fn test_cmac_known_answer() {
        let tag = cmac(&unhex(KEY), &[&unhex(PLAIN)[..64]]).unwrap();
        assert_eq!(hex::encode(tag), "336f4d296059fbe34ddeb35b37749c67");
    }

    #[test]
    fn test_ctr_acpkm_known_answer() {
        let mut data = unhex(PLAIN);
        ctr_acpkm_sections(&unhex(KEY), &unhex("1234567890abcef0"), &mut data, 32).unwrap();
        assert_eq!(
            hex::encode(&data),
            "f195d8bec10ed1dbd57b5fa240bda1b885eee733f6a13e5df33ce4b33c45dee4\
             4bceeb8f646f4c55001706275e85e800587c4df568d094393e4834afd0805046\
             cf30f57686aeece11cfc6c316b8a896edffd07ec813636460c4f3b743423163e\
             6409a9c282fac8d469d221e7fbd6de5d"
        );
    }

    #[test]
    fn test_kdf_tree_known_answer() {
        let key: Vec<u8> = (0..32u8).collect();
        let (first, second) =
            kdf_tree_256(&key, &unhex("26bdb878"), &unhex("af21434145656378")).unwrap();
        assert_eq!(
            hex::encode(first),
            "22b6837845c6bef65ea71672b265831086d3c76aebe6dae91cad51d83f79d16b"
        );
        assert_eq!(
            hex::encode(second),
            "074c9330599d7f8d712fca54392f4ddde93751206b3584c8f43f9e6dc51531f9"
        );
    }

    #[test]
    fn test_kexp15_known_answer() {
        let k_enc = unhex("202122232425262728292a2b2c2d2e2f38393a3b3c3d3e3f3031323334353637");
        let k_mac = unhex("08090a0b0c0d0e0f0001020304050607101112131415161718191a1b1c1d1e1f");
        let iv = unhex("09090a0b0c0d0e0f");
        let wrapped = kexp15(&unhex(KEY), &k_enc, &k_mac, &iv).unwrap();
        assert_eq!(
            hex::encode(&wrapped),
            "5f00cb36ea6e553e8e4be45f1e708e357d437cab9247cd091ed561d707feacb0\
             9f391fdef8ce423e081df154e8f77025"
        );
        assert_eq!(kimp15(&wrapped, &k_enc, &k_mac, &iv).unwrap(), unhex(KEY));
    }
}
