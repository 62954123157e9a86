//! Messages produced by an independent GOST implementation.
//!
//! The fixtures are attached `signedData` with one embedded self-signed
//! certificate on a tc26 curve, a `signingTime` attribute and no
//! parameters on the digest identifiers.

use gost_csp::{
    Certificate, CertificateStore, ContentType, CryptoMessage, HashAlgorithm, KeyAlgorithm,
    ParamSet,
};

const PAYLOAD: &[u8] = b"signed outside gost-csp\n";
const TC26_256A: &[u8] = include_bytes!("fixtures/external_tc26_256a.p7s");
const TC26_512B: &[u8] = include_bytes!("fixtures/external_tc26_512b.p7s");

fn check_external(
    bytes: &[u8],
    algorithm: KeyAlgorithm,
    paramset: ParamSet,
    hash: HashAlgorithm,
) {
    let message = CryptoMessage::decode(bytes).unwrap();
    assert_eq!(message.content_type(), Some(ContentType::SignedData));
    assert!(!message.is_detached());
    assert_eq!(message.get_data().unwrap(), PAYLOAD);
    assert_eq!(message.num_signers(), 1);
    assert_eq!(message.signer_info(0).unwrap().digest_algorithm, hash);

    let signers = message.signer_certs();
    assert_eq!(signers.len(), 1);
    let public = signers[0].public_key().unwrap();
    assert_eq!(public.algorithm(), algorithm);
    assert_eq!(public.paramset(), paramset);
    assert!(signers[0].can_sign());

    assert!(message.verify_data(None, 0).unwrap());
    assert!(message.verify_cert(&signers[0]).unwrap());
    assert!(!message.verify_data(Some(b"signed outside gost-csp?"), 0).unwrap());

    let store = CertificateStore::from_message(&message).unwrap();
    let found = store
        .get_cert_by_signer_info(message.signer_info(0).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(found.thumbprint(), signers[0].thumbprint());
}

fn flip_last_byte(bytes: &[u8]) -> Vec<u8> {
    let mut tampered = bytes.to_vec();
    if let Some(last) = tampered.last_mut() {
        *last ^= 0x01;
    }
    tampered
}

#[test]
fn tc26_256_a_message_verifies() {
    check_external(
        TC26_256A,
        KeyAlgorithm::Gost2012_256,
        ParamSet::Tc26_256A,
        HashAlgorithm::Streebog256,
    );
}

#[test]
fn tc26_512_b_message_verifies() {
    check_external(
        TC26_512B,
        KeyAlgorithm::Gost2012_512,
        ParamSet::Tc26_512B,
        HashAlgorithm::Streebog512,
    );
}

#[test]
fn damaged_external_signature_fails() {
    // The signature value is the last element of the encoding.
    for fixture in [TC26_256A, TC26_512B] {
        let message = CryptoMessage::decode(&flip_last_byte(fixture)).unwrap();
        assert!(!message.verify_data(None, 0).unwrap());
    }
}

#[test]
fn external_certificate_loads_on_its_own() {
    let message = CryptoMessage::decode(TC26_256A).unwrap();
    let embedded = &message.signer_certs()[0];
    let loaded = Certificate::load(embedded.as_der()).unwrap();
    assert_eq!(loaded.common_name().as_deref(), Some("external tc26-256-A"));
    assert_eq!(loaded.serial_hex(), "4a:1b:2c:3d");
    assert_eq!(loaded.subject(), loaded.issuer());
}
