//! Hash and signed-hash objects over a persisted container.

mod common;

use common::{Fixture, CONTAINER};
use gost_csp::{CspError, Digest, HashAlgorithm, ProviderType, SignedDigest};

#[test]
fn digest_is_idempotent_and_closes_after_finalize() {
    let fx = Fixture::new();
    let mut digest = Digest::create(&fx.context, b"hurble", None, 256).unwrap();
    digest.update(b"wurble").unwrap();
    let first = digest.digest();
    assert_eq!(first, digest.digest());
    assert_eq!(digest.hexdigest(), hex::encode(&first));
    assert_eq!(first, HashAlgorithm::Streebog256.digest(b"hurblewurble"));

    assert!(matches!(digest.update(b"more"), Err(CspError::StateError(_))));
    assert!(matches!(digest.derive_key(), Err(CspError::StateError(_))));
}

#[test]
fn hmac_depends_on_key() {
    let fx = Fixture::new();
    let mut plain = Digest::create(&fx.context, b"data", None, 512).unwrap();
    let mut keyed = Digest::create(&fx.context, b"data", Some(b"secret"), 512).unwrap();
    let mut again = Digest::create(&fx.context, b"data", Some(b"secret"), 512).unwrap();
    let mut other = Digest::create(&fx.context, b"data", Some(b"other"), 512).unwrap();

    let keyed = keyed.digest();
    assert_eq!(keyed.len(), 64);
    assert_ne!(keyed, plain.digest());
    assert_eq!(keyed, again.digest());
    assert_ne!(keyed, other.digest());
}

#[test]
fn unknown_length_is_rejected() {
    let fx = Fixture::new();
    assert!(matches!(
        Digest::create(&fx.context, b"", None, 384),
        Err(CspError::InvalidInput(_))
    ));
}

#[test]
fn signed_digest_follows_key_algorithm() {
    let fx = Fixture::with_provider(ProviderType::Gost2001);
    let signed = SignedDigest::create(&fx.context, b"", 0).unwrap();
    assert_eq!(signed.algorithm(), HashAlgorithm::Gost94);

    let fx = Fixture::with_provider(ProviderType::Gost2012_512);
    let signed = SignedDigest::create(&fx.context, b"", 0).unwrap();
    assert_eq!(signed.algorithm(), HashAlgorithm::Streebog512);
}

#[test]
fn signed_digest_by_thumbprint_signs_and_verifies() {
    let fx = Fixture::new();
    let csp = fx.reopen();
    let thumb = fx.cert.thumbprint().to_hex();

    let mut signed = SignedDigest::for_certificate(&csp, Some(&thumb), None).unwrap();
    signed.update(b"hurblewurble").unwrap();
    let signature = signed.sign().unwrap();

    let mut check = SignedDigest::create(&fx.context, b"hurblewurble", 0).unwrap();
    assert!(check.verify(&fx.cert, &signature).unwrap());
    let mut tampered = SignedDigest::create(&fx.context, b"hUrblEwurBle", 0).unwrap();
    assert!(!tampered.verify(&fx.cert, &signature).unwrap());
}

#[test]
fn signed_digest_by_container() {
    let fx = Fixture::new();
    let mut signed = SignedDigest::for_certificate(&fx.csp, None, Some(CONTAINER)).unwrap();
    signed.update(b"payload").unwrap();
    let signature = signed.sign().unwrap();

    let mut check = SignedDigest::create(&fx.context, b"payload", 0).unwrap();
    assert!(check.verify(&fx.cert, &signature).unwrap());

    assert!(matches!(
        SignedDigest::for_certificate(&fx.csp, Some("00"), Some(CONTAINER)),
        Err(CspError::InvalidInput(_))
    ));
    assert!(matches!(
        SignedDigest::for_certificate(&fx.csp, Some(&"ab".repeat(20)), None),
        Err(CspError::NotFound(_))
    ));
}
