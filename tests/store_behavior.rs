//! Certificate store semantics against directory-backed stores.

mod common;

use common::Fixture;
use gost_csp::{Certificate, CertificateStore, CryptoMessage, CspError, KeySlot};

#[test]
fn duplicate_keeps_thumbprint_and_is_independently_removable() {
    let fx = Fixture::new();
    let copy = fx.cert.duplicate();
    assert_eq!(copy.thumbprint(), fx.cert.thumbprint());
    assert!(!copy.is_bound());

    let mut store = CertificateStore::open_empty();
    let first = store.add_cert(&fx.cert).unwrap();
    store.add_cert(&copy).unwrap();
    assert!(first.remove_from_store(&mut store).unwrap());

    let left = store
        .find_by_thumbprint(fx.cert.thumbprint().as_bytes())
        .unwrap();
    assert_eq!(left.len(), 1);
}

#[test]
fn system_store_duplicates_persist_per_entry() {
    let fx = Fixture::new();
    let mut store = CertificateStore::open_default(&fx.csp).unwrap();
    let extra = store.add_cert(&fx.cert).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    assert!(store.remove(&extra).unwrap());

    let reopened = CertificateStore::open_default(&fx.reopen()).unwrap();
    let found = reopened
        .find_by_thumbprint(fx.cert.thumbprint().as_bytes())
        .unwrap();
    assert_eq!(found.len(), 1);
    let binding = found[0].binding().expect("binding restored");
    assert_eq!(binding.slot, KeySlot::Signature);
}

#[test]
fn lookups_return_empty_not_errors() {
    let fx = Fixture::new();
    let store = CertificateStore::open_default(&fx.csp).unwrap();
    assert!(store.find_by_thumbprint(&[b'x'; 20]).unwrap().is_empty());
    assert_eq!(store.find_by_name("test").unwrap().len(), 1);
    assert!(store.find_by_name("absent").unwrap().is_empty());
    let other = CertificateStore::open(&fx.csp, None, "ROOT").unwrap();
    assert!(other.is_empty().unwrap());
}

#[test]
fn iteration_reflects_live_state() {
    let fx = Fixture::new();
    let mut store = CertificateStore::open_default(&fx.csp).unwrap();
    let before: Vec<Certificate> = store.iter().unwrap().collect();
    store.add_cert(&fx.other_signer("later")).unwrap();
    let after: Vec<Certificate> = store.iter().unwrap().collect();
    assert_eq!(before.len() + 1, after.len());
    assert_eq!(after[0].thumbprint(), fx.cert.thumbprint());
}

#[test]
fn message_store_is_read_only() {
    let fx = Fixture::new();
    let encoded = CryptoMessage::new()
        .sign_data(b"data", Some(&fx.cert), None)
        .unwrap();
    let message = CryptoMessage::decode(&encoded).unwrap();
    let mut store = CertificateStore::from_message(&message).unwrap();
    assert!(store.is_read_only());
    assert_eq!(store.len().unwrap(), 1);
    assert!(matches!(store.add_cert(&fx.cert), Err(CspError::StateError(_))));

    assert!(matches!(
        CertificateStore::from_message(&CryptoMessage::new()),
        Err(CspError::StateError(_))
    ));
}

#[test]
fn pem_input_is_accepted() {
    let fx = Fixture::new();
    let pem = pem::encode(&pem::Pem::new("CERTIFICATE", fx.cert.extract()));
    let loaded = Certificate::load(pem.as_bytes()).unwrap();
    assert_eq!(loaded.thumbprint(), fx.cert.thumbprint());
    assert!(matches!(
        Certificate::load(b"garbage"),
        Err(CspError::FormatError(_))
    ));
}
