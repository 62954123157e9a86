//! Shared fixture: a runtime persisting below a temporary directory, one
//! container holding both key pairs, and a certificate issued for it.

#![allow(dead_code)]

use gost_csp::{
    Certificate, CertificateIssuer, CertificateStore, ContextFlags, Csp, CspConfiguration,
    KeyContext, KeySlot, ProviderType, RetryPolicy,
};
use tempfile::TempDir;

pub const CONTAINER: &str = "test";

/// Retries stay on but finish quickly.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        initial_delay_ms: 1,
        backoff_factor: 2,
    }
}

pub struct Fixture {
    /// Keeps the directory alive for the duration of the test
    pub dir: TempDir,
    pub csp: Csp,
    pub context: KeyContext,
    /// Self-signed `CN=test` certificate for the signature key, kept in the
    /// container and in the default store
    pub cert: Certificate,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_provider(ProviderType::Gost2012_256)
    }

    pub fn with_provider(provider: ProviderType) -> Self {
        env_logger::try_init().ok();
        let dir = TempDir::new().expect("temp dir");
        let csp = runtime(&dir);
        let context = KeyContext::create(&csp, CONTAINER, provider, ContextFlags::NONE)
            .expect("create container");
        let key = context
            .create_key(false, KeySlot::Signature)
            .expect("signature key");
        context
            .create_key(false, KeySlot::Exchange)
            .expect("exchange key");
        let cert = CertificateIssuer::new(CONTAINER)
            .self_signed(&context, KeySlot::Signature)
            .expect("self-signed certificate");
        key.store_cert(&cert).expect("store certificate in container");
        let stored = CertificateStore::open_default(&csp)
            .expect("default store")
            .add_cert(&cert)
            .expect("add to default store");
        Self {
            dir,
            csp,
            context,
            cert: stored,
        }
    }

    /// A second runtime over the same directories, as another process
    /// would see them.
    pub fn reopen(&self) -> Csp {
        runtime(&self.dir)
    }

    /// Another container with its own certificate, not added to any store.
    pub fn other_signer(&self, name: &str) -> Certificate {
        let context = KeyContext::create(&self.csp, name, ProviderType::Gost2012_256, ContextFlags::NONE)
            .expect("create container");
        context
            .create_key(false, KeySlot::Signature)
            .expect("signature key");
        CertificateIssuer::new(name)
            .self_signed(&context, KeySlot::Signature)
            .expect("self-signed certificate")
    }
}

fn runtime(dir: &TempDir) -> Csp {
    Csp::builder(CspConfiguration::rooted_at(dir.path()).with_retry(fast_retry()))
        .build()
        .expect("runtime")
}
