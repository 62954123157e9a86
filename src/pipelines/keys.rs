//! `KeyWorkflow`: container lifecycle and certificate binding.

use crate::domain::constants::PROV_HSM;
use crate::domain::types::{ContextFlags, KeySlot, ProviderSelector, Thumbprint};
use crate::infra::error::{CspError, CspResult};
use crate::pipelines::{container_certificate, open_container};
use crate::services::{CertificateStore, Certificate, Csp, KeyContext};

/// Creates and removes containers, binds certificates and reads them back.
#[derive(Debug, Clone)]
pub struct KeyWorkflow {
    csp: Csp,
    provider: Option<ProviderSelector>,
}

impl KeyWorkflow {
    #[must_use]
    pub fn new(csp: &Csp) -> Self {
        Self {
            csp: csp.clone(),
            provider: None,
        }
    }

    /// Force a provider. Without one, `local` picks between the default
    /// provider and the HSM provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<ProviderSelector>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    fn selector(&self, local: bool) -> ProviderSelector {
        match (&self.provider, local) {
            (Some(provider), _) => provider.clone(),
            (None, true) => ProviderSelector::default(),
            (None, false) => ProviderSelector::Name(PROV_HSM.to_string()),
        }
    }

    /// Open or create `container` and make sure it holds both key pairs.
    /// Both slots get an empty PIN. Keys that already exist are kept.
    ///
    /// # Errors
    /// Returns `NotFound` for an unregistered provider and key generation
    /// errors.
    pub fn gen_key(&self, container: &str, local: bool, silent: bool) -> CspResult<()> {
        let selector = self.selector(local);
        let flags = if silent {
            ContextFlags::SILENT
        } else {
            ContextFlags::NONE
        };
        let ctx = match KeyContext::open(&self.csp, Some(container), selector.clone(), flags) {
            Ok(ctx) => ctx,
            Err(CspError::NotFound(_)) => {
                KeyContext::open(&self.csp, Some(container), selector, flags | ContextFlags::NEW_KEYSET)?
            }
            Err(e) => return Err(e),
        };

        for slot in [KeySlot::Exchange, KeySlot::Signature] {
            ctx.set_password("", slot)?;
        }
        for slot in [KeySlot::Signature, KeySlot::Exchange] {
            if ctx.get_key(slot)?.is_none() {
                ctx.create_key(true, slot)?;
            }
        }
        log::info!(
            "Container {container} ready in {}",
            ctx.provider_name()
        );
        Ok(())
    }

    /// Destroy `container`.
    ///
    /// # Errors
    /// Returns `NotFound` when it does not exist.
    pub fn remove_key(&self, container: &str, local: bool) -> CspResult<()> {
        KeyContext::remove(&self.csp, container, self.selector(local))
    }

    /// Bind `cert` to the matching key in `container` and add it to the
    /// default store. With `store_in_container` the certificate is also kept
    /// in the container. Returns the hex thumbprint.
    ///
    /// # Errors
    /// Returns `CryptoFailure` when no key in the container matches.
    pub fn bind_cert_to_key(
        &self,
        container: &str,
        cert: &[u8],
        local: bool,
        store_in_container: bool,
    ) -> CspResult<String> {
        let ctx = open_container(&self.csp, container, &self.selector(local))?;
        let mut cert = Certificate::load(cert)?;
        cert.bind(&ctx)?;
        let mut store =
            CertificateStore::open(&self.csp, Some(&ctx), &self.csp.config().default_store)?;
        store.add_cert(&cert)?;
        if store_in_container {
            let slot = cert
                .binding()
                .map_or(KeySlot::Signature, |binding| binding.slot);
            let key = ctx
                .get_key(slot)?
                .ok_or_else(|| CspError::NotFound(format!("No {slot} key in {container}")))?;
            key.store_cert(&cert)?;
        }
        Ok(cert.thumbprint().to_hex())
    }

    /// DER of a certificate from `container`, or else from the default
    /// store by thumbprint or by exact common name. Exactly one of
    /// `thumbprint` and `name` is used without a container.
    ///
    /// # Errors
    /// Returns `InvalidInput` when both or neither of thumbprint and name
    /// are given and `NotFound` when nothing matches.
    pub fn get_certificate(
        &self,
        thumbprint: Option<&str>,
        name: Option<&str>,
        container: Option<&str>,
    ) -> CspResult<Vec<u8>> {
        if let Some(container) = container {
            let ctx = open_container(&self.csp, container, &self.selector(true))?;
            return Ok(container_certificate(&ctx)?.extract());
        }

        let store = CertificateStore::open_default(&self.csp)?;
        let found = match (thumbprint, name) {
            (Some(thumb), None) => {
                let thumb = Thumbprint::from_hex(thumb)?;
                store.find_by_thumbprint(thumb.as_bytes())?
            }
            (None, Some(name)) => {
                let subject = format!("CN={name}");
                store
                    .find_by_name(name)?
                    .into_iter()
                    .filter(|cert| cert.subject() == subject)
                    .collect()
            }
            _ => {
                return Err(CspError::InvalidInput(
                    "Give exactly one of thumbprint and name".to_string(),
                ))
            }
        };
        found
            .first()
            .map(Certificate::extract)
            .ok_or_else(|| CspError::NotFound("Certificate not found".to_string()))
    }

    /// Public key blob of `container`, or of the default container.
    ///
    /// # Errors
    /// Returns `NotFound` when the container or its keys are missing.
    pub fn get_key(&self, container: Option<&str>) -> CspResult<Vec<u8>> {
        let ctx = KeyContext::open(
            &self.csp,
            container,
            self.selector(true),
            ContextFlags::SILENT,
        )?;
        ctx.public_key()
    }
}
