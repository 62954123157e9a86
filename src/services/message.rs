//! PKCS#7 messages: signing, enveloping, decoding and verification.
//!
//! A message is used in one direction. Built messages go
//! `Empty → Building → Encoded`; decoded messages start and stay `Decoded`.
//! A detached-signature message only differs in its default for
//! `sign_data`.

use crate::domain::constants::{GOST_KEY_LEN, OID_KUZNYECHIK_CTR_ACPKM};
use crate::domain::crypto::cipher::{self, CTR_IV_LEN};
use crate::domain::crypto::{KeyAlgorithm, PrivateKey, PublicKey};
use crate::domain::pkcs7::{
    ContentInfo, ContentType, EnvelopedData, KeyTransport, RecipientInfo, SignedAttributes,
    SignedData, SignerInfo,
};
use crate::infra::error::{CspError, CspResult};
use crate::services::cert_store::CertificateStore;
use crate::services::certificate::Certificate;

const UKM_LEN: usize = 32;
const KDF_LABEL: &[u8] = b"kdf tree";

#[derive(Debug)]
struct DecodedMessage {
    content_type: ContentType,
    payload: Option<Vec<u8>>,
    signer_infos: Vec<SignerInfo>,
    recipient_infos: Vec<RecipientInfo>,
    enveloped: Option<EnvelopedData>,
    certificates: Vec<Certificate>,
}

#[derive(Debug)]
enum MessageState {
    Empty,
    Building,
    Encoded,
    Decoded(Box<DecodedMessage>),
}

/// Builder and decoder for signed and enveloped messages.
#[derive(Debug)]
pub struct CryptoMessage {
    detached: bool,
    recipients: Vec<Certificate>,
    signers: Vec<Certificate>,
    state: MessageState,
}

impl Default for CryptoMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoMessage {
    /// Empty message for building attached signatures or envelopes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            detached: false,
            recipients: Vec::new(),
            signers: Vec::new(),
            state: MessageState::Empty,
        }
    }

    /// Empty message whose signatures are detached by default.
    #[must_use]
    pub fn signature() -> Self {
        Self {
            detached: true,
            ..Self::new()
        }
    }

    /// Decode a DER `ContentInfo`.
    ///
    /// `data`, `signedData` and `envelopedData` are decoded. The other
    /// PKCS#7 content types are accepted and only report their type.
    ///
    /// # Errors
    /// Returns `FormatError` for malformed input or embedded certificates
    /// that do not parse.
    pub fn decode(bytes: &[u8]) -> CspResult<Self> {
        let info = ContentInfo::decode(bytes)?;
        let mut decoded = DecodedMessage {
            content_type: info.content_type,
            payload: None,
            signer_infos: Vec::new(),
            recipient_infos: Vec::new(),
            enveloped: None,
            certificates: Vec::new(),
        };
        let mut detached = false;

        match info.content_type {
            ContentType::Data => decoded.payload = info.data_payload()?,
            ContentType::SignedData => {
                let body = info.content.as_deref().ok_or_else(|| {
                    CspError::FormatError("signedData without content".to_string())
                })?;
                let signed = SignedData::decode(body)?;
                detached = signed.content.is_none();
                decoded.payload = signed.content;
                decoded.signer_infos = signed.signer_infos;
                decoded.certificates = signed
                    .certificates
                    .iter()
                    .map(|der| Certificate::load(der.as_slice()))
                    .collect::<CspResult<Vec<_>>>()?;
            }
            ContentType::EnvelopedData => {
                let body = info.content.as_deref().ok_or_else(|| {
                    CspError::FormatError("envelopedData without content".to_string())
                })?;
                let enveloped = EnvelopedData::decode(body)?;
                decoded.recipient_infos = enveloped.recipients.clone();
                decoded.enveloped = Some(enveloped);
            }
            other => log::debug!("Decoded {other} message; content is not interpreted"),
        }

        log::debug!(
            "Decoded {} message: {} signer(s), {} recipient(s), {} certificate(s)",
            decoded.content_type,
            decoded.signer_infos.len(),
            decoded.recipient_infos.len(),
            decoded.certificates.len()
        );
        Ok(Self {
            detached,
            recipients: Vec::new(),
            signers: Vec::new(),
            state: MessageState::Decoded(Box::new(decoded)),
        })
    }

    /// Whether signatures omit the payload by default (or, for a decoded
    /// message, whether the payload was omitted).
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// # Errors
    /// Returns `StateError` unless the message is being built.
    pub fn add_recipient(&mut self, certificate: &Certificate) -> CspResult<()> {
        self.start_building()?;
        self.recipients.push(certificate.clone());
        Ok(())
    }

    /// Add a signer. The certificate must be bound when `sign_data` runs.
    ///
    /// # Errors
    /// Returns `StateError` unless the message is being built.
    pub fn add_signer(&mut self, certificate: &Certificate) -> CspResult<()> {
        self.start_building()?;
        self.signers.push(certificate.clone());
        Ok(())
    }

    /// Produce an encoded `signedData` over `data` signed by every added
    /// signer plus `signer`. `detached` of `None` follows the message
    /// default.
    ///
    /// # Errors
    /// Returns `InvalidInput` without signers, `StateError` for unbound
    /// signers or a message not being built, and any signing failure.
    pub fn sign_data(
        &mut self,
        data: &[u8],
        signer: Option<&Certificate>,
        detached: Option<bool>,
    ) -> CspResult<Vec<u8>> {
        self.start_building()?;
        let mut signers = self.signers.clone();
        if let Some(cert) = signer {
            signers.push(cert.clone());
        }
        if signers.is_empty() {
            return Err(CspError::InvalidInput(
                "Signing requires at least one signer".to_string(),
            ));
        }
        let detached = detached.unwrap_or(self.detached);

        let mut signed = SignedData {
            content: (!detached).then(|| data.to_vec()),
            ..SignedData::default()
        };
        for cert in &signers {
            let info = sign_one(cert, data)?;
            signed.digest_algorithms.push(info.digest_algorithm);
            signed.signer_infos.push(info);
            let der = cert.as_der().to_vec();
            if !signed.certificates.contains(&der) {
                signed.certificates.push(der);
            }
        }

        let encoded = ContentInfo {
            content_type: ContentType::SignedData,
            content: Some(signed.encode()),
        }
        .encode();
        self.signers = signers;
        self.state = MessageState::Encoded;
        log::info!(
            "Signed {} bytes with {} signer(s){}",
            data.len(),
            signed.signer_infos.len(),
            if detached { " (detached)" } else { "" }
        );
        Ok(encoded)
    }

    /// Produce an encoded `envelopedData` that every added recipient can
    /// open with its own key.
    ///
    /// # Errors
    /// Returns `InvalidInput` without recipients and `Unsupported` for a
    /// recipient certificate without a GOST key.
    pub fn encrypt_data(&mut self, data: &[u8]) -> CspResult<Vec<u8>> {
        self.start_building()?;
        if self.recipients.is_empty() {
            return Err(CspError::InvalidInput(
                "Encryption requires at least one recipient".to_string(),
            ));
        }

        let mut cek = [0u8; GOST_KEY_LEN];
        rand::fill(&mut cek[..]);
        let mut iv = [0u8; CTR_IV_LEN];
        rand::fill(&mut iv[..]);

        let recipients = self
            .recipients
            .iter()
            .map(|cert| wrap_for(cert, &cek))
            .collect::<CspResult<Vec<_>>>()?;

        let mut encrypted_content = data.to_vec();
        cipher::ctr_acpkm_apply(&cek, &iv, &mut encrypted_content)?;
        let enveloped = EnvelopedData {
            recipients,
            content_encryption_algorithm: OID_KUZNYECHIK_CTR_ACPKM,
            iv: iv.to_vec(),
            encrypted_content,
        };
        let encoded = ContentInfo {
            content_type: ContentType::EnvelopedData,
            content: Some(enveloped.encode()),
        }
        .encode();
        self.state = MessageState::Encoded;
        log::info!(
            "Encrypted {} bytes for {} recipient(s)",
            data.len(),
            enveloped.recipients.len()
        );
        Ok(encoded)
    }

    /// Decrypt with a bound certificate that one of the recipients names.
    /// The plaintext also becomes the message payload.
    ///
    /// # Errors
    /// Returns `CryptoFailure` when no recipient matches or the key does
    /// not unwrap, `StateError` for an unbound certificate or a message
    /// that is not a decoded envelope.
    pub fn decrypt_by_cert(&mut self, certificate: &Certificate) -> CspResult<Vec<u8>> {
        let decoded = self.decoded_mut()?;
        let enveloped = decoded.enveloped.as_ref().ok_or_else(|| {
            CspError::StateError(format!(
                "Cannot decrypt a {} message",
                decoded.content_type
            ))
        })?;
        let rid = certificate.issuer_and_serial()?;
        let recipient = enveloped
            .recipients
            .iter()
            .find(|r| r.rid == rid)
            .ok_or_else(|| {
                CspError::CryptoFailure(format!(
                    "Certificate {} is not a recipient of this message",
                    certificate.thumbprint()
                ))
            })?;
        let cek = unwrap_for(certificate, recipient)?;
        let plain = decrypt_content(enveloped, &cek)?;
        log::info!("Decrypted {} bytes", plain.len());
        decoded.payload = Some(plain.clone());
        Ok(plain)
    }

    /// Decrypt with the first bound certificate in `store` that names a
    /// recipient.
    ///
    /// # Errors
    /// Returns `CryptoFailure` when no certificate in the store can decrypt.
    pub fn decrypt_with_store(&mut self, store: &CertificateStore) -> CspResult<Vec<u8>> {
        let rids: Vec<_> = self
            .recipient_infos()
            .iter()
            .map(|r| r.rid.clone())
            .collect();
        for rid in rids {
            let Some(cert) = store.find_by_issuer_and_serial(&rid)? else {
                continue;
            };
            if !cert.is_bound() {
                log::debug!("Recipient {} has no bound key in the store", rid.serial_hex());
                continue;
            }
            match self.decrypt_by_cert(&cert) {
                Ok(plain) => return Ok(plain),
                Err(e) => log::warn!("Recipient {} failed to decrypt: {e}", rid.serial_hex()),
            }
        }
        Err(CspError::CryptoFailure(
            "No certificate in the store can decrypt this message".to_string(),
        ))
    }

    /// Payload of a decoded message.
    ///
    /// # Errors
    /// Returns `StateError` for detached signatures, undecrypted envelopes
    /// and messages that were not decoded.
    pub fn get_data(&self) -> CspResult<Vec<u8>> {
        self.decoded()?
            .payload
            .clone()
            .ok_or_else(|| CspError::StateError("Message carries no payload".to_string()))
    }

    /// Content type of a decoded message.
    #[must_use]
    pub fn content_type(&self) -> Option<ContentType> {
        match &self.state {
            MessageState::Decoded(decoded) => Some(decoded.content_type),
            _ => None,
        }
    }

    #[must_use]
    pub fn num_signers(&self) -> usize {
        self.signer_infos().len()
    }

    #[must_use]
    pub fn signer_infos(&self) -> &[SignerInfo] {
        match &self.state {
            MessageState::Decoded(decoded) => &decoded.signer_infos,
            _ => &[],
        }
    }

    /// # Errors
    /// Returns `InvalidInput` for an index past the last signer.
    pub fn signer_info(&self, index: usize) -> CspResult<&SignerInfo> {
        self.signer_infos().get(index).ok_or_else(|| {
            CspError::InvalidInput(format!(
                "Signer index {index} out of range ({} signers)",
                self.num_signers()
            ))
        })
    }

    #[must_use]
    pub fn recipient_infos(&self) -> &[RecipientInfo] {
        match &self.state {
            MessageState::Decoded(decoded) => &decoded.recipient_infos,
            _ => &[],
        }
    }

    /// Certificates embedded in a decoded message.
    ///
    /// # Errors
    /// Returns `StateError` if the message was not decoded.
    pub fn embedded_certificates(&self) -> CspResult<&[Certificate]> {
        Ok(&self.decoded()?.certificates)
    }

    /// Embedded certificates of the signers, in signer order. Signers whose
    /// certificate is not embedded are left out.
    #[must_use]
    pub fn signer_certs(&self) -> Vec<Certificate> {
        self.signer_infos()
            .iter()
            .filter_map(|info| self.embedded_signer(info))
            .collect()
    }

    /// Check signer `index` against `data`, or the embedded payload when
    /// `data` is `None`. The signer certificate comes from the message;
    /// when it is not embedded the result is `false`.
    ///
    /// # Errors
    /// Returns `InvalidInput` for a bad index and `StateError` when no data
    /// is available.
    pub fn verify_data(&self, data: Option<&[u8]>, index: usize) -> CspResult<bool> {
        let info = self.signer_info(index)?;
        match self.embedded_signer(info) {
            Some(cert) => self.verify_data_with_cert(data, index, &cert),
            None => {
                log::debug!("Signer {index} certificate is not embedded");
                Ok(false)
            }
        }
    }

    /// Check signer `index` against `data` using `certificate`'s key.
    ///
    /// # Errors
    /// Returns `InvalidInput` for a bad index and `StateError` when no data
    /// is available.
    pub fn verify_data_with_cert(
        &self,
        data: Option<&[u8]>,
        index: usize,
        certificate: &Certificate,
    ) -> CspResult<bool> {
        let info = self.signer_info(index)?;
        let data = self.signed_content(data)?;
        check_signer(info, certificate, data)
    }

    /// Check the signature of the signer `certificate` names against the
    /// embedded payload. `false` if no signer matches.
    ///
    /// # Errors
    /// Returns `StateError` for a detached message.
    pub fn verify_cert(&self, certificate: &Certificate) -> CspResult<bool> {
        self.verify_cert_with_data(certificate, None)
    }

    /// [`verify_cert`](Self::verify_cert) with externally supplied data for
    /// detached signatures.
    ///
    /// # Errors
    /// Returns `StateError` when no data is available.
    pub fn verify_cert_with_data(
        &self,
        certificate: &Certificate,
        data: Option<&[u8]>,
    ) -> CspResult<bool> {
        let sid = certificate.issuer_and_serial()?;
        let Some(info) = self.signer_infos().iter().find(|info| info.sid == sid) else {
            return Ok(false);
        };
        let data = self.signed_content(data)?;
        check_signer(info, certificate, data)
    }

    fn signed_content<'a>(&'a self, data: Option<&'a [u8]>) -> CspResult<&'a [u8]> {
        match data {
            Some(data) => Ok(data),
            None => self.decoded()?.payload.as_deref().ok_or_else(|| {
                CspError::StateError("Detached signature needs the signed data".to_string())
            }),
        }
    }

    fn embedded_signer(&self, info: &SignerInfo) -> Option<Certificate> {
        let decoded = self.decoded().ok()?;
        decoded
            .certificates
            .iter()
            .find(|cert| cert.issuer_and_serial().is_ok_and(|id| id == info.sid))
            .cloned()
    }

    fn start_building(&mut self) -> CspResult<()> {
        match self.state {
            MessageState::Empty | MessageState::Building => {
                self.state = MessageState::Building;
                Ok(())
            }
            MessageState::Encoded => Err(CspError::StateError(
                "Message is already encoded".to_string(),
            )),
            MessageState::Decoded(_) => Err(CspError::StateError(
                "Decoded message cannot be modified".to_string(),
            )),
        }
    }

    fn decoded(&self) -> CspResult<&DecodedMessage> {
        match &self.state {
            MessageState::Decoded(decoded) => Ok(decoded),
            _ => Err(not_decoded()),
        }
    }

    fn decoded_mut(&mut self) -> CspResult<&mut DecodedMessage> {
        match &mut self.state {
            MessageState::Decoded(decoded) => Ok(decoded),
            _ => Err(not_decoded()),
        }
    }
}

fn not_decoded() -> CspError {
    CspError::StateError("Message was not decoded".to_string())
}

/// One `SignerInfo` with contentType and messageDigest attributes.
fn sign_one(cert: &Certificate, data: &[u8]) -> CspResult<SignerInfo> {
    let algorithm = cert.public_key()?.algorithm();
    let digest_algorithm = algorithm.digest_algorithm();
    let attrs = SignedAttributes::new(ContentType::Data, digest_algorithm.digest(data));
    let signature = cert.sign_hash(&digest_algorithm.digest(attrs.signed_bytes()))?;
    log::debug!(
        "Signer {} ({algorithm}) produced a {}-byte signature",
        cert.thumbprint(),
        signature.len()
    );
    Ok(SignerInfo {
        version: 1,
        sid: cert.issuer_and_serial()?,
        digest_algorithm,
        signed_attributes: Some(attrs),
        signature_algorithm: algorithm.oid(),
        signature,
    })
}

fn check_signer(info: &SignerInfo, cert: &Certificate, data: &[u8]) -> CspResult<bool> {
    let public = cert.public_key()?;
    let message_digest = info.digest_algorithm.digest(data);
    let hash = match &info.signed_attributes {
        Some(attrs) => {
            if attrs.message_digest != message_digest {
                log::debug!("messageDigest attribute does not match the data");
                return Ok(false);
            }
            info.digest_algorithm.digest(attrs.signed_bytes())
        }
        None => message_digest,
    };
    Ok(public.verify_hash(&hash, &info.signature))
}

/// Export keys for one recipient, `(K_mac, K_enc, KExp15 IV)`.
///
/// `vko` is the VKO output for the first 16 UKM bytes. 512-bit keys split
/// their 64-byte VKO output directly; other keys expand theirs with
/// KDF_TREE seeded by UKM bytes 16..24. The IV is UKM bytes 24..32.
fn transport_keys(
    algorithm: KeyAlgorithm,
    vko: &[u8],
    ukm: &[u8],
) -> CspResult<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let (k_mac, k_enc) = match algorithm {
        KeyAlgorithm::Gost2012_512 => {
            if vko.len() != 2 * GOST_KEY_LEN {
                return Err(CspError::CryptoFailure(format!(
                    "VKO output for {algorithm} keys must be {} bytes, got {}",
                    2 * GOST_KEY_LEN,
                    vko.len()
                )));
            }
            let (mac, enc) = vko.split_at(GOST_KEY_LEN);
            (mac.to_vec(), enc.to_vec())
        }
        KeyAlgorithm::Gost2001 | KeyAlgorithm::Gost2012_256 => {
            cipher::kdf_tree_256(vko, KDF_LABEL, &ukm[16..24])?
        }
    };
    Ok((k_mac, k_enc, ukm[24..32].to_vec()))
}

fn wrap_for(cert: &Certificate, cek: &[u8]) -> CspResult<RecipientInfo> {
    let public = cert.public_key()?;
    let ephemeral = PrivateKey::generate_for(&public);
    let mut ukm = [0u8; UKM_LEN];
    rand::fill(&mut ukm[..]);

    let vko = ephemeral.agree(&public, &ukm[..16])?;
    let (k_mac, k_enc, iv) = transport_keys(public.algorithm(), &vko, &ukm)?;
    let transport = KeyTransport {
        encrypted_key: cipher::kexp15(cek, &k_enc, &k_mac, &iv)?,
        ephemeral_public_key: ephemeral.public_key()?.to_spki_der()?,
        ukm: ukm.to_vec(),
    };
    Ok(RecipientInfo {
        rid: cert.issuer_and_serial()?,
        key_encryption_algorithm: public.algorithm().oid(),
        encrypted_key: transport.encode()?,
    })
}

fn unwrap_for(cert: &Certificate, recipient: &RecipientInfo) -> CspResult<Vec<u8>> {
    let transport = KeyTransport::decode(&recipient.encrypted_key)?;
    if transport.ukm.len() != UKM_LEN {
        return Err(CspError::FormatError(format!(
            "UKM must be {UKM_LEN} bytes, got {}",
            transport.ukm.len()
        )));
    }
    let ephemeral = PublicKey::from_spki_der(&transport.ephemeral_public_key)?;
    let vko = cert.agree(&ephemeral, &transport.ukm[..16])?;
    let (k_mac, k_enc, iv) = transport_keys(ephemeral.algorithm(), &vko, &transport.ukm)?;
    cipher::kimp15(&transport.encrypted_key, &k_enc, &k_mac, &iv)
}

fn decrypt_content(enveloped: &EnvelopedData, cek: &[u8]) -> CspResult<Vec<u8>> {
    if enveloped.content_encryption_algorithm != OID_KUZNYECHIK_CTR_ACPKM {
        return Err(CspError::Unsupported(format!(
            "Content encryption algorithm {}",
            enveloped.content_encryption_algorithm
        )));
    }
    let mut plain = enveloped.encrypted_content.clone();
    cipher::ctr_acpkm_apply(cek, &enveloped.iv, &mut plain)?;
    Ok(plain)
}
