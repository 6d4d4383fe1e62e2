use crate::config::Config;
use crate::crypto::seed::generate_entropy;
use crate::crypto::provider::{CapabilityBackend, ChainKey, StepKeys};
use crate::crypto::DrbgMode;
use crate::error::CryptoError;
use crate::status::StatusCode;
use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key as AeadKeyChacha, KeyInit, Nonce,
};
use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};
use tracing::{info, warn};
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

const LICENSE_DOMAIN: &[u8] = b"sealchannel-license:";
const ROOT_INFO: &[u8] = b"sealchannel/root/v1";
const STEP_INFO: &[u8] = b"sealchannel/step/v1";

/// Concrete `CapabilityBackend`: HKDF chain derivation + ChaCha20-Poly1305.
#[derive(Debug)]
pub struct StandardBackend {
    license: StatusCode,
    insecure_seeding: bool,
}

impl StandardBackend {
    /// First phase of startup: load the backend, unlicensed.
    pub fn load(config: &Config) -> Self {
        Self {
            license: StatusCode::LicenseError,
            insecure_seeding: config.insecure_demo_seeding,
        }
    }

    /// Second phase: check the license. Must happen before the backend is shared.
    pub fn init_license(&mut self, company: &str, key: &str) -> StatusCode {
        let expected = Self::activation_code(company);
        self.license = if !company.trim().is_empty() && key.trim().eq_ignore_ascii_case(&expected) {
            StatusCode::Success
        } else {
            StatusCode::LicenseError
        };

        if self.license.is_success() {
            info!(target: "backend", company = %company, "License accepted");
        } else {
            warn!(
                target: "backend",
                company = %company,
                status = %self.license.name(),
                "License rejected"
            );
        }
        self.license
    }

    /// Activation code for `company`: first 8 bytes of SHA-256, hex encoded.
    pub fn activation_code(company: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(LICENSE_DOMAIN);
        hasher.update(company.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    fn hkdf_expand(
        drbg: DrbgMode,
        salt: &[u8],
        ikm: &[u8],
        info: &[&[u8]],
        len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let mut okm = Zeroizing::new(vec![0u8; len]);
        match drbg {
            DrbgMode::HashSha512 => Hkdf::<Sha512>::new(Some(salt), ikm)
                .expand_multi_info(info, okm.as_mut_slice())?,
            DrbgMode::Unseeded | DrbgMode::HashSha256 => Hkdf::<Sha256>::new(Some(salt), ikm)
                .expand_multi_info(info, okm.as_mut_slice())?,
        }
        Ok(okm)
    }
}

impl CapabilityBackend for StandardBackend {
    fn entropy_min_bytes(&self, drbg: DrbgMode) -> usize {
        match drbg {
            DrbgMode::Unseeded => 0,
            DrbgMode::HashSha256 => 32,
            DrbgMode::HashSha512 => 64,
        }
    }

    fn license_status(&self) -> StatusCode {
        self.license
    }

    fn allows_insecure_seeding(&self) -> bool {
        self.insecure_seeding
    }

    fn overhead(&self) -> usize {
        TAG_LEN
    }

    fn key_len(&self) -> usize {
        KEY_LEN
    }

    fn derive_root(
        &self,
        drbg: DrbgMode,
        identifier: &[u8],
        epoch: u32,
        entropy: &[u8],
        nonce: &[u8],
    ) -> Result<ChainKey, CryptoError> {
        if identifier.len() > u16::MAX as usize {
            return Err(CryptoError::InvalidInputError("identifier too long".to_string()));
        }
        let id_len = (identifier.len() as u16).to_be_bytes();
        let epoch = epoch.to_be_bytes();
        Self::hkdf_expand(
            drbg,
            nonce,
            entropy,
            &[ROOT_INFO, drbg.name().as_bytes(), &epoch[..], &id_len[..], identifier],
            KEY_LEN,
        )
    }

    fn kdf_step(&self, drbg: DrbgMode, chain_key: &[u8]) -> Result<(StepKeys, ChainKey), CryptoError> {
        let output = Self::hkdf_expand(drbg, chain_key, b"", &[STEP_INFO], KEY_LEN + NONCE_LEN + KEY_LEN)?;

        let keys = StepKeys {
            key: output[..KEY_LEN].to_vec(),
            nonce: output[KEY_LEN..KEY_LEN + NONCE_LEN].to_vec(),
        };
        let next_chain = Zeroizing::new(output[KEY_LEN + NONCE_LEN..].to_vec());

        Ok((keys, next_chain))
    }

    fn random_message_key(&self) -> Zeroizing<Vec<u8>> {
        generate_entropy(KEY_LEN)
    }

    fn message_keys(&self, message_key: &[u8]) -> Result<StepKeys, CryptoError> {
        if message_key.len() != KEY_LEN {
            return Err(CryptoError::InvalidInputError("Invalid message key length".to_string()));
        }
        // Каждый message key используется один раз, нулевой nonce безопасен
        Ok(StepKeys {
            key: message_key.to_vec(),
            nonce: vec![0u8; NONCE_LEN],
        })
    }

    fn seal(
        &self,
        keys: &StepKeys,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if keys.key.len() != KEY_LEN || keys.nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidInputError("Invalid step key length".to_string()));
        }
        let cipher = ChaCha20Poly1305::new(AeadKeyChacha::from_slice(&keys.key));
        cipher
            .encrypt(
                Nonce::from_slice(&keys.nonce),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|e| CryptoError::AeadEncryptionError(e.to_string()))
    }

    fn open(
        &self,
        keys: &StepKeys,
        sealed: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if keys.key.len() != KEY_LEN || keys.nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidInputError("Invalid step key length".to_string()));
        }
        let cipher = ChaCha20Poly1305::new(AeadKeyChacha::from_slice(&keys.key));
        cipher
            .decrypt(
                Nonce::from_slice(&keys.nonce),
                Payload {
                    msg: sealed,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::AeadDecryptionError)
    }
}
