//! Contract encryption, signing and schema validation (C2).
//!
//! Grounded on `examples/original_source/contract/encryption.go` and
//! `contract/key.go`: a fresh RSA keypair is generated per call, each
//! workload/env subtree is symmetrically encrypted, the symmetric key is
//! wrapped with the target certificate, and a canonical digest of the
//! ciphertext is signed with the ephemeral private key.

use failure::{Backtrace, Context, Fail};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::Signer;
use openssl::symm::{encrypt as symm_encrypt, Cipher};
use openssl::x509::X509;
use serde_json::{json, Value as JsonValue};
use std::fmt::{self, Display};

use crate::contract::ContractMap;

const RSA_KEY_BITS: u32 = 4096;

#[derive(Debug)]
pub struct CryptoError {
    inner: Context<CryptoErrKind>,
}

#[derive(Debug, Fail)]
pub enum CryptoErrKind {
    #[fail(display = "target encryption certificate is missing or malformed")]
    CertificateMissing,
    #[fail(display = "failed to encrypt contract: {}", _0)]
    EncryptFailed(String),
    #[fail(display = "failed to sign contract digest: {}", _0)]
    SignFailed(String),
    #[fail(display = "contract failed schema validation at '{}': {}", _0, _1)]
    SchemaInvalid(String, String),
}

impl Fail for CryptoError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }
    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}
impl Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<CryptoErrKind> for CryptoError {
    fn from(kind: CryptoErrKind) -> CryptoError {
        CryptoError {
            inner: Context::new(kind),
        }
    }
}
impl From<Context<CryptoErrKind>> for CryptoError {
    fn from(inner: Context<CryptoErrKind>) -> CryptoError {
        CryptoError { inner }
    }
}

/// The encrypted, signed envelope HPCR expects in place of the plaintext
/// contract.
pub struct EncryptedContract(pub JsonValue);

/// Generates a fresh ephemeral RSA keypair, symmetrically encrypts the
/// contract body, wraps the symmetric key with `target_cert`, signs the
/// ciphertext digest with the ephemeral private key, and returns the
/// envelope HPCR expects as user-data.
pub fn encrypt_and_sign(contract: &ContractMap, target_cert: &[u8]) -> crate::Result<EncryptedContract> {
    let cert = X509::from_pem(target_cert).map_err(|_| CryptoErrKind::CertificateMissing)?;
    let target_pubkey = cert
        .public_key()
        .map_err(|_| CryptoErrKind::CertificateMissing)?;

    let ephemeral_rsa = Rsa::generate(RSA_KEY_BITS)
        .map_err(|e| CryptoErrKind::SignFailed(e.to_string()))?;
    let ephemeral_key: PKey<Private> =
        PKey::from_rsa(ephemeral_rsa).map_err(|e| CryptoErrKind::SignFailed(e.to_string()))?;

    let plaintext = contract.to_json()?.to_string();

    // symmetric envelope: fresh AES-256 key, sealed with the target cert's RSA key
    let mut symmetric_key = [0u8; 32];
    openssl::rand::rand_bytes(&mut symmetric_key)
        .map_err(|e| CryptoErrKind::EncryptFailed(e.to_string()))?;
    let cipher = Cipher::aes_256_cbc();
    let mut iv = [0u8; 16];
    openssl::rand::rand_bytes(&mut iv).map_err(|e| CryptoErrKind::EncryptFailed(e.to_string()))?;
    let ciphertext = symm_encrypt(cipher, &symmetric_key, Some(&iv), plaintext.as_bytes())
        .map_err(|e| CryptoErrKind::EncryptFailed(e.to_string()))?;

    let mut rsa_pub = target_pubkey
        .rsa()
        .map_err(|_| CryptoErrKind::CertificateMissing)?;
    let mut wrapped_key = vec![0u8; rsa_pub.size() as usize];
    rsa_pub
        .public_encrypt(&symmetric_key, &mut wrapped_key, Padding::PKCS1)
        .map_err(|e| CryptoErrKind::EncryptFailed(e.to_string()))?;

    let mut signer = Signer::new(MessageDigest::sha256(), &ephemeral_key)
        .map_err(|e| CryptoErrKind::SignFailed(e.to_string()))?;
    signer
        .update(&ciphertext)
        .map_err(|e| CryptoErrKind::SignFailed(e.to_string()))?;
    let signature = signer
        .sign_to_vec()
        .map_err(|e| CryptoErrKind::SignFailed(e.to_string()))?;

    let signing_public_key = ephemeral_key
        .public_key_to_pem()
        .map_err(|e| CryptoErrKind::SignFailed(e.to_string()))?;

    Ok(EncryptedContract(json!({
        "encrypted": base64::encode(&ciphertext),
        "iv": base64::encode(&iv),
        "wrappedKey": base64::encode(&wrapped_key),
        "signature": base64::encode(&signature),
        "signingKey": base64::encode(&signing_public_key),
    })))
}

/// Pure JSON-Schema check, returning the first violation as an error.
pub fn validate_schema(value: &JsonValue, schema: &JsonValue) -> crate::Result<()> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| CryptoErrKind::SchemaInvalid("$".to_string(), e.to_string()))?;
    if let Err(mut errors) = compiled.validate(value) {
        if let Some(first) = errors.next() {
            return Err(CryptoErrKind::SchemaInvalid(first.instance_path.to_string(), first.to_string()).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_certificate_is_rejected() {
        let contract = ContractMap::skeleton().unwrap();
        let err = encrypt_and_sign(&contract, b"not a certificate").unwrap_err();
        assert!(err.to_string().contains("certificate"));
    }
}
