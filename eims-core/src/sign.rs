//! RSA-SHA512 request signing and certificate encoding.
//!
//! Both functions are pure: key and certificate bytes are supplied by the
//! caller, already read from wherever the host keeps them.
use base64ct::{Base64, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha2::Sha512;
use thiserror::Error;

use crate::canonical::canonical_json;

/// Errors raised while loading or using the signing key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("private key is not valid UTF-8 PEM")]
    NotPem,
    #[error("private key could not be parsed as RSA: {0}")]
    Parse(String),
    #[error("signing failed: {0}")]
    Sign(String),
}

/// Errors raised while assembling a signed envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Encoding(#[from] crate::canonical::EncodingError),
}

/// Sign canonical bytes with RSA PKCS#1 v1.5 over SHA-512.
///
/// Accepts PKCS#8 (`PRIVATE KEY`) and PKCS#1 (`RSA PRIVATE KEY`) PEM.
///
/// # Errors
/// Returns [`KeyError`] if the key cannot be parsed or is not RSA.
pub fn sign_sha512(canonical: &[u8], private_key_pem: &[u8]) -> Result<String, KeyError> {
    let pem = std::str::from_utf8(private_key_pem).map_err(|_| KeyError::NotPem)?;
    let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
        Ok(key) => key,
        Err(_) => {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| KeyError::Parse(e.to_string()))?
        }
    };
    let signing_key = SigningKey::<Sha512>::new(key);
    let signature = signing_key
        .try_sign(canonical)
        .map_err(|e| KeyError::Sign(e.to_string()))?;
    Ok(Base64::encode_string(&signature.to_bytes()))
}

/// Base64-encode the raw PEM certificate bytes exactly as provided.
///
/// This is not a structural transform: header and footer lines are part of
/// the encoded payload, as the authority expects.
pub fn encode_certificate(cert_pem: &[u8]) -> String {
    Base64::encode_string(cert_pem)
}

/// Canonicalize and sign `request`, then assemble the wire envelope
/// `{request, signature, certificate}` shared by login and submission.
pub fn signed_envelope(
    request: &Value,
    private_key_pem: &[u8],
    certificate_pem: &[u8],
) -> Result<Value, EnvelopeError> {
    let canonical = canonical_json(request)?;
    let signature = sign_sha512(&canonical, private_key_pem)?;
    Ok(json!({
        "request": request,
        "signature": signature,
        "certificate": encode_certificate(certificate_pem),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::signature::Verifier;

    fn test_key() -> (RsaPrivateKey, String) {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("generate key");
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode key")
            .to_string();
        (key, pem)
    }

    #[test]
    fn sign_verifies_with_matching_public_key() {
        let (key, pem) = test_key();
        let message = br#"{"apikey":"k","tin":"0062192232"}"#;

        let signature_b64 = sign_sha512(message, pem.as_bytes()).expect("sign");
        let raw = Base64::decode_vec(&signature_b64).expect("decode signature");
        let signature = Signature::try_from(raw.as_slice()).expect("signature bytes");

        let verifying = VerifyingKey::<Sha512>::new(key.to_public_key());
        verifying.verify(message, &signature).expect("verify");
    }

    #[test]
    fn wrong_public_key_rejects_signature() {
        let (_, pem) = test_key();
        let (other, _) = test_key();
        let message = b"payload";

        let signature_b64 = sign_sha512(message, pem.as_bytes()).expect("sign");
        let raw = Base64::decode_vec(&signature_b64).expect("decode signature");
        let signature = Signature::try_from(raw.as_slice()).expect("signature bytes");

        let verifying = VerifyingKey::<Sha512>::new(other.to_public_key());
        assert!(verifying.verify(message, &signature).is_err());
    }

    #[test]
    fn garbage_key_is_a_key_error() {
        let err = sign_sha512(b"payload", b"not a pem at all").expect_err("must fail");
        assert!(matches!(err, KeyError::Parse(_)));
    }

    #[test]
    fn pkcs1_pem_is_accepted() {
        use rsa::pkcs1::EncodeRsaPrivateKey;
        let (key, _) = test_key();
        let pem = key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("pkcs1 pem")
            .to_string();
        sign_sha512(b"payload", pem.as_bytes()).expect("sign with pkcs1 key");
    }

    #[test]
    fn certificate_encoding_preserves_pem_exactly() {
        let pem = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
        let encoded = encode_certificate(pem);
        let decoded = Base64::decode_vec(&encoded).expect("decode");
        assert_eq!(decoded, pem);
    }

    #[test]
    fn envelope_carries_request_signature_and_certificate() {
        let (_, pem) = test_key();
        let request = json!({"clientId": "id", "tin": "0062192232"});
        let envelope =
            signed_envelope(&request, pem.as_bytes(), b"-----BEGIN CERTIFICATE-----")
                .expect("envelope");
        assert_eq!(envelope["request"], request);
        assert!(envelope["signature"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(envelope["certificate"].as_str().is_some_and(|s| !s.is_empty()));
    }
}
