//! Session surveyor identity.
//!
//! One ed25519 keypair per session, generated before the first survey cycle
//! and immutable for the session's lifetime. The keypair is a capability
//! injected into the builder and transport; the correlator never sees it.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Byte length of a hex-decoded public key.
const PUBLIC_KEY_LEN: usize = 32;
/// Byte length of a hex-decoded signature.
const SIGNATURE_LEN: usize = 64;

/// The session keypair used to tag and sign published survey notes.
pub struct SurveyorIdentity {
    signing_key: SigningKey,
}

impl SurveyorIdentity {
    /// Generate a fresh session identity.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Public key as lowercase hex, the opaque surveyor identity on the wire.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Detached signature over `payload`, hex encoded.
    pub fn sign_hex(&self, payload: &[u8]) -> String {
        hex::encode(self.signing_key.sign(payload).to_bytes())
    }
}

/// Verify a hex signature against a hex public key.
///
/// Returns false on any malformed input; note envelopes with undecodable
/// identities are simply not trusted.
pub fn verify_hex(public_key_hex: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(sig_bytes) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key.verify(payload, &signature).is_ok()
}
