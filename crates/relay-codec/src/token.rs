use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::payload::ForwardPayload;

type HmacSha256 = Hmac<Sha256>;

/// Signature bytes kept from the HMAC-SHA256 digest.
const SIGNATURE_BYTES: usize = 9;

/// Encoded signature length: two hex digits per byte.
pub const SIGNATURE_LEN: usize = SIGNATURE_BYTES * 2;

pub const TOKEN_SEPARATOR: char = '_';

/// One data byte, the separator and the signature.
const MIN_TOKEN_LEN: usize = SIGNATURE_LEN + 3;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("invalid signing key")]
    InvalidKey,
}

/// Signs payloads into `<hex(payload)>_<signature>` tokens and verifies
/// them on redemption.
///
/// Tokens only use `[0-9a-f_]`, so a whole `/send_<token>` stays one bot
/// command when tapped in a chat. The signature is a fixed-length suffix:
/// the first 9 bytes of HMAC-SHA256 over the raw payload, hex-encoded.
/// Verification compares in constant time.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
        Ok(Self { mac })
    }

    pub fn encode(&self, payload: &str) -> String {
        let data = hex::encode(payload.as_bytes());
        let signature = hex::encode(self.sign(payload));
        format!("{data}{TOKEN_SEPARATOR}{signature}")
    }

    /// Recover the payload from a token. Any structural problem or signature
    /// mismatch yields `None`.
    pub fn decode(&self, token: &str) -> Option<String> {
        let token = token.trim();
        if token.len() < MIN_TOKEN_LEN || !token.is_ascii() {
            return None;
        }

        let (head, signature) = token.split_at(token.len() - SIGNATURE_LEN);
        let data = head.strip_suffix(TOKEN_SEPARATOR)?;
        if data.is_empty() {
            return None;
        }

        let signature = hex::decode(signature).ok()?;
        let payload = String::from_utf8(hex::decode(data).ok()?).ok()?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        if mac.verify_truncated_left(&signature).is_err() {
            debug!("Token signature mismatch");
            return None;
        }

        Some(payload)
    }

    /// Decode a token and require it to carry a forward payload.
    pub fn decode_forward(&self, token: &str) -> Option<ForwardPayload> {
        ForwardPayload::parse(&self.decode(token)?)
    }

    fn sign(&self, payload: &str) -> [u8; SIGNATURE_BYTES] {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let digest = mac.finalize().into_bytes();

        let mut signature = [0u8; SIGNATURE_BYTES];
        signature.copy_from_slice(&digest[..SIGNATURE_BYTES]);
        signature
    }
}
