/// Relay codecs
///
/// Two pure, secret-parameterised building blocks shared by the notifier and
/// the inbound bot:
/// - `payload`: canonical "forward payload" strings addressing a source
///   message, built from public catalog links and redeemed into a forward
///   target.
/// - `token`: HMAC-signed, hex-encoded wrapping of a payload that stays a
///   single tappable `/send_<token>` bot command.
///
/// Malformed input from links or commands never raises; it resolves to `None`.

pub mod payload;
pub mod token;

pub use payload::{ChatRef, ForwardPayload, ForwardTarget};
pub use token::{TokenCodec, TokenError};
