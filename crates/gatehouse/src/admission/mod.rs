//! Request admission: origin allowlist, Turnstile verification, and the
//! gateway that composes them in front of storage.

mod gateway;
mod origin;
mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use gateway::{AdmissionGateway, AdmissionRequest};
pub use origin::OriginGuard;
pub use verifier::{CaptchaVerifier, TurnstileVerifier, token_fingerprint};
