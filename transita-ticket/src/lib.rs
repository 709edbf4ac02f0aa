//! Tamper-evident ticket payloads.
//!
//! A signed payload proves "this ticket was issued by us at this instant" and
//! nothing more. It is a pure function of the payload fields and the server
//! secret; the booking's current status is deliberately not part of it, so a
//! previously issued ticket stays verifiable even after payment-state changes.
//! Boarding eligibility is a separate live lookup composed by the caller.

use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The signed bundle handed to the passenger and presented at boarding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketPayload {
    pub booking_ref: String,
    /// RFC 3339 issuance instant, part of the signed content.
    pub issued_at: String,
    /// Hex-encoded HMAC-SHA256 over `booking_ref` and `issued_at`.
    pub signature: String,
}

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("signing secret must not be empty")]
    EmptySecret,
}

/// Issues and verifies ticket payloads with a server-held HMAC secret.
#[derive(Clone)]
pub struct TicketSigner {
    secret: Vec<u8>,
}

impl TicketSigner {
    pub fn new(secret: &str) -> Result<Self, TicketError> {
        if secret.is_empty() {
            return Err(TicketError::EmptySecret);
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn mac_over(&self, booking_ref: &str, issued_at: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac key");
        mac.update(booking_ref.as_bytes());
        mac.update(b"|");
        mac.update(issued_at.as_bytes());
        mac
    }

    /// Hex signature over the canonical `booking_ref|issued_at` serialization.
    pub fn sign(&self, booking_ref: &str, issued_at: &str) -> String {
        let digest = self.mac_over(booking_ref, issued_at).finalize();
        hex::encode(digest.into_bytes())
    }

    /// Produce a payload stamped with the current instant.
    pub fn issue(&self, booking_ref: &str) -> TicketPayload {
        let issued_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let signature = self.sign(booking_ref, &issued_at);
        TicketPayload {
            booking_ref: booking_ref.to_string(),
            issued_at,
            signature,
        }
    }

    /// Recompute the signature over the payload's content fields and compare
    /// in constant time. Any mutation of `booking_ref`, `issued_at`, or
    /// `signature` fails verification.
    pub fn verify(&self, payload: &TicketPayload) -> bool {
        let supplied = match hex::decode(&payload.signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        self.mac_over(&payload.booking_ref, &payload.issued_at)
            .verify_slice(&supplied)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TicketSigner {
        TicketSigner::new("test-secret").unwrap()
    }

    #[test]
    fn test_issue_verify_round_trip() {
        let signer = signer();
        let payload = signer.issue("BRB-7K2M9QX4");
        assert!(signer.verify(&payload));
    }

    #[test]
    fn test_tampered_booking_ref_fails() {
        let signer = signer();
        let mut payload = signer.issue("BRB-7K2M9QX4");
        payload.booking_ref = "BRB-7K2M9QX5".to_string();
        assert!(!signer.verify(&payload));
    }

    #[test]
    fn test_tampered_issued_at_fails() {
        let signer = signer();
        let mut payload = signer.issue("BRB-7K2M9QX4");
        payload.issued_at = "2030-01-01T00:00:00Z".to_string();
        assert!(!signer.verify(&payload));
    }

    #[test]
    fn test_tampered_signature_fails() {
        let signer = signer();
        let mut payload = signer.issue("BRB-7K2M9QX4");
        payload.signature = "00".repeat(32);
        assert!(!signer.verify(&payload));
    }

    #[test]
    fn test_non_hex_signature_fails_cleanly() {
        let signer = signer();
        let mut payload = signer.issue("BRB-7K2M9QX4");
        payload.signature = "not hex".to_string();
        assert!(!signer.verify(&payload));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let payload = signer().issue("BRB-7K2M9QX4");
        let other = TicketSigner::new("other-secret").unwrap();
        assert!(!other.verify(&payload));
    }

    #[test]
    fn test_verification_independent_of_booking_state() {
        // Two issuances for the same booking differ only by instant; both
        // verify regardless of anything that happened to the booking.
        let signer = signer();
        let first = signer.issue("BRB-AAAA1111");
        let second = signer.issue("BRB-AAAA1111");
        assert!(signer.verify(&first));
        assert!(signer.verify(&second));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(TicketSigner::new("").is_err());
    }
}
