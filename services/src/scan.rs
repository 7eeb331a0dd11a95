use chrono::{DateTime, Duration, Utc};
use common::config::Config;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::Mutex;

use crate::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Inbound payload from the trusted scanning device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    pub card_id: String,
    pub subject: String,
    pub semester: String,
    /// Hex-encoded keyed digest over the other fields.
    pub digest: String,
    pub device_id: Option<String>,
}

/// Validates that a scan payload originated from a device holding the shared
/// secret. Pure over its inputs plus the secret; no storage access.
pub struct ScanVerifier {
    secret: Option<Vec<u8>>,
}

impl ScanVerifier {
    /// An empty secret means "not configured" and every scan is rejected.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        let secret: Vec<u8> = secret.into();
        Self {
            secret: (!secret.is_empty()).then_some(secret),
        }
    }

    pub fn from_config() -> Self {
        Self::new(Config::get().scanner_secret.as_bytes().to_vec())
    }

    /// Recomputes the keyed digest over `card_id | semester | subject` and
    /// compares it to the supplied one in constant time. Any mismatch,
    /// malformed hex, or missing secret is an `Integrity` rejection.
    pub fn verify(&self, event: &ScanEvent) -> Result<(), ServiceError> {
        let Some(secret) = &self.secret else {
            log::warn!("scanner secret not configured; rejecting scan");
            return Err(ServiceError::Integrity);
        };

        let supplied = hex::decode(event.digest.trim()).map_err(|_| ServiceError::Integrity)?;

        let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| ServiceError::Integrity)?;
        mac.update(event.card_id.as_bytes());
        mac.update(event.semester.as_bytes());
        mac.update(event.subject.as_bytes());
        mac.verify_slice(&supplied)
            .map_err(|_| ServiceError::Integrity)
    }

    /// Digest a trusted device would attach to a scan. None when the secret
    /// is not configured.
    pub fn digest_for(&self, card_id: &str, subject: &str, semester: &str) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(card_id.as_bytes());
        mac.update(semester.as_bytes());
        mac.update(subject.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

/// A device tap waiting to be picked up by the registration form.
#[derive(Debug, Clone)]
pub struct PendingScan {
    pub card_id: String,
    pub seen_at: DateTime<Utc>,
}

/// Capacity-one mailbox for the latest unclaimed device tap. A new tap
/// replaces the pending one; an unclaimed tap expires after the TTL.
pub struct ScanMailbox {
    slot: Mutex<Option<PendingScan>>,
    ttl: Duration,
}

impl ScanMailbox {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    pub fn from_config() -> Self {
        Self::new(Config::get().scan_ttl_seconds)
    }

    pub async fn publish(&self, card_id: &str) {
        let mut slot = self.slot.lock().await;
        *slot = Some(PendingScan {
            card_id: card_id.to_owned(),
            seen_at: Utc::now(),
        });
    }

    /// Returns the pending tap without claiming it, if still fresh.
    pub async fn peek(&self) -> Option<PendingScan> {
        let slot = self.slot.lock().await;
        slot.clone().filter(|s| self.is_fresh(s))
    }

    /// Takes the pending tap; at most one caller wins.
    pub async fn claim(&self) -> Option<PendingScan> {
        let mut slot = self.slot.lock().await;
        slot.take().filter(|s| self.is_fresh(s))
    }

    fn is_fresh(&self, scan: &PendingScan) -> bool {
        Utc::now() - scan.seen_at <= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(digest: &str) -> ScanEvent {
        ScanEvent {
            card_id: "04A224E9".into(),
            subject: "DSP".into(),
            semester: "6".into(),
            digest: digest.into(),
            device_id: Some("esp32-01".into()),
        }
    }

    #[test]
    fn accepts_digest_from_shared_secret() {
        let verifier = ScanVerifier::new(b"device-secret".to_vec());
        let digest = verifier.digest_for("04A224E9", "DSP", "6").unwrap();
        assert!(verifier.verify(&event(&digest)).is_ok());
    }

    #[test]
    fn rejects_digest_from_wrong_secret() {
        let trusted = ScanVerifier::new(b"device-secret".to_vec());
        let forger = ScanVerifier::new(b"guessed-secret".to_vec());
        let digest = forger.digest_for("04A224E9", "DSP", "6").unwrap();
        assert!(matches!(
            trusted.verify(&event(&digest)),
            Err(ServiceError::Integrity)
        ));
    }

    #[test]
    fn rejects_malformed_digest_and_missing_secret() {
        let verifier = ScanVerifier::new(b"device-secret".to_vec());
        assert!(matches!(
            verifier.verify(&event("not-hex")),
            Err(ServiceError::Integrity)
        ));

        let unconfigured = ScanVerifier::new(Vec::new());
        let digest = verifier.digest_for("04A224E9", "DSP", "6").unwrap();
        assert!(matches!(
            unconfigured.verify(&event(&digest)),
            Err(ServiceError::Integrity)
        ));
    }

    #[test]
    fn digest_binds_context_fields() {
        let verifier = ScanVerifier::new(b"device-secret".to_vec());
        let digest = verifier.digest_for("04A224E9", "DSP", "6").unwrap();
        let mut tampered = event(&digest);
        tampered.subject = "VLSI".into();
        assert!(matches!(
            verifier.verify(&tampered),
            Err(ServiceError::Integrity)
        ));
    }

    #[tokio::test]
    async fn mailbox_holds_one_pending_scan() {
        let mailbox = ScanMailbox::new(30);
        mailbox.publish("04A224E9").await;
        mailbox.publish("11BB22CC").await;

        let pending = mailbox.peek().await.expect("scan pending");
        assert_eq!(pending.card_id, "11BB22CC");

        assert!(mailbox.claim().await.is_some());
        assert!(mailbox.claim().await.is_none());
    }

    #[tokio::test]
    async fn mailbox_expires_unclaimed_scans() {
        let mailbox = ScanMailbox::new(0);
        mailbox.publish("04A224E9").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(mailbox.peek().await.is_none());
        assert!(mailbox.claim().await.is_none());
    }
}
