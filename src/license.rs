//! License Guard (§4.4).
//!
//! Verifies an opaque `ENC-LICENSE-V1:<base64-payload>:<base64-signature>`
//! blob against a server-held HMAC-SHA256 key and exposes the decoded
//! feature set. Gating is enforced by callers checking `LicenseStatus::allows`
//! before performing a protected operation; the guard itself never blocks --
//! it only reports.

use crate::error::{AppError, AppResult};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::PathBuf;

const HEADER: &str = "ENC-LICENSE-V1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensePayload {
    pub product: String,
    pub licensee: String,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseStatus {
    pub valid: bool,
    pub reason: Option<String>,
    pub payload: Option<LicensePayload>,
}

impl LicenseStatus {
    fn invalid(reason: impl Into<String>) -> Self {
        Self { valid: false, reason: Some(reason.into()), payload: None }
    }

    pub fn none_installed() -> Self {
        Self::invalid("no license installed")
    }

    /// Case-insensitive feature check, gated on overall validity.
    pub fn allows(&self, feature: &str) -> bool {
        self.valid
            && self
                .payload
                .as_ref()
                .is_some_and(|p| p.features.iter().any(|f| f.eq_ignore_ascii_case(feature)))
    }
}

#[derive(Clone)]
pub struct LicenseGuard {
    secret: Option<String>,
    license_path: PathBuf,
}

impl LicenseGuard {
    pub fn new(secret: Option<String>, license_path: PathBuf) -> Self {
        Self { secret, license_path }
    }

    /// Current status of whatever blob is installed on disk, if any.
    pub async fn status(&self) -> LicenseStatus {
        match tokio::fs::read_to_string(&self.license_path).await {
            Ok(blob) => self.verify(Some(&blob)),
            Err(_) => LicenseStatus::none_installed(),
        }
    }

    /// Persists `blob` as the installed license and returns its verification
    /// result. An invalid blob is still stored (so `status` reflects it
    /// faithfully) -- rejection only happens at the gated operation.
    pub async fn install(&self, blob: &str) -> AppResult<LicenseStatus> {
        if let Some(parent) = self.license_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("creating license dir: {e}")))?;
        }
        tokio::fs::write(&self.license_path, blob)
            .await
            .map_err(|e| AppError::Internal(format!("writing license: {e}")))?;
        Ok(self.verify(Some(blob)))
    }

    /// Fails with `LicenseDenied` unless the installed license is valid and
    /// carries `feature`.
    pub async fn require(&self, feature: &str) -> AppResult<()> {
        let status = self.status().await;
        if status.allows(feature) {
            return Ok(());
        }
        let reason = status.reason.unwrap_or_else(|| format!("license does not grant '{feature}'"));
        Err(AppError::LicenseDenied(reason))
    }

    /// Verify a raw license blob. Never panics or propagates an error across
    /// this boundary -- every failure becomes a `LicenseStatus{valid: false}`.
    pub fn verify(&self, blob: Option<&str>) -> LicenseStatus {
        let Some(secret) = &self.secret else {
            return LicenseStatus::none_installed();
        };
        let Some(blob) = blob else {
            return LicenseStatus::none_installed();
        };

        let mut parts = blob.splitn(3, ':');
        let (Some(header), Some(payload_b64), Some(sig_b64)) = (parts.next(), parts.next(), parts.next()) else {
            return LicenseStatus::invalid("malformed license blob");
        };
        if header != HEADER {
            return LicenseStatus::invalid("unrecognised license header");
        }

        let Ok(expected_sig) = Self::sign(secret.as_bytes(), payload_b64.as_bytes()) else {
            return LicenseStatus::invalid("signing backend error");
        };
        let Ok(provided_sig) = B64.decode(sig_b64) else {
            return LicenseStatus::invalid("signature is not valid base64");
        };
        if expected_sig.len() != provided_sig.len() || !constant_time_eq(&expected_sig, &provided_sig) {
            return LicenseStatus::invalid("signature invalid");
        }

        let Ok(payload_bytes) = B64.decode(payload_b64) else {
            return LicenseStatus::invalid("payload is not valid base64");
        };
        let Ok(payload) = serde_json::from_slice::<LicensePayload>(&payload_bytes) else {
            return LicenseStatus::invalid("payload is not valid license JSON");
        };

        let now = Utc::now();
        if now < payload.not_before {
            return LicenseStatus::invalid(format!("not yet valid until {}", payload.not_before.to_rfc3339()));
        }
        if now > payload.expires_at {
            return LicenseStatus::invalid(format!("expired at {}", payload.expires_at.to_rfc3339()));
        }

        LicenseStatus { valid: true, reason: None, payload: Some(payload) }
    }

    fn sign(secret: &[u8], payload_b64: &[u8]) -> Result<Vec<u8>, hmac::digest::InvalidLength> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret)?;
        mac.update(payload_b64);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(secret: Option<&str>) -> LicenseGuard {
        LicenseGuard::new(secret.map(str::to_string), PathBuf::from("/tmp/inspection-core-test-license.txt"))
    }

    fn make_blob(secret: &str, payload: &LicensePayload) -> String {
        let payload_json = serde_json::to_vec(payload).unwrap();
        let payload_b64 = B64.encode(payload_json);
        let sig = LicenseGuard::sign(secret.as_bytes(), payload_b64.as_bytes()).unwrap();
        format!("{HEADER}:{payload_b64}:{}", B64.encode(sig))
    }

    fn sample_payload(features: Vec<&str>) -> LicensePayload {
        let now = Utc::now();
        LicensePayload {
            product: "inspection-core".to_string(),
            licensee: "acme".to_string(),
            issued_at: now,
            not_before: now - chrono::Duration::days(1),
            expires_at: now + chrono::Duration::days(30),
            features: features.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn valid_license_allows_its_features() {
        let guard = guard(Some("top-secret"));
        let payload = sample_payload(vec!["clusters", "inspections"]);
        let blob = make_blob("top-secret", &payload);
        let status = guard.verify(Some(&blob));
        assert!(status.valid);
        assert!(status.allows("clusters"));
        assert!(status.allows("INSPECTIONS"));
        assert!(!status.allows("reports"));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let guard = guard(Some("top-secret"));
        let payload = sample_payload(vec!["clusters"]);
        let blob = make_blob("wrong-secret", &payload);
        let status = guard.verify(Some(&blob));
        assert!(!status.valid);
        assert_eq!(status.reason.as_deref(), Some("signature invalid"));
    }

    #[test]
    fn expired_license_is_rejected() {
        let guard = guard(Some("top-secret"));
        let now = Utc::now();
        let payload = LicensePayload {
            expires_at: now - chrono::Duration::days(1),
            ..sample_payload(vec!["clusters"])
        };
        let blob = make_blob("top-secret", &payload);
        let status = guard.verify(Some(&blob));
        assert!(!status.valid);
        assert!(status.reason.unwrap().starts_with("expired at"));
    }

    #[test]
    fn no_license_installed() {
        let g = guard(None);
        assert!(!g.verify(None).valid);
        let guard_with_secret = guard(Some("s"));
        assert!(!guard_with_secret.verify(None).valid);
    }
}
