//! The credential record.

use serde::{Deserialize, Serialize};

use calkeeper_core::{EpochMillis, now_millis};

/// One authenticated session: access token, optional refresh token and
/// optional absolute expiry.
///
/// The JSON shape matches the token file written by Google's client
/// libraries, so unknown fields (`scope`, `token_type`, `id_token`) are
/// ignored on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Bearer token for API requests. Empty means "not usable".
    #[serde(default)]
    pub access_token: String,

    /// Long-lived token used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry in epoch milliseconds. `None` means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<EpochMillis>,
}

impl CredentialRecord {
    /// Creates a record.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry_date: Option<EpochMillis>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry_date,
        }
    }

    /// Builds a record from a token endpoint response, converting the
    /// relative `expires_in` (seconds) into an absolute expiry.
    pub fn from_expires_in(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let expiry_date =
            expires_in_secs.map(|secs| now_millis().saturating_add(secs.saturating_mul(1000)));
        Self::new(access_token, refresh_token, expiry_date)
    }

    /// True if an access token is present.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// True if the record has no expiry or the expiry is in the future.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(now_millis())
    }

    /// [`is_fresh`](Self::is_fresh) against an explicit clock.
    pub fn is_fresh_at(&self, now: EpochMillis) -> bool {
        match self.expiry_date {
            Some(expiry) => expiry > now,
            None => true,
        }
    }

    /// True if the record has an expiry and it has passed.
    pub fn is_expired(&self) -> bool {
        !self.is_fresh()
    }

    /// Copies the refresh token from `previous` when this record lacks one.
    ///
    /// Google omits `refresh_token` from refresh responses; the old one
    /// stays valid.
    pub fn inherit_refresh_token(mut self, previous: &CredentialRecord) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_requires_access_token() {
        assert!(!CredentialRecord::default().is_usable());
        assert!(CredentialRecord::new("a", None, None).is_usable());
    }

    #[test]
    fn no_expiry_is_always_fresh() {
        let record = CredentialRecord::new("a", None, None);
        assert!(record.is_fresh_at(i64::MAX));
        assert!(!record.is_expired());
    }

    #[test]
    fn expiry_boundary_is_expired() {
        let record = CredentialRecord::new("a", None, Some(1_000));
        assert!(record.is_fresh_at(999));
        assert!(!record.is_fresh_at(1_000));
    }

    #[test]
    fn expires_in_becomes_absolute() {
        let before = now_millis();
        let record = CredentialRecord::from_expires_in("a", None, Some(3600));
        let expiry = record.expiry_date.unwrap();
        assert!(expiry >= before + 3_600_000);
        assert!(!record.is_expired());
    }

    #[test]
    fn inherits_refresh_token_only_when_missing() {
        let old = CredentialRecord::new("a", Some("r-old".into()), None);

        let new = CredentialRecord::new("b", None, None).inherit_refresh_token(&old);
        assert_eq!(new.refresh_token.as_deref(), Some("r-old"));

        let rotated =
            CredentialRecord::new("b", Some("r-new".into()), None).inherit_refresh_token(&old);
        assert_eq!(rotated.refresh_token.as_deref(), Some("r-new"));
    }

    #[test]
    fn json_shape() {
        let record = CredentialRecord::new("a", Some("r".into()), Some(42));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"access_token": "a", "refresh_token": "r", "expiry_date": 42})
        );

        let bare = serde_json::to_value(CredentialRecord::new("a", None, None)).unwrap();
        assert_eq!(bare, serde_json::json!({"access_token": "a"}));
    }

    #[test]
    fn tolerates_extra_google_fields() {
        let json = r#"{
            "access_token": "ya29.x",
            "refresh_token": "1//r",
            "scope": "https://www.googleapis.com/auth/calendar",
            "token_type": "Bearer",
            "expiry_date": 1700000000000
        }"#;
        let record: CredentialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.access_token, "ya29.x");
        assert_eq!(record.expiry_date, Some(1_700_000_000_000));
    }
}
