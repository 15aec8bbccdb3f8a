use std::collections::HashMap;

use rand::Rng;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::OtpConfig;

/// What a code proves. Codes issued for one purpose never verify the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    VerifyAccount,
    PasswordReset,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("OTP expired or not found")]
    NotFound,
    #[error("OTP has expired. Please request a new one")]
    Expired,
    #[error("Invalid OTP. {remaining} attempts remaining")]
    Mismatch { remaining: u32 },
    #[error("Maximum verification attempts exceeded. Please request a new OTP")]
    TooManyAttempts,
    #[error("Please wait {retry_after} seconds before requesting a new OTP")]
    RateLimited { retry_after: i64 },
}

#[derive(Debug)]
pub struct IssuedOtp {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    expires_at: OffsetDateTime,
    attempts: u32,
}

#[derive(Default)]
struct OtpInner {
    entries: HashMap<(OtpPurpose, String), OtpEntry>,
    // Issuance timestamps per key for the resend cooldown and hourly cap.
    issuance: HashMap<(OtpPurpose, String), Vec<OffsetDateTime>>,
}

/// In-memory store of live verification codes, keyed by purpose and the
/// normalized email or phone they were sent to. At most one live code per
/// key; issuing again replaces the previous one.
pub struct OtpCache {
    cfg: OtpConfig,
    inner: RwLock<OtpInner>,
}

impl OtpCache {
    pub fn new(cfg: OtpConfig) -> Self {
        Self {
            cfg,
            inner: RwLock::new(OtpInner::default()),
        }
    }

    /// Issues a fresh code, replacing any live one for the same key.
    /// Unthrottled; resend traffic goes through [`OtpCache::resend`].
    pub async fn issue(&self, purpose: OtpPurpose, identifier: &str) -> IssuedOtp {
        let mut inner = self.inner.write().await;
        self.issue_locked(&mut inner, purpose, identifier)
    }

    /// Re-issues a code, subject to the hourly cap and the resend cooldown.
    /// The cap is checked first so a burst cannot ride the shorter cooldown.
    pub async fn resend(
        &self,
        purpose: OtpPurpose,
        identifier: &str,
    ) -> Result<IssuedOtp, OtpError> {
        let mut inner = self.inner.write().await;
        let now = OffsetDateTime::now_utc();
        let horizon = now - Duration::hours(1);
        let key = (purpose, identifier.to_string());

        if let Some(stamps) = inner.issuance.get_mut(&key) {
            stamps.retain(|t| *t > horizon);
            if stamps.len() >= self.cfg.rate_limit_per_hour as usize {
                let oldest = stamps.iter().min().copied().unwrap_or(now);
                let retry_after = (oldest + Duration::hours(1) - now).whole_seconds().max(1);
                warn!(identifier, "otp hourly cap reached");
                return Err(OtpError::RateLimited { retry_after });
            }
            if let Some(last) = stamps.iter().max().copied() {
                let ready_at = last + Duration::seconds(self.cfg.resend_cooldown_seconds);
                if ready_at > now {
                    let retry_after = (ready_at - now).whole_seconds().max(1);
                    return Err(OtpError::RateLimited { retry_after });
                }
            }
        }
        Ok(self.issue_locked(&mut inner, purpose, identifier))
    }

    /// Checks a submitted code. Success consumes the entry; a wrong code
    /// burns an attempt and the entry dies once attempts run out.
    pub async fn verify(
        &self,
        purpose: OtpPurpose,
        identifier: &str,
        code: &str,
    ) -> Result<(), OtpError> {
        let mut inner = self.inner.write().await;
        let now = OffsetDateTime::now_utc();
        let key = (purpose, identifier.to_string());

        let entry = inner.entries.get_mut(&key).ok_or(OtpError::NotFound)?;
        if entry.expires_at <= now {
            inner.entries.remove(&key);
            return Err(OtpError::Expired);
        }
        if entry.attempts >= self.cfg.max_attempts {
            inner.entries.remove(&key);
            return Err(OtpError::TooManyAttempts);
        }
        if entry.code != code {
            entry.attempts += 1;
            let attempts = entry.attempts;
            if attempts >= self.cfg.max_attempts {
                inner.entries.remove(&key);
                warn!(identifier, "otp attempts exhausted");
                return Err(OtpError::TooManyAttempts);
            }
            return Err(OtpError::Mismatch {
                remaining: self.cfg.max_attempts - attempts,
            });
        }
        inner.entries.remove(&key);
        debug!(identifier, "otp verified");
        Ok(())
    }

    fn issue_locked(
        &self,
        inner: &mut OtpInner,
        purpose: OtpPurpose,
        identifier: &str,
    ) -> IssuedOtp {
        let now = OffsetDateTime::now_utc();
        // Issuing is the natural point to shed dead state across all keys.
        inner.entries.retain(|_, e| e.expires_at > now);
        let horizon = now - Duration::hours(1);
        inner.issuance.retain(|_, stamps| {
            stamps.retain(|t| *t > horizon);
            !stamps.is_empty()
        });

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let expires_at = now + Duration::minutes(self.cfg.expire_minutes);
        let key = (purpose, identifier.to_string());
        inner.entries.insert(
            key.clone(),
            OtpEntry {
                code: code.clone(),
                expires_at,
                attempts: 0,
            },
        );
        inner.issuance.entry(key).or_default().push(now);
        debug!(identifier, purpose = ?purpose, "otp issued");
        IssuedOtp { code, expires_at }
    }

    /// Test hook: the live code for a key, if any.
    #[cfg(test)]
    pub(crate) async fn peek(&self, purpose: OtpPurpose, identifier: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&(purpose, identifier.to_string()))
            .map(|e| e.code.clone())
    }

    #[cfg(test)]
    async fn force_expire(&self, purpose: OtpPurpose, identifier: &str) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get_mut(&(purpose, identifier.to_string())) {
            entry.expires_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        }
    }

    #[cfg(test)]
    async fn backdate_issuance(&self, purpose: OtpPurpose, identifier: &str, by: Duration) {
        let mut inner = self.inner.write().await;
        if let Some(stamps) = inner.issuance.get_mut(&(purpose, identifier.to_string())) {
            for stamp in stamps.iter_mut() {
                *stamp -= by;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache() -> OtpCache {
        OtpCache::new(OtpConfig {
            expire_minutes: 5,
            max_attempts: 5,
            resend_cooldown_seconds: 60,
            rate_limit_per_hour: 5,
        })
    }

    fn wrong(code: &str) -> String {
        let first = code.as_bytes()[0];
        let flipped = if first == b'9' { b'0' } else { first + 1 };
        format!("{}{}", flipped as char, &code[1..])
    }

    #[tokio::test]
    async fn issued_code_verifies_exactly_once() {
        let cache = cache();
        let issued = cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;
        assert_eq!(issued.code.len(), 6);
        assert!(issued.code.chars().all(|c| c.is_ascii_digit()));
        let now = OffsetDateTime::now_utc();
        assert!(issued.expires_at > now + Duration::minutes(4));
        assert!(issued.expires_at < now + Duration::minutes(6));

        cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &issued.code)
            .await
            .expect("first use succeeds");
        let err = cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &issued.code)
            .await
            .unwrap_err();
        assert_eq!(err, OtpError::NotFound);
    }

    #[tokio::test]
    async fn reissue_replaces_the_previous_code() {
        let cache = cache();
        let first = cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;
        let second = cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;
        assert_eq!(
            cache.peek(OtpPurpose::VerifyAccount, "a@b.com").await,
            Some(second.code.clone())
        );

        if first.code != second.code {
            let err = cache
                .verify(OtpPurpose::VerifyAccount, "a@b.com", &first.code)
                .await
                .unwrap_err();
            assert!(matches!(err, OtpError::Mismatch { .. }));
        }
        cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &second.code)
            .await
            .expect("current code verifies");
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_dropped() {
        let cache = cache();
        let issued = cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;
        cache.force_expire(OtpPurpose::VerifyAccount, "a@b.com").await;

        let err = cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &issued.code)
            .await
            .unwrap_err();
        assert_eq!(err, OtpError::Expired);
        let err = cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &issued.code)
            .await
            .unwrap_err();
        assert_eq!(err, OtpError::NotFound);
    }

    #[tokio::test]
    async fn wrong_codes_burn_attempts_then_lock_out() {
        let cache = cache();
        let issued = cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;
        let bad = wrong(&issued.code);

        for expected_remaining in (1..=4).rev() {
            let err = cache
                .verify(OtpPurpose::VerifyAccount, "a@b.com", &bad)
                .await
                .unwrap_err();
            assert_eq!(
                err,
                OtpError::Mismatch {
                    remaining: expected_remaining
                }
            );
        }
        let err = cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &bad)
            .await
            .unwrap_err();
        assert_eq!(err, OtpError::TooManyAttempts);

        // Even the right code is dead after lockout.
        let err = cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &issued.code)
            .await
            .unwrap_err();
        assert_eq!(err, OtpError::NotFound);
    }

    #[tokio::test]
    async fn resend_respects_the_cooldown() {
        let cache = cache();
        cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;

        let err = cache
            .resend(OtpPurpose::VerifyAccount, "a@b.com")
            .await
            .unwrap_err();
        match err {
            OtpError::RateLimited { retry_after } => {
                assert!(retry_after >= 1 && retry_after <= 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        cache
            .backdate_issuance(OtpPurpose::VerifyAccount, "a@b.com", Duration::seconds(61))
            .await;
        cache
            .resend(OtpPurpose::VerifyAccount, "a@b.com")
            .await
            .expect("cooldown elapsed");
    }

    #[tokio::test]
    async fn hourly_cap_limits_resends() {
        let cache = OtpCache::new(OtpConfig {
            expire_minutes: 5,
            max_attempts: 5,
            resend_cooldown_seconds: 0,
            rate_limit_per_hour: 5,
        });
        cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;
        for _ in 0..4 {
            cache
                .resend(OtpPurpose::VerifyAccount, "a@b.com")
                .await
                .expect("under the cap");
        }
        let err = cache
            .resend(OtpPurpose::VerifyAccount, "a@b.com")
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::RateLimited { retry_after } if retry_after > 0));
    }

    #[tokio::test]
    async fn purposes_are_isolated() {
        let cache = cache();
        let issued = cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;

        let err = cache
            .verify(OtpPurpose::PasswordReset, "a@b.com", &issued.code)
            .await
            .unwrap_err();
        assert_eq!(err, OtpError::NotFound);

        cache
            .verify(OtpPurpose::VerifyAccount, "a@b.com", &issued.code)
            .await
            .expect("original purpose still verifies");
    }

    #[tokio::test]
    async fn concurrent_verifies_admit_a_single_winner() {
        let cache = Arc::new(cache());
        let issued = cache.issue(OtpPurpose::VerifyAccount, "a@b.com").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let code = issued.code.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .verify(OtpPurpose::VerifyAccount, "a@b.com", &code)
                    .await
                    .is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("task join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
