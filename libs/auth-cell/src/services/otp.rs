use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::{Builder, Uuid};

use shared_config::{AppConfig, MAX_OTP_RESEND_COOLDOWN_SECONDS, MAX_OTP_TTL_SECONDS, MAX_SESSION_TTL_HOURS};
use shared_models::auth::{JwtClaims, Role, TokenResponse};
use shared_utils::jwt::{sign_token, JwtError};
use shared_utils::validation::{mask_phone, validate_phone};

use crate::error::OtpError;
use crate::models::{SendOtpResponse, SessionResponse};
use crate::services::delivery::{HttpSmsDelivery, LogOtpDelivery, OtpDelivery};

type HmacSha256 = Hmac<Sha256>;

const CODE_LENGTH: usize = 6;

struct PendingCode {
    digest: Vec<u8>,
    sent_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

/// Phone login with one-time codes. Only a keyed digest of each code is
/// kept, and a successful verification issues a patient session JWT.
pub struct OtpService {
    pending: RwLock<HashMap<String, PendingCode>>,
    delivery: Arc<dyn OtpDelivery>,
    secret: String,
    ttl_seconds: u64,
    max_attempts: u32,
    resend_cooldown_seconds: u64,
    session_ttl_hours: i64,
}

impl OtpService {
    pub fn new(config: &AppConfig, delivery: Arc<dyn OtpDelivery>) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            delivery,
            secret: config.supabase_jwt_secret.clone(),
            ttl_seconds: config.otp_ttl_seconds.clamp(1, MAX_OTP_TTL_SECONDS),
            max_attempts: config.otp_max_attempts.max(1),
            resend_cooldown_seconds: config.otp_resend_cooldown_seconds.min(MAX_OTP_RESEND_COOLDOWN_SECONDS),
            session_ttl_hours: config.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let delivery: Arc<dyn OtpDelivery> = if config.is_sms_configured() {
            Arc::new(HttpSmsDelivery::new(&config.sms_api_url, &config.sms_api_key))
        } else {
            warn!("SMS_API_URL / SMS_API_KEY not set, verification codes will only be logged");
            Arc::new(LogOtpDelivery)
        };
        Self::new(config, delivery)
    }

    pub async fn send_otp(&self, phone: &str) -> Result<SendOtpResponse, OtpError> {
        self.send_otp_at(phone, Utc::now()).await
    }

    pub async fn send_otp_at(&self, phone: &str, now: DateTime<Utc>) -> Result<SendOtpResponse, OtpError> {
        let phone = phone.trim();
        validate_phone(phone)?;

        let code = generate_code();
        {
            let mut pending = self.pending.write().await;

            if let Some(existing) = pending.get(phone) {
                let ready_at = existing.sent_at + Duration::seconds(self.resend_cooldown_seconds as i64);
                if now < ready_at {
                    let wait = (ready_at - now).num_seconds().max(1) as u64;
                    return Err(OtpError::CooldownActive {
                        retry_after_seconds: wait,
                    });
                }
            }

            pending.insert(
                phone.to_string(),
                PendingCode {
                    digest: self.digest(phone, &code)?,
                    sent_at: now,
                    expires_at: now + Duration::seconds(self.ttl_seconds as i64),
                    attempts: 0,
                },
            );
        }

        if let Err(e) = self.delivery.deliver(phone, &code).await {
            // Allow an immediate retry once the gateway recovers
            self.pending.write().await.remove(phone);
            return Err(e);
        }

        info!("Verification code sent to {}", mask_phone(phone));
        Ok(SendOtpResponse {
            success: true,
            message: "Verification code sent".to_string(),
            phone: mask_phone(phone),
            expires_in_seconds: self.ttl_seconds,
            resend_after_seconds: self.resend_cooldown_seconds,
        })
    }

    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<SessionResponse, OtpError> {
        self.verify_otp_at(phone, code, Utc::now()).await
    }

    pub async fn verify_otp_at(&self, phone: &str, code: &str, now: DateTime<Utc>) -> Result<SessionResponse, OtpError> {
        let phone = phone.trim();
        validate_phone(phone)?;

        {
            let mut pending = self.pending.write().await;
            let entry = pending.get_mut(phone).ok_or(OtpError::NotRequested)?;

            if now >= entry.expires_at {
                pending.remove(phone);
                return Err(OtpError::Expired);
            }

            if !self.matches(phone, code.trim(), &entry.digest)? {
                entry.attempts += 1;
                debug!("Wrong code for {} (attempt {})", mask_phone(phone), entry.attempts);
                if entry.attempts >= self.max_attempts {
                    pending.remove(phone);
                    warn!("Verification locked for {} after too many attempts", mask_phone(phone));
                    return Err(OtpError::TooManyAttempts);
                }
                return Err(OtpError::InvalidCode);
            }

            pending.remove(phone);
        }

        info!("Phone {} verified", mask_phone(phone));
        self.issue_session(phone, now)
    }

    /// Drops codes that can no longer be used.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, entry| entry.expires_at > now);
        before - pending.len()
    }

    /// Stable user id for a phone number, so repeat logins map to the same patient.
    pub fn subject_for(&self, phone: &str) -> Result<Uuid, OtpError> {
        let mut mac = self.mac()?;
        mac.update(b"subject:");
        mac.update(phone.as_bytes());
        let digest = mac.finalize().into_bytes();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Ok(Builder::from_custom_bytes(bytes).into_uuid())
    }

    fn issue_session(&self, phone: &str, now: DateTime<Utc>) -> Result<SessionResponse, OtpError> {
        let subject = self.subject_for(phone)?.to_string();
        let expires_in = Duration::hours(self.session_ttl_hours).num_seconds();

        let claims = JwtClaims {
            sub: subject.clone(),
            exp: Some((now.timestamp() + expires_in) as u64),
            email: None,
            phone: Some(phone.to_string()),
            role: Some(Role::Patient.as_str().to_string()),
            app_metadata: None,
            user_metadata: None,
            aud: Some("authenticated".to_string()),
            iat: Some(now.timestamp() as u64),
        };

        let access_token = sign_token(&claims, &self.secret)?;

        Ok(SessionResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in,
            user: TokenResponse {
                valid: true,
                user_id: subject,
                email: None,
                phone: claims.phone,
                role: claims.role,
            },
        })
    }

    fn mac(&self) -> Result<HmacSha256, OtpError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| OtpError::Session(JwtError::Signing))
    }

    fn digest(&self, phone: &str, code: &str) -> Result<Vec<u8>, OtpError> {
        let mut mac = self.mac()?;
        mac.update(phone.as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time comparison against the stored digest.
    fn matches(&self, phone: &str, code: &str, digest: &[u8]) -> Result<bool, OtpError> {
        let mut mac = self.mac()?;
        mac.update(phone.as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        Ok(mac.verify_slice(digest).is_ok())
    }
}

fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", value, width = CODE_LENGTH)
}
