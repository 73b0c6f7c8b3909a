use std::env;
use std::str::FromStr;
use tracing::warn;

/// Upper bounds for the duration settings. Larger values overflow chrono.
pub const MAX_OTP_TTL_SECONDS: u64 = 24 * 60 * 60;
pub const MAX_OTP_RESEND_COOLDOWN_SECONDS: u64 = 60 * 60;
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
pub const MAX_QUEUE_RETENTION_DAYS: i64 = 10 * 365;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub sms_api_url: String,
    pub sms_api_key: String,
    /// Offset of the clinic's local time from UTC, used to decide which day a queue belongs to.
    pub clinic_utc_offset_minutes: i32,
    pub default_service_minutes: u32,
    pub otp_ttl_seconds: u64,
    pub otp_max_attempts: u32,
    pub otp_resend_cooldown_seconds: u64,
    pub session_ttl_hours: i64,
    pub queue_retention_days: i64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            email_api_url: String::new(),
            email_api_key: String::new(),
            email_from: "no-reply@clinic.local".to_string(),
            sms_api_url: String::new(),
            sms_api_key: String::new(),
            clinic_utc_offset_minutes: 330,
            default_service_minutes: 10,
            otp_ttl_seconds: 300,
            otp_max_attempts: 5,
            otp_resend_cooldown_seconds: 30,
            session_ttl_hours: 24,
            queue_retention_days: 7,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: string_var("SUPABASE_URL", defaults.supabase_url),
            supabase_anon_key: string_var("SUPABASE_ANON_PUBLIC_KEY", defaults.supabase_anon_key),
            supabase_jwt_secret: string_var("SUPABASE_JWT_SECRET", defaults.supabase_jwt_secret),
            email_api_url: string_var("EMAIL_API_URL", defaults.email_api_url),
            email_api_key: string_var("EMAIL_API_KEY", defaults.email_api_key),
            email_from: string_var("EMAIL_FROM", defaults.email_from),
            sms_api_url: string_var("SMS_API_URL", defaults.sms_api_url),
            sms_api_key: string_var("SMS_API_KEY", defaults.sms_api_key),
            clinic_utc_offset_minutes: parsed_var("CLINIC_UTC_OFFSET_MINUTES", defaults.clinic_utc_offset_minutes),
            default_service_minutes: parsed_var("DEFAULT_SERVICE_MINUTES", defaults.default_service_minutes),
            otp_ttl_seconds: bounded_var("OTP_TTL_SECONDS", defaults.otp_ttl_seconds, 1, MAX_OTP_TTL_SECONDS),
            otp_max_attempts: parsed_var("OTP_MAX_ATTEMPTS", defaults.otp_max_attempts),
            otp_resend_cooldown_seconds: bounded_var(
                "OTP_RESEND_COOLDOWN_SECONDS",
                defaults.otp_resend_cooldown_seconds,
                0,
                MAX_OTP_RESEND_COOLDOWN_SECONDS,
            ),
            session_ttl_hours: bounded_var("SESSION_TTL_HOURS", defaults.session_ttl_hours, 1, MAX_SESSION_TTL_HOURS),
            queue_retention_days: bounded_var(
                "QUEUE_RETENTION_DAYS",
                defaults.queue_retention_days,
                0,
                MAX_QUEUE_RETENTION_DAYS,
            ),
            port: parsed_var("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// A JWT secret is the only hard requirement; Supabase and the
    /// notification gateways are optional.
    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.email_api_url.is_empty() && !self.email_api_key.is_empty()
    }

    pub fn is_sms_configured(&self) -> bool {
        !self.sms_api_url.is_empty() && !self.sms_api_key.is_empty()
    }
}

fn string_var(name: &str, default: String) -> String {
    env::var(name).unwrap_or_else(|_| {
        if default.is_empty() {
            warn!("{} not set, using empty value", name);
        } else {
            warn!("{} not set, using default", name);
        }
        default
    })
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Like `parsed_var`, but clamps the value into `min..=max`.
fn bounded_var<T>(name: &str, default: T, min: T, max: T) -> T
where
    T: FromStr + Copy + Ord + std::fmt::Display,
{
    let value = parsed_var(name, default);
    let bounded = value.clamp(min, max);
    if bounded != value {
        warn!("{} = {} is out of range, using {}", name, value, bounded);
    }
    bounded
}
