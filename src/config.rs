use std::time::Duration;

use crate::jobs::request_watcher::WatcherSettings;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    /// Sender identity, e.g. `+14155238886` or `whatsapp:+14155238886`.
    pub twilio_whatsapp_number: Option<String>,
    /// The single recipient of every alert.
    pub admin_whatsapp_number: Option<String>,
    pub twilio_api_base: String,
    pub watcher: WatcherSettings,
    /// Raises the default log filter to debug.
    pub debug: bool,
}

/// Everything the messaging client needs, all present.
#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: String,
}

impl Config {
    /// Returns the messaging settings, or an error naming every missing variable.
    pub fn twilio_settings(&self) -> anyhow::Result<TwilioSettings> {
        let fields = [
            ("TWILIO_ACCOUNT_SID", &self.twilio_account_sid),
            ("TWILIO_AUTH_TOKEN", &self.twilio_auth_token),
            ("TWILIO_WHATSAPP_NUMBER", &self.twilio_whatsapp_number),
            ("ADMIN_WHATSAPP_NUMBER", &self.admin_whatsapp_number),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "messaging is not configured; set {}",
                missing.join(", ")
            );
        }

        Ok(TwilioSettings {
            api_base: self.twilio_api_base.clone(),
            account_sid: self.twilio_account_sid.clone().unwrap_or_default(),
            auth_token: self.twilio_auth_token.clone().unwrap_or_default(),
            from: self.twilio_whatsapp_number.clone().unwrap_or_default(),
            to: self.admin_whatsapp_number.clone().unwrap_or_default(),
        })
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: u64| {
            Duration::from_secs(
                non_empty(key)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(default),
            )
        };

        let database_url = non_empty("DATABASE_URL").unwrap_or_else(|| {
            database_url_from_parts(
                &non_empty("DB_HOST").unwrap_or_else(|| "localhost".into()),
                &non_empty("DB_NAME").unwrap_or_else(|| "campus_maintenance".into()),
                &non_empty("DB_USER").unwrap_or_else(|| "postgres".into()),
                non_empty("DB_PASSWORD").as_deref(),
            )
        });

        let defaults = WatcherSettings::default();
        let watcher = WatcherSettings {
            // a zero interval would spin against the database
            check_interval: secs("CHECK_INTERVAL_SECS", defaults.check_interval.as_secs())
                .max(Duration::from_secs(1)),
            error_backoff: secs("ERROR_BACKOFF_SECS", defaults.error_backoff.as_secs()),
            lookback: secs("LOOKBACK_SECS", defaults.lookback.as_secs()),
            store_timeout: secs("STORE_TIMEOUT_SECS", defaults.store_timeout.as_secs()),
            notify_timeout: secs("NOTIFY_TIMEOUT_SECS", defaults.notify_timeout.as_secs()),
        };

        Config {
            port: non_empty("MAINTDESK_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
            database_url,
            twilio_account_sid: non_empty("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: non_empty("TWILIO_AUTH_TOKEN"),
            twilio_whatsapp_number: non_empty("TWILIO_WHATSAPP_NUMBER"),
            admin_whatsapp_number: non_empty("ADMIN_WHATSAPP_NUMBER"),
            twilio_api_base: non_empty("TWILIO_API_BASE")
                .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.into()),
            watcher,
            debug: non_empty("DEBUG").map(|v| is_truthy(&v)).unwrap_or(false),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    Ok(Config::from_lookup(|key| std::env::var(key).ok()))
}

fn database_url_from_parts(host: &str, name: &str, user: &str, password: Option<&str>) -> String {
    match password {
        Some(pw) => format!(
            "postgres://{}:{}@{}/{}",
            urlencoding::encode(user),
            urlencoding::encode(pw),
            host,
            name
        ),
        None => format!("postgres://{}@{}/{}", urlencoding::encode(user), host, name),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
