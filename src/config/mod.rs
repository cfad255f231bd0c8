use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub crm: CrmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// REST data store and auth provider (PostgREST + GoTrue layout)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Project base URL, e.g. `https://<project>.supabase.co`
    #[serde(default)]
    pub url: String,
    /// Service role key, used by server-side handlers (bypasses row policies)
    #[serde(default)]
    pub service_key: String,
    /// Public anon key, sent as `apikey` alongside user tokens
    #[serde(default)]
    pub anon_key: String,
}

impl StoreConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.service_key.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Page to send unauthenticated visitors to
    #[serde(default = "default_login_page")]
    pub login_page: String,
    /// Page to send authenticated visitors without the required role to
    #[serde(default = "default_home_page")]
    pub home_page: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_page: default_login_page(),
            home_page: default_home_page(),
        }
    }
}

fn default_login_page() -> String {
    "login.html".to_string()
}

fn default_home_page() -> String {
    "app.html".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// VAPID public key, base64url encoded uncompressed P-256 point
    #[serde(default)]
    pub vapid_public_key: String,
    /// VAPID private key as a PKCS#8 PEM document
    #[serde(default)]
    pub vapid_private_key_pem: String,
    /// Contact URI for the push service operator (`mailto:` or `https:`)
    #[serde(default)]
    pub vapid_subject: String,
    #[serde(default = "default_push_ttl")]
    pub ttl_secs: u32,
    /// Upper bound on a single delivery so one slow endpoint cannot stall a dispatch
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
    /// Deliveries in flight at once during a dispatch
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub dashboard_url: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: String::new(),
            vapid_private_key_pem: String::new(),
            vapid_subject: String::new(),
            ttl_secs: default_push_ttl(),
            delivery_timeout_secs: default_delivery_timeout(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            icon_url: String::new(),
            dashboard_url: String::new(),
        }
    }
}

impl PushConfig {
    pub fn is_configured(&self) -> bool {
        !self.vapid_public_key.is_empty() && !self.vapid_private_key_pem.is_empty()
    }
}

fn default_push_ttl() -> u32 {
    86_400
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_max_concurrent_deliveries() -> usize {
    16
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    #[default]
    Resend,
    Smtp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub transport: MailTransport,
    /// Transactional email API base URL
    #[serde(default = "default_resend_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sender mailbox, e.g. `ServiceBridge <alerts@example.com>`
    #[serde(default = "default_from")]
    pub from: String,
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransport::default(),
            api_url: default_resend_url(),
            api_key: None,
            from: default_from(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
        }
    }
}

fn default_resend_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_from() -> String {
    "ServiceBridge <alerts@localhost>".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

/// Where ADF leads go and how the lead document describes its origin
#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    /// CRM lead intake mailbox
    #[serde(default)]
    pub lead_address: String,
    #[serde(default = "default_vendor_name")]
    pub vendor_name: String,
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
    #[serde(default = "default_provider_service")]
    pub provider_service: String,
    #[serde(default)]
    pub provider_url: String,
    #[serde(default = "default_lead_source")]
    pub source: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            lead_address: String::new(),
            vendor_name: default_vendor_name(),
            provider_name: default_provider_name(),
            provider_service: default_provider_service(),
            provider_url: String::new(),
            source: default_lead_source(),
        }
    }
}

fn default_vendor_name() -> String {
    "Dealership".to_string()
}

fn default_provider_name() -> String {
    "ServiceBridge".to_string()
}

fn default_provider_service() -> String {
    "Service-to-Sales Lead Conversion".to_string()
}

fn default_lead_source() -> String {
    "Service to Sales".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay secrets and deployment-specific values from the environment.
    ///
    /// Key material is only ever injected this way or through the config file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };

        set(&mut self.store.url, "SUPABASE_URL");
        set(&mut self.store.service_key, "SUPABASE_SERVICE_KEY");
        set(&mut self.store.anon_key, "SUPABASE_ANON_KEY");
        set(&mut self.push.vapid_public_key, "VAPID_PUBLIC_KEY");
        set(&mut self.push.vapid_private_key_pem, "VAPID_PRIVATE_KEY_PEM");
        set(&mut self.push.vapid_subject, "VAPID_SUBJECT");
        set(&mut self.crm.lead_address, "CRM_LEAD_ADDRESS");

        if let Some(key) = lookup("RESEND_API_KEY").filter(|v| !v.is_empty()) {
            self.mail.api_key = Some(key);
        }
        if let Some(user) = lookup("SMTP_USER").filter(|v| !v.is_empty()) {
            self.mail.smtp_username = Some(user);
        }
        if let Some(pass) = lookup("SMTP_PASS").filter(|v| !v.is_empty()) {
            self.mail.smtp_password = Some(pass);
        }
    }
}
