//! Server configuration

use shared::models::CompanyInfo;

use crate::payments::mpesa::{MpesaConfig, MpesaEnvironment};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP port
    pub http_port: u16,
    /// redb database file
    pub database_path: String,
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
    /// Allowed CORS origin (`*` when unset)
    pub cors_origin: Option<String>,
    /// Daily rolling log files go here when set
    pub log_dir: Option<String>,
    pub mpesa: MpesaConfig,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Default redirect after a successful checkout
    pub stripe_success_url: String,
    /// Default redirect after a cancelled checkout
    pub stripe_cancel_url: String,
    /// Seller details printed on invoices
    pub company: CompanyInfo,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Optional provider credential; empty leaves the provider unconfigured
    fn optional(name: &str) -> String {
        std::env::var(name).unwrap_or_default()
    }

    fn company_from_env() -> CompanyInfo {
        let defaults = CompanyInfo::default();
        let var = |name: &str, fallback: String| std::env::var(name).unwrap_or(fallback);
        CompanyInfo {
            name: var("COMPANY_NAME", defaults.name),
            address: var("COMPANY_ADDRESS", defaults.address),
            phone: var("COMPANY_PHONE", defaults.phone),
            email: var("COMPANY_EMAIL", defaults.email),
            website: var("COMPANY_WEBSITE", defaults.website),
            tax_id: std::env::var("COMPANY_TAX_ID")
                .ok()
                .filter(|s| !s.is_empty())
                .or(defaults.tax_id),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/brandson.redb".into()),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            mpesa: MpesaConfig {
                environment: MpesaEnvironment::parse(
                    &std::env::var("MPESA_ENVIRONMENT").unwrap_or_default(),
                ),
                consumer_key: Self::optional("MPESA_CONSUMER_KEY"),
                consumer_secret: Self::optional("MPESA_CONSUMER_SECRET"),
                pass_key: Self::optional("MPESA_PASS_KEY"),
                shortcode: Self::optional("MPESA_SHORTCODE"),
                callback_url: Self::optional("MPESA_CALLBACK_URL"),
                base_url: std::env::var("MPESA_BASE_URL").ok().filter(|s| !s.is_empty()),
            },
            stripe_secret_key: Self::optional("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            stripe_success_url: std::env::var("STRIPE_SUCCESS_URL")
                .unwrap_or_else(|_| "https://brandsonmedia.co.ke/checkout/success".into()),
            stripe_cancel_url: std::env::var("STRIPE_CANCEL_URL")
                .unwrap_or_else(|_| "https://brandsonmedia.co.ke/checkout/cancel".into()),
            company: Self::company_from_env(),
            environment,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
