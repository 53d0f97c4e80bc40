//! Application state shared by all handlers

use std::path::Path;
use std::sync::Arc;

use crate::auth::{Authenticator, JwtAuthenticator};
use crate::config::Config;
use crate::db::Storage;
use crate::invoices::InvoiceStore;
use crate::orders::OrderStore;
use crate::payments::{MpesaClient, PaymentGateway, StripeClient};
use crate::quotes::QuoteStore;
use crate::receipts::ReceiptStore;
use crate::reconcile::Reconciler;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Storage,
    pub orders: OrderStore,
    pub quotes: QuoteStore,
    pub receipts: ReceiptStore,
    pub invoices: InvoiceStore,
    pub reconciler: Reconciler,
    pub mpesa: Arc<dyn PaymentGateway>,
    pub stripe: Arc<dyn PaymentGateway>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Open the database and build the real provider clients
    pub fn new(config: Config) -> Result<Self, BoxError> {
        if let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let storage = Storage::open(&config.database_path)?;

        let missing = config.mpesa.validate_config();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "M-Pesa not fully configured, STK push will fail");
        }
        if config.stripe_secret_key.is_empty() {
            tracing::warn!("STRIPE_SECRET_KEY not set, Stripe checkout will fail");
        }

        let mpesa: Arc<dyn PaymentGateway> = Arc::new(MpesaClient::new(config.mpesa.clone()));
        let stripe: Arc<dyn PaymentGateway> = Arc::new(StripeClient::new(
            config.stripe_secret_key.clone(),
            config.stripe_webhook_secret.clone(),
        ));
        let auth: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::new(&config.jwt_secret));
        Ok(Self::from_parts(config, storage, mpesa, stripe, auth))
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: Config,
        storage: Storage,
        mpesa: Arc<dyn PaymentGateway>,
        stripe: Arc<dyn PaymentGateway>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let orders = OrderStore::new(storage.clone());
        let quotes = QuoteStore::new(storage.clone(), orders.clone());
        let receipts = ReceiptStore::new(storage.clone());
        let invoices = InvoiceStore::new(storage.clone(), config.company.clone());
        let reconciler = Reconciler::new(storage.clone(), invoices.clone(), receipts.clone());
        Self {
            config: Arc::new(config),
            storage,
            orders,
            quotes,
            receipts,
            invoices,
            reconciler,
            mpesa,
            stripe,
            auth,
        }
    }
}
