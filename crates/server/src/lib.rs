//! ledgerdesk server: the HTTP API over SQLite.
//!
//! The binary in `main.rs` only loads configuration and serves
//! [`build_router`]; everything else lives here so integration tests can
//! drive the router directly.

pub mod accounting;
pub mod cache;
pub mod error;
pub mod plaid;
pub mod routes;
pub mod storage;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    routing::{delete, get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ledgerdesk_runtime_config::{LedgerConfig, apply_compat_fallbacks, apply_env_overrides};

use accounting::Accounting;
use cache::TotalsCache;
use plaid::PlaidClient;
use storage::Db;

/// CSV uploads are the largest bodies the API accepts.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<LedgerConfig>,
    pub accounting: Accounting,
    pub plaid: PlaidClient,
}

impl AppState {
    pub fn new(db: Db, config: LedgerConfig, cache: TotalsCache) -> anyhow::Result<Self> {
        let accounting = Accounting::new(db.clone(), cache, &config.cache);
        let plaid = PlaidClient::new(&config.plaid).context("building Plaid client")?;
        Ok(Self {
            db,
            config: Arc::new(config),
            accounting,
            plaid,
        })
    }
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for Arc<LedgerConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Accounting {
    fn from_ref(state: &AppState) -> Self {
        state.accounting.clone()
    }
}

impl FromRef<AppState> for PlaidClient {
    fn from_ref(state: &AppState) -> Self {
        state.plaid.clone()
    }
}

/// Read `ledgerdesk.toml` (a missing file means defaults), then apply
/// environment overrides.
pub fn load_config(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<LedgerConfig> {
    let mut config: LedgerConfig = if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        tracing::info!("{} not found; using defaults", path.display());
        LedgerConfig::default()
    };
    let overridden = apply_env_overrides(&mut config, lookup);
    if !overridden.is_empty() {
        tracing::info!("config overridden from environment: {}", overridden.join(", "));
    }
    if apply_compat_fallbacks(&mut config) {
        tracing::warn!("invalid config values replaced with defaults");
    }
    Ok(config)
}

pub fn build_router(state: AppState) -> Router {
    use routes::{
        assets, auth, banking, catalog, clients, email, health, hr, invoices, projects, quotes,
        recurring, reports, tickets,
    };

    let api = Router::new()
        // Health
        .route("/health", get(health::health))
        // Users
        .route("/users", post(auth::create_user).get(auth::list_users))
        .route("/users/me", get(auth::me))
        // Clients
        .route("/clients", post(clients::create_client).get(clients::list_clients))
        .route(
            "/clients/{id}",
            get(clients::get_client).put(clients::update_client),
        )
        .route("/clients/{id}/archive", post(clients::archive_client))
        .route("/clients/{id}/unarchive", post(clients::unarchive_client))
        .route(
            "/clients/{id}/contacts",
            post(clients::create_contact).get(clients::list_contacts),
        )
        .route(
            "/clients/{id}/contacts/{contact_id}",
            get(clients::get_contact).put(clients::update_contact),
        )
        .route(
            "/clients/{id}/contacts/{contact_id}/archive",
            post(clients::archive_contact),
        )
        .route(
            "/clients/{id}/locations",
            post(clients::create_location).get(clients::list_locations),
        )
        .route(
            "/clients/{id}/locations/{location_id}",
            get(clients::get_location).put(clients::update_location),
        )
        .route(
            "/clients/{id}/locations/{location_id}/archive",
            post(clients::archive_location),
        )
        .route(
            "/clients/{id}/documents",
            post(clients::create_document).get(clients::list_documents),
        )
        .route(
            "/clients/{id}/documents/{document_id}",
            get(clients::get_document).put(clients::update_document),
        )
        .route(
            "/clients/{id}/documents/{document_id}/archive",
            post(clients::archive_document),
        )
        .route(
            "/clients/{id}/subscriptions",
            post(recurring::create_subscription).get(recurring::list_subscriptions),
        )
        .route(
            "/clients/{id}/subscriptions/{subscription_id}",
            delete(recurring::delete_subscription),
        )
        // Catalog
        .route("/taxes", post(catalog::create_tax).get(catalog::list_taxes))
        .route("/taxes/{id}/archive", post(catalog::archive_tax))
        .route(
            "/categories",
            post(catalog::create_category).get(catalog::list_categories),
        )
        .route("/categories/{id}/archive", post(catalog::archive_category))
        .route(
            "/products",
            post(catalog::create_product).get(catalog::list_products),
        )
        .route(
            "/products/{id}",
            get(catalog::get_product).put(catalog::update_product),
        )
        .route("/products/{id}/archive", post(catalog::archive_product))
        // Invoices & payments
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route(
            "/invoices/{id}",
            get(invoices::get_invoice).put(invoices::update_invoice),
        )
        .route("/invoices/{id}/status", put(invoices::set_invoice_status))
        .route("/invoices/{id}/send", post(invoices::send_invoice))
        .route("/invoices/{id}/archive", post(invoices::archive_invoice))
        .route("/invoices/{id}/unarchive", post(invoices::unarchive_invoice))
        .route("/invoices/{id}/items", post(invoices::add_item))
        .route(
            "/invoices/{id}/items/{item_id}",
            put(invoices::update_item).delete(invoices::delete_item),
        )
        .route(
            "/invoices/{id}/payments",
            post(invoices::record_payment).get(invoices::list_payments),
        )
        .route(
            "/invoices/{id}/payments/{payment_id}",
            delete(invoices::delete_payment),
        )
        // Quotes
        .route("/quotes", post(quotes::create_quote).get(quotes::list_quotes))
        .route("/quotes/{id}", get(quotes::get_quote))
        .route("/quotes/{id}/items", post(quotes::add_quote_item))
        .route("/quotes/{id}/status", put(quotes::set_quote_status))
        .route("/quotes/{id}/convert", post(quotes::convert_quote))
        // Recurring payments
        .route(
            "/recurring",
            post(recurring::create_recurring).get(recurring::list_recurring),
        )
        .route("/recurring/import", post(recurring::import_recurring))
        .route(
            "/recurring/{id}",
            get(recurring::get_recurring).put(recurring::update_recurring),
        )
        .route("/recurring/{id}/upcoming", get(recurring::upcoming_recurring))
        .route("/recurring/{id}/process", post(recurring::process_recurring))
        .route("/recurring/{id}/cancel", post(recurring::cancel_recurring))
        // Tickets
        .route(
            "/tickets",
            post(tickets::create_ticket).get(tickets::list_tickets),
        )
        .route("/tickets/counts", get(tickets::ticket_counts))
        .route(
            "/tickets/{id}",
            get(tickets::get_ticket).put(tickets::update_ticket),
        )
        .route("/tickets/{id}/status", put(tickets::set_ticket_status))
        .route("/tickets/{id}/assign", put(tickets::assign_ticket))
        .route("/tickets/{id}/replies", post(tickets::reply_to_ticket))
        // Projects
        .route(
            "/projects",
            post(projects::create_project).get(projects::list_projects),
        )
        .route(
            "/projects/{id}",
            get(projects::get_project).put(projects::update_project),
        )
        .route("/projects/{id}/complete", post(projects::complete_project))
        .route(
            "/projects/{id}/tickets/{ticket_id}",
            post(projects::link_ticket),
        )
        // HR
        .route("/employees", post(hr::create_employee).get(hr::list_employees))
        .route("/employees/sync", post(hr::sync_employees))
        .route(
            "/employees/{id}",
            get(hr::get_employee).put(hr::update_employee),
        )
        .route("/employees/{id}/archive", post(hr::archive_employee))
        .route("/employees/{id}/clock-in", post(hr::clock_in))
        .route("/employees/{id}/clock-out", post(hr::clock_out))
        .route("/employees/{id}/time-entries", get(hr::list_time_entries))
        .route("/employees/{id}/timesheet", get(hr::timesheet))
        .route("/time-entries/{id}/breaks", post(hr::add_break))
        .route("/payroll/summary", get(hr::payroll_summary))
        // Banking
        .route(
            "/accounts",
            post(banking::create_account).get(banking::list_accounts),
        )
        .route("/accounts/{id}", get(banking::get_account))
        .route("/accounts/{id}/plaid/exchange", post(banking::plaid_exchange))
        .route("/accounts/{id}/plaid/sync", post(banking::plaid_sync))
        .route(
            "/accounts/{id}/transactions",
            post(banking::create_transaction).get(banking::list_transactions),
        )
        .route("/transactions/{id}", put(banking::update_transaction))
        // Inventory
        .route("/assets", post(assets::create_asset).get(assets::list_assets))
        .route(
            "/assets/{id}",
            get(assets::get_asset).put(assets::update_asset),
        )
        .route("/assets/{id}/archive", post(assets::archive_asset))
        // Email queue
        .route("/emails", post(email::enqueue_email).get(email::list_emails))
        .route("/emails/{id}/sent", post(email::mark_sent))
        .route("/emails/{id}/failed", post(email::mark_failed))
        // Reports
        .route("/reports/aging", get(reports::aging))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
