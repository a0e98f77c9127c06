//! Server configuration types.
//!
//! The server reads `ledgerdesk.toml` into [`LedgerConfig`]; every field has a
//! serde default so a missing file or a partial file is valid. Environment
//! variables are layered on top with [`apply_env_overrides`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "ledgerdesk.toml";

/// Top-level configuration (persisted as `ledgerdesk.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub billing: BillingSettings,
    #[serde(default)]
    pub payroll: PayrollSettings,
    #[serde(default)]
    pub inventory: InventorySettings,
    #[serde(default)]
    pub plaid: PlaidSettings,
    #[serde(default)]
    pub email: EmailSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            base_url: default_base_url(),
        }
    }
}

impl ServerSettings {
    /// Absolute link under `base_url`.
    pub fn link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Redis when `redis_url` is set, in-process otherwise.
    #[default]
    Auto,
    Redis,
    Memory,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default)]
    pub redis_url: String,
    #[serde(default = "default_invoice_ttl")]
    pub invoice_ttl_secs: u64,
    #[serde(default = "default_balance_ttl")]
    pub balance_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Auto,
            redis_url: String::new(),
            invoice_ttl_secs: default_invoice_ttl(),
            balance_ttl_secs: default_balance_ttl(),
        }
    }
}

impl CacheSettings {
    /// Backend after resolving `auto`.
    pub fn effective_backend(&self) -> CacheBackend {
        match self.backend {
            CacheBackend::Auto if self.redis_url.trim().is_empty() => CacheBackend::Memory,
            CacheBackend::Auto => CacheBackend::Redis,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSettings {
    #[serde(default = "default_invoice_prefix")]
    pub invoice_prefix: String,
    #[serde(default = "default_quote_prefix")]
    pub quote_prefix: String,
    #[serde(default = "default_ticket_prefix")]
    pub ticket_prefix: String,
    /// Due-date offset used when neither the invoice nor the client says.
    #[serde(default = "default_net_terms")]
    pub default_net_terms: u32,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            invoice_prefix: default_invoice_prefix(),
            quote_prefix: default_quote_prefix(),
            ticket_prefix: default_ticket_prefix(),
            default_net_terms: default_net_terms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollSettings {
    #[serde(default = "default_period_weeks")]
    pub period_weeks: u32,
    /// Any past period end date; later periods are counted from it.
    #[serde(default = "default_anchor_end")]
    pub anchor_end: NaiveDate,
    #[serde(default = "default_overtime_threshold")]
    pub overtime_threshold_hours: u32,
}

impl Default for PayrollSettings {
    fn default() -> Self {
        Self {
            period_weeks: default_period_weeks(),
            anchor_end: default_anchor_end(),
            overtime_threshold_hours: default_overtime_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default = "default_asset_tag_prefix")]
    pub asset_tag_prefix: String,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            asset_tag_prefix: default_asset_tag_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaidSettings {
    #[serde(default = "default_plaid_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub secret: String,
}

impl Default for PlaidSettings {
    fn default() -> Self {
        Self {
            base_url: default_plaid_base_url(),
            client_id: String::new(),
            secret: String::new(),
        }
    }
}

impl PlaidSettings {
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.secret.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

impl EmailSettings {
    /// `Name <address>`, or the bare address when the name is blank.
    pub fn sender(&self) -> String {
        let name = self.from_name.trim();
        let address = self.from_address.trim();
        if name.is_empty() {
            address.to_string()
        } else {
            format!("{name} <{address}>")
        }
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_port() -> u16 {
    3000
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_invoice_ttl() -> u64 {
    300
}
fn default_balance_ttl() -> u64 {
    900
}
fn default_invoice_prefix() -> String {
    "INV-".to_string()
}
fn default_quote_prefix() -> String {
    "QUO-".to_string()
}
fn default_ticket_prefix() -> String {
    "TKT-".to_string()
}
fn default_net_terms() -> u32 {
    30
}
fn default_period_weeks() -> u32 {
    1
}
fn default_anchor_end() -> NaiveDate {
    // A Friday.
    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap_or_default()
}
fn default_overtime_threshold() -> u32 {
    40
}
fn default_asset_tag_prefix() -> String {
    "AST".to_string()
}
fn default_plaid_base_url() -> String {
    "https://sandbox.plaid.com".to_string()
}
fn default_from_address() -> String {
    "billing@localhost".to_string()
}
fn default_from_name() -> String {
    "Billing".to_string()
}

/// Layer environment variables over a parsed config. `lookup` is
/// `std::env::var` in production. Returns the names that were applied.
pub fn apply_env_overrides(
    config: &mut LedgerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<&'static str> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let mut applied = Vec::new();

    if let Some(port) = get("PORT").and_then(|v| v.trim().parse().ok()) {
        config.server.port = port;
        applied.push("PORT");
    }
    if let Some(dir) = get("LEDGERDESK_DATA_DIR") {
        config.server.data_dir = dir;
        applied.push("LEDGERDESK_DATA_DIR");
    }
    if let Some(url) = get("BASE_URL") {
        config.server.base_url = url;
        applied.push("BASE_URL");
    }
    if let Some(url) = get("REDIS_URL") {
        config.cache.redis_url = url;
        applied.push("REDIS_URL");
    }
    if let Some(id) = get("PLAID_CLIENT_ID") {
        config.plaid.client_id = id;
        applied.push("PLAID_CLIENT_ID");
    }
    if let Some(secret) = get("PLAID_SECRET") {
        config.plaid.secret = secret;
        applied.push("PLAID_SECRET");
    }
    if let Some(url) = get("PLAID_BASE_URL") {
        config.plaid.base_url = url;
        applied.push("PLAID_BASE_URL");
    }
    applied
}

/// Clamp values that would make the server misbehave.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut LedgerConfig) -> bool {
    let mut changed = false;

    if config.payroll.period_weeks == 0 {
        config.payroll.period_weeks = default_period_weeks();
        changed = true;
    }

    if config.inventory.asset_tag_prefix.trim().is_empty() {
        config.inventory.asset_tag_prefix = default_asset_tag_prefix();
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: LedgerConfig = toml::from_str("").expect("parse toml");
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.cache.invoice_ttl_secs, 300);
        assert_eq!(cfg.cache.balance_ttl_secs, 900);
        assert_eq!(cfg.billing.invoice_prefix, "INV-");
        assert_eq!(cfg.payroll.period_weeks, 1);
        assert_eq!(cfg.payroll.anchor_end, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(cfg.cache.effective_backend(), CacheBackend::Memory);
        assert!(!cfg.plaid.is_configured());
    }

    #[test]
    fn partial_sections_deserialize() {
        let cfg: LedgerConfig = toml::from_str(
            r#"
[cache]
redis_url = "redis://127.0.0.1:6379"
invoice_ttl_secs = 60

[payroll]
period_weeks = 2
anchor_end = "2024-01-12"
"#,
        )
        .expect("parse toml");

        assert_eq!(cfg.cache.effective_backend(), CacheBackend::Redis);
        assert_eq!(cfg.cache.invoice_ttl_secs, 60);
        assert_eq!(cfg.cache.balance_ttl_secs, 900);
        assert_eq!(cfg.payroll.period_weeks, 2);
        assert_eq!(cfg.payroll.overtime_threshold_hours, 40);
    }

    #[test]
    fn sender_and_links() {
        let mut cfg = LedgerConfig::default();
        cfg.server.base_url = "https://desk.example.com/".to_string();
        cfg.email.from_name = "Acme Billing".to_string();
        cfg.email.from_address = "billing@acme.example".to_string();
        assert_eq!(cfg.server.link("/invoices/7"), "https://desk.example.com/invoices/7");
        assert_eq!(cfg.email.sender(), "Acme Billing <billing@acme.example>");

        cfg.email.from_name = "  ".to_string();
        assert_eq!(cfg.email.sender(), "billing@acme.example");
    }

    #[test]
    fn explicit_backend_wins_over_url() {
        let cfg: LedgerConfig = toml::from_str(
            r#"
[cache]
backend = "disabled"
redis_url = "redis://127.0.0.1:6379"
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.cache.effective_backend(), CacheBackend::Disabled);
    }

    #[test]
    fn env_overrides_apply_and_skip_blanks() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("REDIS_URL", "redis://cache:6379"),
            ("PLAID_SECRET", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = LedgerConfig::default();
        let applied = apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(applied, vec!["PORT", "REDIS_URL"]);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.cache.redis_url, "redis://cache:6379");
        assert!(cfg.plaid.secret.is_empty());
    }

    #[test]
    fn compat_fallbacks_fix_zero_period() {
        let mut cfg = LedgerConfig::default();
        cfg.payroll.period_weeks = 0;
        cfg.inventory.asset_tag_prefix = " ".to_string();
        assert!(apply_compat_fallbacks(&mut cfg));
        assert_eq!(cfg.payroll.period_weeks, 1);
        assert_eq!(cfg.inventory.asset_tag_prefix, "AST");
        assert!(!apply_compat_fallbacks(&mut cfg));
    }
}
