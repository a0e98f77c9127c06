//! Minimal Plaid client: public-token exchange and cursor-based
//! transaction sync.

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerdesk_core::money::round_money;
use ledgerdesk_runtime_config::PlaidSettings;

/// Page size requested from `/transactions/sync` (Plaid's maximum).
const SYNC_PAGE_SIZE: u32 = 500;
/// Upper bound on pages pulled by one sync call.
const MAX_SYNC_PAGES: usize = 50;

#[derive(Debug, Error)]
pub enum PlaidError {
    #[error("Plaid credentials are not configured")]
    NotConfigured,
    #[error("Plaid request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Plaid returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Clone)]
pub struct PlaidClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    pub item_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaidTransaction {
    pub transaction_id: String,
    pub account_id: String,
    /// Positive for money leaving the account.
    pub amount: Decimal,
    pub date: NaiveDate,
    pub name: String,
}

impl PlaidTransaction {
    /// Amount as stored locally: inflows positive.
    pub fn local_amount(&self) -> Decimal {
        round_money(-self.amount)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemovedTransaction {
    pub transaction_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Everything pulled by one sync, across pages.
#[derive(Debug, Default)]
pub struct SyncBatch {
    pub added: Vec<PlaidTransaction>,
    pub modified: Vec<PlaidTransaction>,
    pub removed: Vec<RemovedTransaction>,
    pub next_cursor: Option<String>,
}

impl SyncBatch {
    /// Keep only changes for one Plaid account of the item.
    pub fn retain_account(&mut self, plaid_account_id: &str) {
        self.added.retain(|t| t.account_id == plaid_account_id);
        self.modified.retain(|t| t.account_id == plaid_account_id);
        self.removed
            .retain(|r| r.account_id.as_deref().is_none_or(|id| id == plaid_account_id));
    }
}

#[derive(Serialize)]
struct ExchangeBody<'a> {
    client_id: &'a str,
    secret: &'a str,
    public_token: &'a str,
}

#[derive(Serialize)]
struct SyncBody<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
    count: u32,
}

#[derive(Deserialize)]
struct SyncPage {
    #[serde(default)]
    added: Vec<PlaidTransaction>,
    #[serde(default)]
    modified: Vec<PlaidTransaction>,
    #[serde(default)]
    removed: Vec<RemovedTransaction>,
    next_cursor: String,
    #[serde(default)]
    has_more: bool,
}

impl PlaidClient {
    pub fn new(settings: &PlaidSettings) -> Result<Self, PlaidError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client_id: settings.client_id.clone(),
            secret: settings.secret.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.secret.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PlaidError> {
        if !self.is_configured() {
            return Err(PlaidError::NotConfigured);
        }
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlaidError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    /// POST /item/public_token/exchange
    pub async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange, PlaidError> {
        let body = ExchangeBody {
            client_id: &self.client_id,
            secret: &self.secret,
            public_token,
        };
        self.post("/item/public_token/exchange", &body).await
    }

    /// POST /transactions/sync, following `has_more` until caught up.
    pub async fn sync_transactions(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<SyncBatch, PlaidError> {
        let mut batch = SyncBatch::default();
        let mut cursor = cursor.map(str::to_string);
        for _ in 0..MAX_SYNC_PAGES {
            let body = SyncBody {
                client_id: &self.client_id,
                secret: &self.secret,
                access_token,
                cursor: cursor.as_deref(),
                count: SYNC_PAGE_SIZE,
            };
            let page: SyncPage = self.post("/transactions/sync", &body).await?;
            batch.added.extend(page.added);
            batch.modified.extend(page.modified);
            batch.removed.extend(page.removed);
            cursor = Some(page.next_cursor);
            if !page.has_more {
                break;
            }
        }
        batch.next_cursor = cursor;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str, account: &str, amount: &str) -> PlaidTransaction {
        PlaidTransaction {
            transaction_id: id.into(),
            account_id: account.into(),
            amount: amount.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            name: "x".into(),
        }
    }

    #[test]
    fn outflows_become_negative() {
        assert_eq!(tx("a", "acc", "12.345").local_amount().to_string(), "-12.35");
        assert_eq!(tx("b", "acc", "-500").local_amount().to_string(), "500");
    }

    #[test]
    fn retain_account_filters_every_list() {
        let mut batch = SyncBatch {
            added: vec![tx("a", "acc1", "1"), tx("b", "acc2", "1")],
            modified: vec![tx("c", "acc2", "1")],
            removed: vec![
                RemovedTransaction {
                    transaction_id: "d".into(),
                    account_id: Some("acc2".into()),
                },
                RemovedTransaction {
                    transaction_id: "e".into(),
                    account_id: None,
                },
            ],
            next_cursor: None,
        };
        batch.retain_account("acc1");
        assert_eq!(batch.added.len(), 1);
        assert!(batch.modified.is_empty());
        assert_eq!(batch.removed.len(), 1);
        assert_eq!(batch.removed[0].transaction_id, "e");
    }

    #[test]
    fn page_parses_numeric_amounts() {
        let page: SyncPage = serde_json::from_str(
            r#"{"added":[{"transaction_id":"t1","account_id":"a","amount":4.33,
                "date":"2024-05-02","name":"Coffee","pending":false}],
                "next_cursor":"c1","has_more":false}"#,
        )
        .unwrap();
        assert_eq!(page.added[0].amount.to_string(), "4.33");
        assert_eq!(page.next_cursor, "c1");
        assert!(page.modified.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_refuses() {
        let client = PlaidClient::new(&PlaidSettings::default()).unwrap();
        assert!(!client.is_configured());
        let err = client.exchange_public_token("public-sandbox").await.unwrap_err();
        assert!(matches!(err, PlaidError::NotConfigured));
    }
}
