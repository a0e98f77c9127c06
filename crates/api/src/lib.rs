//! Shared API types, validation, and SQL builders for ledgerdesk.
//!
//! This crate is the single source of truth for every request/response body
//! the server speaks. The `backend` feature adds the pieces only the server
//! needs: query builders, migrations, validation and key hashing.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod db;
#[cfg(feature = "backend")]
pub mod service;

pub use ledgerdesk_core::aging::AgingReport;
pub use ledgerdesk_core::billing::{DocumentTotals, PaymentMethod};
pub use ledgerdesk_core::import::RowError;
pub use ledgerdesk_core::payroll::{PayPeriod, Timesheet};
pub use ledgerdesk_core::recurring::Frequency;
pub use rust_decimal::Decimal;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Declares a lowercase string-backed enum with `as_str`, `parse` and `Display`.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parse the stored column value.
            pub fn parse(text: &str) -> Option<Self> {
                match text {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum! {
    /// Role of an API user.
    UserRole { Admin => "admin", Staff => "staff" }
}

str_enum! {
    /// Lifecycle of an invoice.
    InvoiceStatus {
        Draft => "draft",
        Sent => "sent",
        Viewed => "viewed",
        Partial => "partial",
        Paid => "paid",
        Cancelled => "cancelled",
    }
}

impl InvoiceStatus {
    /// Whether the invoice counts toward receivables.
    pub fn is_receivable(&self) -> bool {
        !matches!(self, Self::Draft | Self::Cancelled)
    }
}

str_enum! {
    QuoteStatus {
        Draft => "draft",
        Sent => "sent",
        Accepted => "accepted",
        Declined => "declined",
        Invoiced => "invoiced",
    }
}

str_enum! {
    TicketStatus {
        New => "new",
        Open => "open",
        OnHold => "on_hold",
        Resolved => "resolved",
        Closed => "closed",
    }
}

str_enum! {
    TicketPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

str_enum! {
    /// Visibility of a ticket reply.
    ReplyKind { Public => "public", Internal => "internal" }
}

str_enum! {
    RecurringStatus {
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

str_enum! {
    EmailStatus { Queued => "queued", Sent => "sent", Failed => "failed" }
}

str_enum! {
    CategoryType {
        Income => "income",
        Expense => "expense",
        PaymentMethod => "payment_method",
        Ticket => "ticket",
    }
}

// ─── Common ──────────────────────────────────────────────────────────────────

/// Generic success body for operations with nothing else to report.
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Returned by `GET /api/health` - server liveness check.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache: String,
}

/// `?archived=true` switches a listing to archived rows only.
#[derive(Debug, Default, Deserialize)]
pub struct ArchivedQuery {
    #[serde(default)]
    pub archived: bool,
}

/// Body for status transitions.
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest<S> {
    pub status: S,
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: String,
}

/// The API key is only ever returned here.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub user: UserResponse,
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserResponse>,
}

// ─── Clients ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub net_terms: Option<u32>,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub net_terms: Option<u32>,
    pub hourly_rate: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResponse {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub net_terms: Option<u32>,
    pub hourly_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: String,
    pub archived_at: Option<String>,
}

/// Outstanding receivables of one client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientBalance {
    pub client_id: i64,
    pub invoiced: Decimal,
    pub paid: Decimal,
    pub balance: Decimal,
    pub aging: AgingReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientDetailResponse {
    #[serde(flatten)]
    pub client: ClientResponse,
    pub balance: ClientBalance,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientListQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientListResponse {
    pub clients: Vec<ClientResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

// ─── Contacts / Locations / Documents ────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateContactRequest {
    pub name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_primary: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactResponse {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_primary: bool,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListContactsResponse {
    pub contacts: Vec<ContactResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLocationRequest {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateLocationRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub is_primary: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationResponse {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub is_primary: bool,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListLocationsResponse {
    pub locations: Vec<LocationResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDocumentRequest {
    pub name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateDocumentRequest {
    pub name: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<DocumentResponse>,
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaxRequest {
    pub name: String,
    pub percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxResponse {
    pub id: i64,
    pub name: String,
    pub percent: Decimal,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTaxesResponse {
    pub taxes: Vec<TaxResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub category_type: CategoryType,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: i64,
    pub name: String,
    pub category_type: CategoryType,
    pub color: Option<String>,
    pub archived_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryListQuery {
    #[serde(rename = "type")]
    pub category_type: Option<CategoryType>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListCategoriesResponse {
    pub categories: Vec<CategoryResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub tax_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub tax_id: Option<i64>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub tax_id: Option<i64>,
    pub category_id: Option<i64>,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListProductsResponse {
    pub products: Vec<ProductResponse>,
}

// ─── Line items ──────────────────────────────────────────────────────────────

/// A line added to an invoice or quote. With `product_id`, unset fields are
/// copied from the product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemInput {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub tax_id: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub tax_id: Option<i64>,
    #[serde(default)]
    pub clear_tax: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub id: i64,
    pub product_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub price: Decimal,
    pub discount: Decimal,
    pub tax_id: Option<i64>,
    pub tax_percent: Option<Decimal>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

// ─── Invoices ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: i64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemInput>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub discount: Option<Decimal>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub id: i64,
    pub client_id: i64,
    /// Display number, prefix included (`INV-12`).
    pub number: String,
    pub status: InvoiceStatus,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub discount: Decimal,
    pub note: Option<String>,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceDetailResponse {
    #[serde(flatten)]
    pub invoice: InvoiceResponse,
    pub items: Vec<ItemResponse>,
    pub payments: Vec<PaymentResponse>,
    pub totals: DocumentTotals,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListQuery {
    pub client_id: Option<i64>,
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub archived: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendInvoiceResponse {
    pub invoice: InvoiceResponse,
    pub email_id: i64,
    pub recipient: String,
}

// ─── Payments ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: i64,
    pub invoice_id: i64,
    pub account_id: Option<i64>,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordPaymentResponse {
    pub payment: PaymentResponse,
    pub invoice_status: InvoiceStatus,
    pub totals: DocumentTotals,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPaymentsResponse {
    pub payments: Vec<PaymentResponse>,
}

// ─── Quotes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateQuoteRequest {
    pub client_id: i64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub expire_date: Option<NaiveDate>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub id: i64,
    pub client_id: i64,
    pub number: String,
    pub status: QuoteStatus,
    pub date: NaiveDate,
    pub expire_date: Option<NaiveDate>,
    pub discount: Decimal,
    pub note: Option<String>,
    pub invoice_id: Option<i64>,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteDetailResponse {
    #[serde(flatten)]
    pub quote: QuoteResponse,
    pub items: Vec<ItemResponse>,
    pub totals: DocumentTotals,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteListQuery {
    pub client_id: Option<i64>,
    pub status: Option<QuoteStatus>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListQuotesResponse {
    pub quotes: Vec<QuoteResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertQuoteResponse {
    pub quote: QuoteResponse,
    pub invoice: InvoiceResponse,
}

// ─── Recurring payments ──────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRecurringRequest {
    pub client_id: i64,
    pub amount: Decimal,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    /// `None` or `0` runs until cancelled.
    #[serde(default)]
    pub occurrences: Option<u32>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateRecurringRequest {
    pub amount: Option<Decimal>,
    pub frequency: Option<Frequency>,
    pub occurrences: Option<u32>,
    pub method: Option<PaymentMethod>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringResponse {
    pub id: i64,
    pub client_id: i64,
    pub amount: Decimal,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub occurrences: Option<u32>,
    pub completed: u32,
    pub remaining: Option<u32>,
    pub next_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub description: Option<String>,
    pub status: RecurringStatus,
    pub last_processed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecurringListQuery {
    pub client_id: Option<i64>,
    pub status: Option<RecurringStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListRecurringResponse {
    pub recurring_payments: Vec<RecurringResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    pub count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpcomingResponse {
    pub id: i64,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessRecurringResponse {
    pub processed_date: NaiveDate,
    pub recurring: RecurringResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportRecurringResponse {
    pub imported: usize,
    pub ids: Vec<i64>,
}

/// 422 body for a rejected import.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImportErrorResponse {
    pub error: String,
    pub rows: Vec<RowError>,
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub product_id: i64,
    #[serde(default)]
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub client_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub monthly_amount: Decimal,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSubscriptionsResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
    pub monthly_total: Decimal,
}

// ─── Tickets ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTicketRequest {
    pub client_id: i64,
    pub subject: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    #[serde(default)]
    pub contact_id: Option<i64>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub assigned_to: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    pub details: Option<String>,
    pub priority: Option<TicketPriority>,
    pub contact_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignTicketRequest {
    /// `None` unassigns.
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub id: i64,
    pub number: String,
    pub client_id: i64,
    pub contact_id: Option<i64>,
    pub project_id: Option<i64>,
    pub subject: String,
    pub details: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub assigned_to: Option<i64>,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub body: String,
    #[serde(default)]
    pub internal: bool,
    /// `HH:MM:SS` or `HH:MM`.
    #[serde(default)]
    pub time_worked: Option<String>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub body: String,
    pub kind: ReplyKind,
    pub time_worked: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketDetailResponse {
    #[serde(flatten)]
    pub ticket: TicketResponse,
    pub replies: Vec<ReplyResponse>,
    pub total_time_worked: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub client_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketListResponse {
    pub tickets: Vec<TicketResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: TicketStatus,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketCountsResponse {
    pub counts: Vec<StatusCount>,
    pub open_total: i64,
}

// ─── Projects ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub id: i64,
    pub client_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub tickets_total: i64,
    pub tickets_closed: i64,
    /// Whole percent of closed tickets.
    pub progress: u32,
    pub tickets: Vec<TicketResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectListQuery {
    pub client_id: Option<i64>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListProjectsResponse {
    pub projects: Vec<ProjectResponse>,
}

// ─── HR ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEmployeeRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateEmployeeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub title: Option<String>,
    pub hourly_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeResponse {
    pub id: i64,
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub title: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEmployeesResponse {
    pub employees: Vec<EmployeeResponse>,
}

/// One record from the external staff directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEmployee {
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmployeeSyncRequest {
    pub employees: Vec<DirectoryEmployee>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmployeeSyncResponse {
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClockRequest {
    /// Defaults to now (UTC).
    #[serde(default)]
    pub at: Option<NaiveDateTime>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddBreakRequest {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakResponse {
    pub id: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntryResponse {
    pub id: i64,
    pub employee_id: i64,
    pub clock_in: NaiveDateTime,
    pub clock_out: Option<NaiveDateTime>,
    pub note: Option<String>,
    pub breaks: Vec<BreakResponse>,
    /// `None` while clocked in.
    pub worked_hours: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeEntryListQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTimeEntriesResponse {
    pub entries: Vec<TimeEntryResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimesheetQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimesheetResponse {
    pub employee_id: i64,
    #[serde(flatten)]
    pub timesheet: Timesheet,
}

#[derive(Debug, Default, Deserialize)]
pub struct PayrollQuery {
    /// Reference date; defaults to today.
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PayrollLine {
    pub employee_id: i64,
    pub name: String,
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
    pub total_hours: Decimal,
    pub open_entries: u32,
    pub hourly_rate: Option<Decimal>,
    /// Regular pay plus overtime at 1.5x; `None` without a rate.
    pub gross_pay: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PayrollSummaryResponse {
    pub period: PayPeriod,
    pub employees: Vec<PayrollLine>,
    pub total_hours: Decimal,
}

// ─── Banking ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub opening_balance: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: i64,
    pub name: String,
    pub account_type: Option<String>,
    pub currency: String,
    pub opening_balance: Decimal,
    pub plaid_linked: bool,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountDetailResponse {
    #[serde(flatten)]
    pub account: AccountResponse,
    pub payments_received: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListAccountsResponse {
    pub accounts: Vec<AccountResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaidExchangeRequest {
    pub public_token: String,
    /// Plaid account within the item to sync; all accounts when unset.
    #[serde(default)]
    pub plaid_account_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaidExchangeResponse {
    pub account_id: i64,
    pub item_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaidSyncResponse {
    pub added: u32,
    pub modified: u32,
    pub removed: u32,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub date: NaiveDate,
    pub name: String,
    /// Positive for money in.
    pub amount: Decimal,
    #[serde(default)]
    pub category_id: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateTransactionRequest {
    pub category_id: Option<i64>,
    pub reconciled: Option<bool>,
    pub payment_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: i64,
    pub account_id: i64,
    pub plaid_transaction_id: Option<String>,
    pub date: NaiveDate,
    pub name: String,
    pub amount: Decimal,
    pub category_id: Option<i64>,
    pub reconciled: bool,
    pub payment_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionListQuery {
    #[serde(default)]
    pub unreconciled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTransactionsResponse {
    pub transactions: Vec<TransactionResponse>,
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAssetRequest {
    pub name: String,
    pub asset_type: String,
    /// Generated when omitted.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateAssetRequest {
    pub name: Option<String>,
    pub client_id: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetResponse {
    pub id: i64,
    pub client_id: Option<i64>,
    pub tag: String,
    pub name: String,
    pub asset_type: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: String,
    pub archived_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetListQuery {
    pub client_id: Option<i64>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListAssetsResponse {
    pub assets: Vec<AssetResponse>,
}

// ─── Email queue ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueEmailRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailResponse {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub sent_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailListQuery {
    pub status: Option<EmailStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEmailsResponse {
    pub emails: Vec<EmailResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkFailedRequest {
    pub error: String,
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AgingQuery {
    pub client_id: Option<i64>,
    /// Reference date; defaults to today.
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgingResponse {
    pub as_of: NaiveDate,
    pub client_id: Option<i64>,
    #[serde(flatten)]
    pub report: AgingReport,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Each variant maps to an HTTP status code; the server converts it into a
/// response.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unprocessable(_) => 422,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Unprocessable(m)
            | Self::Internal(m) => m,
        }
    }

    /// Build a closure that wraps a DB/IO error as `Internal`.
    pub fn from_db<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| Self::Internal(format!("{context}: {e}"))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

impl From<ledgerdesk_core::CoreError> for ServiceError {
    fn from(e: ledgerdesk_core::CoreError) -> Self {
        use ledgerdesk_core::CoreError;
        match e {
            CoreError::AssetTagExhausted { .. } => Self::Conflict(e.to_string()),
            CoreError::InvalidPayPeriod => Self::Internal(e.to_string()),
            _ => Self::BadRequest(e.to_string()),
        }
    }
}

// ─── Error JSON shape ────────────────────────────────────────────────────────

/// JSON error shape `{ "error": "..." }` returned by all error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl From<&ServiceError> for ApiError {
    fn from(e: &ServiceError) -> Self {
        Self {
            error: e.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_column_text() {
        for status in TicketStatus::ALL {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(*status));
        }
        assert_eq!(TicketStatus::OnHold.to_string(), "on_hold");
        assert_eq!(CategoryType::parse("payment_method"), Some(CategoryType::PaymentMethod));
        assert_eq!(InvoiceStatus::parse("void"), None);
    }

    #[test]
    fn serde_names_match_column_text() {
        let json = serde_json::to_string(&TicketStatus::OnHold).unwrap();
        assert_eq!(json, "\"on_hold\"");
        let parsed: InvoiceStatus = serde_json::from_str("\"partial\"").unwrap();
        assert_eq!(parsed, InvoiceStatus::Partial);
    }

    #[test]
    fn receivable_statuses() {
        assert!(!InvoiceStatus::Draft.is_receivable());
        assert!(!InvoiceStatus::Cancelled.is_receivable());
        assert!(InvoiceStatus::Sent.is_receivable());
        assert!(InvoiceStatus::Partial.is_receivable());
    }

    #[test]
    fn service_error_status_codes() {
        assert_eq!(ServiceError::Unprocessable("x".into()).status_code(), 422);
        assert_eq!(ServiceError::Conflict("x".into()).status_code(), 409);
        let err: ServiceError = ledgerdesk_core::CoreError::InvalidAmount("abc".into()).into();
        assert_eq!(err.status_code(), 400);
        let api: ApiError = (&err).into();
        assert_eq!(api.error, err.message());
    }

    #[test]
    fn decimal_accepts_json_numbers_and_strings() {
        let req: RecordPaymentRequest =
            serde_json::from_str(r#"{"amount": 12.5, "method": "ach"}"#).unwrap();
        assert_eq!(req.amount, "12.5".parse::<Decimal>().unwrap());
        assert_eq!(req.method, Some(PaymentMethod::Ach));
        let req: RecordPaymentRequest = serde_json::from_str(r#"{"amount": "7.10"}"#).unwrap();
        assert_eq!(req.amount.to_string(), "7.10");
    }
}
