//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Name,
    Email,
    Role,
    ApiKeyHash,
    CreatedAt,
}

#[derive(Iden)]
pub enum Clients {
    Table,
    Id,
    Name,
    Email,
    Phone,
    Website,
    NetTerms,
    HourlyRate,
    Notes,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Contacts {
    Table,
    Id,
    ClientId,
    Name,
    Title,
    Email,
    Phone,
    IsPrimary,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Locations {
    Table,
    Id,
    ClientId,
    Name,
    Address,
    City,
    State,
    Zip,
    Phone,
    IsPrimary,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Documents {
    Table,
    Id,
    ClientId,
    Name,
    Content,
    CreatedAt,
    UpdatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Taxes {
    Table,
    Id,
    Name,
    Percent,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Categories {
    Table,
    Id,
    Name,
    CategoryType,
    Color,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Products {
    Table,
    Id,
    Name,
    Description,
    Price,
    TaxId,
    CategoryId,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Invoices {
    Table,
    Id,
    ClientId,
    Prefix,
    Number,
    Status,
    Date,
    DueDate,
    Discount,
    Note,
    CreatedAt,
    UpdatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Quotes {
    Table,
    Id,
    ClientId,
    Prefix,
    Number,
    Status,
    Date,
    ExpireDate,
    Discount,
    Note,
    InvoiceId,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum InvoiceItems {
    Table,
    Id,
    InvoiceId,
    QuoteId,
    ProductId,
    Name,
    Description,
    Quantity,
    Price,
    Discount,
    TaxId,
    CreatedAt,
}

#[derive(Iden)]
pub enum Payments {
    Table,
    Id,
    InvoiceId,
    AccountId,
    Date,
    Amount,
    Method,
    Reference,
    CreatedAt,
}

#[derive(Iden)]
pub enum RecurringPayments {
    Table,
    Id,
    ClientId,
    Amount,
    Frequency,
    StartDate,
    Occurrences,
    Completed,
    Method,
    Description,
    Status,
    LastProcessedAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum Subscriptions {
    Table,
    Id,
    ClientId,
    ProductId,
    Quantity,
    CreatedAt,
}

#[derive(Iden)]
pub enum Projects {
    Table,
    Id,
    ClientId,
    Name,
    Description,
    DueDate,
    CompletedAt,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum Tickets {
    Table,
    Id,
    Prefix,
    Number,
    ClientId,
    ContactId,
    ProjectId,
    Subject,
    Details,
    Priority,
    Status,
    AssignedTo,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
    ClosedAt,
}

#[derive(Iden)]
pub enum TicketReplies {
    Table,
    Id,
    TicketId,
    UserId,
    Body,
    Kind,
    TimeWorkedSecs,
    CreatedAt,
}

#[derive(Iden)]
pub enum Employees {
    Table,
    Id,
    ExternalId,
    FirstName,
    LastName,
    Email,
    Title,
    HourlyRate,
    CreatedAt,
    UpdatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum TimeEntries {
    Table,
    Id,
    EmployeeId,
    ClockIn,
    ClockOut,
    Note,
}

#[derive(Iden)]
pub enum TimeEntryBreaks {
    Table,
    Id,
    TimeEntryId,
    StartAt,
    EndAt,
}

#[derive(Iden)]
pub enum Accounts {
    Table,
    Id,
    Name,
    AccountType,
    Currency,
    OpeningBalance,
    PlaidItemId,
    PlaidAccessToken,
    PlaidAccountId,
    PlaidCursor,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum BankTransactions {
    Table,
    Id,
    AccountId,
    PlaidTransactionId,
    Date,
    Name,
    Amount,
    CategoryId,
    Reconciled,
    PaymentId,
    CreatedAt,
}

#[derive(Iden)]
pub enum Assets {
    Table,
    Id,
    ClientId,
    Tag,
    Name,
    AssetType,
    Make,
    Model,
    Serial,
    PurchaseDate,
    Notes,
    CreatedAt,
    ArchivedAt,
}

#[derive(Iden)]
pub enum EmailQueue {
    Table,
    Id,
    Sender,
    Recipient,
    Subject,
    Body,
    Status,
    Attempts,
    LastError,
    CreatedAt,
    SentAt,
}
