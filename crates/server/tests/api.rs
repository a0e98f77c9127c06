use std::str::FromStr;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use ledgerdesk_runtime_config::LedgerConfig;
use ledgerdesk_server::cache::TotalsCache;
use ledgerdesk_server::routes::auth::bootstrap_admin;
use ledgerdesk_server::{AppState, build_router, storage};

const ADMIN_KEY: &str = "test-admin-key";

struct TestContext {
    _dir: TempDir,
    app: Router,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = storage::init_db(dir.path()).unwrap();
        assert!(bootstrap_admin(&db, ADMIN_KEY).unwrap());
        let state = AppState::new(db, LedgerConfig::default(), TotalsCache::memory()).unwrap();
        Self {
            _dir: dir,
            app: build_router(state),
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(format!("/api{path}"))
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}"));
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        self.send(req).await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.call(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, path, Some(body)).await
    }

    async fn post_csv(&self, path: &str, csv: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("/api{path}"))
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}"))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv.to_string()))
            .unwrap();
        self.send(req).await
    }

    async fn create_client(&self, name: &str) -> i64 {
        let (status, body) = self
            .post(
                "/clients",
                json!({ "name": name, "email": "billing@example.com", "net_terms": 30 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }
}

fn money(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn requests_without_a_key_are_rejected() {
    let ctx = TestContext::new();
    let req = Request::builder()
        .uri("/api/clients")
        .body(Body::empty())
        .unwrap();
    let (status, body) = ctx.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let req = Request::builder()
        .uri("/api/clients")
        .header(header::AUTHORIZATION, "Bearer wrong-key")
        .body(Body::empty())
        .unwrap();
    let (status, _) = ctx.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_cache_backend() {
    let ctx = TestContext::new();
    let req = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = ctx.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"], "memory");
}

#[tokio::test]
async fn payments_drive_invoice_status() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Acme Dental").await;

    let (status, invoice) = ctx
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "items": [
                    { "name": "Managed services", "quantity": "1", "price": "100.00" },
                    { "name": "Backup storage", "quantity": "2", "price": "25.00" }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(invoice["status"], "draft");
    assert_eq!(money(&invoice["totals"]["total"]), dec("150"));
    let id = invoice["id"].as_i64().unwrap();

    let (status, _) = ctx
        .put(&format!("/invoices/{id}/status"), json!({ "status": "sent" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, paid) = ctx
        .post(&format!("/invoices/{id}/payments"), json!({ "amount": "50" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{paid}");
    assert_eq!(paid["invoice_status"], "partial");
    assert_eq!(money(&paid["totals"]["balance"]), dec("100"));

    let (status, err) = ctx
        .post(&format!("/invoices/{id}/payments"), json!({ "amount": "100.01" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("exceeds"));

    let (status, paid) = ctx
        .post(&format!("/invoices/{id}/payments"), json!({ "amount": "100" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(paid["invoice_status"], "paid");
    assert_eq!(money(&paid["totals"]["balance"]), Decimal::ZERO);

    let payment_id = paid["payment"]["id"].as_i64().unwrap();
    let (status, _) = ctx
        .call(
            Method::DELETE,
            &format!("/invoices/{id}/payments/{payment_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = ctx.get(&format!("/invoices/{id}")).await;
    assert_eq!(detail["status"], "partial");
    assert_eq!(detail["payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cancelled_invoices_refuse_payments() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Northwind").await;
    let (_, invoice) = ctx
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "items": [{ "name": "Setup", "price": "80" }]
            }),
        )
        .await;
    let id = invoice["id"].as_i64().unwrap();
    ctx.put(&format!("/invoices/{id}/status"), json!({ "status": "cancelled" }))
        .await;

    let (status, _) = ctx
        .post(&format!("/invoices/{id}/payments"), json!({ "amount": "10" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_client_is_a_bad_request() {
    let ctx = TestContext::new();
    let (status, _) = ctx
        .post("/invoices", json!({ "client_id": 999, "items": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx.get("/invoices/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quote_converts_once() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Contoso").await;
    let (status, quote) = ctx
        .post(
            "/quotes",
            json!({
                "client_id": client_id,
                "items": [{ "name": "Firewall", "quantity": "1", "price": "640" }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{quote}");
    let id = quote["id"].as_i64().unwrap();

    let (status, converted) = ctx.post(&format!("/quotes/{id}/convert"), json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{converted}");
    assert_eq!(converted["quote"]["status"], "invoiced");
    let invoice_id = converted["invoice"]["id"].as_i64().unwrap();
    assert_eq!(converted["quote"]["invoice_id"], invoice_id);

    let (_, invoice) = ctx.get(&format!("/invoices/{invoice_id}")).await;
    assert_eq!(invoice["items"].as_array().unwrap().len(), 1);
    assert_eq!(money(&invoice["totals"]["total"]), dec("640"));

    let (status, _) = ctx.post(&format!("/quotes/{id}/convert"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn recurring_import_is_all_or_nothing() {
    let ctx = TestContext::new();
    ctx.create_client("Fabrikam").await;

    let bad = "Client,Amount,Frequency,Start Date\n\
               Fabrikam,$120.00,monthly,2026-01-01\n\
               Fabrikam,abc,monthly,2026-01-01\n\
               Nobody,10,weekly,2026-01-01\n";
    let (status, body) = ctx.post_csv("/recurring/import", bad).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    let rows = body["rows"].as_array().unwrap();
    assert!(rows.iter().any(|r| r["row"] == 3));

    let (_, listed) = ctx.get("/recurring").await;
    assert!(listed["recurring_payments"].as_array().unwrap().is_empty());

    let good = "Customer,Charge,Interval,Start,Occurrences\n\
                Fabrikam,\"1,200.00\",quarterly,2026-01-15,4\n\
                Fabrikam,45,Bi-Weekly,2026-02-01,\n";
    let (status, body) = ctx.post_csv("/recurring/import", good).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["imported"], 2);

    let id = body["ids"][0].as_i64().unwrap();
    let (status, upcoming) = ctx.get(&format!("/recurring/{id}/upcoming")).await;
    assert_eq!(status, StatusCode::OK);
    let dates = upcoming["dates"].as_array().unwrap();
    assert_eq!(dates.len(), 4);
    assert_eq!(dates[1], "2026-04-15");
}

#[tokio::test]
async fn closing_and_reopening_a_ticket() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Globex").await;
    let (status, ticket) = ctx
        .post(
            "/tickets",
            json!({ "client_id": client_id, "subject": "Printer offline" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{ticket}");
    assert_eq!(ticket["status"], "new");
    assert_eq!(ticket["priority"], "medium");
    let id = ticket["id"].as_i64().unwrap();

    let (status, detail) = ctx
        .post(
            &format!("/tickets/{id}/replies"),
            json!({ "body": "Replaced toner", "time_worked": "0:45", "status": "closed" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{detail}");
    assert_eq!(detail["status"], "closed");
    assert!(detail["closed_at"].is_string());
    assert_eq!(detail["total_time_worked"], "00:45:00");

    let (status, reopened) = ctx
        .put(&format!("/tickets/{id}/status"), json!({ "status": "open" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reopened["closed_at"].is_null());

    let (_, counts) = ctx.get("/tickets/counts").await;
    assert_eq!(counts["open_total"], 1);
}

#[tokio::test]
async fn clock_in_and_out_with_a_break() {
    let ctx = TestContext::new();
    let (status, employee) = ctx
        .post(
            "/employees",
            json!({ "first_name": "Dana", "last_name": "Reyes", "hourly_rate": "20" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{employee}");
    let id = employee["id"].as_i64().unwrap();

    let (status, entry) = ctx
        .post(
            &format!("/employees/{id}/clock-in"),
            json!({ "at": "2026-03-02T09:00:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert!(entry["worked_hours"].is_null());
    let entry_id = entry["id"].as_i64().unwrap();

    let (status, _) = ctx
        .post(
            &format!("/employees/{id}/clock-in"),
            json!({ "at": "2026-03-02T09:05:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .post(
            &format!("/employees/{id}/clock-out"),
            json!({ "at": "2026-03-02T08:00:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, entry) = ctx
        .post(
            &format!("/employees/{id}/clock-out"),
            json!({ "at": "2026-03-02T17:00:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{entry}");
    assert_eq!(money(&entry["worked_hours"]), dec("8"));

    let (status, entry) = ctx
        .post(
            &format!("/time-entries/{entry_id}/breaks"),
            json!({ "start": "2026-03-02T12:00:00", "end": "2026-03-02T12:30:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert_eq!(money(&entry["worked_hours"]), dec("7.5"));

    let (status, _) = ctx
        .post(
            &format!("/employees/{id}/clock-out"),
            json!({ "at": "2026-03-02T18:00:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn aging_buckets_open_invoices() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Initech").await;

    for (date, due, price) in [
        ("2026-01-01", "2026-01-31", "300"),
        ("2026-03-01", "2026-03-31", "200"),
    ] {
        let (status, invoice) = ctx
            .post(
                "/invoices",
                json!({
                    "client_id": client_id,
                    "date": date,
                    "due_date": due,
                    "items": [{ "name": "Support block", "price": price }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{invoice}");
        let id = invoice["id"].as_i64().unwrap();
        ctx.put(&format!("/invoices/{id}/status"), json!({ "status": "sent" }))
            .await;
    }
    // Drafts are not receivable.
    ctx.post(
        "/invoices",
        json!({ "client_id": client_id, "items": [{ "name": "Draft", "price": "999" }] }),
    )
    .await;

    let (status, report) = ctx
        .get(&format!("/reports/aging?client_id={client_id}&as_of=2026-04-15"))
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["invoice_count"], 2);
    assert_eq!(money(&report["days_1_30"]), dec("200"));
    assert_eq!(money(&report["days_61_90"]), dec("300"));
    assert_eq!(money(&report["total"]), dec("500"));
}

#[tokio::test]
async fn recurring_import_matches_non_ascii_client_names() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("ÉCOLE Ünited").await;

    let csv = "client,amount,frequency,start_date\n\
               ÉCOLE Ünited,10,monthly,2024-01-01\n\
               école ünited,20,weekly,2024-01-01\n";
    let (status, body) = ctx.post_csv("/recurring/import", csv).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["imported"], 2);

    let (_, listed) = ctx.get(&format!("/recurring?client_id={client_id}")).await;
    assert_eq!(listed["recurring_payments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn recurring_process_until_limit_then_conflict() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Woodgrove").await;
    let (status, rec) = ctx
        .post(
            "/recurring",
            json!({
                "client_id": client_id,
                "amount": "99.00",
                "frequency": "monthly",
                "start_date": "2026-01-31",
                "occurrences": 2
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{rec}");
    assert_eq!(rec["status"], "active");
    assert_eq!(rec["next_date"], "2026-01-31");
    let id = rec["id"].as_i64().unwrap();

    let (_, upcoming) = ctx.get(&format!("/recurring/{id}/upcoming")).await;
    assert_eq!(upcoming["dates"], json!(["2026-01-31", "2026-02-28"]));

    let (status, processed) = ctx.post(&format!("/recurring/{id}/process"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{processed}");
    assert_eq!(processed["processed_date"], "2026-01-31");
    assert_eq!(processed["recurring"]["remaining"], 1);
    assert_eq!(processed["recurring"]["status"], "active");

    let (_, processed) = ctx.post(&format!("/recurring/{id}/process"), json!({})).await;
    assert_eq!(processed["processed_date"], "2026-02-28");
    assert_eq!(processed["recurring"]["status"], "completed");
    assert!(processed["recurring"]["next_date"].is_null());

    let (status, _) = ctx.post(&format!("/recurring/{id}/process"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = ctx.post(&format!("/recurring/{id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, upcoming) = ctx.get(&format!("/recurring/{id}/upcoming")).await;
    assert!(upcoming["dates"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_recurring_stops_processing() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Litware").await;
    let (_, rec) = ctx
        .post(
            "/recurring",
            json!({
                "client_id": client_id,
                "amount": "15",
                "frequency": "weekly",
                "start_date": "2026-05-04"
            }),
        )
        .await;
    let id = rec["id"].as_i64().unwrap();
    assert!(rec["remaining"].is_null());

    let (status, cancelled) = ctx.post(&format!("/recurring/{id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = ctx.post(&format!("/recurring/{id}/process"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn subscriptions_sum_to_a_monthly_total() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Tailspin").await;
    let mut product_ids = Vec::new();
    for (name, price) in [("Endpoint protection", "49.99"), ("Email filtering", "10")] {
        let (status, product) = ctx
            .post("/products", json!({ "name": name, "price": price }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{product}");
        product_ids.push(product["id"].as_i64().unwrap());
    }

    let (status, sub) = ctx
        .post(
            &format!("/clients/{client_id}/subscriptions"),
            json!({ "product_id": product_ids[0], "quantity": "3" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{sub}");
    assert_eq!(sub["product_name"], "Endpoint protection");
    assert_eq!(money(&sub["monthly_amount"]), dec("149.97"));
    let first_id = sub["id"].as_i64().unwrap();

    ctx.post(
        &format!("/clients/{client_id}/subscriptions"),
        json!({ "product_id": product_ids[1] }),
    )
    .await;
    let (_, listed) = ctx.get(&format!("/clients/{client_id}/subscriptions")).await;
    assert_eq!(listed["subscriptions"].as_array().unwrap().len(), 2);
    assert_eq!(money(&listed["monthly_total"]), dec("159.97"));

    let (status, _) = ctx
        .call(
            Method::DELETE,
            &format!("/clients/{client_id}/subscriptions/{first_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, listed) = ctx.get(&format!("/clients/{client_id}/subscriptions")).await;
    assert_eq!(money(&listed["monthly_total"]), dec("10"));

    let (status, _) = ctx
        .post(
            &format!("/clients/{client_id}/subscriptions"),
            json!({ "product_id": 999 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sending_an_invoice_queues_mail_from_the_configured_sender() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Adventure Works").await;
    let (_, invoice) = ctx
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "items": [{ "name": "Onboarding", "price": "250" }]
            }),
        )
        .await;
    let id = invoice["id"].as_i64().unwrap();
    assert_eq!(invoice["status"], "draft");

    let (status, sent) = ctx.post(&format!("/invoices/{id}/send"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{sent}");
    assert_eq!(sent["invoice"]["status"], "sent");
    assert_eq!(sent["recipient"], "billing@example.com");
    let email_id = sent["email_id"].as_i64().unwrap();

    let (_, queued) = ctx.get("/emails?status=queued").await;
    let emails = queued["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    let email = &emails[0];
    assert_eq!(email["id"], email_id);
    assert_eq!(email["sender"], "Billing <billing@localhost>");
    assert!(email["subject"].as_str().unwrap().contains(invoice["number"].as_str().unwrap()));
    assert!(
        email["body"]
            .as_str()
            .unwrap()
            .contains(&format!("http://localhost:3000/invoices/{id}"))
    );

    let (status, failed) = ctx
        .post(
            &format!("/emails/{email_id}/failed"),
            json!({ "error": "mailbox full" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["attempts"], 1);
    assert_eq!(failed["last_error"], "mailbox full");

    let (status, delivered) = ctx.post(&format!("/emails/{email_id}/sent"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["status"], "sent");
    assert_eq!(delivered["attempts"], 2);
    assert!(delivered["last_error"].is_null());
    assert!(delivered["sent_at"].is_string());

    let (status, _) = ctx.post(&format!("/emails/{email_id}/sent"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = ctx
        .post(&format!("/emails/{email_id}/failed"), json!({ "error": "late bounce" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelled_invoices_are_not_sent() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Proseware").await;
    let (_, invoice) = ctx
        .post(
            "/invoices",
            json!({ "client_id": client_id, "items": [{ "name": "Audit", "price": "75" }] }),
        )
        .await;
    let id = invoice["id"].as_i64().unwrap();
    ctx.put(&format!("/invoices/{id}/status"), json!({ "status": "cancelled" }))
        .await;

    let (status, _) = ctx.post(&format!("/invoices/{id}/send"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, emails) = ctx.get("/emails").await;
    assert!(emails["emails"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn directory_sync_counts_inserts_updates_and_unchanged() {
    let ctx = TestContext::new();
    let (status, outcome) = ctx
        .post(
            "/employees/sync",
            json!({ "employees": [
                { "external_id": "E-1", "first_name": "Ana", "last_name": "Lima", "title": "Technician" },
                { "external_id": "E-2", "first_name": "Ben", "last_name": "Okafor" }
            ]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome, json!({ "inserted": 2, "updated": 0, "unchanged": 0 }));

    let (_, outcome) = ctx
        .post(
            "/employees/sync",
            json!({ "employees": [
                { "external_id": "E-1", "first_name": "Ana", "last_name": "Lima", "title": "Senior Technician" },
                { "external_id": "E-2", "first_name": "Ben", "last_name": "Okafor" },
                { "external_id": "E-3", "first_name": "Chen", "last_name": "Wu" }
            ]}),
        )
        .await;
    assert_eq!(outcome, json!({ "inserted": 1, "updated": 1, "unchanged": 1 }));

    let (_, listed) = ctx.get("/employees").await;
    let employees = listed["employees"].as_array().unwrap();
    assert_eq!(employees.len(), 3);
    assert!(
        employees
            .iter()
            .any(|e| e["first_name"] == "Ana" && e["title"] == "Senior Technician")
    );

    let (status, _) = ctx
        .post(
            "/employees/sync",
            json!({ "employees": [
                { "external_id": "E-4", "first_name": "Dee", "last_name": "Park" },
                { "external_id": "E-4", "first_name": "Dee", "last_name": "Park" }
            ]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, listed) = ctx.get("/employees").await;
    assert_eq!(listed["employees"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn payroll_summary_covers_the_last_completed_week() {
    let ctx = TestContext::new();
    let (_, employee) = ctx
        .post(
            "/employees",
            json!({ "first_name": "Sam", "last_name": "Ortiz", "hourly_rate": "20" }),
        )
        .await;
    let id = employee["id"].as_i64().unwrap();

    // Mon 2026-03-02 to Fri 2026-03-06, nine hours a day, plus Monday of the
    // following week which falls outside the period.
    for day in ["02", "03", "04", "05", "06", "09"] {
        let (status, _) = ctx
            .post(
                &format!("/employees/{id}/clock-in"),
                json!({ "at": format!("2026-03-{day}T09:00:00") }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = ctx
            .post(
                &format!("/employees/{id}/clock-out"),
                json!({ "at": format!("2026-03-{day}T18:00:00") }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, summary) = ctx.get("/payroll/summary?today=2026-03-10").await;
    assert_eq!(status, StatusCode::OK, "{summary}");
    assert_eq!(summary["period"], json!({ "start": "2026-02-28", "end": "2026-03-06" }));
    let line = summary["employees"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["employee_id"] == id)
        .unwrap()
        .clone();
    assert_eq!(line["name"], "Sam Ortiz");
    assert_eq!(money(&line["total_hours"]), dec("45"));
    assert_eq!(money(&line["regular_hours"]), dec("40"));
    assert_eq!(money(&line["overtime_hours"]), dec("5"));
    assert_eq!(money(&line["gross_pay"]), dec("950"));
    assert_eq!(money(&summary["total_hours"]), dec("45"));
}

#[tokio::test]
async fn asset_tags_are_generated_or_must_be_unique() {
    let ctx = TestContext::new();
    let (status, asset) = ctx
        .post("/assets", json!({ "name": "ThinkPad T14", "asset_type": "Laptop" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{asset}");
    let tag = asset["tag"].as_str().unwrap();
    assert!(tag.starts_with("AST-LAP-"), "{tag}");
    assert_eq!(tag.len(), "AST-LAP-000000".len());
    assert!(tag[8..].chars().all(|c| c.is_ascii_digit()));

    let (status, asset) = ctx
        .post(
            "/assets",
            json!({ "name": "Core switch", "asset_type": "Switch", "tag": "net-001" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{asset}");
    assert_eq!(asset["tag"], "NET-001");

    let (status, _) = ctx
        .post(
            "/assets",
            json!({ "name": "Spare switch", "asset_type": "Switch", "tag": "NET-001" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn project_progress_tracks_closed_tickets() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Lucerne").await;
    let (status, project) = ctx
        .post(
            "/projects",
            json!({ "name": "Office move", "client_id": client_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{project}");
    let project_id = project["id"].as_i64().unwrap();

    let mut ticket_ids = Vec::new();
    for subject in ["Pack servers", "Run cabling", "Test phones"] {
        let (_, ticket) = ctx
            .post(
                "/tickets",
                json!({ "client_id": client_id, "subject": subject }),
            )
            .await;
        let ticket_id = ticket["id"].as_i64().unwrap();
        let (status, _) = ctx
            .post(&format!("/projects/{project_id}/tickets/{ticket_id}"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        ticket_ids.push(ticket_id);
    }

    let (_, detail) = ctx.get(&format!("/projects/{project_id}")).await;
    assert_eq!(detail["tickets_total"], 3);
    assert_eq!(detail["progress"], 0);

    ctx.put(
        &format!("/tickets/{}/status", ticket_ids[0]),
        json!({ "status": "closed" }),
    )
    .await;
    let (_, detail) = ctx.get(&format!("/projects/{project_id}")).await;
    assert_eq!(detail["tickets_closed"], 1);
    assert_eq!(detail["progress"], 33);
    assert_eq!(detail["name"], "Office move");
}

#[tokio::test]
async fn archived_clients_move_between_listings() {
    let ctx = TestContext::new();
    let keep = ctx.create_client("Blue Yonder").await;
    let gone = ctx.create_client("50% Off Deals").await;

    let (status, archived) = ctx.post(&format!("/clients/{gone}/archive"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(archived["archived_at"].is_string());

    let (_, active) = ctx.get("/clients").await;
    assert_eq!(active["total"], 1);
    assert_eq!(active["clients"][0]["id"], keep);
    let (_, listed) = ctx.get("/clients?archived=true").await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["clients"][0]["id"], gone);

    let (status, restored) = ctx.post(&format!("/clients/{gone}/unarchive"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(restored["archived_at"].is_null());
    let (_, active) = ctx.get("/clients").await;
    assert_eq!(active["total"], 2);

    let (_, found) = ctx.get("/clients?search=50%25").await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["clients"][0]["id"], gone);
}

#[tokio::test]
async fn oversized_time_worked_is_rejected() {
    let ctx = TestContext::new();
    let client_id = ctx.create_client("Coho").await;
    let (_, ticket) = ctx
        .post("/tickets", json!({ "client_id": client_id, "subject": "VPN down" }))
        .await;
    let id = ticket["id"].as_i64().unwrap();

    let (status, _) = ctx
        .post(
            &format!("/tickets/{id}/replies"),
            json!({ "body": "Looking", "time_worked": "9999999999999999:00:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, detail) = ctx.get(&format!("/tickets/{id}")).await;
    assert!(detail["replies"].as_array().unwrap().is_empty());
}
