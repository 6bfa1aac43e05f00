use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use construcbill_api::app::{router, services};
use construcbill_auth::{JwtClaims, Role};
use construcbill_core::UserId;
use construcbill_infra::AppConfig;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory stores, bound to an ephemeral port.
        let services = Arc::new(services::in_memory(&AppConfig::default()));
        let app = router(services, SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        roles,
        issued_at: now - ChronoDuration::seconds(1),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

async fn post(client: &reqwest::Client, url: String, token: &str, body: Value) -> reqwest::Response {
    client.post(url).bearer_auth(token).json(&body).send().await.unwrap()
}

/// Company (prefix AQ/, counter 101), client and project; returns the project id.
async fn seed(srv: &TestServer, client: &reqwest::Client, admin: &str) -> String {
    let res = post(
        client,
        srv.url("/companies"),
        admin,
        json!({
            "name": "Aquarius Infra",
            "displayName": "Aquarius Infra Pvt Ltd",
            "address": {
                "line1": "4th Floor, Nariman Bhavan",
                "city": "Mumbai",
                "state": "Maharashtra",
                "pinCode": "400021"
            },
            "legal": { "gstNumber": "27AAACA1234A1Z5", "panNumber": "AAACA1234A" },
            "retentionPercent": "5",
            "invoicePrefix": "AQ/",
            "startingCounter": 101
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let company: Value = res.json().await.unwrap();
    assert_eq!(company["isDefault"], json!(true));

    let res = post(
        client,
        srv.url("/clients"),
        admin,
        json!({ "name": "Metro Rail Corp", "email": "accounts@metrorail.example" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let client_rec: Value = res.json().await.unwrap();

    let res = post(
        client,
        srv.url("/projects"),
        admin,
        json!({
            "companyId": company["id"],
            "clientId": client_rec["id"],
            "name": "Line 3 Depot",
            "code": "L3-DEP",
            "contractValue": "25000000",
            "startDate": "2024-01-01",
            "endDate": "2026-03-31",
            "billingCycle": "Monthly",
            "defaultRetainagePercent": "10"
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let project: Value = res.json().await.unwrap();
    project["id"].as_str().unwrap().to_string()
}

fn new_package(project_id: &str) -> Value {
    json!({
        "projectId": project_id,
        "billingPeriodStart": "2024-10-01",
        "billingPeriodEnd": "2024-10-31",
        "retainagePercent": "10",
        "items": [
            { "kind": "simple", "particulars": "Mobilisation", "unit": "LS", "quantity": "1", "rate": "1000" },
            { "kind": "simple", "particulars": "Survey", "unit": "LS", "quantity": "1", "rate": "2000" }
        ]
    })
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = mint_jwt("some-other-secret", vec![Role::ADMIN]);
    let res = client
        .get(srv.url("/packages"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, vec![Role::PROJECT_MANAGER, Role::FINANCE]);

    let client = reqwest::Client::new();
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["effectiveRole"], json!("finance"));
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "project_manager"));
}

#[tokio::test]
async fn package_lifecycle_create_send_lock_and_pay() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, vec![Role::ADMIN]);
    let pm = mint_jwt(SECRET, vec![Role::PROJECT_MANAGER]);
    let finance = mint_jwt(SECRET, vec![Role::FINANCE]);

    let project_id = seed(&srv, &client, &admin).await;

    let res = post(&client, srv.url("/packages"), &pm, new_package(&project_id)).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let pkg: Value = res.json().await.unwrap();
    let id = pkg["id"].as_str().unwrap().to_string();
    assert_eq!(pkg["status"], json!("DRAFT"));
    assert_eq!(pkg["invoice"]["invoiceNumber"], json!("AQ/101"));
    assert_eq!(pkg["invoice"]["placeOfSupply"], json!("Maharashtra"));
    assert_eq!(decimal(&pkg["invoice"]["totals"]["grandTotal"]), dec!(2922.75));
    assert!(!pkg["invoice"]["totals"]["amountInWords"].as_str().unwrap().is_empty());

    // Project managers may not skip the send flow.
    let res = post(&client, srv.url(&format!("/packages/{id}/mark-paid")), &pm, json!({})).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("forbidden"));

    let res = post(
        &client,
        srv.url(&format!("/packages/{id}/send")),
        &pm,
        json!({ "recipient": "accounts@metrorail.example" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let sent: Value = res.json().await.unwrap();
    assert_eq!(sent["status"], json!("SENT"));
    assert_eq!(sent["sentTo"], json!("accounts@metrorail.example"));

    // SENT locks content for project managers, not for finance.
    let terms = json!({ "invoiceDate": "2024-11-02", "retainagePercent": "10" });
    let res = client
        .put(srv.url(&format!("/packages/{id}/terms")))
        .bearer_auth(&pm)
        .json(&terms)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("edit_denied"));

    let res = client
        .put(srv.url(&format!("/packages/{id}/terms")))
        .bearer_auth(&finance)
        .json(&terms)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = post(&client, srv.url(&format!("/packages/{id}/mark-paid")), &finance, json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let paid: Value = res.json().await.unwrap();
    assert_eq!(paid["status"], json!("PAID"));
    assert!(paid["paidDate"].is_string());

    let res = client
        .get(srv.url("/dashboard"))
        .bearer_auth(&pm)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: Value = res.json().await.unwrap();
    assert_eq!(summary["paid"], json!(1));
    assert_eq!(summary["pending"], json!(0));
    assert_eq!(summary["projects"], json!(1));
    assert_eq!(decimal(&summary["paidRevenue"]), dec!(2922.75));
}

#[tokio::test]
async fn numbering_is_sequential_and_listing_filters_by_status() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, vec![Role::ADMIN]);
    let project_id = seed(&srv, &client, &admin).await;

    let first: Value = post(&client, srv.url("/packages"), &admin, new_package(&project_id))
        .await
        .json()
        .await
        .unwrap();
    let second: Value = post(&client, srv.url("/packages"), &admin, new_package(&project_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["invoice"]["invoiceNumber"], json!("AQ/101"));
    assert_eq!(second["invoice"]["invoiceNumber"], json!("AQ/102"));

    let second_id = second["id"].as_str().unwrap();
    let res = client
        .put(srv.url(&format!("/packages/{second_id}/status")))
        .bearer_auth(&admin)
        .json(&json!({ "status": "SENT" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let drafts: Value = client
        .get(srv.url(&format!("/packages?projectId={project_id}&status=DRAFT")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let drafts = drafts.as_array().unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0]["id"], first["id"]);

    let all: Value = client
        .get(srv.url("/packages"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // Newest first.
    assert_eq!(all[0]["id"], second["id"]);
}

#[tokio::test]
async fn stale_if_match_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, vec![Role::ADMIN]);
    let project_id = seed(&srv, &client, &admin).await;

    let pkg: Value = post(&client, srv.url("/packages"), &admin, new_package(&project_id))
        .await
        .json()
        .await
        .unwrap();
    let id = pkg["id"].as_str().unwrap();
    let version = pkg["version"].as_u64().unwrap();
    let period = json!({ "start": "2024-10-01", "end": "2024-10-30" });

    let res = client
        .put(srv.url(&format!("/packages/{id}/period")))
        .bearer_auth(&admin)
        .header("If-Match", (version + 5).to_string())
        .json(&period)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .put(srv.url(&format!("/packages/{id}/period")))
        .bearer_auth(&admin)
        .header("If-Match", version.to_string())
        .json(&period)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["billingPeriodEnd"], json!("2024-10-30"));
}

#[tokio::test]
async fn missing_references_and_bad_ids_are_reported() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, vec![Role::ADMIN]);

    let res = post(
        &client,
        srv.url("/packages"),
        &admin,
        new_package(&uuid::Uuid::now_v7().to_string()),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("not_found"));

    let res = client
        .get(srv.url("/packages/not-a-uuid"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("invalid_id"));
}

#[tokio::test]
async fn draft_packages_can_be_deleted() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, vec![Role::ADMIN]);
    let pm = mint_jwt(SECRET, vec![Role::PROJECT_MANAGER]);
    let project_id = seed(&srv, &client, &admin).await;

    let pkg: Value = post(&client, srv.url("/packages"), &pm, new_package(&project_id))
        .await
        .json()
        .await
        .unwrap();
    let id = pkg["id"].as_str().unwrap();

    let res = client
        .delete(srv.url(&format!("/packages/{id}")))
        .bearer_auth(&pm)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.url(&format!("/packages/{id}")))
        .bearer_auth(&pm)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replaced_progress_lines_take_project_retainage() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, vec![Role::ADMIN]);
    let pm = mint_jwt(SECRET, vec![Role::PROJECT_MANAGER]);
    let project_id = seed(&srv, &client, &admin).await;

    let mut input = new_package(&project_id);
    input["retainagePercent"] = json!("5");
    let pkg: Value = post(&client, srv.url("/packages"), &pm, input)
        .await
        .json()
        .await
        .unwrap();
    let id = pkg["id"].as_str().unwrap();

    let res = client
        .put(srv.url(&format!("/packages/{id}/items")))
        .bearer_auth(&pm)
        .json(&json!({
            "items": [{
                "kind": "progress",
                "description": "Earthwork",
                "originalValue": "100000",
                "thisPeriodPercent": "25"
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        decimal(&body["invoice"]["items"][0]["retainagePercent"]),
        dec!(10)
    );
    assert_eq!(decimal(&body["invoice"]["totals"]["retainageAmount"]), dec!(2500));
}

#[tokio::test]
async fn server_side_image_paths_need_an_upload_directory() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, vec![Role::ADMIN]);
    let pm = mint_jwt(SECRET, vec![Role::PROJECT_MANAGER]);
    let project_id = seed(&srv, &client, &admin).await;

    let pkg: Value = post(&client, srv.url("/packages"), &pm, new_package(&project_id))
        .await
        .json()
        .await
        .unwrap();
    let id = pkg["id"].as_str().unwrap();

    let res = post(
        &client,
        srv.url(&format!("/packages/{id}/report/images")),
        &pm,
        json!({ "path": "/etc/ssl/private/server.png", "caption": "site" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("validation_error"));

    let stored: Value = client
        .get(srv.url(&format!("/packages/{id}")))
        .bearer_auth(&pm)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["statusReport"]["images"], json!([]));
}
