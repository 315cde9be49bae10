//! Checkout, settlement and refund integration tests.

mod common;

use common::{decimal, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};

async fn start_checkout(app: &TestApp, booking_id: &str) -> String {
    let response = app
        .post(&format!("/api/bookings/{}/checkout", booking_id), None, json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["url"].as_str().unwrap().starts_with("https://checkout.mock/"));
    body["sessionId"].as_str().unwrap().to_string()
}

async fn verify(app: &TestApp, booking_id: &str, session_id: &str) -> reqwest::Response {
    app.post(
        &format!("/api/bookings/{}/verify-payment", booking_id),
        None,
        json!({ "sessionId": session_id }),
    )
    .await
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn card_payment_confirms_booking_once() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "50.00").await;
    let booking = app.book_ok(tour_id, 2).await;
    let booking_id = booking["id"].as_str().unwrap();

    let session_id = start_checkout(&app, booking_id).await;

    // Not paid yet
    let unpaid = verify(&app, booking_id, &session_id).await;
    assert_eq!(unpaid.status(), 400);
    let current: Value = app
        .get(&format!("/api/bookings/{}", booking_id), None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(current["status"], "pending_payment");

    app.gateway.mark_paid(&session_id).expect("session exists");

    let first = verify(&app, booking_id, &session_id).await;
    assert_eq!(first.status(), 200);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["alreadyRecorded"], false);
    assert_eq!(first["booking"]["status"], "confirmed");
    assert_eq!(first["payment"]["paymentMethod"], "card");
    assert_eq!(decimal(&first["payment"]["amount"]), Decimal::from(100));
    assert!(first["transaction"].is_object());

    // A repeated verification records nothing new
    let second: Value = verify(&app, booking_id, &session_id)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["alreadyRecorded"], true);
    assert!(second["transaction"].is_null());
    assert_eq!(second["payment"]["id"], first["payment"]["id"]);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn verify_rejects_foreign_session() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "50.00").await;
    let one = app.book_ok(tour_id, 1).await;
    let other = app.book_ok(tour_id, 1).await;

    let session_id = start_checkout(&app, one["id"].as_str().unwrap()).await;
    app.gateway.mark_paid(&session_id).unwrap();

    let response = verify(&app, other["id"].as_str().unwrap(), &session_id).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn cash_payment_settles_without_gateway() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "30.00").await;
    let booking = app.book_ok(tour_id, 1).await;

    let result = app.pay_cash(booking["id"].as_str().unwrap()).await;
    assert_eq!(result["booking"]["status"], "confirmed");
    assert_eq!(result["payment"]["paymentMethod"], "cash");
    assert!(result["payment"]["paymentIntentId"]
        .as_str()
        .unwrap()
        .starts_with("cash_"));
    assert_eq!(decimal(&result["transaction"]["bankCommission"]), Decimal::ZERO);

    // Cash is settled at the counter, never through the gateway
    let refund = app
        .post(
            &format!("/api/admin/payments/{}/refund", result["payment"]["id"].as_str().unwrap()),
            Some(&app.admin_token),
            json!({}),
        )
        .await;
    assert_eq!(refund.status(), 400);
    assert!(app.gateway.refunded_intents().is_empty());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn card_refund_cancels_booking() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "45.00").await;
    let booking = app.book_ok(tour_id, 2).await;
    let booking_id = booking["id"].as_str().unwrap();

    let session_id = start_checkout(&app, booking_id).await;
    let intent = app.gateway.mark_paid(&session_id).unwrap();
    let paid: Value = verify(&app, booking_id, &session_id)
        .await
        .json()
        .await
        .unwrap();
    let payment_id = paid["payment"]["id"].as_str().unwrap();

    let refund = app
        .post(
            &format!("/api/admin/payments/{}/refund", payment_id),
            Some(&app.admin_token),
            json!({}),
        )
        .await;
    assert_eq!(refund.status(), 200);
    let refund: Value = refund.json().await.unwrap();
    assert_eq!(refund["payment"]["status"], "refunded");
    assert_eq!(refund["booking"]["status"], "cancelled");
    assert_eq!(app.gateway.refunded_intents(), vec![intent]);

    // Refunding twice is refused
    let again = app
        .post(
            &format!("/api/admin/payments/{}/refund", payment_id),
            Some(&app.admin_token),
            json!({}),
        )
        .await;
    assert_eq!(again.status(), 400);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn rejected_refund_leaves_payment_untouched() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "45.00").await;
    let booking = app.book_ok(tour_id, 1).await;
    let booking_id = booking["id"].as_str().unwrap();

    let session_id = start_checkout(&app, booking_id).await;
    app.gateway.mark_paid(&session_id).unwrap();
    let paid: Value = verify(&app, booking_id, &session_id)
        .await
        .json()
        .await
        .unwrap();

    app.gateway.set_refund_status("failed");
    let refund = app
        .post(
            &format!(
                "/api/admin/payments/{}/refund",
                paid["payment"]["id"].as_str().unwrap()
            ),
            Some(&app.admin_token),
            json!({}),
        )
        .await;
    assert_eq!(refund.status(), 502);

    let current: Value = app
        .get(&format!("/api/bookings/{}", booking_id), None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(current["status"], "confirmed");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn financial_summary_totals_settlements() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "20.00").await;
    let booking = app.book_ok(tour_id, 1).await;
    app.pay_cash(booking["id"].as_str().unwrap()).await;

    let response = app
        .get("/api/financial-summary", Some(&app.admin_token))
        .await;
    assert_eq!(response.status(), 200);
    let summary: Value = response.json().await.unwrap();
    assert!(summary["transactionCount"].as_i64().unwrap() >= 1);
    assert!(decimal(&summary["grossTotal"]) >= Decimal::from(20));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn card_payment_after_cash_is_rejected() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "40.00").await;
    let booking = app.book_ok(tour_id, 1).await;
    let booking_id = booking["id"].as_str().unwrap();

    let session_id = start_checkout(&app, booking_id).await;
    let cash = app.pay_cash(booking_id).await;
    assert_eq!(cash["booking"]["status"], "confirmed");

    // The customer completes the card checkout anyway
    app.gateway.mark_paid(&session_id).expect("session exists");
    let card = verify(&app, booking_id, &session_id).await;
    assert_eq!(card.status(), 409);

    let payments: Value = app
        .get(
            &format!("/api/admin/payments?bookingId={}", booking_id),
            Some(&app.admin_token),
        )
        .await
        .json()
        .await
        .unwrap();
    let payments = payments.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["paymentMethod"], "cash");

    let ledger_entries: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE booking_id = $1")
            .bind(booking_id.parse::<uuid::Uuid>().unwrap())
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(ledger_entries, 1);
}
