//! Check-in, ticket validation and redemption integration tests.

mod common;

use common::TestApp;
use serde_json::{json, Value};

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn check_in_is_idempotent() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "30.00").await;
    let booking = app.book_ok(tour_id, 2).await;
    let booking_id = booking["id"].as_str().unwrap();
    app.pay_cash(booking_id).await;

    let path = format!("/api/bookings/{}/check-in", booking_id);
    let first: Value = app
        .post(&path, Some(&app.admin_token), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["alreadyCheckedIn"], false);
    assert!(first["checkedInAt"].is_string());

    let second: Value = app
        .post(&path, Some(&app.admin_token), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["alreadyCheckedIn"], true);
    assert_eq!(second["checkedInAt"], first["checkedInAt"]);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn unpaid_booking_cannot_check_in() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "30.00").await;
    let booking = app.book_ok(tour_id, 2).await;
    let booking_id = booking["id"].as_str().unwrap();
    assert_eq!(booking["status"], "pending");

    let path = format!("/api/bookings/{}/check-in", booking_id);
    let rejected = app.post(&path, Some(&app.admin_token), json!({})).await;
    assert_eq!(rejected.status(), 400);

    let current: Value = app
        .get(&format!("/api/bookings/{}", booking_id), None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(current["status"], "pending");
    assert_eq!(current["checkedIn"], false);

    // Once paid, the same booking checks in and completes
    app.pay_cash(booking_id).await;
    let checked_in: Value = app
        .post(&path, Some(&app.admin_token), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(checked_in["success"], true);
    assert_eq!(checked_in["booking"]["status"], "completed");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn validation_reports_unpaid_and_unknown_tickets() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "30.00").await;
    let booking = app.book_ok(tour_id, 1).await;

    let unpaid: Value = app
        .post(
            "/api/validate-ticket",
            Some(&app.admin_token),
            json!({ "qrCode": booking["qrCode"] }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(unpaid["valid"], false);
    assert_eq!(unpaid["reason"], "Booking is not paid");

    app.pay_cash(booking["id"].as_str().unwrap()).await;

    let paid: Value = app
        .post(
            "/api/validate-ticket-code",
            Some(&app.admin_token),
            json!({ "code": booking["alphanumericCode"] }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(paid["valid"], true);
    assert_eq!(paid["booking"]["id"], booking["id"]);

    let unknown = app
        .post(
            "/api/validate-ticket",
            Some(&app.admin_token),
            json!({ "qrCode": "no-such-ticket" }),
        )
        .await;
    assert_eq!(unknown.status(), 200);
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(unknown["valid"], false);
    assert!(unknown["booking"].is_null());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn ticket_redeems_only_once() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "30.00").await;
    let booking = app.book_ok(tour_id, 1).await;
    app.pay_cash(booking["id"].as_str().unwrap()).await;

    let redeem = app
        .post(
            "/api/redeem-ticket",
            Some(&app.admin_token),
            json!({ "code": booking["alphanumericCode"] }),
        )
        .await;
    assert_eq!(redeem.status(), 200);
    let redeemed: Value = redeem.json().await.unwrap();
    assert_eq!(redeemed["booking"]["status"], "completed");
    assert_eq!(redeemed["booking"]["checkedIn"], true);
    assert!(redeemed["booking"]["redeemedAt"].is_string());

    let again = app
        .post(
            "/api/redeem-ticket",
            Some(&app.admin_token),
            json!({ "code": booking["qrCode"] }),
        )
        .await;
    assert_eq!(again.status(), 409);

    let public: Value = app
        .get(
            &format!("/api/bookings/qr/{}", booking["qrCode"].as_str().unwrap()),
            None,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(public["valid"], false);
    assert_eq!(public["reason"], "Ticket already redeemed");
    assert_eq!(public["tourName"], "Old town walk");
}
