//! Role and capability enforcement integration tests.

mod common;

use common::{login, TestApp, ADMIN_PASSWORD, ADMIN_USERNAME};
use serde_json::{json, Value};

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn protected_routes_require_a_token() {
    let app = TestApp::spawn().await;

    assert_eq!(app.get("/api/bookings", None).await.status(), 401);
    assert_eq!(app.get("/api/auth/me", None).await.status(), 401);
    assert_eq!(
        app.get("/api/admin/payments", Some("not-a-jwt")).await.status(),
        401
    );
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn customers_cannot_use_staff_routes() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "30.00").await;
    let booking = app.book_ok(tour_id, 1).await;
    let token = app.customer_token().await;

    let create_tour = app
        .post(
            "/api/tours",
            Some(&token),
            json!({ "name": "Rogue tour", "location": "Nowhere", "price": "1", "capacity": 1 }),
        )
        .await;
    assert_eq!(create_tour.status(), 403);

    let cash = app
        .post(
            &format!(
                "/api/bookings/{}/confirm-cash-payment",
                booking["id"].as_str().unwrap()
            ),
            Some(&token),
            json!({}),
        )
        .await;
    assert_eq!(cash.status(), 403);

    let check_in = app
        .post(
            &format!("/api/bookings/{}/check-in", booking["id"].as_str().unwrap()),
            Some(&token),
            json!({}),
        )
        .await;
    assert_eq!(check_in.status(), 403);

    assert_eq!(
        app.get("/api/admin/payments", Some(&token)).await.status(),
        403
    );
    assert_eq!(
        app.get("/api/financial-summary", Some(&token)).await.status(),
        403
    );
    assert_eq!(
        app.put(
            "/api/admin/retention-config",
            Some(&token),
            json!({
                "platformFeeRate": "10",
                "sellerCommissionRate": "10",
                "taxRate": "21",
                "bankCommissionRate": "3",
                "otherRetentionsRate": "0"
            }),
        )
        .await
        .status(),
        403
    );
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn admin_manages_retention_rates() {
    let app = TestApp::spawn().await;

    let current = app
        .get("/api/admin/retention-config", Some(&app.admin_token))
        .await;
    assert_eq!(current.status(), 200);

    let invalid = app
        .put(
            "/api/admin/retention-config",
            Some(&app.admin_token),
            json!({
                "platformFeeRate": "120",
                "sellerCommissionRate": "10",
                "taxRate": "21",
                "bankCommissionRate": "3",
                "otherRetentionsRate": "0"
            }),
        )
        .await;
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn me_returns_sanitized_user() {
    let app = TestApp::spawn().await;

    let me: Value = app
        .get("/api/auth/me", Some(&app.admin_token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(me["username"], ADMIN_USERNAME);
    assert_eq!(me["role"], "master_admin");
    assert!(me.get("passwordHash").is_none());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn login_rejects_wrong_password() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/auth/login",
            None,
            json!({ "username": ADMIN_USERNAME, "password": "wrong-password" }),
        )
        .await;
    assert_eq!(response.status(), 401);

    // The right password still works afterwards
    let token = login(&app.client, &app.address, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    assert!(!token.is_empty());
}
