//! Coupon and referral integration tests.

mod common;

use common::{decimal, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

fn unique_code(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..8])
}

async fn create_coupon(app: &TestApp, body: Value) -> reqwest::Response {
    app.post("/api/coupons", Some(&app.admin_token), body).await
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn coupon_discounts_booking_and_counts_use() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "40.00").await;
    let code = unique_code("spring");

    let coupon = create_coupon(
        &app,
        json!({
            "code": code,
            "discountType": "percent",
            "discountValue": "20",
            "usageLimit": 1,
        }),
    )
    .await;
    assert_eq!(coupon.status(), 201);
    let coupon: Value = coupon.json().await.unwrap();
    // Codes are stored upper-cased
    assert_eq!(coupon["code"], code.to_ascii_uppercase());

    let preview: Value = app
        .post(
            "/api/coupons/validate",
            None,
            json!({ "code": code, "tourId": tour_id, "amount": "80" }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(preview["valid"], true);
    assert_eq!(decimal(&preview["finalAmount"]), Decimal::from(64));

    let booking = app
        .book(tour_id, 2, json!({ "couponCode": code }))
        .await;
    assert_eq!(booking.status(), 201);
    let booking: Value = booking.json().await.unwrap();
    assert_eq!(booking["discountSource"], "coupon");
    assert_eq!(decimal(&booking["grossAmount"]), Decimal::from(80));
    assert_eq!(decimal(&booking["totalAmount"]), Decimal::from(64));

    // The single use is spent; the next booking pays full price
    let full_price: Value = app
        .book(tour_id, 2, json!({ "couponCode": code }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(full_price["discountSource"], "none");
    assert_eq!(decimal(&full_price["totalAmount"]), Decimal::from(80));

    let exhausted = app
        .post("/api/coupons/validate", None, json!({ "code": code }))
        .await;
    assert_eq!(exhausted.status(), 404);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn coupon_validation_rules() {
    let app = TestApp::spawn().await;

    let over_hundred = create_coupon(
        &app,
        json!({
            "code": unique_code("big"),
            "discountType": "percent",
            "discountValue": "150",
        }),
    )
    .await;
    assert_eq!(over_hundred.status(), 400);

    let negative = create_coupon(
        &app,
        json!({
            "code": unique_code("neg"),
            "discountType": "fixed",
            "discountValue": "-5",
        }),
    )
    .await;
    assert_eq!(negative.status(), 400);

    let code = unique_code("dup");
    let body = json!({ "code": code, "discountType": "fixed", "discountValue": "5" });
    assert_eq!(create_coupon(&app, body.clone()).await.status(), 201);
    assert_eq!(create_coupon(&app, body).await.status(), 409);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn referral_code_discounts_and_rewards_referrer() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "50.00").await;
    let referrer = app.customer_token().await;

    let none: Value = app
        .get("/api/referrals/my-code", Some(&referrer))
        .await
        .json()
        .await
        .unwrap();
    assert!(none["referralCode"].is_null());

    let generated: Value = app
        .post("/api/referrals/generate", Some(&referrer), json!({}))
        .await
        .json()
        .await
        .unwrap();
    let code = generated["referralCode"].as_str().unwrap().to_string();
    assert!(code.starts_with("REF"));

    // Generating again returns the same code
    let again: Value = app
        .post("/api/referrals/generate", Some(&referrer), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["referralCode"], code.as_str());

    let booking: Value = app
        .book(tour_id, 2, json!({ "referralCode": code.to_lowercase() }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(booking["discountSource"], "referral");
    assert_eq!(decimal(&booking["totalAmount"]), Decimal::from(90));

    let stats: Value = app
        .get("/api/referrals/stats", Some(&referrer))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["referralCount"], 1);
    assert_eq!(decimal(&stats["pendingRewards"]), Decimal::from(5));
}
