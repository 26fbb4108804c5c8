mod common;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use common::spawn_app;
use item_service::models::{Scope, permission::ITEMS_READ};

const REGISTER: &str = r#"{"name":"A","email":"a@x.io","password":"pw12345678"}"#;

#[tokio::test]
async fn register_activate_and_authenticate() {
    let app = spawn_app();

    let res = app
        .send(Method::POST, "/v1/users", None, Some(REGISTER))
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.body["user"]["email"], "a@x.io");
    assert_eq!(res.body["user"]["activated"], false);
    assert!(res.body["user"].get("password").is_none());
    assert!(res.body["user"].get("version").is_none());
    let user_id = res.body["user"]["id"].as_i64().unwrap();

    app.settle().await;
    let token = app
        .mailer
        .activation_token("a@x.io")
        .expect("welcome email with activation token");
    assert_eq!(token.len(), 26);

    let permissions = app.state.repositories.permissions.get_all_for_user(user_id).await.unwrap();
    assert!(permissions.includes(ITEMS_READ));

    let body = format!(r#"{{"token":"{token}"}}"#);
    let res = app
        .send(Method::PUT, "/v1/users/activated", None, Some(&body))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["activated"], true);
    assert_eq!(app.store.tokens_for(user_id, Scope::Activation), 0);

    // Activation tokens are single use.
    let res = app
        .send(Method::PUT, "/v1/users/activated", None, Some(&body))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["token"], "invalid or expired activation token");

    let res = app
        .send(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(r#"{"email":"a@x.io","password":"pw12345678"}"#),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let token = &res.body["authentication_token"];
    assert_eq!(token["token"].as_str().unwrap().len(), 26);

    let expiry: DateTime<Utc> = token["expiry"].as_str().unwrap().parse().unwrap();
    let ttl = expiry - Utc::now();
    assert!(ttl > chrono::Duration::hours(23) && ttl <= chrono::Duration::hours(24));
}

#[tokio::test]
async fn duplicate_email_is_a_validation_error() {
    let app = spawn_app();
    app.seed_user("a@x.io", true, &[]).await;

    let res = app
        .send(Method::POST, "/v1/users", None, Some(REGISTER))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["email"], "a user with this email already exists");
    assert_eq!(app.store.user_count(), 1);
}

#[tokio::test]
async fn registration_is_validated() {
    let app = spawn_app();

    let res = app
        .send(
            Method::POST,
            "/v1/users",
            None,
            Some(r#"{"name":"","email":"nope","password":"short"}"#),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["name"], "must be provided");
    assert_eq!(res.body["error"]["email"], "must be a valid email address");
    assert_eq!(res.body["error"]["password"], "must be at least 8 bytes long");
    assert_eq!(app.store.user_count(), 0);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn activation_token_must_be_well_formed() {
    let app = spawn_app();

    let res = app
        .send(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(r#"{"token":"short"}"#),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["token"], "must be 26 bytes long");
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let app = spawn_app();

    let res = app
        .send(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(r#"{"email":"nobody@x.io","password":"pw12345678"}"#),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "invalid authentication credentials");

    app.send(Method::POST, "/v1/users", None, Some(REGISTER))
        .await;
    let res = app
        .send(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(r#"{"email":"a@x.io","password":"wrong-password"}"#),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "invalid authentication credentials");
}

#[tokio::test]
async fn background_panics_are_contained() {
    let app = spawn_app();

    app.state.background(async {
        panic!("mail server exploded");
    });
    app.settle().await;

    let res = app
        .send(Method::GET, "/v1/healthcheck", None, None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(app.state.tracker.len(), 0);
}
