//! Users and sessions related API tests

use actix_web::{App, test};
use assert_json_diff::assert_json_include;
use serde_json::json;

use crate::model::Model;
use crate::service;
use crate::service::tests::{execute, expiring_model, sign_up, status};

const ME: &str = "query { users { me { id name email } } }";

#[actix_web::test]
async fn sign_up_and_sign_in() {
    let service_config = service::configure(false, Model::test().await.unwrap())
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    let resp = execute(
        &app,
        None,
        r#"mutation($user: NewUser!) {
            users {
                create(user: $user) { name email gender dateOfBirth }
            }
        }"#,
        json!({ "user": {
            "name": "santa",
            "email": "santa@example.com",
            "password": "ho-ho-ho",
            "dateOfBirth": "1990-12-24",
        }}),
    )
    .await;

    assert_json_include!(
        actual: resp.data,
        expected: json!({ "users": { "create": {
            "name": "santa",
            "email": "santa@example.com",
            "gender": null,
            "dateOfBirth": "1990-12-24",
        }}})
    );

    let resp = execute(
        &app,
        None,
        r#"mutation($email: String!, $password: String!) {
            users { signIn(email: $email, password: $password) { token expiresAt } }
        }"#,
        json!({ "email": "santa@example.com", "password": "ho-ho-ho" }),
    )
    .await;

    let token: String = resp.data("users.signIn.token").unwrap();
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    resp.data::<String>("users.signIn.expiresAt").unwrap();

    let resp = execute(&app, Some(&token), ME, json!({})).await;
    assert_json_include!(
        actual: resp.data,
        expected: json!({ "users": { "me": { "name": "santa", "email": "santa@example.com" } } })
    );
}

#[actix_web::test]
async fn invalid_sign_up() {
    let service_config = service::configure(false, Model::test().await.unwrap())
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;
    sign_up(&app, "user1").await;

    let create = r#"mutation($user: NewUser!) {
        users { create(user: $user) { id } }
    }"#;

    let resp = execute(
        &app,
        None,
        create,
        json!({ "user": { "name": "other", "email": "user1@example.com", "password": "secret" } }),
    )
    .await;
    assert_eq!(resp.error_code(), Some("BAD_USER_INPUT"));

    let resp = execute(
        &app,
        None,
        create,
        json!({ "user": { "name": "user2", "email": "user2@example.com", "password": "" } }),
    )
    .await;
    assert_eq!(resp.error_code(), Some("BAD_USER_INPUT"));
}

#[actix_web::test]
async fn invalid_credentials() {
    let service_config = service::configure(false, Model::test().await.unwrap())
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;
    sign_up(&app, "user1").await;

    let sign_in = r#"mutation($email: String!, $password: String!) {
        users { signIn(email: $email, password: $password) { token } }
    }"#;

    let resp = execute(
        &app,
        None,
        sign_in,
        json!({ "email": "user1@example.com", "password": "not-a-secret" }),
    )
    .await;
    assert_eq!(resp.error_code(), Some("UNAUTHENTICATED"));

    let resp = execute(
        &app,
        None,
        sign_in,
        json!({ "email": "nobody@example.com", "password": "secret" }),
    )
    .await;
    assert_eq!(resp.error_code(), Some("UNAUTHENTICATED"));
}

#[actix_web::test]
async fn missing_authorization() {
    let service_config = service::configure(false, Model::test().await.unwrap())
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    let resp = execute(&app, None, ME, json!({})).await;
    assert_eq!(resp.error_code(), Some("UNAUTHENTICATED"));
    assert_eq!(resp.data, json!({ "users": null }));

    let req = test::TestRequest::post()
        .uri("/api")
        .insert_header(("content-type", "application/json"))
        .set_payload(super::gql(ME, json!({})))
        .to_request();
    assert_eq!(status(&app, req).await, 401);
}

#[actix_web::test]
async fn invalid_authorization_is_rejected() {
    let service_config = service::configure(false, Model::test().await.unwrap())
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;
    let (_, token) = sign_up(&app, "user1").await;

    for header in [
        "Bearer not-a-real-token".to_owned(),
        "Bearer".to_owned(),
        "Bearer ".to_owned(),
        format!("Basic {token}"),
    ] {
        let req = test::TestRequest::post()
            .uri("/api")
            .insert_header(("content-type", "application/json"))
            .insert_header(("authorization", header.as_str()))
            .set_payload(super::gql(ME, json!({})))
            .to_request();
        assert_eq!(status(&app, req).await, 401, "{header}");
    }

    // Scheme is case insensitive
    let req = test::TestRequest::post()
        .uri("/api")
        .insert_header(("content-type", "application/json"))
        .insert_header(("authorization", format!("bearer {token}")))
        .set_payload(super::gql(ME, json!({})))
        .to_request();
    assert_eq!(status(&app, req).await, 200);
}

#[actix_web::test]
async fn signing_in_again_replaces_session() {
    let service_config = service::configure(false, Model::test().await.unwrap())
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;
    let (user_id, old_token) = sign_up(&app, "user1").await;

    let resp = execute(
        &app,
        None,
        r#"mutation($email: String!, $password: String!) {
            users { signIn(email: $email, password: $password) { token } }
        }"#,
        json!({ "email": "user1@example.com", "password": "secret" }),
    )
    .await;
    let token: String = resp.data("users.signIn.token").unwrap();
    assert_ne!(token, old_token);

    let resp = execute(&app, Some(&token), ME, json!({})).await;
    assert_eq!(resp.data::<i64>("users.me.id").unwrap(), user_id);

    let req = test::TestRequest::post()
        .uri("/api")
        .insert_header(("content-type", "application/json"))
        .insert_header(("authorization", format!("Bearer {old_token}")))
        .set_payload(super::gql(ME, json!({})))
        .to_request();
    assert_eq!(status(&app, req).await, 401);
}

#[actix_web::test]
async fn expired_session_is_rejected() {
    let service_config = service::configure(false, expiring_model().await)
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;
    let (_, token) = sign_up(&app, "user1").await;

    let req = test::TestRequest::post()
        .uri("/api")
        .insert_header(("content-type", "application/json"))
        .insert_header(("authorization", format!("Bearer {token}")))
        .set_payload(super::gql(ME, json!({})))
        .to_request();
    assert_eq!(status(&app, req).await, 401);
}

#[actix_web::test]
async fn sign_out() {
    let model = Model::test().await.unwrap();
    let service_config = service::configure(false, model.clone()).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;
    let (_, token) = sign_up(&app, "user1").await;
    assert_eq!(model.tokens().len(), 1);

    let req = test::TestRequest::delete().uri("/session").to_request();
    assert_eq!(status(&app, req).await, 401);

    let req = test::TestRequest::delete()
        .uri("/session")
        .insert_header(("authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(status(&app, req).await, 204);
    assert!(model.tokens().is_empty());

    let req = test::TestRequest::delete()
        .uri("/session")
        .insert_header(("authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(status(&app, req).await, 401);
}
