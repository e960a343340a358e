use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use canopy_api::app::{AppServices, build_app};
use canopy_auth::{RemoteJwks, StaticKeySet, TokenVerifier, VerificationKey};
use canopy_infra::InMemoryEntityStore;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const PRIVATE_PEM: &[u8] = include_bytes!("../../auth/testdata/rsa_private.pem");
const PUBLIC_PEM: &[u8] = include_bytes!("../../auth/testdata/rsa_public.pem");
const JWKS_JSON: &str = include_str!("../../auth/testdata/jwks.json");

const ISSUER: &str = "https://canopy.test/";
const AUDIENCE: &str = "canopy-api";
const KID: &str = "canopy-test-1";

const ALL_PERMISSIONS: &[&str] = &[
    "post:farmer",
    "patch:farmer",
    "delete:farmer",
    "post:forest",
    "patch:forest",
    "delete:forest",
    "post:tree",
    "delete:tree",
];

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let keys = StaticKeySet::single(VerificationKey::rsa_pem(KID, PUBLIC_PEM).unwrap());
        Self::spawn_with(TokenVerifier::new(ISSUER, AUDIENCE, Arc::new(keys))).await
    }

    async fn spawn_with(verifier: TokenVerifier) -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let services = AppServices::new(Arc::new(InMemoryEntityStore::new()), verifier);
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

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

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn sign(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap())
        .expect("failed to encode jwt")
}

fn mint_jwt(permissions: &[&str]) -> String {
    sign(&json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "auth0|grower",
        "iat": now(),
        "exp": now() + 600,
        "permissions": permissions,
    }))
}

fn admin() -> String {
    mint_jwt(ALL_PERMISSIONS)
}

async fn body(res: reqwest::Response) -> Value {
    res.json().await.unwrap()
}

async fn post_json(client: &reqwest::Client, url: String, token: &str, payload: Value) -> reqwest::Response {
    client.post(url).bearer_auth(token).json(&payload).send().await.unwrap()
}

/// Seed one farmer and one forest, returning their ids.
async fn seed(srv: &TestServer, client: &reqwest::Client, token: &str) -> (i64, i64) {
    let res = post_json(client, srv.url("/farmers"), token, json!({ "name": "Gino Gianni" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let farmer = body(res).await["created"]["id"].as_i64().unwrap();

    let res = post_json(
        client,
        srv.url("/forests"),
        token,
        json!({ "name": "Foresta", "location": "Angola" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let forest = body(res).await["created"]["id"].as_i64().unwrap();

    (farmer, forest)
}

async fn plant(
    srv: &TestServer,
    client: &reqwest::Client,
    token: &str,
    name: &str,
    farmer: i64,
    forest: i64,
    quantity: i64,
) -> reqwest::Response {
    post_json(
        client,
        srv.url("/trees"),
        token,
        json!({ "name": name, "farmer_id": farmer, "forest_id": forest, "quantity": quantity }),
    )
    .await
}

#[tokio::test]
async fn reads_are_public() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for (path, key) in [
        ("/farmers", "number_of_farmers"),
        ("/forests", "number_of_forests"),
        ("/trees", "number_of_trees"),
    ] {
        let res = client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{path}");
        let body = body(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body[key], 0);
    }
}

#[tokio::test]
async fn health_and_request_id() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn mutations_require_a_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/farmers"))
        .json(&json!({ "name": "Gino" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = body(res).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], 401);
    assert_eq!(body["code"], "authorization_header_missing");

    let res = client
        .delete(srv.url("/trees/1"))
        .header("Authorization", "Basic abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_code(res).await, "invalid_header");
}

async fn body_code(res: reqwest::Response) -> String {
    body(res).await["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn missing_permission_is_forbidden_without_side_effects() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(&["post:forest"]);

    let res = post_json(&client, srv.url("/farmers"), &token, json!({ "name": "Gino" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_code(res).await, "unauthorized");

    let listed = body(client.get(srv.url("/farmers")).send().await.unwrap()).await;
    assert_eq!(listed["number_of_farmers"], 0);
}

#[tokio::test]
async fn token_without_permissions_claim_is_invalid_claims() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = sign(&json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "auth0|grower",
        "exp": now() + 600,
    }));

    let res = post_json(&client, srv.url("/forests"), &token, json!({ "name": "Foresta" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_code(res).await, "invalid_claims");
}

#[tokio::test]
async fn expired_and_foreign_tokens_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let expired = sign(&json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now() - 600,
        "permissions": ALL_PERMISSIONS,
    }));
    let res = post_json(&client, srv.url("/farmers"), &expired, json!({ "name": "Gino" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_code(res).await, "token_expired");

    let other_audience = sign(&json!({
        "iss": ISSUER,
        "aud": "another-api",
        "exp": now() + 600,
        "permissions": ALL_PERMISSIONS,
    }));
    let res = post_json(&client, srv.url("/farmers"), &other_audience, json!({ "name": "Gino" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_code(res).await, "invalid_claims");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();

    for path in ["/farmers/999", "/forests/999", "/farmers/abc"] {
        let res = client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
        let body = body(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], 404);
        assert_eq!(body["message"], "resource not found");
    }

    let res = client
        .patch(srv.url("/farmers/999"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Nobody" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.delete(srv.url("/trees/999")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/no/such/route")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(res).await["success"], false);
}

#[tokio::test]
async fn malformed_bodies_are_unprocessable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();

    let res = post_json(&client, srv.url("/farmers"), &token, json!({ "nome": "Gino" })).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body(res).await;
    assert_eq!(body["error"], 422);
    assert_eq!(body["message"], "unprocessable");

    let res = client
        .post(srv.url("/forests"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let (farmer, forest) = seed(&srv, &client, &token).await;
    for quantity in [0, 1001] {
        let res = plant(&srv, &client, &token, "Platano", farmer, forest, quantity).await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY, "quantity {quantity}");
    }
}

#[tokio::test]
async fn farmer_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();

    let res = post_json(&client, srv.url("/farmers"), &token, json!({ "name": "Gino Gianni" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let created = body(res).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["total_farmers"], 1);
    let id = created["created"]["id"].as_i64().unwrap();

    let res = client
        .patch(srv.url(&format!("/farmers/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "Gino" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let modified = body(res).await;
    assert_eq!(modified["modified"]["id"], id);
    assert_eq!(modified["modified"]["name"], "Gino");

    let detail = body(client.get(srv.url(&format!("/farmers/{id}"))).send().await.unwrap()).await;
    assert_eq!(detail["farmer"]["name"], "Gino");
    assert_eq!(detail["number_of_trees"], 0);
}

#[tokio::test]
async fn planting_creates_quantity_distinct_trees() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();
    let (farmer, forest) = seed(&srv, &client, &token).await;

    let res = plant(&srv, &client, &token, "Platano", farmer, forest, 5).await;
    assert_eq!(res.status(), StatusCode::OK);
    let planted = body(res).await;
    let created = planted["created"].as_array().unwrap();
    assert_eq!(created.len(), 5);
    assert_eq!(planted["total_trees"], 5);

    let mut ids: Vec<i64> = created.iter().map(|t| t["id"].as_i64().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);
    assert!(created.iter().all(|t| t["name"] == "Platano"
        && t["farmer_id"] == farmer
        && t["forest_id"] == forest));

    let detail = body(client.get(srv.url(&format!("/farmers/{farmer}"))).send().await.unwrap()).await;
    assert_eq!(detail["trees"]["Platano"], 5);
    assert_eq!(detail["number_of_trees"], 5);

    let res = client
        .delete(srv.url(&format!("/trees/{}", ids[0])))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let deleted = body(res).await;
    assert_eq!(deleted["deleted"], ids[0]);
    assert_eq!(deleted["total_trees"], 4);
}

#[tokio::test]
async fn planting_for_unknown_owner_is_not_found_and_writes_nothing() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();
    let (farmer, forest) = seed(&srv, &client, &token).await;

    let res = plant(&srv, &client, &token, "Platano", farmer + 100, forest, 3).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = plant(&srv, &client, &token, "Platano", farmer, forest + 100, 3).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let trees = body(client.get(srv.url("/trees")).send().await.unwrap()).await;
    assert_eq!(trees["number_of_trees"], 0);
}

#[tokio::test]
async fn forest_detail_counts_distinct_farmers() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();
    let (farmer, forest) = seed(&srv, &client, &token).await;

    let empty = body(client.get(srv.url(&format!("/forests/{forest}"))).send().await.unwrap()).await;
    assert_eq!(empty["farmer_count"], 0);
    assert_eq!(empty["number_of_trees"], 0);

    let res = post_json(&client, srv.url("/farmers"), &token, json!({ "name": "Ana" })).await;
    let second = body(res).await["created"]["id"].as_i64().unwrap();

    plant(&srv, &client, &token, "Platano", farmer, forest, 2).await;
    plant(&srv, &client, &token, "Olivo", farmer, forest, 1).await;
    plant(&srv, &client, &token, "Olivo", second, forest, 3).await;

    let detail = body(client.get(srv.url(&format!("/forests/{forest}"))).send().await.unwrap()).await;
    assert_eq!(detail["forest"]["location"], "Angola");
    assert_eq!(detail["farmer_count"], 2);
    assert_eq!(detail["number_of_trees"], 6);
    assert_eq!(detail["trees"]["Olivo"], 4);
    assert_eq!(detail["trees"]["Platano"], 2);
}

#[tokio::test]
async fn forest_update_and_creation_payloads() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();
    let (_farmer, forest) = seed(&srv, &client, &token).await;

    let res = post_json(&client, srv.url("/forests"), &token, json!({ "name": "Bosco" })).await;
    let created = body(res).await;
    assert_eq!(created["forests"].as_array().unwrap().len(), 2);
    assert!(created["created"]["location"].is_null());

    let res = client
        .patch(srv.url(&format!("/forests/{forest}")))
        .bearer_auth(&token)
        .json(&json!({ "location": "Brasil" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let modified = body(res).await;
    assert_eq!(modified["modified"]["name"], "Foresta");
    assert_eq!(modified["modified"]["location"], "Brasil");

    let res = client
        .patch(srv.url(&format!("/forests/{forest}")))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn deleting_owners_cascades_to_trees() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();
    let (farmer, forest) = seed(&srv, &client, &token).await;

    let res = post_json(&client, srv.url("/forests"), &token, json!({ "name": "Bosco" })).await;
    let other_forest = body(res).await["created"]["id"].as_i64().unwrap();

    plant(&srv, &client, &token, "Platano", farmer, forest, 2).await;
    plant(&srv, &client, &token, "Olivo", farmer, other_forest, 3).await;

    let res = client
        .delete(srv.url(&format!("/forests/{forest}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let deleted = body(res).await;
    assert_eq!(deleted["deleted"], forest);
    assert_eq!(deleted["total_forests"], 1);

    let trees = body(client.get(srv.url("/trees")).send().await.unwrap()).await;
    assert_eq!(trees["number_of_trees"], 3);
    assert!(trees["trees"].as_array().unwrap().iter().all(|t| t["forest_id"] == other_forest));

    let res = client
        .delete(srv.url(&format!("/farmers/{farmer}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await["total_farmers"], 0);

    let trees = body(client.get(srv.url("/trees")).send().await.unwrap()).await;
    assert_eq!(trees["number_of_trees"], 0);
    let forests = body(client.get(srv.url("/forests")).send().await.unwrap()).await;
    assert_eq!(forests["number_of_forests"], 1);
}

#[tokio::test]
async fn tokens_verify_against_issuer_key_set() {
    use axum::{Router, http::header::CONTENT_TYPE, routing::get};

    let jwks = Router::new().route(
        "/.well-known/jwks.json",
        get(|| async { ([(CONTENT_TYPE, "application/json")], JWKS_JSON) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let issuer_url = format!("http://{}", listener.local_addr().unwrap());
    let issuer_handle = tokio::spawn(async move {
        axum::serve(listener, jwks).await.unwrap();
    });

    let keys = RemoteJwks::for_issuer(&issuer_url);
    let srv = TestServer::spawn_with(TokenVerifier::new(ISSUER, AUDIENCE, Arc::new(keys))).await;
    let client = reqwest::Client::new();

    let res = post_json(&client, srv.url("/farmers"), &admin(), json!({ "name": "Gino" })).await;
    assert_eq!(res.status(), StatusCode::OK);

    issuer_handle.abort();
}

#[tokio::test]
async fn unreachable_key_set_is_a_server_error() {
    let unreachable = RemoteJwks::new("http://127.0.0.1:9/.well-known/jwks.json");
    let srv = TestServer::spawn_with(TokenVerifier::new(ISSUER, AUDIENCE, Arc::new(unreachable))).await;
    let client = reqwest::Client::new();

    let res = post_json(&client, srv.url("/farmers"), &admin(), json!({ "name": "Gino" })).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_code(res).await, "key_set_unavailable");
}

#[tokio::test]
async fn wrong_method_gets_the_envelope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/trees/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(res.headers().contains_key("allow"));
    let json = body(res).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], 405);
    assert_eq!(json["message"], "method not allowed");

    let res = client.put(srv.url("/farmers")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body(res).await["success"], false);
}

#[tokio::test]
async fn rejected_tokens_never_reach_the_handler() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();
    let (farmer, forest) = seed(&srv, &client, &token).await;

    let expired = sign(&json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now() - 600,
        "permissions": ALL_PERMISSIONS,
    }));
    let res = plant(&srv, &client, &expired, "Platano", farmer, forest, 3).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let mut tampered = admin().into_bytes();
    let idx = tampered.iter().rposition(|b| *b == b'.').unwrap() + 10;
    tampered[idx] = if tampered[idx] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();
    let res = plant(&srv, &client, &tampered, "Platano", farmer, forest, 3).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let trees = body(client.get(srv.url("/trees")).send().await.unwrap()).await;
    assert_eq!(trees["number_of_trees"], 0);

    let res = client
        .delete(srv.url(&format!("/farmers/{farmer}")))
        .bearer_auth(&expired)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let farmers = body(client.get(srv.url("/farmers")).send().await.unwrap()).await;
    assert_eq!(farmers["number_of_farmers"], 1);
}

#[tokio::test]
async fn patching_existing_farmer_with_bad_body_is_unprocessable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();
    let (farmer, _forest) = seed(&srv, &client, &token).await;

    let res = client
        .patch(srv.url(&format!("/farmers/{farmer}")))
        .bearer_auth(&token)
        .json(&json!({ "nome": "Gino" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body(res).await["message"], "unprocessable");

    let detail = body(client.get(srv.url(&format!("/farmers/{farmer}"))).send().await.unwrap()).await;
    assert_eq!(detail["farmer"]["name"], "Gino Gianni");
}
