#![allow(non_snake_case)]

use actix_web::{
    App,
    HttpRequest,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    http::header,
    web,
};
use base64::{
    Engine as _,
    engine::general_purpose::URL_SAFE_NO_PAD,
};
use serde_json::{
    Value,
    json,
};
use std::{
    net::TcpListener,
    sync::{
        Arc,
        Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};
use tick_client::{
    ConfirmPolicy,
    Credentials,
    GameClient,
    HttpReceiptSource,
    NakamaGateway,
    Submission,
    backend::GameBackend,
    error::{
        ConfirmError,
        FetchError,
    },
    identity::ClaimOutcome,
    messages::{
        Receipt,
        ReceiptBatch,
    },
    session::SessionGuard,
    test_helpers::receipt,
};

#[derive(Default)]
struct ShardState {
    tick: u64,
    issued_tokens: u64,
    persona: Option<String>,
    submitted: Vec<(String, u64)>,
    rpc_bodies: Vec<(String, Value)>,
    bearer_tokens: Vec<String>,
    receipts_down: bool,
}

type Shared = Arc<Mutex<ShardState>>;

/// Nakama gateway plus receipt endpoint, served from a background thread.
struct FakeShard {
    base_url: String,
    state: Shared,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl FakeShard {
    fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(ShardState {
            tick: 10,
            ..ShardState::default()
        }));
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let server_state = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(server_state.clone()))
                .route(
                    "/v2/account/authenticate/email",
                    web::post().to(handle_authenticate),
                )
                .route("/v2/account/session/refresh", web::post().to(handle_refresh))
                .route("/v2/account", web::get().to(handle_account))
                .route("/healthcheck", web::get().to(handle_healthcheck))
                .route("/v2/rpc/{route:.*}", web::post().to(handle_rpc))
                .route("/query/receipts/list", web::post().to(handle_receipts))
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Self {
            base_url,
            state,
            server_handle,
            server_thread: Some(server_thread),
        }
    }

    fn client(&self) -> GameClient<NakamaGateway, HttpReceiptSource> {
        let gateway =
            NakamaGateway::new(&self.base_url, "defaultkey", Duration::from_secs(5)).unwrap();
        let receipts = HttpReceiptSource::new(&self.base_url, Duration::from_secs(5)).unwrap();
        let policy = ConfirmPolicy {
            poll_interval: Duration::from_millis(20),
            ..ConfirmPolicy::default()
        };
        GameClient::new(gateway, receipts, SessionGuard::default(), policy)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ShardState> {
        self.state.lock().unwrap()
    }
}

impl Drop for FakeShard {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

fn jwt(state: &mut ShardState) -> String {
    state.issued_tokens += 1;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = json!({
        "exp": chrono::Utc::now().timestamp() + 3600,
        "uid": "user-1",
        "usn": "pepe",
        "n": state.issued_tokens,
    });
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{body}.sig")
}

fn session_reply(state: &mut ShardState) -> HttpResponse {
    let token = jwt(state);
    let refresh_token = jwt(state);
    HttpResponse::Ok().json(json!({
        "created": true,
        "token": token,
        "refresh_token": refresh_token,
    }))
}

fn header_value(req: &HttpRequest) -> String {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn handle_authenticate(
    state: web::Data<Shared>,
    req: HttpRequest,
    body: web::Json<Value>,
) -> HttpResponse {
    let expected = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("defaultkey:")
    );
    if header_value(&req) != expected || body.get("email").is_none() {
        return HttpResponse::Unauthorized().json(json!({ "message": "bad server key" }));
    }
    session_reply(&mut state.lock().unwrap())
}

async fn handle_refresh(state: web::Data<Shared>) -> HttpResponse {
    session_reply(&mut state.lock().unwrap())
}

async fn handle_account() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "user": { "id": "user-1", "username": "pepe" } }))
}

async fn handle_healthcheck() -> HttpResponse {
    HttpResponse::Ok().json(json!({}))
}

fn envelope(route: &str, payload: Value) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "id": route, "payload": payload.to_string() }))
}

async fn handle_rpc(
    state: web::Data<Shared>,
    req: HttpRequest,
    route: web::Path<String>,
    body: web::Json<String>,
) -> HttpResponse {
    let route = route.into_inner();
    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(_) => return HttpResponse::BadRequest().finish(),
    };
    let mut state = state.lock().unwrap();
    state.bearer_tokens.push(header_value(&req));
    state.rpc_bodies.push((route.clone(), payload.clone()));

    match route.as_str() {
        "nakama/show-persona" => match &state.persona {
            Some(tag) => envelope(
                &route,
                json!({ "personaTag": tag, "status": "accepted", "tick": 1 }),
            ),
            None => HttpResponse::NotFound().json(json!({ "message": "persona not found" })),
        },
        "nakama/claim-persona" => {
            let tag = payload["personaTag"].as_str().unwrap_or_default().to_string();
            state.persona = Some(tag.clone());
            envelope(&route, json!({ "personaTag": tag, "status": "pending" }))
        }
        "query/game/current-tick" => {
            let tick = state.tick;
            state.tick += 1;
            envelope(&route, json!({ "currentTick": tick }))
        }
        "tx/game/create-pet" => {
            let hash = format!("0x{:04}", state.submitted.len() + 1);
            let tick = state.tick;
            state.submitted.push((hash.clone(), tick));
            envelope(&route, json!({ "TxHash": hash, "Tick": tick }))
        }
        "query/game/pets-list" => envelope(&route, json!({ "pets": null })),
        _ => HttpResponse::NotFound().json(json!({ "message": "rpc function not found" })),
    }
}

async fn handle_receipts(state: web::Data<Shared>, body: web::Json<Value>) -> HttpResponse {
    let state = state.lock().unwrap();
    if state.receipts_down {
        return HttpResponse::ServiceUnavailable().body("receipt log offline");
    }
    let start_tick = body["startTick"].as_u64().unwrap_or_default();
    let mut receipts: Vec<Receipt> = vec![receipt("0xforeign", start_tick + 1)];
    receipts.extend(
        state
            .submitted
            .iter()
            .filter(|(_, tick)| *tick >= start_tick)
            .map(|(hash, tick)| receipt(hash, tick + 1)),
    );
    HttpResponse::Ok().json(ReceiptBatch {
        start_tick,
        end_tick: state.tick,
        receipts,
    })
}

fn credentials() -> Credentials {
    Credentials::new("email@example.com", "3bc8f72e95a9")
}

#[tokio::test]
async fn full_flow__claim_create_and_confirm_over_http() {
    // given
    let shard = FakeShard::start();
    let client = shard.client();

    // when
    let session = client.authenticate(&credentials()).await.unwrap();
    let account = client
        .dispatcher()
        .backend()
        .account(&session)
        .await
        .unwrap();
    let claimed = client.claim_persona("pepe5").await.unwrap();
    let again = client.claim_persona("pepe5").await.unwrap();
    let submission = client.create_pet("Manny2").await.unwrap();
    let confirmation = client.confirm(&submission).await.unwrap();

    // then
    assert_eq!(session.user_id(), Some("user-1"));
    assert_eq!(account.user.id, "user-1");
    assert!(matches!(claimed, ClaimOutcome::Claimed(_)));
    assert!(matches!(again, ClaimOutcome::AlreadyBound(_)));
    assert_eq!(confirmation.receipts.len(), 1);
    assert_eq!(confirmation.receipts[0].tx_hash, submission.tx_hash);
    assert!(!confirmation.soft_timed_out());

    let state = shard.state();
    assert!(
        state
            .bearer_tokens
            .iter()
            .all(|t| *t == format!("Bearer {}", session.token()))
    );
    assert!(state.rpc_bodies.contains(&(
        "tx/game/create-pet".to_string(),
        json!({ "nickname": "Manny2" })
    )));
}

#[tokio::test]
async fn confirm__concurrent_submissions__each_sees_only_its_receipt() {
    // given
    let shard = FakeShard::start();
    let client = shard.client();
    client.authenticate(&credentials()).await.unwrap();
    client.claim_persona("pepe5").await.unwrap();
    let first = client.create_pet("Manny2").await.unwrap();
    let second = client.create_pet("Manny3").await.unwrap();

    // when
    let results =
        futures::future::join_all([client.confirm(&first), client.confirm(&second)]).await;

    // then
    let hashes: Vec<Vec<String>> = results
        .into_iter()
        .map(|r| {
            r.unwrap()
                .receipts
                .into_iter()
                .map(|receipt| receipt.tx_hash)
                .collect()
        })
        .collect();
    assert_eq!(hashes, vec![vec![first.tx_hash], vec![second.tx_hash]]);
}

#[tokio::test]
async fn persona__none_claimed__is_absent_and_queries_still_work() {
    // given
    let shard = FakeShard::start();
    let client = shard.client();
    client.authenticate(&credentials()).await.unwrap();

    // when
    let persona = client.persona().await.unwrap();
    let pets = client.pets().await.unwrap();
    let tick = client.current_tick().await.unwrap();

    // then
    assert_eq!(persona, None);
    assert!(pets.is_empty());
    assert_eq!(tick, 10);
}

#[tokio::test]
async fn confirm__receipt_log_down__is_fetch_error() {
    // given
    let shard = FakeShard::start();
    let client = shard.client();
    client.authenticate(&credentials()).await.unwrap();
    shard.state().receipts_down = true;

    // when
    let result = client.confirm(&Submission::new("0x0001", 10)).await;

    // then
    assert!(matches!(
        result,
        Err(ConfirmError::Fetch(FetchError::Status { status: 503, .. }))
    ));
}

#[tokio::test]
async fn refresh_session__exchanges_refresh_token_for_new_session() {
    // given
    let shard = FakeShard::start();
    let gateway =
        NakamaGateway::new(&shard.base_url, "defaultkey", Duration::from_secs(5)).unwrap();
    let session = gateway
        .authenticate_email("email@example.com", "3bc8f72e95a9")
        .await
        .unwrap();

    // when
    let refreshed = gateway.refresh_session(&session).await.unwrap();

    // then
    assert_ne!(refreshed.token(), session.token());
    assert_eq!(refreshed.username(), Some("pepe"));
}

#[tokio::test]
async fn authenticate__wrong_server_key__is_rejected() {
    // given
    let shard = FakeShard::start();
    let gateway = NakamaGateway::new(&shard.base_url, "wrongkey", Duration::from_secs(5)).unwrap();

    // when
    let result = gateway
        .authenticate_email("email@example.com", "3bc8f72e95a9")
        .await;

    // then
    assert!(matches!(
        result,
        Err(tick_client::error::TransportError::Status { status: 401, .. })
    ));
}
