use axum::http::{header, StatusCode};
use channel_api::ChannelStatus;
use fanout_server::{
    api::{build_router, run_http_server, AppState},
    config::Config,
};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

async fn spawn_server() -> (SocketAddr, JoinHandle<()>, AppState) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();
    let state = AppState::new(Config::default());
    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (addr, server, state)
}

#[tokio::test]
async fn broadcast_without_listeners() {
    let (addr, server, state) = spawn_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/broadcast/room1", addr))
        .form(&[("message", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    assert_eq!(resp.text().await.unwrap(), "OK\n");
    let status = state.hub.status("room1").unwrap();
    assert_eq!(status.messages, 1);
    assert_eq!(status.listeners, 0);
    server.abort();
}

#[tokio::test]
async fn missing_message_is_an_empty_broadcast() {
    let (addr, server, state) = spawn_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/broadcast/quiet", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.hub.status("quiet").unwrap().messages, 1);
    server.abort();
}

#[tokio::test]
async fn channels_endpoint_reports_counts() {
    let (addr, server, state) = spawn_server().await;
    let _a = state.hub.subscribe("test1");
    let _b = state.hub.subscribe("test2");
    let _c = state.hub.subscribe("test2");
    for _ in 0..5 {
        state.hub.publish("test1", "x");
    }
    for _ in 0..10 {
        state.hub.publish("test2", "x");
    }

    let resp = reqwest::get(format!("http://{}/channels/", addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    let mut topics: Vec<ChannelStatus> = resp.json().await.unwrap();
    topics.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        topics,
        vec![
            ChannelStatus {
                name: "test1".into(),
                listeners: 1,
                messages: 5
            },
            ChannelStatus {
                name: "test2".into(),
                listeners: 2,
                messages: 10
            },
        ]
    );
    server.abort();
}

#[tokio::test]
async fn empty_registry_lists_nothing() {
    let (addr, server, _state) = spawn_server().await;
    let v: serde_json::Value = reqwest::get(format!("http://{}/channels/", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(v, serde_json::json!([]));
    server.abort();
}

#[tokio::test]
async fn unknown_endpoint_is_404() {
    let (addr, server, _state) = spawn_server().await;
    let resp = reqwest::get(format!("http://{}/invalid/endpoint", addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    server.abort();
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = Config {
        http: taken.local_addr().unwrap().to_string(),
        ..Config::default()
    };
    assert!(run_http_server(config).await.is_err());
}

#[tokio::test]
async fn hostname_listen_address_serves() {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = Config {
        http: format!("localhost:{port}"),
        ..Config::default()
    };
    let server = tokio::spawn(run_http_server(config));

    let resp = timeout(Duration::from_secs(5), async {
        loop {
            match reqwest::get(format!("http://127.0.0.1:{port}/channels/")).await {
                Ok(resp) => break resp,
                Err(_) => sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("server never came up on localhost");
    assert_eq!(resp.status(), StatusCode::OK);
    server.abort();
}
