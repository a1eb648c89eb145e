mod common;

use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use common::{befriend, call, register, start_server, TestServer};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(base_url: &str, token: &str) -> WsStream {
    let ws_url = format!(
        "{}/api/ws?token={}",
        base_url.replacen("http://", "ws://", 1),
        token
    );
    let (ws, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("ws connect");
    ws
}

/// Read events until one satisfies `pred`.
async fn next_matching(ws: &mut WsStream, pred: impl Fn(&Value) -> bool) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let event: Value = serde_json::from_str(&text).expect("event json");
                    if pred(&event) {
                        return event;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn next_of_type(ws: &mut WsStream, kind: &str) -> Value {
    next_matching(ws, |e| e["type"] == kind).await
}

fn online_ids(event: &Value) -> Vec<String> {
    event["user_ids"]
        .as_array()
        .expect("user_ids")
        .iter()
        .map(|v| v.as_str().expect("id").to_string())
        .collect()
}

/// Two verified users who are friends. Returns ((a_id, a_token), (b_id, b_token)).
async fn friends_pair(server: &TestServer) -> ((String, String), (String, String)) {
    tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        let mailer = server.mailer.clone();
        move || {
            let a = register(&base_url, &mailer, "Ada", "ada@example.com");
            let b = register(&base_url, &mailer, "Bob", "bob@example.com");
            befriend(&base_url, (&a.0, &a.1), (&b.0, &b.1));
            (a, b)
        }
    })
    .await
    .expect("setup")
}

#[tokio::test]
async fn online_set_follows_connections() {
    let server = start_server().await;
    let ((a_id, a_token), (b_id, b_token)) = friends_pair(&server).await;

    let mut ws_a = connect(&server.base_url, &a_token).await;
    let event = next_of_type(&mut ws_a, "online_users").await;
    assert_eq!(online_ids(&event), vec![a_id.clone()]);

    let mut ws_b = connect(&server.base_url, &b_token).await;
    let b_id_clone = b_id.clone();
    let event = next_matching(&mut ws_a, move |e| {
        e["type"] == "online_users" && online_ids(e).contains(&b_id_clone)
    })
    .await;
    assert_eq!(online_ids(&event).len(), 2);

    let (status, body) = tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        move || call(&base_url, "GET", "/api/health", None, None)
    })
    .await
    .expect("health");
    assert_eq!(status, 200);
    assert_eq!(body["online"], 2);

    ws_b.close(None).await.expect("close b");
    let event = next_matching(&mut ws_a, |e| {
        e["type"] == "online_users" && online_ids(e).len() == 1
    })
    .await;
    assert_eq!(online_ids(&event), vec![a_id]);

    server.stop();
}

#[tokio::test]
async fn messages_and_notifications_arrive_live() {
    let server = start_server().await;
    let ((a_id, a_token), (b_id, b_token)) = friends_pair(&server).await;

    let mut ws_b = connect(&server.base_url, &b_token).await;
    next_of_type(&mut ws_b, "online_users").await;

    let (status, sent) = tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        let b_id = b_id.clone();
        move || {
            call(
                &base_url,
                "POST",
                &format!("/api/messages/send/{}", b_id),
                Some(&a_token),
                Some(json!({ "text": "are you around?" })),
            )
        }
    })
    .await
    .expect("send");
    assert_eq!(status, 201, "{sent}");

    let event = next_of_type(&mut ws_b, "new_message").await;
    assert_eq!(event["message"]["id"], sent["id"]);
    assert_eq!(event["message"]["text"], "are you around?");
    assert_eq!(event["message"]["sender_id"], a_id.as_str());

    let event = next_of_type(&mut ws_b, "notification").await;
    assert_eq!(event["notification"]["kind"], "message");
    assert_eq!(event["notification"]["from_id"], a_id.as_str());

    server.stop();
}

#[tokio::test]
async fn friend_request_pushed_to_target() {
    let server = start_server().await;

    let ((a_id, a_token), (b_id, b_token)) = tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        let mailer = server.mailer.clone();
        move || {
            let a = register(&base_url, &mailer, "Ada", "ada@example.com");
            let b = register(&base_url, &mailer, "Bob", "bob@example.com");
            (a, b)
        }
    })
    .await
    .expect("setup");

    let mut ws_b = connect(&server.base_url, &b_token).await;
    next_of_type(&mut ws_b, "online_users").await;

    let (status, _) = tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        move || {
            call(
                &base_url,
                "POST",
                "/api/friends/request-note",
                Some(&a_token),
                Some(json!({ "user_id": b_id, "note": "hello" })),
            )
        }
    })
    .await
    .expect("request");
    assert_eq!(status, 200);

    let event = next_of_type(&mut ws_b, "friend_request_received").await;
    assert_eq!(event["from_id"], a_id.as_str());
    assert_eq!(event["from_name"], "Ada");
    assert_eq!(event["note"], "hello");

    let event = next_of_type(&mut ws_b, "notification").await;
    assert_eq!(event["notification"]["kind"], "friend_request");

    server.stop();
}

#[tokio::test]
async fn hidden_users_stay_out_of_the_online_set() {
    let server = start_server().await;
    let ((a_id, a_token), (b_id, b_token)) = friends_pair(&server).await;

    let (status, _) = tokio::task::spawn_blocking({
        let base_url = server.base_url.clone();
        let a_token = a_token.clone();
        move || {
            call(
                &base_url,
                "POST",
                "/api/friends/privacy",
                Some(&a_token),
                Some(json!({ "show_online_status": false })),
            )
        }
    })
    .await
    .expect("privacy");
    assert_eq!(status, 200);

    let mut ws_a = connect(&server.base_url, &a_token).await;
    let event = next_of_type(&mut ws_a, "online_users").await;
    assert!(online_ids(&event).is_empty());

    let mut ws_b = connect(&server.base_url, &b_token).await;
    let event = next_of_type(&mut ws_b, "online_users").await;
    assert_eq!(online_ids(&event), vec![b_id]);

    // Hidden users still receive their own events.
    let event = next_of_type(&mut ws_a, "online_users").await;
    assert!(!online_ids(&event).contains(&a_id));

    server.stop();
}

#[tokio::test]
async fn ping_text_gets_pong() {
    let server = start_server().await;
    let ((_, a_token), _) = friends_pair(&server).await;

    let mut ws = connect(&server.base_url, &a_token).await;
    next_of_type(&mut ws, "online_users").await;

    ws.send(WsMessage::Text("ping".to_string()))
        .await
        .expect("send ping");
    let reply = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) if text == "pong" => return text,
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await
    .expect("pong");
    assert_eq!(reply, "pong");

    server.stop();
}

#[tokio::test]
async fn websocket_requires_a_session() {
    let server = start_server().await;

    let ws_url = format!(
        "{}/api/ws?token=not-a-session",
        server.base_url.replacen("http://", "ws://", 1)
    );
    assert!(tokio_tungstenite::connect_async(&ws_url).await.is_err());

    let ws_url = format!("{}/api/ws", server.base_url.replacen("http://", "ws://", 1));
    assert!(tokio_tungstenite::connect_async(&ws_url).await.is_err());

    server.stop();
}
