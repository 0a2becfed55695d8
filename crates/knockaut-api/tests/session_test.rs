// Live push-channel tests against a loopback WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;

use knockaut_api::{
    AuthStore, Error, PushFrame, SessionConfig, SessionManager, SessionSink,
};

// ── Test doubles ────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    opens: AtomicU32,
    closes: AtomicU32,
    errors: AtomicU32,
    exhausted: AtomicU32,
    attempts: Mutex<Vec<u32>>,
    frames: Mutex<Vec<PushFrame>>,
}

impl SessionSink for Recorder {
    fn open(&self) {
        self.opens.fetch_add(1, Ordering::SeqCst);
    }

    fn push(&self, frame: &PushFrame) {
        self.frames.lock().unwrap().push(frame.clone());
    }

    fn error(&self, _error: &Error) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn reconnecting(&self, attempt: u32) {
        self.attempts.lock().unwrap().push(attempt);
    }

    fn exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::SeqCst);
    }
}

fn manager(config: SessionConfig, addr: SocketAddr) -> (SessionManager, Arc<Recorder>) {
    let session = SessionManager::new(config, Arc::new(AuthStore::new()));
    let url = Url::parse(&format!("ws://{addr}/wfc/1/api/")).unwrap();
    session.set_url(url);
    let sink = Arc::new(Recorder::default());
    session.set_sink(Arc::clone(&sink) as Arc<dyn SessionSink>);
    (session, sink)
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn frames_are_delivered_and_sends_reach_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(tokio_tungstenite::tungstenite::Message::text(
            r#"{"Message":10603,"Data":[12345,true,21.5],"SenderID":0,"TimeStamp":1700000000}"#,
        ))
        .await
        .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                received_tx.send(text.to_string()).unwrap();
            }
        }
    });

    let (session, sink) = manager(SessionConfig::default(), addr);
    session.connect().unwrap();

    wait_until("pushed frame", || !sink.frames.lock().unwrap().is_empty()).await;
    {
        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames[0].message, 10603);
        assert_eq!(frames[0].data, vec![json!(12345), json!(true), json!(21.5)]);
    }
    assert!(session.is_connected());

    session.send_json(&json!({ "register": [12345] })).unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(echoed.contains("register"));

    session.close();
}

#[tokio::test]
async fn unexpected_drop_schedules_bounded_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept a single handshake and hang up; the port then refuses
    // connections, so every retry fails until the ceiling is hit.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
    });

    let config = SessionConfig {
        reconnection: true,
        attempt_ceiling: 2,
        reconnect_delay: Duration::from_millis(30),
    };
    let (session, sink) = manager(config, addr);
    session.connect().unwrap();

    wait_until("reconnection exhaustion", || {
        sink.exhausted.load(Ordering::SeqCst) == 1
    })
    .await;

    assert_eq!(sink.opens.load(Ordering::SeqCst), 1);
    // attempt <= ceiling schedules, so a ceiling of 2 yields attempts
    // 1, 2 and 3 before giving up.
    assert_eq!(*sink.attempts.lock().unwrap(), vec![1, 2, 3]);

    session.close();
}

#[tokio::test]
async fn reopening_resets_the_attempt_counter() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // First connection is dropped straight away, the second is held
    // open. A successful reopen must start attempt numbering over, so
    // the drop of the held connection reports attempt 1 again.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        ws.close(None).await.ok();
        while ws.next().await.is_some() {}
    });

    let config = SessionConfig {
        reconnection: true,
        attempt_ceiling: 5,
        reconnect_delay: Duration::from_millis(30),
    };
    let (session, sink) = manager(config, addr);
    session.connect().unwrap();

    wait_until("second reconnect cycle", || {
        sink.attempts.lock().unwrap().iter().filter(|a| **a == 1).count() >= 2
    })
    .await;

    assert_eq!(sink.opens.load(Ordering::SeqCst), 2);

    session.close();
}

#[tokio::test]
async fn intentional_close_schedules_no_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    let config = SessionConfig {
        reconnection: true,
        attempt_ceiling: 5,
        reconnect_delay: Duration::from_millis(30),
    };
    let (session, sink) = manager(config, addr);
    session.connect().unwrap();

    wait_until("open", || sink.opens.load(Ordering::SeqCst) == 1).await;
    session.close();

    wait_until("close notification", || {
        sink.closes.load(Ordering::SeqCst) == 1
    })
    .await;

    // Give a stray reconnect plenty of time to show itself.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sink.attempts.lock().unwrap().is_empty());
    assert_eq!(sink.opens.load(Ordering::SeqCst), 1);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn replacing_a_live_session_reconnects_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    let (session, sink) = manager(SessionConfig::default(), addr);
    session.connect().unwrap();
    wait_until("first open", || sink.opens.load(Ordering::SeqCst) == 1).await;

    // A second connect() replaces the live session instead of stacking
    // a second loop on top of it.
    session.connect().unwrap();
    wait_until("second open", || sink.opens.load(Ordering::SeqCst) == 2).await;
    assert!(sink.attempts.lock().unwrap().is_empty());

    session.close();
}
