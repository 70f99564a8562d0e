//! Mock identity provider and manual clock for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use common::Secret;
use tokio::net::TcpListener;

use crate::clock::Clock;
use crate::token::Credentials;

pub(crate) fn test_credentials() -> Credentials {
    Credentials {
        personal_access_token: Secret::new("pat-123".to_string()),
        client_id: "client-abc".to_string(),
        client_secret: Secret::new("shh".to_string()),
    }
}

/// Clock that only moves when a test says so.
pub(crate) struct ManualClock(AtomicU64);

impl ManualClock {
    pub(crate) fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub(crate) fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the mock token endpoint answers with.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// 200 with `access_token = "tok-<n>"`, n being the 1-based hit count.
    Token { expires_in: Option<u64> },
    /// Arbitrary status and body.
    Body { status: u16, body: &'static str },
}

#[derive(Clone)]
pub(crate) struct MockIdentity {
    pub(crate) url: String,
    hits: Arc<AtomicUsize>,
    reply: Arc<Mutex<Reply>>,
    last_form: Arc<Mutex<Option<HashMap<String, String>>>>,
    delay: Duration,
}

impl MockIdentity {
    pub(crate) async fn start(reply: Reply) -> Self {
        Self::start_with_delay(reply, Duration::ZERO).await
    }

    pub(crate) async fn start_with_delay(reply: Reply, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mock = Self {
            url: format!("http://{addr}/connect/token"),
            hits: Arc::new(AtomicUsize::new(0)),
            reply: Arc::new(Mutex::new(reply)),
            last_form: Arc::new(Mutex::new(None)),
            delay,
        };

        let app = Router::new()
            .route("/connect/token", post(token_handler))
            .with_state(mock.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        mock
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub(crate) fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub(crate) fn last_form(&self) -> Option<HashMap<String, String>> {
        self.last_form.lock().unwrap().clone()
    }
}

async fn token_handler(
    State(mock): State<MockIdentity>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = mock.hits.fetch_add(1, Ordering::SeqCst) + 1;
    *mock.last_form.lock().unwrap() = Some(form);

    if !mock.delay.is_zero() {
        tokio::time::sleep(mock.delay).await;
    }

    let reply = mock.reply.lock().unwrap().clone();
    match reply {
        Reply::Token { expires_in } => {
            let mut body = serde_json::json!({
                "access_token": format!("tok-{n}"),
                "token_type": "Bearer",
            });
            if let Some(secs) = expires_in {
                body["expires_in"] = secs.into();
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Reply::Body { status, body } => {
            (StatusCode::from_u16(status).unwrap(), body).into_response()
        }
    }
}
