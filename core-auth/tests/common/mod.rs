//! Scripted club backend shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{HistoryNavigator, MemorySecureStore};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_auth::{AuthManager, AuthTokens, Session, UserProfile};
use core_runtime::config::ClientConfig;
use core_runtime::events::EventBus;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How `/refresh-token` answers.
#[derive(Clone)]
pub enum RefreshReply {
    /// Issue this access token (and no new refresh token).
    Issue(&'static str),
    Reject(u16, &'static str),
}

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// In-process stand-in for the club API.
///
/// `/clubs` accepts only the currently valid access token; `/slow` always
/// times out; `/refresh-token` follows [`RefreshReply`]. `/login` and the
/// Kakao OAuth callback sign in with the currently valid token.
pub struct FakeBackend {
    valid_token: Mutex<String>,
    refresh_reply: RefreshReply,
    refresh_delay: Duration,
    reject_everything: bool,
    refresh_calls: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl FakeBackend {
    pub fn new(valid_token: &str, refresh_reply: RefreshReply) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_reply,
            refresh_delay: Duration::from_millis(25),
            reject_everything: false,
            refresh_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every protected call answers 401, even with a fresh token.
    pub fn rejecting_everything(mut self) -> Self {
        self.reject_everything = true;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self, path: &str) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| seen.path == path)
            .cloned()
            .collect()
    }

    fn path_of(url: &str) -> String {
        url.trim_start_matches("http://clubs.test/api/auth").to_string()
    }
}

#[async_trait]
impl HttpClient for FakeBackend {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let path = Self::path_of(&request.url);
        self.seen.lock().unwrap().push(Seen {
            path: path.clone(),
            authorization: request.header_value("Authorization").map(str::to_string),
            body: request
                .body
                .as_ref()
                .and_then(|body| serde_json::from_slice(body).ok()),
        });

        match path.as_str() {
            "/refresh-token" => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.refresh_delay).await;
                match &self.refresh_reply {
                    RefreshReply::Issue(token) => {
                        *self.valid_token.lock().unwrap() = token.to_string();
                        Ok(HttpResponse::new(200, json!({ "token": token }).to_string()))
                    }
                    RefreshReply::Reject(status, message) => Ok(HttpResponse::new(
                        *status,
                        json!({ "message": message }).to_string(),
                    )),
                }
            }
            "/login" | "/oauth2/callback/kakao" => {
                let token = self.valid_token.lock().unwrap().clone();
                Ok(HttpResponse::new(
                    200,
                    json!({
                        "token": token,
                        "refreshToken": "R9",
                        "user": { "id": 6, "name": "Jung", "email": "jung@club.io", "role": "MEMBER" }
                    })
                    .to_string(),
                ))
            }
            "/slow" => Err(BridgeError::Timeout(
                request.timeout.unwrap_or(Duration::from_secs(15)),
            )),
            "/clubs" => {
                let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
                let authorized = request.header_value("Authorization") == Some(expected.as_str());
                if authorized && !self.reject_everything {
                    Ok(HttpResponse::new(200, r#"[{"id":1,"name":"Hiking"}]"#))
                } else {
                    Ok(HttpResponse::new(401, r#"{"message":"Token expired"}"#))
                }
            }
            _ => Ok(HttpResponse::new(404, "Not Found")),
        }
    }
}

pub struct TestClient {
    pub manager: AuthManager,
    pub backend: Arc<FakeBackend>,
    pub navigator: Arc<HistoryNavigator>,
    pub events: EventBus,
}

pub fn client(backend: FakeBackend) -> TestClient {
    let backend = Arc::new(backend);
    let navigator = Arc::new(HistoryNavigator::new("/"));
    let config = ClientConfig::builder()
        .api_base_url("http://clubs.test/api/auth")
        .request_timeout(Duration::from_secs(2))
        .http_client(backend.clone())
        .secure_store(Arc::new(MemorySecureStore::new()))
        .navigator(navigator.clone())
        .build()
        .expect("test config is valid");
    let events = EventBus::new(64);

    TestClient {
        manager: AuthManager::new(config, events.clone()),
        backend,
        navigator,
        events,
    }
}

pub fn session(access_token: &str) -> Session {
    Session::new(
        AuthTokens::new(access_token, "R1"),
        UserProfile {
            id: Some(5),
            name: "Yoon".to_string(),
            email: "yoon@club.io".to_string(),
            ..Default::default()
        },
    )
}
