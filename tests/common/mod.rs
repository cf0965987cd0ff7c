//! Shared helpers for integration tests: a wiremock-backed identity
//! provider, fake collaborators and an unsigned JWT builder.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_agent::auth::authorization::{
    AuthorizationError, AuthorizationRequest, AuthorizationResponse, AuthorizationSession,
    AuthorizationStep, UserAgent,
};
use oidc_agent::auth::orchestrator::FlowOrchestrator;
use oidc_agent::config::{ClientConfig, HttpConfig};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("oidc.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Builds an unsigned compact JWT carrying `claims`.
#[allow(dead_code)]
pub fn unsigned_jwt(claims: serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.c2lnbmF0dXJl",
        engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        engine.encode(claims.to_string())
    )
}

/// Discovery document with every endpoint pointing at `base`.
#[allow(dead_code)]
pub fn discovery_document(base: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authz"),
        "token_endpoint": format!("{base}/token"),
        "userinfo_endpoint": format!("{base}/userinfo"),
        "end_session_endpoint": format!("{base}/logout"),
        "response_types_supported": ["code"]
    })
}

/// Serves `document` at the discovery path.
#[allow(dead_code)]
pub async fn mount_discovery(server: &MockServer, document: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn client_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(
        "app1",
        "openid profile email",
        REDIRECT_URI,
        &format!("{}{}", server.uri(), DISCOVERY_PATH),
    )
    .expect("valid client config")
}

#[allow(dead_code)]
pub fn orchestrator(
    server: &MockServer,
    authorizer: Arc<FakeAuthorizer>,
    user_agent: Arc<RecordingUserAgent>,
) -> FlowOrchestrator {
    FlowOrchestrator::new(
        client_config(server),
        &HttpConfig::default(),
        authorizer,
        user_agent,
    )
    .expect("orchestrator builds")
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// What [`FakeAuthorizer`] answers with.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum FakeOutcome {
    /// Return this code and echo the request's state.
    Code(String),
    /// Return this code with a different state.
    WrongState(String),
    /// Fail with this reason.
    Deny(String),
}

/// Authorization collaborator that answers without any browser.
#[derive(Debug)]
pub struct FakeAuthorizer {
    outcome: FakeOutcome,
    calls: AtomicUsize,
    releases: Arc<AtomicUsize>,
    last_request: Mutex<Option<AuthorizationRequest>>,
}

#[allow(dead_code)]
impl FakeAuthorizer {
    pub fn new(outcome: FakeOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            last_request: Mutex::new(None),
        })
    }

    pub fn granting(code: &str) -> Arc<Self> {
        Self::new(FakeOutcome::Code(code.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How many sessions this collaborator saw released.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AuthorizationRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorizationStep for FakeAuthorizer {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        session: &AuthorizationSession,
    ) -> Result<AuthorizationResponse, AuthorizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let releases = Arc::clone(&self.releases);
        session.on_release(move || {
            releases.fetch_add(1, Ordering::SeqCst);
        });

        match &self.outcome {
            FakeOutcome::Code(code) => Ok(AuthorizationResponse {
                code: code.clone(),
                state: Some(request.state.clone()),
            }),
            FakeOutcome::WrongState(code) => Ok(AuthorizationResponse {
                code: code.clone(),
                state: Some("forged".to_string()),
            }),
            FakeOutcome::Deny(reason) => Err(AuthorizationError::new(reason.clone())),
        }
    }
}

/// User agent that records every URL it is asked to show.
#[derive(Debug, Default)]
pub struct RecordingUserAgent {
    presented: Mutex<Vec<Url>>,
}

#[allow(dead_code)]
impl RecordingUserAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn presented(&self) -> Vec<Url> {
        self.presented.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserAgent for RecordingUserAgent {
    async fn present(&self, url: &Url) -> oidc_agent::Result<()> {
        self.presented.lock().unwrap().push(url.clone());
        Ok(())
    }
}
