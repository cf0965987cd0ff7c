//! Authorization code flow orchestration
//!
//! [`FlowOrchestrator`] drives one sign-in from discovery to a populated
//! [`AuthenticationContext`]:
//!
//! ```text
//! Init -> Discovering -> AwaitingAuthorization -> ExchangingToken
//!      -> [FetchingUserInfo] -> Complete
//! ```
//!
//! Any step may end the flow in `Failed`. Steps never run out of order: the
//! token exchange only starts after the authorization step produced a code,
//! and the authorization step only starts after discovery succeeded.
//!
//! A failed flow yields exactly one [`OidcError`] and no context. The
//! optional userinfo step is the exception: its failure is logged and the
//! flow still completes, without userinfo.
//!
//! The orchestrator is immutable after construction and can be shared
//! between tasks behind an [`Arc`]; each `authorize` call gets its own
//! context.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::auth::authorization::{
    AuthorizationRequest, AuthorizationSession, AuthorizationStep, UserAgent,
};
use crate::auth::context::{AuthenticationContext, User};
use crate::auth::discovery::{DiscoveryClient, DiscoveryDocument};
use crate::auth::http;
use crate::auth::token::TokenClient;
use crate::auth::userinfo::{UserInfoClient, UserInfoResponse};
use crate::config::{ClientConfig, HttpConfig};
use crate::error::{OidcError, Result};

/// Query parameter carrying the ID token on logout.
const ID_TOKEN_HINT: &str = "id_token_hint";
/// Query parameter carrying the post-logout redirect.
const POST_LOGOUT_REDIRECT_URI: &str = "post_logout_redirect_uri";

// ---------------------------------------------------------------------------
// FlowState
// ---------------------------------------------------------------------------

/// Lifecycle of one `authorize` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Init,
    Discovering,
    AwaitingAuthorization,
    ExchangingToken,
    FetchingUserInfo,
    Complete,
    Failed,
}

impl FlowState {
    /// `Complete` and `Failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Complete | FlowState::Failed)
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowState::Init => "INIT",
            FlowState::Discovering => "DISCOVERING",
            FlowState::AwaitingAuthorization => "AWAITING_AUTHORIZATION",
            FlowState::ExchangingToken => "EXCHANGING_TOKEN",
            FlowState::FetchingUserInfo => "FETCHING_USERINFO",
            FlowState::Complete => "COMPLETE",
            FlowState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Records state transitions for one flow.
#[derive(Debug, Clone)]
struct FlowTracker {
    state: watch::Sender<FlowState>,
    history: Arc<Mutex<Vec<FlowState>>>,
}

impl FlowTracker {
    fn new() -> Self {
        let (state, _) = watch::channel(FlowState::Init);
        Self {
            state,
            history: Arc::new(Mutex::new(vec![FlowState::Init])),
        }
    }

    fn enter(&self, next: FlowState) {
        let previous = *self.state.borrow();
        tracing::debug!("Flow state {} -> {}", previous, next);
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(next);
        self.state.send_replace(next);
    }
}

// ---------------------------------------------------------------------------
// FlowHandle
// ---------------------------------------------------------------------------

/// A flow running on its own task, returned by
/// [`FlowOrchestrator::spawn_authorize`].
#[derive(Debug)]
pub struct FlowHandle {
    tracker: FlowTracker,
    task: JoinHandle<Result<AuthenticationContext>>,
}

impl FlowHandle {
    /// The flow's current state.
    pub fn state(&self) -> FlowState {
        *self.tracker.state.borrow()
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.tracker.state.subscribe()
    }

    /// Every state entered so far, starting with `Init`.
    pub fn history(&self) -> Vec<FlowState> {
        self.tracker
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Waits for the flow to finish.
    ///
    /// # Errors
    ///
    /// Returns the flow's error, or [`OidcError::Client`] if the task was
    /// aborted or panicked.
    pub async fn join(self) -> Result<AuthenticationContext> {
        self.task
            .await
            .map_err(|e| OidcError::Client(format!("authorization task did not finish: {e}")))?
    }

    /// Cancels the flow. Any open authorization session is released.
    pub fn abort(&self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// LogoutOutcome
// ---------------------------------------------------------------------------

/// Result of [`FlowOrchestrator::logout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The end-session URL was handed to the user agent and the context was
    /// cleared.
    Dispatched(Url),
    /// No discovery document or no `end_session_endpoint`; nothing was done.
    Skipped,
}

// ---------------------------------------------------------------------------
// FlowOrchestrator
// ---------------------------------------------------------------------------

/// Runs the authorization code flow against one provider.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use oidc_agent::auth::loopback::LoopbackAuthorizer;
/// use oidc_agent::auth::orchestrator::FlowOrchestrator;
/// use oidc_agent::config::{ClientConfig, HttpConfig};
///
/// # async fn example() -> oidc_agent::error::Result<()> {
/// let config = ClientConfig::new(
///     "my-app",
///     "openid profile",
///     "http://127.0.0.1:8400/callback",
///     "https://idp.example/.well-known/openid-configuration",
/// )?;
/// let loopback = Arc::new(LoopbackAuthorizer::new(true));
/// let orchestrator =
///     FlowOrchestrator::new(config, &HttpConfig::default(), loopback.clone(), loopback)?;
///
/// let context = orchestrator.authorize(true).await?;
/// if let Some(user) = context.user() {
///     println!("signed in as {}", user.username);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FlowOrchestrator {
    config: Arc<ClientConfig>,
    discovery: DiscoveryClient,
    tokens: TokenClient,
    userinfo: UserInfoClient,
    authorizer: Arc<dyn AuthorizationStep>,
    user_agent: Arc<dyn UserAgent>,
}

impl std::fmt::Debug for FlowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FlowOrchestrator {
    /// Creates an orchestrator with HTTP clients built from `http_config`.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Configuration`] if an HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        http_config: &HttpConfig,
        authorizer: Arc<dyn AuthorizationStep>,
        user_agent: Arc<dyn UserAgent>,
    ) -> Result<Self> {
        let client = http::build_client(http_config)?;
        let no_redirect = http::build_no_redirect_client(http_config)?;

        Ok(Self {
            config: Arc::new(config),
            discovery: DiscoveryClient::new(client.clone()),
            tokens: TokenClient::new(client),
            userinfo: UserInfoClient::new(no_redirect),
            authorizer,
            user_agent,
        })
    }

    /// The client configuration this orchestrator runs with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetches the provider's discovery document without starting a flow.
    pub async fn discover(&self) -> Result<DiscoveryDocument> {
        self.discovery.fetch(self.config.discovery_uri().as_str()).await
    }

    /// Runs the flow to completion and returns the populated context.
    ///
    /// With `call_userinfo` set, userinfo is fetched after the token
    /// exchange. A userinfo failure is logged and does not fail the flow.
    ///
    /// # Errors
    ///
    /// - [`OidcError::Client`] for a malformed discovery URI or a discovery
    ///   document lacking the authorization or token endpoint.
    /// - [`OidcError::Server`] when discovery or the token exchange fails,
    ///   or the ID token cannot be decoded.
    /// - [`OidcError::Authorization`] when the authorization step fails or
    ///   the redirect `state` does not match.
    pub async fn authorize(&self, call_userinfo: bool) -> Result<AuthenticationContext> {
        self.run(call_userinfo, &FlowTracker::new()).await
    }

    /// Starts the flow on a new task and returns a handle to observe it.
    pub fn spawn_authorize(self: &Arc<Self>, call_userinfo: bool) -> FlowHandle {
        let tracker = FlowTracker::new();
        let orchestrator = Arc::clone(self);
        let task_tracker = tracker.clone();
        let task =
            tokio::spawn(async move { orchestrator.run(call_userinfo, &task_tracker).await });
        FlowHandle { tracker, task }
    }

    /// Starts the flow on a new task and reports the outcome through
    /// exactly one of the two callbacks.
    pub fn authorize_with_callbacks<S, F>(
        self: &Arc<Self>,
        call_userinfo: bool,
        on_success: S,
        on_failure: F,
    ) -> JoinHandle<()>
    where
        S: FnOnce(AuthenticationContext) + Send + 'static,
        F: FnOnce(OidcError) + Send + 'static,
    {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            match orchestrator.authorize(call_userinfo).await {
                Ok(context) => on_success(context),
                Err(e) => on_failure(e),
            }
        })
    }

    /// Fetches userinfo for an existing context.
    ///
    /// Returns the cached response when `ctx` already has one.
    ///
    /// # Errors
    ///
    /// See [`UserInfoClient::fetch`].
    pub async fn get_user_info(&self, ctx: &mut AuthenticationContext) -> Result<UserInfoResponse> {
        self.userinfo.fetch(ctx).await
    }

    /// Ends the provider session and clears `ctx`.
    ///
    /// The end-session URL carries `id_token_hint` when an ID token is held
    /// and always carries `post_logout_redirect_uri`. When `ctx` has no
    /// discovery document or the provider publishes no end-session endpoint,
    /// nothing happens and `ctx` is left as is.
    ///
    /// # Errors
    ///
    /// Returns the user agent's error if it cannot present the URL. `ctx` is
    /// not cleared in that case.
    pub async fn logout(&self, ctx: &mut AuthenticationContext) -> Result<LogoutOutcome> {
        let Some(end_session) = ctx.discovery().and_then(|d| d.end_session_endpoint()) else {
            tracing::info!("No end_session_endpoint available, skipping logout");
            return Ok(LogoutOutcome::Skipped);
        };

        let id_token = ctx.token().and_then(|t| t.id_token.as_deref());
        let url = self.end_session_url(end_session, id_token);

        self.user_agent.present(&url).await?;
        ctx.dispose();
        tracing::info!("Logged out; authentication context cleared");

        Ok(LogoutOutcome::Dispatched(url))
    }

    fn end_session_url(&self, mut endpoint: Url, id_token: Option<&str>) -> Url {
        {
            let mut query = endpoint.query_pairs_mut();
            if let Some(id_token) = id_token {
                query.append_pair(ID_TOKEN_HINT, id_token);
            }
            query.append_pair(POST_LOGOUT_REDIRECT_URI, self.config.redirect_uri().as_str());
        }
        endpoint
    }

    async fn run(
        &self,
        call_userinfo: bool,
        tracker: &FlowTracker,
    ) -> Result<AuthenticationContext> {
        let mut context = AuthenticationContext::new();
        match self.drive(&mut context, call_userinfo, tracker).await {
            Ok(()) => {
                tracker.enter(FlowState::Complete);
                tracing::info!(
                    "Authorization complete for client {}",
                    self.config.client_id()
                );
                Ok(context)
            }
            Err(e) => {
                tracker.enter(FlowState::Failed);
                tracing::warn!("Authorization failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        context: &mut AuthenticationContext,
        call_userinfo: bool,
        tracker: &FlowTracker,
    ) -> Result<()> {
        tracker.enter(FlowState::Discovering);
        let document = self.discover().await?;
        let request = self.authorization_request(&document)?;
        context.set_discovery(document);

        tracker.enter(FlowState::AwaitingAuthorization);
        let session = AuthorizationSession::new();
        let response = self.authorizer.authorize(&request, &session).await?;

        if response.state.as_deref() != Some(request.state.as_str()) {
            return Err(OidcError::Authorization(
                "state returned by the provider does not match the request".to_string(),
            ));
        }

        tracker.enter(FlowState::ExchangingToken);
        let exchanged = self.tokens.exchange(&request, &response).await;
        session.release();
        let token = exchanged?;

        let user = match token.id_token_claims()? {
            Some(claims) => Some(User::from_claims(claims.claims())?),
            None => {
                tracing::debug!("Token response carries no id_token");
                None
            }
        };
        context.set_token(token);
        if let Some(user) = user {
            context.set_user(user);
        }

        if call_userinfo {
            tracker.enter(FlowState::FetchingUserInfo);
            if let Err(e) = self.userinfo.fetch(context).await {
                tracing::warn!("Userinfo request failed, continuing without it: {}", e);
            }
        }

        Ok(())
    }

    fn authorization_request(&self, document: &DiscoveryDocument) -> Result<AuthorizationRequest> {
        let authorization_endpoint = document.authorization_endpoint().ok_or_else(|| {
            OidcError::Client(
                "discovery document has no usable authorization_endpoint".to_string(),
            )
        })?;
        let token_endpoint = document.token_endpoint().ok_or_else(|| {
            OidcError::Client("discovery document has no usable token_endpoint".to_string())
        })?;

        Ok(AuthorizationRequest::new(
            authorization_endpoint,
            token_endpoint,
            &self.config,
        ))
    }
}
