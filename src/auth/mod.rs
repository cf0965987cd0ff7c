//! OpenID Connect authorization code flow
//!
//! # Module Layout
//!
//! - [`discovery`]     -- provider metadata retrieval and endpoint lookup
//! - [`authorization`] -- authorization request, session and collaborator traits
//! - [`pkce`]          -- PKCE `S256` verifier and challenge generation
//! - [`token`]         -- authorization code exchange and ID token claims
//! - [`userinfo`]      -- userinfo endpoint client
//! - [`context`]       -- per-user authentication state and the derived user
//! - [`orchestrator`]  -- the flow state machine, userinfo and logout
//! - [`loopback`]      -- browser plus loopback listener collaborator
//! - [`http`]          -- shared HTTP client construction

pub mod authorization;
pub mod context;
pub mod discovery;
pub mod http;
pub mod loopback;
pub mod orchestrator;
pub mod pkce;
pub mod token;
pub mod userinfo;
