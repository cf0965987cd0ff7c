//! Configuration management for the OIDC agent
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! The loaded [`Config`] is a mutable, layered settings value. The flow
//! itself only ever sees the validated, immutable [`ClientConfig`] produced
//! by [`Config::client_config`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OidcError, Result};

/// Path appended to an issuer URI to derive its discovery document location.
pub const DISCOVERY_PATH: &str = "/oauth2/oidcdiscovery/.well-known/openid-configuration";

/// Main configuration structure for the OIDC agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Relying-party client registration settings
    #[serde(default)]
    pub client: ClientSettings,
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Flow behaviour settings
    #[serde(default)]
    pub flow: FlowConfig,
}

/// Raw client registration settings as they appear in the config file
///
/// Every field is optional here; presence and shape are enforced when the
/// settings are turned into a [`ClientConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSettings {
    /// OAuth client identifier
    #[serde(default)]
    pub client_id: Option<String>,

    /// Space-separated scopes requested during authorization
    #[serde(default, alias = "scope")]
    pub authorization_scope: Option<String>,

    /// Redirect URI registered for this client
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Location of the provider's discovery document
    #[serde(default)]
    pub discovery_uri: Option<String>,

    /// Provider issuer. Used to derive `discovery_uri` when that is not set.
    #[serde(default)]
    pub issuer_uri: Option<String>,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("oidc-agent/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

/// Flow behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Fetch userinfo after a successful token exchange
    #[serde(default)]
    pub call_userinfo: bool,

    /// Try to open the system browser for the authorization URL
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_open_browser() -> bool {
    true
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            call_userinfo: false,
            open_browser: default_open_browser(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and the client
    /// settings are expected to come from the environment or the CLI.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file (YAML or JSON)
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Configuration`] if the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parses a configuration file. JSON files are accepted since YAML is a
    /// superset of the JSON used by provider-issued config snippets.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OidcError::Configuration(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| OidcError::Configuration(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("OIDC_AGENT_CLIENT_ID") {
            self.client.client_id = Some(client_id);
        }

        if let Ok(scope) = std::env::var("OIDC_AGENT_SCOPE") {
            self.client.authorization_scope = Some(scope);
        }

        if let Ok(redirect_uri) = std::env::var("OIDC_AGENT_REDIRECT_URI") {
            self.client.redirect_uri = Some(redirect_uri);
        }

        if let Ok(discovery_uri) = std::env::var("OIDC_AGENT_DISCOVERY_URI") {
            self.client.discovery_uri = Some(discovery_uri);
        }

        if let Ok(issuer_uri) = std::env::var("OIDC_AGENT_ISSUER_URI") {
            self.client.issuer_uri = Some(issuer_uri);
        }

        if let Ok(timeout) = std::env::var("OIDC_AGENT_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.http.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid OIDC_AGENT_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(call_userinfo) = std::env::var("OIDC_AGENT_CALL_USERINFO") {
            if let Ok(value) = call_userinfo.parse() {
                self.flow.call_userinfo = value;
            } else {
                tracing::warn!("Invalid OIDC_AGENT_CALL_USERINFO: {}", call_userinfo);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(client_id) = &cli.client_id {
            self.client.client_id = Some(client_id.clone());
        }
        if let Some(scope) = &cli.scope {
            self.client.authorization_scope = Some(scope.clone());
        }
        if let Some(redirect_uri) = &cli.redirect_uri {
            self.client.redirect_uri = Some(redirect_uri.clone());
        }
        if let Some(discovery_uri) = &cli.discovery_uri {
            self.client.discovery_uri = Some(discovery_uri.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Configuration`] when the client settings do not
    /// form a valid [`ClientConfig`] or an HTTP setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_seconds == 0 {
            return Err(OidcError::Configuration(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }
        self.client_config().map(|_| ())
    }

    /// Builds the immutable [`ClientConfig`] the flow runs with.
    ///
    /// When `discovery_uri` is absent it is derived from `issuer_uri`.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let settings = &self.client;
        let discovery_uri = match (&settings.discovery_uri, &settings.issuer_uri) {
            (Some(discovery), _) if !discovery.trim().is_empty() => discovery.clone(),
            (_, Some(issuer)) if !issuer.trim().is_empty() => derive_discovery_uri(issuer.trim()),
            _ => {
                return Err(OidcError::Configuration(
                    "discovery_uri is required but not specified in the configuration"
                        .to_string(),
                ))
            }
        };

        ClientConfig::new(
            required_string("client_id", settings.client_id.as_deref())?,
            required_string("authorization_scope", settings.authorization_scope.as_deref())?,
            &required_string("redirect_uri", settings.redirect_uri.as_deref())?,
            &discovery_uri,
        )
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Validated relying-party configuration.
///
/// Immutable once constructed. Both URIs are absolute, hierarchical and carry
/// no user-info, query or fragment.
///
/// # Examples
///
/// ```
/// use oidc_agent::config::ClientConfig;
///
/// let config = ClientConfig::new(
///     "my-app",
///     "openid profile",
///     "http://127.0.0.1:8400/callback",
///     "https://idp.example/.well-known/openid-configuration",
/// )
/// .unwrap();
/// assert_eq!(config.client_id(), "my-app");
///
/// assert!(ClientConfig::new(
///     "my-app",
///     "openid",
///     "http://127.0.0.1:8400/callback?x=1",
///     "https://idp.example/.well-known/openid-configuration",
/// )
/// .is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    client_id: String,
    scope: String,
    redirect_uri: Url,
    discovery_uri: Url,
}

impl ClientConfig {
    /// Validates and builds a client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Configuration`] if a value is empty or a URI
    /// violates the shape constraints.
    pub fn new(
        client_id: impl Into<String>,
        scope: impl Into<String>,
        redirect_uri: &str,
        discovery_uri: &str,
    ) -> Result<Self> {
        let client_id = required_string("client_id", Some(&client_id.into()))?;
        let scope = required_string("authorization_scope", Some(&scope.into()))?;
        let redirect_uri = validate_uri("redirect_uri", redirect_uri)?;
        let discovery_uri = validate_uri("discovery_uri", discovery_uri)?;

        Ok(Self {
            client_id,
            scope,
            redirect_uri,
            discovery_uri,
        })
    }

    /// OAuth client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Space-separated scopes requested during authorization.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Registered redirect URI.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Discovery document location.
    pub fn discovery_uri(&self) -> &Url {
        &self.discovery_uri
    }
}

fn required_string(name: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(OidcError::Configuration(format!(
            "{} is required but not specified in the configuration",
            name
        ))),
    }
}

/// Checks that `value` is an absolute, hierarchical URI without user-info,
/// query or fragment.
pub fn validate_uri(name: &str, value: &str) -> Result<Url> {
    let uri = Url::parse(value.trim()).map_err(|e| {
        OidcError::Configuration(format!("{} must be an absolute URI ({}): {}", name, value, e))
    })?;

    if uri.cannot_be_a_base() {
        return Err(OidcError::Configuration(format!(
            "{} must be hierarchical and absolute: {}",
            name, value
        )));
    }
    if !uri.username().is_empty() || uri.password().is_some() {
        return Err(OidcError::Configuration(format!(
            "{} must not have user info: {}",
            name, value
        )));
    }
    if uri.query().is_some_and(|q| !q.is_empty()) {
        return Err(OidcError::Configuration(format!(
            "{} must not have query parameters: {}",
            name, value
        )));
    }
    if uri.fragment().is_some_and(|f| !f.is_empty()) {
        return Err(OidcError::Configuration(format!(
            "{} must not have a fragment: {}",
            name, value
        )));
    }

    Ok(uri)
}

fn derive_discovery_uri(issuer: &str) -> String {
    if issuer.contains(DISCOVERY_PATH) {
        issuer.to_string()
    } else {
        format!("{}{}", issuer.trim_end_matches('/'), DISCOVERY_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use serial_test::serial;

    const DISCOVERY: &str = "https://idp.example/.well-known/openid-configuration";
    const REDIRECT: &str = "http://127.0.0.1:8400/callback";

    fn settings() -> ClientSettings {
        ClientSettings {
            client_id: Some("my-app".to_string()),
            authorization_scope: Some("openid profile".to_string()),
            redirect_uri: Some(REDIRECT.to_string()),
            discovery_uri: Some(DISCOVERY.to_string()),
            issuer_uri: None,
        }
    }

    fn clear_env() {
        for key in [
            "OIDC_AGENT_CLIENT_ID",
            "OIDC_AGENT_SCOPE",
            "OIDC_AGENT_REDIRECT_URI",
            "OIDC_AGENT_DISCOVERY_URI",
            "OIDC_AGENT_ISSUER_URI",
            "OIDC_AGENT_TIMEOUT_SECONDS",
            "OIDC_AGENT_CALL_USERINFO",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http.timeout_seconds, 30);
        assert!(config.http.user_agent.starts_with("oidc-agent/"));
        assert!(!config.flow.call_userinfo);
        assert!(config.flow.open_browser);
    }

    #[test]
    fn test_client_config_from_settings() {
        let config = Config {
            client: settings(),
            ..Default::default()
        };
        let client = config.client_config().unwrap();
        assert_eq!(client.client_id(), "my-app");
        assert_eq!(client.scope(), "openid profile");
        assert_eq!(client.redirect_uri().as_str(), REDIRECT);
        assert_eq!(client.discovery_uri().as_str(), DISCOVERY);
    }

    #[test]
    fn test_client_config_trims_values() {
        let config = ClientConfig::new("  my-app ", " openid ", REDIRECT, DISCOVERY).unwrap();
        assert_eq!(config.client_id(), "my-app");
        assert_eq!(config.scope(), "openid");
    }

    #[test]
    fn test_missing_client_id_is_configuration_error() {
        let mut s = settings();
        s.client_id = None;
        let config = Config {
            client: s,
            ..Default::default()
        };
        let err = config.client_config().unwrap_err();
        assert!(matches!(err, OidcError::Configuration(_)));
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_blank_scope_is_configuration_error() {
        let mut s = settings();
        s.authorization_scope = Some("   ".to_string());
        let config = Config {
            client: s,
            ..Default::default()
        };
        let err = config.client_config().unwrap_err();
        assert!(err.to_string().contains("authorization_scope"));
    }

    #[test]
    fn test_missing_discovery_and_issuer_is_error() {
        let mut s = settings();
        s.discovery_uri = None;
        let config = Config {
            client: s,
            ..Default::default()
        };
        let err = config.client_config().unwrap_err();
        assert!(err.to_string().contains("discovery_uri"));
    }

    #[test]
    fn test_discovery_uri_derived_from_issuer() {
        let mut s = settings();
        s.discovery_uri = None;
        s.issuer_uri = Some("https://idp.example/".to_string());
        let config = Config {
            client: s,
            ..Default::default()
        };
        let client = config.client_config().unwrap();
        assert_eq!(
            client.discovery_uri().as_str(),
            "https://idp.example/oauth2/oidcdiscovery/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_issuer_already_containing_discovery_path_is_used_verbatim() {
        let issuer = "https://idp.example/t/acme/oauth2/oidcdiscovery/.well-known/openid-configuration";
        assert_eq!(derive_discovery_uri(issuer), issuer);
    }

    #[test]
    fn test_validate_uri_rejects_query() {
        let err = validate_uri("redirect_uri", "http://127.0.0.1/cb?x=1").unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn test_validate_uri_rejects_fragment() {
        let err = validate_uri("redirect_uri", "http://127.0.0.1/cb#frag").unwrap_err();
        assert!(err.to_string().contains("fragment"));
    }

    #[test]
    fn test_validate_uri_rejects_user_info() {
        let err = validate_uri("discovery_uri", "https://user:pw@idp.example/x").unwrap_err();
        assert!(err.to_string().contains("user info"));
    }

    #[test]
    fn test_validate_uri_rejects_relative() {
        assert!(validate_uri("discovery_uri", "/.well-known/openid-configuration").is_err());
    }

    #[test]
    fn test_validate_uri_rejects_opaque() {
        let err = validate_uri("redirect_uri", "mailto:someone@example.com").unwrap_err();
        assert!(err.to_string().contains("hierarchical"));
    }

    #[test]
    fn test_validate_uri_accepts_private_use_scheme() {
        let uri = validate_uri("redirect_uri", "com.example.app:/oauth2redirect").unwrap();
        assert_eq!(uri.scheme(), "com.example.app");
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config {
            client: settings(),
            ..Default::default()
        };
        config.http.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
client:
  client_id: "yaml-app"
  authorization_scope: "openid"
  redirect_uri: "http://127.0.0.1:9000/callback"
  discovery_uri: "https://idp.example/.well-known/openid-configuration"
flow:
  call_userinfo: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.client_id.as_deref(), Some("yaml-app"));
        assert!(config.flow.call_userinfo);
        assert!(config.flow.open_browser);
        assert_eq!(config.http.timeout_seconds, 30);
    }

    #[test]
    fn test_parse_json_config_with_scope_alias() {
        let json = r#"{"client": {"client_id": "json-app", "scope": "openid email",
            "redirect_uri": "http://127.0.0.1:9000/callback",
            "discovery_uri": "https://idp.example/.well-known/openid-configuration"}}"#;
        let config: Config = serde_yaml::from_str(json).unwrap();
        assert_eq!(
            config.client.authorization_scope.as_deref(),
            Some("openid email")
        );
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        clear_env();
        std::env::set_var("OIDC_AGENT_CLIENT_ID", "env-app");
        std::env::set_var("OIDC_AGENT_TIMEOUT_SECONDS", "5");
        std::env::set_var("OIDC_AGENT_CALL_USERINFO", "true");

        let mut config = Config {
            client: settings(),
            ..Default::default()
        };
        config.apply_env_vars();

        assert_eq!(config.client.client_id.as_deref(), Some("env-app"));
        assert_eq!(config.http.timeout_seconds, 5);
        assert!(config.flow.call_userinfo);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_timeout_is_ignored() {
        clear_env();
        std::env::set_var("OIDC_AGENT_TIMEOUT_SECONDS", "soon");

        let mut config = Config::default();
        config.apply_env_vars();
        assert_eq!(config.http.timeout_seconds, 30);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_cli_overrides_take_precedence_over_env() {
        clear_env();
        std::env::set_var("OIDC_AGENT_CLIENT_ID", "env-app");

        let cli = Cli::parse_from([
            "oidc-agent",
            "--client-id",
            "cli-app",
            "--config",
            "/nonexistent/oidc.yaml",
            "discover",
        ]);
        let config = Config::load("/nonexistent/oidc.yaml", &cli).unwrap();
        assert_eq!(config.client.client_id.as_deref(), Some("cli-app"));

        clear_env();
    }
}
