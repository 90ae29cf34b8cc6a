//! Identity of the current actor.
//!
//! Authentication happens once per session: the configured [`Authenticator`]
//! produces credentials, the [`IdentityService`] trades them for a bearer
//! token, and `who_am_i` turns the token into an [`Identity`]. The result is
//! memoized by [`IdentityResolver`] for the lifetime of the session. There is
//! no token refresh and no retry; every failure here is fatal.

use crate::config::{AuthenticatorKind, Config};
use crate::error::{LeaseError, Result};
use crate::storage::StatusResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// An account, unique across federated identity providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub idp: String,
    pub opaque_id: String,
}

impl Identity {
    pub fn new(
        username: impl Into<String>,
        idp: impl Into<String>,
        opaque_id: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            idp: idp.into(),
            opaque_id: opaque_id.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.idp)
    }
}

/// What the identity service is asked to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Client id and secret, checked by the gateway.
    Password {
        client_id: String,
        client_secret: String,
        login_type: String,
    },
    /// An externally issued token, passed through with its scheme.
    Bearer { scheme: String, token: String },
}

/// The identity service collaborator.
pub trait IdentityService: Send + Sync {
    /// Exchange credentials for a bearer token.
    fn authenticate(&self, credentials: &Credentials) -> StatusResult<String>;

    /// Resolve the identity behind a token.
    fn who_am_i(&self, token: &str) -> StatusResult<Identity>;
}

/// Where a pre-issued token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Inline(String),
    /// Read when authenticating, trimmed of surrounding whitespace.
    File(PathBuf),
}

impl TokenSource {
    fn from_options(inline: Option<&str>, file: Option<&str>, what: &str) -> Result<Self> {
        match (inline, file) {
            (Some(token), _) if !token.is_empty() => Ok(TokenSource::Inline(token.to_string())),
            (_, Some(path)) if !path.is_empty() => Ok(TokenSource::File(PathBuf::from(path))),
            _ => Err(LeaseError::ConfigError(format!(
                "{} authentication needs either {}_token or {}_file",
                what, what, what
            ))),
        }
    }

    fn read(&self) -> Result<String> {
        match self {
            TokenSource::Inline(token) => Ok(token.clone()),
            TokenSource::File(path) => std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| {
                    LeaseError::AuthenticationFailure(format!(
                        "failed to read token file '{}': {}",
                        path.display(),
                        e
                    ))
                }),
        }
    }
}

/// How this session authenticates. Chosen once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticator {
    RevaPassword {
        client_id: String,
        client_secret: String,
        login_type: String,
    },
    OAuth(TokenSource),
    Eos(TokenSource),
}

impl Authenticator {
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.authenticator {
            AuthenticatorKind::RevaPassword => Ok(Authenticator::RevaPassword {
                client_id: config.client_id.clone().unwrap_or_default(),
                client_secret: config.client_secret.clone().unwrap_or_default(),
                login_type: config.login_type.clone(),
            }),
            AuthenticatorKind::Oauth => Ok(Authenticator::OAuth(TokenSource::from_options(
                config.oauth_token.as_deref(),
                config.oauth_file.as_deref(),
                "oauth",
            )?)),
            AuthenticatorKind::Eos => Ok(Authenticator::Eos(TokenSource::from_options(
                config.eos_token.as_deref(),
                config.eos_file.as_deref(),
                "eos",
            )?)),
        }
    }

    /// Build the credentials to present. Token files are read here.
    pub fn credentials(&self) -> Result<Credentials> {
        match self {
            Authenticator::RevaPassword {
                client_id,
                client_secret,
                login_type,
            } => Ok(Credentials::Password {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                login_type: login_type.clone(),
            }),
            Authenticator::OAuth(source) | Authenticator::Eos(source) => Ok(Credentials::Bearer {
                scheme: "bearer".to_string(),
                token: source.read()?,
            }),
        }
    }
}

/// Resolves the current identity once and caches it.
pub struct IdentityResolver {
    service: Arc<dyn IdentityService>,
    authenticator: Authenticator,
    resolved: OnceLock<Identity>,
}

impl IdentityResolver {
    pub fn new(service: Arc<dyn IdentityService>, authenticator: Authenticator) -> Self {
        Self {
            service,
            authenticator,
            resolved: OnceLock::new(),
        }
    }

    /// The identity behind this session.
    ///
    /// The first call authenticates and asks the service who we are; later
    /// calls return the cached answer. Failures are not cached.
    pub fn current_identity(&self) -> Result<Identity> {
        if let Some(identity) = self.resolved.get() {
            return Ok(identity.clone());
        }

        let credentials = self.authenticator.credentials()?;
        let token = self
            .service
            .authenticate(&credentials)
            .map_err(|s| LeaseError::AuthenticationFailure(s.message))?;
        let identity = self
            .service
            .who_am_i(&token)
            .map_err(|s| LeaseError::AuthenticationFailure(s.message))?;

        info!(user = %identity, "resolved session identity");
        Ok(self.resolved.get_or_init(|| identity).clone())
    }
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("resolved", &self.resolved.get())
            .finish_non_exhaustive()
    }
}

/// Identity taken from the local account, for the CLI.
///
/// The username comes from `$USER` (or `$USERNAME`), the identity provider
/// is the host name.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalIdentityService;

impl IdentityService for LocalIdentityService {
    fn authenticate(&self, credentials: &Credentials) -> StatusResult<String> {
        let kind = match credentials {
            Credentials::Password { .. } => "password",
            Credentials::Bearer { .. } => "bearer",
        };
        debug!(kind, "local authentication accepts any credentials");
        Ok("local".to_string())
    }

    fn who_am_i(&self, _token: &str) -> StatusResult<Identity> {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Identity::new(user.clone(), host, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Status, StatusCode};
    use crate::test_support::StaticIdentityService;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn einstein() -> Identity {
        Identity::new("einstein", "cernbox.cern.ch", "4c510ada")
    }

    #[test]
    fn identity_equality_uses_all_fields() {
        assert_eq!(einstein(), einstein());
        assert_ne!(einstein(), Identity::new("einstein", "other.idp", "4c510ada"));
        assert_ne!(einstein(), Identity::new("einstein", "cernbox.cern.ch", "ffff"));
    }

    #[test]
    fn resolver_memoizes_identity() {
        let service = Arc::new(StaticIdentityService::new(einstein()));
        let resolver = IdentityResolver::new(
            service.clone(),
            Authenticator::OAuth(TokenSource::Inline("t".to_string())),
        );

        assert_eq!(resolver.current_identity().unwrap(), einstein());
        assert_eq!(resolver.current_identity().unwrap(), einstein());
        assert_eq!(service.who_am_i_calls(), 1);
    }

    #[test]
    fn resolver_failure_is_authentication_failure() {
        let service = Arc::new(StaticIdentityService::failing(Status::new(
            StatusCode::Unauthenticated,
            "bad token",
        )));
        let resolver = IdentityResolver::new(
            service,
            Authenticator::OAuth(TokenSource::Inline("t".to_string())),
        );

        let err = resolver.current_identity().unwrap_err();
        assert!(matches!(err, LeaseError::AuthenticationFailure(_)));
        assert_eq!(err.exit_code(), crate::exit_codes::AUTH_FAILURE);
    }

    #[test]
    fn token_file_is_read_and_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  abc123  ").unwrap();

        let auth = Authenticator::Eos(TokenSource::File(file.path().to_path_buf()));
        assert_eq!(
            auth.credentials().unwrap(),
            Credentials::Bearer {
                scheme: "bearer".to_string(),
                token: "abc123".to_string()
            }
        );
    }

    #[test]
    fn eos_and_oauth_present_the_same_bearer_token() {
        let token = TokenSource::Inline("tok".to_string());
        assert_eq!(
            Authenticator::Eos(token.clone()).credentials().unwrap(),
            Authenticator::OAuth(token).credentials().unwrap()
        );
    }

    #[test]
    fn missing_token_file_fails_authentication() {
        let auth = Authenticator::OAuth(TokenSource::File(PathBuf::from("/nonexistent/token")));
        assert!(matches!(
            auth.credentials().unwrap_err(),
            LeaseError::AuthenticationFailure(_)
        ));
    }

    #[test]
    fn authenticator_from_config() {
        let mut config = Config::default();
        config.client_id = Some("einstein".to_string());
        config.client_secret = Some("relativity".to_string());
        assert_eq!(
            Authenticator::from_config(&config).unwrap(),
            Authenticator::RevaPassword {
                client_id: "einstein".to_string(),
                client_secret: "relativity".to_string(),
                login_type: "basic".to_string(),
            }
        );

        config.authenticator = AuthenticatorKind::Oauth;
        config.oauth_file = Some("/tmp/token".to_string());
        assert_eq!(
            Authenticator::from_config(&config).unwrap(),
            Authenticator::OAuth(TokenSource::File(PathBuf::from("/tmp/token")))
        );

        config.authenticator = AuthenticatorKind::Eos;
        assert!(matches!(
            Authenticator::from_config(&config).unwrap_err(),
            LeaseError::ConfigError(_)
        ));
    }

    #[test]
    fn local_identity_uses_hostname_as_idp() {
        let service = LocalIdentityService;
        let token = service
            .authenticate(&Credentials::Bearer {
                scheme: "bearer".to_string(),
                token: String::new(),
            })
            .unwrap();
        let identity = service.who_am_i(&token).unwrap();
        assert!(!identity.username.is_empty());
        assert!(!identity.idp.is_empty());
        assert_eq!(identity.username, identity.opaque_id);
    }
}
