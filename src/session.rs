//! Session management for an authenticated connection to the service.
//!
//! Provides the one piece of mutable state a lifecycle controller owns:
//! - Server endpoint, domain/project and proxy settings
//! - Credentials used for (re-)authentication
//! - Whether the service currently considers us logged in

use std::fmt;

use tracing::{info, warn};

use crate::gateway::PcGateway;

/// Outgoing proxy settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Where the service lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Host, optionally with `:port`
    pub server: String,
    pub https: bool,
    pub domain: String,
    pub project: String,
    pub proxy: Option<ProxySettings>,
}

impl ServerSettings {
    pub fn new(server: impl Into<String>, domain: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            https: false,
            domain: domain.into(),
            project: project.into(),
            proxy: None,
        }
    }

    pub fn https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn protocol(&self) -> &'static str {
        if self.https { "https" } else { "http" }
    }

    /// `protocol://server`, without a trailing slash
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}",
            self.protocol(),
            self.server.trim_end_matches('/')
        )
    }
}

/// Login credentials. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// An authenticated (or not yet authenticated) session with the service
#[derive(Debug, Clone)]
pub struct Session {
    pub settings: ServerSettings,
    pub credentials: Credentials,
    authenticated: bool,
}

impl Session {
    /// Create an unauthenticated session
    pub fn new(settings: ServerSettings, credentials: Credentials) -> Self {
        if let Some(proxy) = &settings.proxy {
            info!(proxy = %proxy.url, "Using proxy");
        }
        Self {
            settings,
            credentials,
            authenticated: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Authenticate with the configured credentials.
    ///
    /// Failures of any kind are logged and reported as `false`.
    pub fn login<G: PcGateway + ?Sized>(&mut self, gateway: &G) -> bool {
        info!(
            server = %self.settings.base_url(),
            user = %self.credentials.user,
            "Trying to login"
        );
        self.authenticated = match gateway.authenticate(&self.credentials.user, self.credentials.password()) {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Login request failed");
                false
            }
        };
        info!(
            "Login {}",
            if self.authenticated { "succeeded" } else { "failed" }
        );
        self.authenticated
    }

    /// End the session. Succeeds trivially when not logged in.
    pub fn logout<G: PcGateway + ?Sized>(&mut self, gateway: &G) -> bool {
        if !self.authenticated {
            return true;
        }

        let succeeded = match gateway.logout() {
            Ok(succeeded) => succeeded,
            Err(e) => {
                warn!(error = %e, "Logout request failed");
                false
            }
        };
        self.authenticated = !succeeded;
        info!("Logout {}", if succeeded { "succeeded" } else { "failed" });
        succeeded
    }
}
