//! Service lifecycle control against the GIS server admin API.
//!
//! Structural changes (domains, relationship classes) need an exclusive
//! schema lock, so the hosting services are stopped first and restarted
//! afterwards. Services are driven strictly one at a time; the first
//! failure aborts the whole operation.

use std::fmt;
use std::str::FromStr;

use log::info;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::PortalInfo;

/// Start or stop, as requested on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// Bring services up.
    Start,
    /// Take services down.
    Stop,
}

impl ServiceAction {
    /// REST verb for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl FromStr for ServiceAction {
    type Err = ServiceActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(ServiceActionError::Invalid {
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned when parsing a [`ServiceAction`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceActionError {
    /// The value was neither start nor stop.
    #[error("invalid service action {value:?}; valid values are \"START\" or \"STOP\"")]
    Invalid {
        /// The rejected value.
        value: String,
    },
}

/// Errors raised while controlling services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configured server URL did not parse.
    #[error("invalid server url {url:?}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// Requesting a sign-in token failed.
    #[error("failed to sign in to the server")]
    Token {
        /// Underlying HTTP failure.
        #[source]
        source: reqwest::Error,
    },
    /// The server declined the sign-in.
    #[error("the server rejected the sign-in credentials")]
    TokenRejected,
    /// Listing services failed.
    #[error("failed to list services (folder: {folder:?})")]
    List {
        /// Folder being listed, `None` for the root.
        folder: Option<String>,
        /// Underlying HTTP failure.
        #[source]
        source: reqwest::Error,
    },
    /// Issuing a start/stop failed.
    #[error("failed to {action} service {service:?}")]
    Action {
        /// Service being driven.
        service: String,
        /// Action being issued.
        action: ServiceAction,
        /// Underlying HTTP failure.
        #[source]
        source: reqwest::Error,
    },
    /// The server reported a non-success status for a start/stop.
    #[error("service {service:?} reported {status:?} for {action}")]
    Failed {
        /// Service being driven.
        service: String,
        /// Action being issued.
        action: ServiceAction,
        /// Status string returned by the server.
        status: String,
    },
}

/// A host whose services can be enumerated and driven.
pub trait ServiceHost {
    /// Names of the services at the root, or inside `folder`.
    fn service_names(&self, folder: Option<&str>) -> Result<Vec<String>, ServiceError>;

    /// Issue one start or stop.
    fn apply(&self, service: &str, action: ServiceAction) -> Result<(), ServiceError>;
}

/// Apply `action` to every root service plus every service in `folders`,
/// sequentially. The first failure aborts and is the overall result.
/// Returns the services driven.
pub fn apply_to_all(
    host: &dyn ServiceHost,
    folders: &[String],
    action: ServiceAction,
) -> Result<Vec<String>, ServiceError> {
    let mut services = host.service_names(None)?;
    for folder in folders {
        services.extend(host.service_names(Some(folder))?);
    }
    for service in &services {
        host.apply(service, action)?;
        match action {
            ServiceAction::Start => info!("...Started service: {service}"),
            ServiceAction::Stop => info!("...Stopped service: {service}"),
        }
    }
    Ok(services)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServicesResponse {
    #[serde(default)]
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    #[serde(rename = "serviceName")]
    service_name: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// Blocking client against the server admin REST API.
pub struct PortalClient {
    base: Url,
    token: String,
    client: reqwest::blocking::Client,
}

impl fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl PortalClient {
    /// Sign in and hold the returned token for the run.
    pub fn connect(portal: &PortalInfo) -> Result<Self, ServiceError> {
        let mut base = Url::parse(&portal.url).map_err(|source| ServiceError::InvalidUrl {
            url: portal.url.clone(),
            source,
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::blocking::Client::new();
        let token_url = base
            .join("generateToken")
            .map_err(|source| ServiceError::InvalidUrl {
                url: portal.url.clone(),
                source,
            })?;
        let response: TokenResponse = client
            .post(token_url)
            .form(&[
                ("username", portal.username.as_str()),
                ("password", portal.password.as_str()),
                ("f", "json"),
            ])
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|response| response.json())
            .map_err(|source| ServiceError::Token { source })?;
        let token = response.token.ok_or(ServiceError::TokenRejected)?;

        Ok(Self {
            base,
            token,
            client,
        })
    }

    fn join(&self, relative: &str) -> Result<Url, ServiceError> {
        self.base
            .join(relative)
            .map_err(|source| ServiceError::InvalidUrl {
                url: self.base.as_str().to_owned(),
                source,
            })
    }
}

impl ServiceHost for PortalClient {
    fn service_names(&self, folder: Option<&str>) -> Result<Vec<String>, ServiceError> {
        let relative = folder.map_or_else(
            || "services".to_owned(),
            |name| format!("services/{name}"),
        );
        let url = self.join(&relative)?;
        let response: ServicesResponse = self
            .client
            .get(url)
            .query(&[("f", "json"), ("token", self.token.as_str())])
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|response| response.json())
            .map_err(|source| ServiceError::List {
                folder: folder.map(str::to_owned),
                source,
            })?;
        Ok(response
            .services
            .into_iter()
            .map(|entry| entry.service_name)
            .collect())
    }

    fn apply(&self, service: &str, action: ServiceAction) -> Result<(), ServiceError> {
        let url = self.join(&format!("services/{service}/{}", action.as_str()))?;
        let response: StatusResponse = self
            .client
            .post(url)
            .form(&[("f", "json"), ("token", self.token.as_str())])
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|response| response.json())
            .map_err(|source| ServiceError::Action {
                service: service.to_owned(),
                action,
                source,
            })?;
        if !response.status.eq_ignore_ascii_case("success") {
            return Err(ServiceError::Failed {
                service: service.to_owned(),
                action,
                status: response.status,
            });
        }
        Ok(())
    }
}
