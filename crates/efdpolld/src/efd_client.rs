//! EFD query client.
//!
//! `EfdClient` is the seam the poller talks to. `HttpEfdClient` speaks the
//! InfluxDB 1.x HTTP API; tests use in-memory fakes.

use crate::config::EfdConfig;
use async_trait::async_trait;
use efd_shared::{EfdError, QueryResponse, ResultTable};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Longest body excerpt carried in an HTTP error
const ERROR_BODY_LIMIT: usize = 512;

#[async_trait]
pub trait EfdClient: Send + Sync {
    /// Run one InfluxQL statement and return its first series
    async fn query(&self, influxql: &str) -> Result<ResultTable, EfdError>;
}

/// Where and how to reach InfluxDB
#[derive(Debug, Clone, PartialEq)]
pub struct EfdConnection {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Payload returned by the credential service for an alias
#[derive(Debug, Clone, Deserialize)]
pub struct EfdCredentials {
    pub host: String,
    pub port: Value,
    #[serde(default)]
    pub path: String,
    pub username: String,
    pub password: String,
}

impl EfdCredentials {
    /// InfluxDB base URL: always https, path with a leading and no trailing slash
    pub fn base_url(&self) -> String {
        let port = match &self.port {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("https://{}:{}", self.host, port)
        } else {
            format!("https://{}:{}/{}", self.host, port, path)
        }
    }

    pub fn into_connection(self) -> EfdConnection {
        EfdConnection {
            base_url: self.base_url(),
            username: Some(self.username),
            password: Some(self.password),
        }
    }
}

/// Resolve an alias such as `summit_efd` through the credential service.
pub async fn lookup_credentials(
    http: &reqwest::Client,
    credentials_url: &str,
    alias: &str,
) -> Result<EfdCredentials, EfdError> {
    let url = format!("{}/creds/{}", credentials_url.trim_end_matches('/'), alias);
    debug!("Looking up EFD credentials at {}", url);

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| EfdError::Credentials(format!("{}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(EfdError::Credentials(format!(
            "{} returned HTTP {}",
            url,
            status.as_u16()
        )));
    }

    response
        .json::<EfdCredentials>()
        .await
        .map_err(|e| EfdError::Credentials(format!("bad payload for '{}': {}", alias, e)))
}

/// Explicit URL from config, otherwise a credential lookup by alias
pub async fn resolve_connection(
    http: &reqwest::Client,
    config: &EfdConfig,
) -> Result<EfdConnection, EfdError> {
    if let Some(url) = &config.url {
        return Ok(EfdConnection {
            base_url: url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        });
    }

    let creds = lookup_credentials(http, &config.credentials_url, &config.alias).await?;
    let connection = creds.into_connection();
    info!("Resolved EFD alias '{}' to {}", config.alias, connection.base_url);
    Ok(connection)
}

pub struct HttpEfdClient {
    http: reqwest::Client,
    connection: EfdConnection,
    database: String,
    timeout: Option<Duration>,
}

impl HttpEfdClient {
    pub fn new(connection: EfdConnection, database: &str, timeout: Option<Duration>) -> Self {
        Self::with_http(reqwest::Client::new(), connection, database, timeout)
    }

    pub fn with_http(
        http: reqwest::Client,
        connection: EfdConnection,
        database: &str,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            http,
            connection,
            database: database.to_string(),
            timeout,
        }
    }

    /// Resolve the connection from config and build a client
    pub async fn from_config(config: &EfdConfig) -> Result<Self, EfdError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("efdpolld/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EfdError::Transport(e.to_string()))?;
        let connection = resolve_connection(&http, config).await?;
        Ok(Self::with_http(
            http,
            connection,
            &config.database,
            config.query_timeout(),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.connection.base_url
    }
}

#[async_trait]
impl EfdClient for HttpEfdClient {
    async fn query(&self, influxql: &str) -> Result<ResultTable, EfdError> {
        let mut request = self
            .http
            .get(format!("{}/query", self.connection.base_url))
            .query(&[("db", self.database.as_str()), ("q", influxql)]);

        if let Some(user) = &self.connection.username {
            request = request.basic_auth(user, self.connection.password.as_ref());
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EfdError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EfdError::Transport(e.to_string()))?;

        if !status.is_success() {
            // InfluxDB reports bad statements as JSON {"error": ..} with a 4xx
            if let Err(err @ EfdError::Query(_)) = QueryResponse::from_json(&body) {
                return Err(err);
            }
            return Err(EfdError::Http {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        Ok(QueryResponse::from_json(&body)?.into_table())
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
