use crate::infrastructure::cookie_jar::SessionCookieJar;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use url::Url;

const USER_AGENT: &str = concat!("moodle-deadlines/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP seam used by the session client. One transport instance carries one
/// cookie jar, so a transport must not outlive the refresh run that built it.
#[async_trait]
pub trait MoodleTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse, InfraError>;

    async fn post_form(
        &self,
        url: &Url,
        fields: &[(&str, &str)],
    ) -> Result<HttpResponse, InfraError>;

    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestMoodleTransport {
    client: Client,
    cookie_jar: Arc<SessionCookieJar>,
}

impl ReqwestMoodleTransport {
    pub fn new(cookie_jar: Arc<SessionCookieJar>) -> Result<Self, InfraError> {
        let client = Client::builder()
            .cookie_provider(Arc::clone(&cookie_jar))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| {
                InfraError::NetworkUnreachable(format!("failed to build http client: {error}"))
            })?;
        Ok(Self { client, cookie_jar })
    }

    pub fn cookie_jar(&self) -> &Arc<SessionCookieJar> {
        &self.cookie_jar
    }

    async fn read(response: reqwest::Response, url: &Url) -> Result<HttpResponse, InfraError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| {
            InfraError::NetworkUnreachable(format!("failed reading response from {url}: {error}"))
        })?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl MoodleTransport for ReqwestMoodleTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, InfraError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| {
                InfraError::NetworkUnreachable(format!("network error on GET {url}: {error}"))
            })?;
        Self::read(response, url).await
    }

    async fn post_form(
        &self,
        url: &Url,
        fields: &[(&str, &str)],
    ) -> Result<HttpResponse, InfraError> {
        let response = self
            .client
            .post(url.clone())
            .form(fields)
            .send()
            .await
            .map_err(|error| {
                InfraError::NetworkUnreachable(format!("network error on POST {url}: {error}"))
            })?;
        Self::read(response, url).await
    }

    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, InfraError> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|error| {
                InfraError::NetworkUnreachable(format!("network error on POST {url}: {error}"))
            })?;
        Self::read(response, url).await
    }
}
