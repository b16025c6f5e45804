//! HTTP client for the record service

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::traits::*;
use crate::config::ClientConfig;
use crate::error::{Result, RosterError};
use crate::listing::{ListPage, ListQuery};
use crate::record::MemberRecord;
use crate::token::CapabilityToken;

/// Record service over HTTP.
///
/// # Example
///
/// ```rust,no_run
/// use member_roster::{ClientConfig, HttpMemberService, ListQuery, MemberService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = HttpMemberService::new(ClientConfig {
///     api_url: "http://localhost:8000".into(),
///     admin_token: Some("admin-session".into()),
///     ..Default::default()
/// })?;
///
/// let page = service.list_members(&ListQuery::default()).await?;
/// println!("{} members", page.total);
/// # Ok(())
/// # }
/// ```
pub struct HttpMemberService {
    config: ClientConfig,
    client: Client,
}

impl HttpMemberService {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| RosterError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn with_admin(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.admin_token {
            Some(ref admin) => request.bearer_auth(admin),
            None => request,
        }
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Turn a non-success status into `Rejected`, using the JSON `detail` or
/// `message` field of the body when the server sends one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = server_message(&body).unwrap_or_else(|| default_message(status));
    warn!(status = status.as_u16(), "record service rejected request: {}", message);

    Err(RosterError::Rejected {
        status: Some(status.as_u16()),
        message,
    })
}

fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

fn default_message(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "Token inválido ou expirado.".to_string(),
        StatusCode::NOT_FOUND => "Registro não encontrado.".to_string(),
        other => format!("HTTP {}", other.as_u16()),
    }
}

#[async_trait]
impl MemberService for HttpMemberService {
    async fn list_members(&self, query: &ListQuery) -> Result<ListPage> {
        let params = query.to_params();
        debug!(?params, "listing members");

        let request = self.client.get(self.url("/membros")).query(&params);
        let response = self.with_admin(request).send().await?;
        let body: ListResponse = self.handle_response(response).await?;
        Ok(body.into())
    }

    async fn issue_update_token(
        &self,
        member_id: i64,
        celular: Option<&str>,
    ) -> Result<CapabilityToken> {
        let url = self.url(&format!("/membros/{}/token", member_id));
        debug!(member_id, with_phone = celular.is_some(), "issuing update token");

        let mut request = self.with_admin(self.client.post(&url));
        if let Some(celular) = celular {
            request = request.json(&TokenRequest {
                celular: celular.to_string(),
            });
        }

        let body: TokenResponse = self.handle_response(request.send().await?).await?;
        Ok(CapabilityToken::new(body.access_token))
    }

    async fn issue_new_token(&self, celular: &str) -> Result<CapabilityToken> {
        debug!("issuing new-member token");
        let response = self
            .client
            .post(self.url("/membros/new/token"))
            .json(&TokenRequest {
                celular: celular.to_string(),
            })
            .send()
            .await?;

        let body: TokenResponse = self.handle_response(response).await?;
        Ok(CapabilityToken::new(body.access_token))
    }

    async fn fetch_self(&self, token: &CapabilityToken) -> Result<MemberRecord> {
        debug!(token = %token.fingerprint(), "fetching own record");
        let response = self
            .client
            .get(self.url("/membros/me"))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn update_self(&self, token: &CapabilityToken, record: &MemberRecord) -> Result<()> {
        debug!(token = %token.fingerprint(), "updating own record");
        let response = self
            .client
            .put(self.url("/membros/me"))
            .bearer_auth(token.as_str())
            .json(record)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn create_self(&self, token: &CapabilityToken, record: &MemberRecord) -> Result<()> {
        debug!(token = %token.fingerprint(), "creating own record");
        let response = self
            .client
            .put(self.url("/membros/new"))
            .bearer_auth(token.as_str())
            .json(record)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}
