//! Core trait for the record service.
//!
//! Six calls make up the whole remote surface: listing and admin token
//! issuance behind the admin session, self-service token issuance with no
//! credentials, and read/update/create of one's own record behind a
//! capability token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::listing::{ListPage, ListQuery};
use crate::record::MemberRecord;
use crate::token::CapabilityToken;

#[async_trait]
pub trait MemberService: Send + Sync {
    /// `GET /membros?skip&limit&sort_by&sort_order&nome` (admin session)
    async fn list_members(&self, query: &ListQuery) -> Result<ListPage>;

    /// `POST /membros/{id}/token` (admin session). `celular` overrides the
    /// destination phone for records lacking one.
    async fn issue_update_token(
        &self,
        member_id: i64,
        celular: Option<&str>,
    ) -> Result<CapabilityToken>;

    /// `POST /membros/new/token` (public)
    async fn issue_new_token(&self, celular: &str) -> Result<CapabilityToken>;

    /// `GET /membros/me` (capability token)
    async fn fetch_self(&self, token: &CapabilityToken) -> Result<MemberRecord>;

    /// `PUT /membros/me` (capability token)
    async fn update_self(&self, token: &CapabilityToken, record: &MemberRecord) -> Result<()>;

    /// `PUT /membros/new` (capability token)
    async fn create_self(&self, token: &CapabilityToken, record: &MemberRecord) -> Result<()>;
}

/// Body of both token issuance requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Destination phone, digits with country code
    pub celular: String,
}

/// Response of both token issuance endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Response of the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub membros: Vec<MemberRecord>,
    pub total: u64,
}

impl From<ListResponse> for ListPage {
    fn from(response: ListResponse) -> Self {
        ListPage {
            rows: response.membros,
            total: response.total,
        }
    }
}
