//! In-memory record service for testing.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::traits::*;
use crate::error::{Result, RosterError};
use crate::listing::{ListPage, ListQuery, SortOrder};
use crate::record::{MemberField, MemberRecord};
use crate::token::CapabilityToken;

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    List(ListQuery),
    IssueUpdateToken { member_id: i64, celular: Option<String> },
    IssueNewToken { celular: String },
    FetchSelf,
    UpdateSelf(MemberRecord),
    CreateSelf(MemberRecord),
}

/// Failure injected into the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Network,
    Status(u16),
}

impl MockFailure {
    fn into_error(self) -> RosterError {
        match self {
            MockFailure::Network => RosterError::Network("connection refused".to_string()),
            MockFailure::Status(status) => RosterError::Rejected {
                status: Some(status),
                message: format!("HTTP {}", status),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenScope {
    Existing(i64),
    New { used: bool },
}

#[derive(Default)]
struct MockState {
    members: BTreeMap<i64, MemberRecord>,
    tokens: HashMap<String, TokenScope>,
    calls: Vec<MockCall>,
    failures: VecDeque<MockFailure>,
    delays: VecDeque<Duration>,
    delay: Option<Duration>,
    next_id: i64,
    minted: u64,
}

/// Mock record service.
///
/// Keeps a roster in memory, records every call, and can be told to fail or
/// stall the next calls.
#[derive(Default)]
pub struct MockMemberService {
    state: Mutex<MockState>,
}

impl MockMemberService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a member; returns the assigned id.
    pub fn insert(&self, record: MemberRecord) -> i64 {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.members.insert(id, record.with(MemberField::Id, id.to_string()));
        id
    }

    pub fn member(&self, id: i64) -> Option<MemberRecord> {
        self.state().members.get(&id).cloned()
    }

    pub fn member_ids(&self) -> Vec<i64> {
        self.state().members.keys().copied().collect()
    }

    /// Mint an update token for a member without recording a call.
    pub fn mint_update_token(&self, member_id: i64) -> CapabilityToken {
        let mut state = self.state();
        let subject = state
            .members
            .get(&member_id)
            .map(|m| phone_digits(m.get(MemberField::Celular)))
            .unwrap_or_default();
        mint(&mut state, &subject, TokenScope::Existing(member_id))
    }

    /// Accept an externally built token as a new-member token.
    pub fn register_new_token(&self, token: &CapabilityToken) {
        self.state()
            .tokens
            .insert(token.as_str().to_string(), TokenScope::New { used: false });
    }

    /// Fail the next call.
    pub fn fail_next(&self, failure: MockFailure) {
        self.state().failures.push_back(failure);
    }

    /// Delay every call.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Delay the next calls by the given amounts, in order.
    pub fn queue_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.state().delays.extend(delays);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Record the call, wait out any delay, then apply an injected failure.
    async fn enter(&self, call: MockCall) -> Result<()> {
        let delay = {
            let mut state = self.state();
            state.calls.push(call);
            state.delays.pop_front().or(state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.state().failures.pop_front() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }

    fn scope(&self, token: &CapabilityToken) -> Result<TokenScope> {
        self.state()
            .tokens
            .get(token.as_str())
            .cloned()
            .ok_or_else(unauthorized)
    }
}

fn unauthorized() -> RosterError {
    RosterError::Rejected {
        status: Some(401),
        message: "Token inválido ou expirado.".to_string(),
    }
}

/// Unsigned three-segment token carrying `sub`.
fn mint(state: &mut MockState, subject: &str, scope: TokenScope) -> CapabilityToken {
    state.minted += 1;
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = serde_json::json!({ "sub": subject, "jti": state.minted });
    let body = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
    let token = CapabilityToken::new(format!("{}.{}.mock", header, body));
    state.tokens.insert(token.as_str().to_string(), scope);
    token
}

fn phone_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[async_trait]
impl MemberService for MockMemberService {
    async fn list_members(&self, query: &ListQuery) -> Result<ListPage> {
        self.enter(MockCall::List(query.clone())).await?;
        let state = self.state();

        let needle = query.name_filter.as_deref().map(str::to_lowercase);
        let mut rows: Vec<&MemberRecord> = state
            .members
            .values()
            .filter(|m| match needle {
                Some(ref n) => m.get(MemberField::Nome).to_lowercase().contains(n.as_str()),
                None => true,
            })
            .collect();

        // Ties broken by id so pages never overlap.
        rows.sort_by(|a, b| {
            let ordering = a.get(query.sort_by).cmp(b.get(query.sort_by));
            let ordering = match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            ordering.then_with(|| a.id().cmp(&b.id()))
        });

        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(query.skip() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(ListPage { rows, total })
    }

    async fn issue_update_token(
        &self,
        member_id: i64,
        celular: Option<&str>,
    ) -> Result<CapabilityToken> {
        self.enter(MockCall::IssueUpdateToken {
            member_id,
            celular: celular.map(str::to_string),
        })
        .await?;

        let mut state = self.state();
        let stored = match state.members.get(&member_id) {
            Some(member) => phone_digits(member.get(MemberField::Celular)),
            None => {
                return Err(RosterError::Rejected {
                    status: Some(404),
                    message: "Membro não encontrado".to_string(),
                })
            }
        };
        let subject = celular.map(str::to_string).unwrap_or(stored);
        if subject.is_empty() {
            return Err(RosterError::Rejected {
                status: Some(400),
                message: "Membro sem celular cadastrado".to_string(),
            });
        }
        Ok(mint(&mut state, &subject, TokenScope::Existing(member_id)))
    }

    async fn issue_new_token(&self, celular: &str) -> Result<CapabilityToken> {
        self.enter(MockCall::IssueNewToken {
            celular: celular.to_string(),
        })
        .await?;

        let mut state = self.state();
        let registered = state.members.values().any(|m| {
            let digits = phone_digits(m.get(MemberField::Celular));
            !digits.is_empty() && celular.ends_with(&digits)
        });
        if registered {
            return Err(RosterError::Rejected {
                status: Some(409),
                message: "Celular já cadastrado".to_string(),
            });
        }
        Ok(mint(&mut state, celular, TokenScope::New { used: false }))
    }

    async fn fetch_self(&self, token: &CapabilityToken) -> Result<MemberRecord> {
        self.enter(MockCall::FetchSelf).await?;
        match self.scope(token)? {
            TokenScope::Existing(id) => self.member(id).ok_or_else(|| RosterError::Rejected {
                status: Some(404),
                message: "Membro não encontrado".to_string(),
            }),
            TokenScope::New { .. } => Err(unauthorized()),
        }
    }

    async fn update_self(&self, token: &CapabilityToken, record: &MemberRecord) -> Result<()> {
        self.enter(MockCall::UpdateSelf(record.clone())).await?;
        let TokenScope::Existing(id) = self.scope(token)? else {
            return Err(unauthorized());
        };

        let mut state = self.state();
        let member = state.members.get_mut(&id).ok_or_else(unauthorized)?;
        for (field, value) in record.iter() {
            if field != MemberField::Id {
                member.set(field, value);
            }
        }
        Ok(())
    }

    async fn create_self(&self, token: &CapabilityToken, record: &MemberRecord) -> Result<()> {
        self.enter(MockCall::CreateSelf(record.clone())).await?;

        let mut state = self.state();
        match state.tokens.get_mut(token.as_str()) {
            Some(TokenScope::New { used }) if !*used => *used = true,
            _ => return Err(unauthorized()),
        }
        state.next_id += 1;
        let id = state.next_id;
        state
            .members
            .insert(id, record.clone().with(MemberField::Id, id.to_string()));
        Ok(())
    }
}
