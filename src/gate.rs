//! Capability-token gated access to a single member record
//!
//! A gate is opened from a capability link and owns the lifecycle of one
//! record form: `Idle -> Loading -> {Success, Error}`. Only one request runs
//! at a time; a fetch or submit issued while another is in flight is
//! ignored, so a double-click never produces two mutations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Result, RosterError};
use crate::notice::{Notice, NoticeBoard, NoticeChannel, NoticeLevel};
use crate::policy::{AccessDecision, FieldAccess, Operation};
use crate::record::{MemberField, MemberRecord};
use crate::service::MemberService;
use crate::token::{CapabilityLink, CapabilityToken, TokenPurpose};

pub const FETCH_FAILURE_MESSAGE: &str = "Ocorreu um erro ao buscar os dados do membro.";
pub const UPDATE_SUCCESS_MESSAGE: &str = "Dados atualizados com sucesso!";
pub const UPDATE_FAILURE_MESSAGE: &str = "Ocorreu um erro ao atualizar os dados.";
pub const CREATE_SUCCESS_MESSAGE: &str = "Dados cadastrados com sucesso!";
pub const CREATE_FAILURE_MESSAGE: &str = "Ocorreu um erro ao cadastrar os dados.";
pub const TOKEN_MISSING_MESSAGE: &str = "Token não encontrado.";
pub const NOT_LOADED_MESSAGE: &str = "Carregue os dados do membro antes de salvar.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Loading,
    Success,
    /// Failed, with the message shown to the member
    Error(String),
}

/// Whether a gate call did anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Completed,
    /// Another request of this gate was in flight
    Ignored,
}

struct GateInner {
    state: GateState,
    /// What the member is editing
    form: MemberRecord,
    /// Last server-confirmed record (or the prefilled blank for creation)
    baseline: MemberRecord,
    /// Whether `baseline` is a record the server confirmed. Always true for
    /// creation, where there is nothing to load.
    confirmed: bool,
    /// `None` once the token has been used successfully
    token: Option<CapabilityToken>,
    notices: NoticeBoard,
}

/// Clears the in-flight flag when the request ends, including when the
/// future is dropped mid-request.
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-record form bound to a capability token.
pub struct RecordAccessGate<S: MemberService + ?Sized> {
    service: Arc<S>,
    operation: Operation,
    decision: AccessDecision,
    channel: NoticeChannel,
    in_flight: AtomicBool,
    inner: Mutex<GateInner>,
}

impl<S: MemberService + ?Sized> RecordAccessGate<S> {
    /// Open a gate for the record a link points at.
    ///
    /// Update links report through a self-clearing banner, creation links
    /// through a toast that stays until dismissed.
    pub fn open(service: Arc<S>, link: &CapabilityLink, config: &ClientConfig) -> Self {
        let (operation, channel) = match link.purpose {
            TokenPurpose::ExistingRecord => (Operation::Update, NoticeChannel::Banner),
            TokenPurpose::NewRecord => (Operation::Create, NoticeChannel::Toast),
        };
        Self::with_operation(service, link.token.clone(), operation, channel, config)
    }

    pub fn with_operation(
        service: Arc<S>,
        token: CapabilityToken,
        operation: Operation,
        channel: NoticeChannel,
        config: &ClientConfig,
    ) -> Self {
        let decision = AccessDecision::for_token(operation, &token, &config.country_code);
        let mut form = MemberRecord::new();
        decision.apply_prefill(&mut form);

        Self {
            service,
            operation,
            decision,
            channel,
            in_flight: AtomicBool::new(false),
            inner: Mutex::new(GateInner {
                state: GateState::Idle,
                baseline: form.clone(),
                form,
                confirmed: operation == Operation::Create,
                token: Some(token),
                notices: NoticeBoard::new(config.notice_ttl()),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn decision(&self) -> &AccessDecision {
        &self.decision
    }

    pub fn state(&self) -> GateState {
        self.inner().state.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Copy of the form being edited
    pub fn form(&self) -> MemberRecord {
        self.inner().form.clone()
    }

    /// Whether the token has been used up by a successful submit.
    pub fn token_consumed(&self) -> bool {
        self.inner().token.is_none()
    }

    /// Notices visible at `now`.
    pub fn notices(&self, now: Instant) -> Vec<Notice> {
        self.inner().notices.active(now)
    }

    pub fn dismiss_notice(&self, id: u64) -> bool {
        self.inner().notices.dismiss(id)
    }

    /// Type into a field. Locked fields refuse input.
    pub fn set_field(&self, field: MemberField, raw: &str) -> Result<()> {
        if !self.decision.is_editable(field) {
            return Err(RosterError::Validation(format!(
                "O campo {} não pode ser alterado.",
                field.label()
            )));
        }
        self.inner().form.apply_input(field, raw);
        Ok(())
    }

    /// Load the member's own record into the form.
    ///
    /// On failure the form keeps whatever it held before.
    pub async fn fetch_self(&self) -> Result<GateOutcome> {
        if self.operation != Operation::Update {
            return Err(RosterError::Validation(
                "Registro novo: não há dados a carregar.".to_string(),
            ));
        }
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("fetch ignored: request already in flight");
            return Ok(GateOutcome::Ignored);
        };

        let token = self.start_request()?;
        let result = self.service.fetch_self(&token).await;

        let mut inner = self.inner();
        match result {
            Ok(mut record) => {
                self.decision.apply_prefill(&mut record);
                inner.baseline = record.clone();
                inner.form = record;
                inner.confirmed = true;
                inner.state = GateState::Success;
                Ok(GateOutcome::Completed)
            }
            Err(e) => {
                warn!("fetching own record failed: {}", e);
                self.fail(&mut inner, FETCH_FAILURE_MESSAGE);
                Err(e)
            }
        }
    }

    /// Submit the form.
    ///
    /// An update is refused until the record has been fetched. Dates must be
    /// empty or valid before anything is sent, and go out as canonical
    /// instants. Locked fields are reset to their confirmed or prefilled
    /// values. On success the token is discarded; on failure the form stays
    /// as typed for a retry.
    pub async fn submit(&self) -> Result<GateOutcome> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("submit ignored: request already in flight");
            return Ok(GateOutcome::Ignored);
        };

        let (token, payload) = {
            let mut inner = self.inner();
            inner.notices.clear_level(NoticeLevel::Error);
            inner.notices.clear_level(NoticeLevel::Success);

            let Some(token) = inner.token.clone() else {
                self.fail(&mut inner, TOKEN_MISSING_MESSAGE);
                return Err(RosterError::Validation(TOKEN_MISSING_MESSAGE.to_string()));
            };

            if !inner.confirmed {
                self.fail(&mut inner, NOT_LOADED_MESSAGE);
                return Err(RosterError::Validation(NOT_LOADED_MESSAGE.to_string()));
            }

            let invalid = inner.form.invalid_dates();
            if let Some(field) = invalid.first() {
                let message = format!("Data inválida em {}.", field.label());
                self.fail(&mut inner, &message);
                return Err(RosterError::Validation(message));
            }

            let mut payload = inner.form.clone();
            payload.canonicalize_dates();
            self.decision.enforce(&inner.baseline, &mut payload);
            inner.state = GateState::Loading;
            (token, payload)
        };

        let result = match self.operation {
            Operation::Update => self.service.update_self(&token, &payload).await,
            Operation::Create => self.service.create_self(&token, &payload).await,
        };

        let mut inner = self.inner();
        match result {
            Ok(()) => {
                let message = match self.operation {
                    Operation::Update => UPDATE_SUCCESS_MESSAGE,
                    Operation::Create => CREATE_SUCCESS_MESSAGE,
                };
                info!(operation = self.operation.as_str(), token = %token.fingerprint(), "record saved");
                inner.baseline = payload.clone();
                inner.form = payload;
                inner.token = None;
                inner.state = GateState::Success;
                inner
                    .notices
                    .post(NoticeLevel::Success, self.channel, message, Instant::now());
                Ok(GateOutcome::Completed)
            }
            Err(e) => {
                warn!(operation = self.operation.as_str(), "saving record failed: {}", e);
                let message = match self.operation {
                    Operation::Update => UPDATE_FAILURE_MESSAGE,
                    Operation::Create => CREATE_FAILURE_MESSAGE,
                };
                self.fail(&mut inner, message);
                Err(e)
            }
        }
    }

    /// Move to `Loading` and hand out the token for the request.
    fn start_request(&self) -> Result<CapabilityToken> {
        let mut inner = self.inner();
        match inner.token.clone() {
            Some(token) => {
                inner.state = GateState::Loading;
                Ok(token)
            }
            None => {
                self.fail(&mut inner, TOKEN_MISSING_MESSAGE);
                Err(RosterError::Validation(TOKEN_MISSING_MESSAGE.to_string()))
            }
        }
    }

    fn fail(&self, inner: &mut GateInner, message: &str) {
        inner.state = GateState::Error(message.to_string());
        inner
            .notices
            .post(NoticeLevel::Error, self.channel, message, Instant::now());
    }

    /// Access decision for one field, for rendering.
    pub fn access(&self, field: MemberField) -> &FieldAccess {
        self.decision.access(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MockCall, MockFailure, MockMemberService};
    use crate::token::tests::token_with_payload;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> ClientConfig {
        ClientConfig::default()
    }

    fn seeded() -> (Arc<MockMemberService>, CapabilityLink) {
        let mock = Arc::new(MockMemberService::new());
        let id = mock.insert(
            MemberRecord::new()
                .with(MemberField::Nome, "Maria")
                .with(MemberField::Celular, "(62) 99641-5795")
                .with(MemberField::Oficio, "Diácono"),
        );
        let token = mock.mint_update_token(id);
        (mock, CapabilityLink::new(TokenPurpose::ExistingRecord, token))
    }

    #[tokio::test]
    async fn test_fetch_hydrates_form() {
        let (mock, link) = seeded();
        let gate = RecordAccessGate::open(mock, &link, &config());
        assert_eq!(gate.state(), GateState::Idle);

        gate.fetch_self().await.unwrap();
        assert_eq!(gate.state(), GateState::Success);
        assert_eq!(gate.form().get(MemberField::Nome), "Maria");
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_form() {
        let (mock, link) = seeded();
        let gate = RecordAccessGate::open(mock.clone(), &link, &config());
        gate.set_field(MemberField::Nome, "Rascunho").unwrap();

        mock.fail_next(MockFailure::Status(401));
        assert!(gate.fetch_self().await.is_err());

        assert_eq!(gate.state(), GateState::Error(FETCH_FAILURE_MESSAGE.to_string()));
        assert_eq!(gate.form().get(MemberField::Nome), "Rascunho");
    }

    #[tokio::test]
    async fn test_submit_discards_locked_edits_and_consumes_token() {
        let (mock, link) = seeded();
        let gate = RecordAccessGate::open(mock.clone(), &link, &config());
        gate.fetch_self().await.unwrap();

        assert!(gate.set_field(MemberField::Oficio, "Presbítero").is_err());
        gate.set_field(MemberField::Nome, "Maria Souza").unwrap();
        assert_eq!(gate.submit().await.unwrap(), GateOutcome::Completed);

        let saved = mock.member(link_member_id(&mock)).unwrap();
        assert_eq!(saved.get(MemberField::Nome), "Maria Souza");
        assert_eq!(saved.get(MemberField::Oficio), "Diácono");
        assert!(gate.token_consumed());

        let notices = gate.notices(Instant::now());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, UPDATE_SUCCESS_MESSAGE);

        assert!(matches!(gate.submit().await, Err(RosterError::Validation(_))));
        assert_eq!(mock.calls().iter().filter(|c| matches!(c, MockCall::UpdateSelf(_))).count(), 1);
    }

    fn link_member_id(mock: &MockMemberService) -> i64 {
        mock.member_ids()[0]
    }

    #[tokio::test]
    async fn test_invalid_date_blocks_network() {
        let (mock, link) = seeded();
        let gate = RecordAccessGate::open(mock.clone(), &link, &config());
        gate.fetch_self().await.unwrap();
        gate.set_field(MemberField::Nascimento, "31/02/1990").unwrap();

        assert!(matches!(gate.submit().await, Err(RosterError::Validation(_))));
        assert_eq!(mock.calls(), vec![MockCall::FetchSelf]);
        assert!(!gate.token_consumed());
    }

    #[tokio::test]
    async fn test_rejected_submit_keeps_form_for_retry() {
        let (mock, link) = seeded();
        let gate = RecordAccessGate::open(mock.clone(), &link, &config());
        gate.fetch_self().await.unwrap();
        gate.set_field(MemberField::Email, "maria@example.org").unwrap();

        mock.fail_next(MockFailure::Network);
        assert!(gate.submit().await.is_err());
        assert_eq!(gate.state(), GateState::Error(UPDATE_FAILURE_MESSAGE.to_string()));
        assert_eq!(gate.form().get(MemberField::Email), "maria@example.org");
        assert!(!gate.token_consumed());

        assert_eq!(gate.submit().await.unwrap(), GateOutcome::Completed);
    }

    #[tokio::test]
    async fn test_overlapping_submit_is_ignored() {
        let (mock, link) = seeded();
        let gate = RecordAccessGate::open(mock.clone(), &link, &config());
        gate.fetch_self().await.unwrap();
        mock.set_delay(Duration::from_millis(50));

        let (first, second) = tokio::join!(gate.submit(), gate.submit());
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, GateOutcome::Ignored));

        assert_eq!(outcomes, vec![GateOutcome::Completed, GateOutcome::Ignored]);
        assert_eq!(mock.calls().len(), 2);
        assert!(!gate.is_loading());
    }

    #[tokio::test]
    async fn test_update_refused_until_record_loaded() {
        let mock = Arc::new(MockMemberService::new());
        let id = mock.insert(
            MemberRecord::new()
                .with(MemberField::Nome, "Maria")
                .with(MemberField::TipoMembro, "Membro Comungante")
                .with(MemberField::Oficio, "Diácono"),
        );
        let link = CapabilityLink::new(TokenPurpose::ExistingRecord, mock.mint_update_token(id));
        let gate = RecordAccessGate::open(mock.clone(), &link, &config());

        mock.fail_next(MockFailure::Status(500));
        assert!(gate.fetch_self().await.is_err());
        gate.set_field(MemberField::Email, "maria@example.org").unwrap();

        assert!(matches!(gate.submit().await, Err(RosterError::Validation(_))));
        assert_eq!(gate.state(), GateState::Error(NOT_LOADED_MESSAGE.to_string()));
        assert!(!mock.calls().iter().any(|c| matches!(c, MockCall::UpdateSelf(_))));
        assert!(!gate.token_consumed());

        let stored = mock.member(id).unwrap();
        assert_eq!(stored.get(MemberField::Nome), "Maria");
        assert_eq!(stored.get(MemberField::Oficio), "Diácono");
        assert_eq!(stored.get(MemberField::TipoMembro), "Membro Comungante");
    }

    #[tokio::test]
    async fn test_legacy_dates_submitted_canonical() {
        let mock = Arc::new(MockMemberService::new());
        let id = mock.insert(
            MemberRecord::new()
                .with(MemberField::Nome, "Maria")
                .with(MemberField::Nascimento, "17/05/1990"),
        );
        let link = CapabilityLink::new(TokenPurpose::ExistingRecord, mock.mint_update_token(id));
        let gate = RecordAccessGate::open(mock.clone(), &link, &config());

        gate.fetch_self().await.unwrap();
        gate.submit().await.unwrap();

        let sent = mock
            .calls()
            .into_iter()
            .find_map(|c| match c {
                MockCall::UpdateSelf(record) => Some(record),
                _ => None,
            })
            .unwrap();
        assert_eq!(sent.get(MemberField::Nascimento), "1990-05-17T00:00:00.000Z");
        assert_eq!(sent.get(MemberField::DataCasamento), "");
    }

    #[tokio::test]
    async fn test_create_prefills_phone_from_token() {
        let mock = Arc::new(MockMemberService::new());
        let token = token_with_payload(&json!({"sub": "5562996415795"}));
        mock.register_new_token(&token);
        let link = CapabilityLink::new(TokenPurpose::NewRecord, token);

        let gate = RecordAccessGate::open(mock.clone(), &link, &config());
        assert_eq!(gate.operation(), Operation::Create);
        assert_eq!(gate.form().get(MemberField::Celular), "(62) 99641-5795");
        assert!(gate.set_field(MemberField::Celular, "11911112222").is_err());
        assert!(gate.fetch_self().await.is_err());

        gate.set_field(MemberField::Nome, "João").unwrap();
        gate.set_field(MemberField::Oficio, "Diácono").unwrap();
        gate.submit().await.unwrap();

        let created = mock.member(mock.member_ids()[0]).unwrap();
        assert_eq!(created.get(MemberField::Celular), "(62) 99641-5795");
        assert_eq!(created.get(MemberField::Oficio), "Diácono");

        let notices = gate.notices(Instant::now() + Duration::from_secs(60));
        assert_eq!(notices[0].channel, NoticeChannel::Toast);
        assert_eq!(notices[0].message, CREATE_SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_create_token_leaves_phone_editable() {
        let mock = Arc::new(MockMemberService::new());
        let link = CapabilityLink::new(TokenPurpose::NewRecord, CapabilityToken::new("opaque"));
        let gate = RecordAccessGate::open(mock, &link, &config());

        assert_eq!(gate.form().get(MemberField::Celular), "");
        gate.set_field(MemberField::Celular, "62996415795").unwrap();
        assert_eq!(gate.form().get(MemberField::Celular), "(62) 99641-5795");
    }
}
