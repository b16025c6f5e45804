//! Capability token issuance
//!
//! Two paths mint links: an admin issues an update link for an existing
//! member, and anyone may request a registration link bound to their own
//! phone. Phone input is validated locally before anything is sent.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Result, RosterError};
use crate::format::{is_valid_phone, to_e164};
use crate::gate::InFlight;
use crate::notice::{Notice, NoticeBoard, NoticeChannel, NoticeLevel};
use crate::service::MemberService;
use crate::token::{CapabilityLink, TokenPurpose};

pub const PHONE_REQUIRED_MESSAGE: &str = "Por favor, informe o número do celular.";
pub const PHONE_INVALID_MESSAGE: &str = "Informe um celular com DDD (ao menos 10 dígitos).";
pub const ADMIN_ISSUE_FAILURE_MESSAGE: &str = "Ocorreu um erro ao gerar o token.";
pub const SELF_ISSUE_FAILURE_MESSAGE: &str =
    "Ocorreu um erro ao gerar o token. Verifique o número e tente novamente.";
pub const REQUEST_IN_FLIGHT_MESSAGE: &str = "Aguarde: já existe uma solicitação em andamento.";
pub const ISSUE_SUCCESS_MESSAGE: &str =
    "Token gerado com sucesso! Por favor, acesse o link a seguir para continuar o cadastro:";

struct IssuerInner {
    last_link: Option<CapabilityLink>,
    notices: NoticeBoard,
}

/// Mints capability links through the record service.
pub struct TokenIssuer<S: MemberService + ?Sized> {
    service: Arc<S>,
    config: ClientConfig,
    in_flight: AtomicBool,
    inner: Mutex<IssuerInner>,
}

impl<S: MemberService + ?Sized> TokenIssuer<S> {
    pub fn new(service: Arc<S>, config: ClientConfig) -> Self {
        let notices = NoticeBoard::new(config.notice_ttl());
        Self {
            service,
            config,
            in_flight: AtomicBool::new(false),
            inner: Mutex::new(IssuerInner {
                last_link: None,
                notices,
            }),
        }
    }

    /// Claim the issuer for one request. A second issuance while one is in
    /// flight is refused without contacting the service.
    fn claim(&self) -> Result<InFlight<'_>> {
        InFlight::acquire(&self.in_flight).ok_or_else(|| {
            debug!("issuance ignored: request already in flight");
            RosterError::Validation(REQUEST_IN_FLIGHT_MESSAGE.to_string())
        })
    }

    fn inner(&self) -> MutexGuard<'_, IssuerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Link produced by the most recent successful issuance.
    pub fn last_link(&self) -> Option<CapabilityLink> {
        self.inner().last_link.clone()
    }

    pub fn notices(&self, now: Instant) -> Vec<Notice> {
        self.inner().notices.active(now)
    }

    pub fn dismiss_notice(&self, id: u64) -> bool {
        self.inner().notices.dismiss(id)
    }

    /// Issue an update link for a member, delivered to the phone on record.
    pub async fn issue_for_existing(&self, member_id: i64) -> Result<CapabilityLink> {
        self.issue_existing(member_id, None).await
    }

    /// Issue an update link for a member that has no phone on record,
    /// sending it to the number the admin typed.
    pub async fn issue_for_existing_to(
        &self,
        member_id: i64,
        phone_input: &str,
    ) -> Result<CapabilityLink> {
        let celular = self.check_phone(phone_input, NoticeChannel::Toast)?;
        self.issue_existing(member_id, Some(&celular)).await
    }

    async fn issue_existing(&self, member_id: i64, celular: Option<&str>) -> Result<CapabilityLink> {
        let _guard = self.claim()?;
        self.inner().notices.clear_level(NoticeLevel::Error);

        match self.service.issue_update_token(member_id, celular).await {
            Ok(token) => {
                let link = CapabilityLink::new(TokenPurpose::ExistingRecord, token);
                info!(member_id, token = %link.token.fingerprint(), "update link issued");
                self.inner().last_link = Some(link.clone());
                Ok(link)
            }
            Err(e) => {
                warn!(member_id, "issuing update link failed: {}", e);
                self.post_error(NoticeChannel::Toast, ADMIN_ISSUE_FAILURE_MESSAGE);
                Err(e)
            }
        }
    }

    /// Request a registration link bound to the caller's phone.
    ///
    /// Any service failure is reported with the same generic message, so the
    /// caller cannot tell an already registered number from an outage.
    pub async fn issue_for_new(&self, phone_input: &str) -> Result<CapabilityLink> {
        let _guard = self.claim()?;
        {
            let mut inner = self.inner();
            inner.notices.clear_level(NoticeLevel::Error);
            inner.notices.clear_level(NoticeLevel::Success);
        }
        let celular = self.check_phone(phone_input, NoticeChannel::Banner)?;

        match self.service.issue_new_token(&celular).await {
            Ok(token) => {
                let link = CapabilityLink::new(TokenPurpose::NewRecord, token);
                info!(token = %link.token.fingerprint(), "registration link issued");

                let mut inner = self.inner();
                let message = format!(
                    "{} {}",
                    ISSUE_SUCCESS_MESSAGE,
                    link.abbreviated(&self.config.public_url)
                );
                inner
                    .notices
                    .post(NoticeLevel::Success, NoticeChannel::Toast, message, Instant::now());
                inner.last_link = Some(link.clone());
                Ok(link)
            }
            Err(e) => {
                debug!("registration link request failed: {}", e);
                self.post_error(NoticeChannel::Banner, SELF_ISSUE_FAILURE_MESSAGE);
                Err(RosterError::Rejected {
                    status: None,
                    message: SELF_ISSUE_FAILURE_MESSAGE.to_string(),
                })
            }
        }
    }

    /// Validate typed phone input and convert it to international digits.
    fn check_phone(&self, phone_input: &str, channel: NoticeChannel) -> Result<String> {
        let message = if phone_input.trim().is_empty() {
            PHONE_REQUIRED_MESSAGE
        } else if !is_valid_phone(phone_input) {
            PHONE_INVALID_MESSAGE
        } else {
            return Ok(to_e164(phone_input, &self.config.country_code));
        };

        self.post_error(channel, message);
        Err(RosterError::Validation(message.to_string()))
    }

    fn post_error(&self, channel: NoticeChannel, message: &str) {
        self.inner()
            .notices
            .post(NoticeLevel::Error, channel, message, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MemberField, MemberRecord};
    use crate::service::{MockCall, MockFailure, MockMemberService};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn issuer(mock: &Arc<MockMemberService>) -> TokenIssuer<MockMemberService> {
        TokenIssuer::new(mock.clone(), ClientConfig::default())
    }

    #[tokio::test]
    async fn test_short_phone_rejected_before_request() {
        let mock = Arc::new(MockMemberService::new());
        let issuer = issuer(&mock);

        let err = assert_err!(issuer.issue_for_new("(62) 9964-157").await);
        assert!(err.is_local());
        assert!(mock.calls().is_empty());

        let err = issuer.issue_for_new("   ").await.unwrap_err();
        assert_eq!(err.user_message(), PHONE_REQUIRED_MESSAGE);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_new_link_sends_international_digits() {
        let mock = Arc::new(MockMemberService::new());
        let issuer = issuer(&mock);

        let link = assert_ok!(issuer.issue_for_new("(62) 99641-5795").await);
        assert_eq!(link.purpose, TokenPurpose::NewRecord);
        assert!(link.path().starts_with("/new-member?token="));
        assert_eq!(
            mock.calls(),
            vec![MockCall::IssueNewToken {
                celular: "5562996415795".to_string()
            }]
        );
        assert_eq!(issuer.last_link(), Some(link));

        let notices = issuer.notices(Instant::now());
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with(ISSUE_SUCCESS_MESSAGE));
        assert!(notices[0].message.contains("..."));
    }

    #[tokio::test]
    async fn test_new_link_failure_is_generic() {
        let mock = Arc::new(MockMemberService::new());
        mock.insert(MemberRecord::new().with(MemberField::Celular, "(62) 99641-5795"));
        let issuer = issuer(&mock);

        let registered = issuer.issue_for_new("62996415795").await.unwrap_err();
        mock.fail_next(MockFailure::Network);
        let outage = issuer.issue_for_new("11988887777").await.unwrap_err();

        assert_eq!(registered.user_message(), SELF_ISSUE_FAILURE_MESSAGE);
        assert_eq!(outage.user_message(), registered.user_message());
        assert_eq!(registered.status(), None);
        assert!(issuer.last_link().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_issuance_sends_one_request() {
        let mock = Arc::new(MockMemberService::new());
        let id = mock.insert(MemberRecord::new().with(MemberField::Celular, "(62) 99641-5795"));
        mock.set_delay(Duration::from_millis(50));
        let issuer = issuer(&mock);

        let (first, second) =
            tokio::join!(issuer.issue_for_existing(id), issuer.issue_for_existing(id));
        let refused = if first.is_ok() { second } else { first };

        assert_eq!(refused.unwrap_err().user_message(), REQUEST_IN_FLIGHT_MESSAGE);
        assert_eq!(mock.calls().len(), 1);

        assert!(issuer.issue_for_existing(id).await.is_ok());
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_admin_issue_uses_stored_phone() {
        let mock = Arc::new(MockMemberService::new());
        let id = mock.insert(MemberRecord::new().with(MemberField::Celular, "(62) 99641-5795"));
        let issuer = issuer(&mock);

        let link = issuer.issue_for_existing(id).await.unwrap();
        assert_eq!(link.purpose, TokenPurpose::ExistingRecord);
        assert_eq!(
            mock.calls(),
            vec![MockCall::IssueUpdateToken {
                member_id: id,
                celular: None
            }]
        );
    }

    #[tokio::test]
    async fn test_admin_issue_to_typed_phone() {
        let mock = Arc::new(MockMemberService::new());
        let id = mock.insert(MemberRecord::new().with(MemberField::Nome, "Sem Celular"));
        let issuer = issuer(&mock);

        assert_eq!(issuer.issue_for_existing(id).await.unwrap_err().status(), Some(400));

        assert!(issuer.issue_for_existing_to(id, "996415795").await.is_err());
        assert_eq!(mock.calls().len(), 1);

        let link = issuer.issue_for_existing_to(id, "62996415795").await.unwrap();
        assert_eq!(link.token.decode().unwrap().subject, "5562996415795");
        assert_eq!(
            mock.calls().last(),
            Some(&MockCall::IssueUpdateToken {
                member_id: id,
                celular: Some("5562996415795".to_string())
            })
        );
    }
}
