//! End-to-end flows over the in-memory record service

use std::sync::Arc;
use std::time::{Duration, Instant};

use member_roster::service::MockCall;
use member_roster::{
    AdminListingEngine, CapabilityLink, ClientConfig, GateState, MemberField, MemberRecord,
    MockMemberService, NoticeChannel, Operation, QueryOutcome, RecordAccessGate, SortOrder,
    TokenIssuer, TokenPurpose,
};

fn roster(n: usize) -> Arc<MockMemberService> {
    let mock = Arc::new(MockMemberService::new());
    for i in 0..n {
        mock.insert(
            MemberRecord::new()
                .with(MemberField::Nome, format!("Membro {:02}", i))
                .with(MemberField::Email, format!("m{:02}@igreja.org", n - i))
                .with(MemberField::Celular, format!("(62) 9{:04}-{:04}", i, i)),
        );
    }
    mock
}

fn last_list_call(mock: &MockMemberService) -> member_roster::ListQuery {
    mock.calls()
        .into_iter()
        .rev()
        .find_map(|call| match call {
            MockCall::List(query) => Some(query),
            _ => None,
        })
        .expect("a listing call")
}

#[tokio::test]
async fn test_second_page_skips_first_page_rows() {
    let mock = roster(12);
    let engine = AdminListingEngine::new(mock.clone(), 5);

    engine.refresh().await.unwrap();
    engine.go_to_page(2).await.unwrap();

    let query = last_list_call(&mock);
    assert_eq!(query.skip(), 5);
    assert_eq!(query.limit, 5);

    let state = engine.snapshot();
    assert_eq!(state.total_pages(), 3);
    assert_eq!(state.rows()[0].get(MemberField::Nome), "Membro 05");
    assert!(engine.go_to_page(4).await.is_err());
}

#[tokio::test]
async fn test_sorting_on_third_page_returns_to_first() {
    let mock = roster(12);
    let engine = AdminListingEngine::new(mock.clone(), 5);
    engine.refresh().await.unwrap();
    engine.go_to_page(3).await.unwrap();

    engine.sort_by(MemberField::Email).await.unwrap();
    let state = engine.snapshot();
    assert_eq!(state.query().page, 1);
    assert_eq!(state.query().sort_order, SortOrder::Asc);
    assert_eq!(state.rows()[0].get(MemberField::Email), "m01@igreja.org");

    engine.sort_by(MemberField::Email).await.unwrap();
    let state = engine.snapshot();
    assert_eq!(state.query().sort_order, SortOrder::Desc);
    assert_eq!(state.rows()[0].get(MemberField::Email), "m12@igreja.org");
}

#[tokio::test]
async fn test_search_applies_only_on_commit() {
    let mock = roster(12);
    let engine = AdminListingEngine::new(mock.clone(), 5);
    engine.refresh().await.unwrap();
    let calls = mock.calls().len();

    engine.type_search("Membro 1");
    engine.type_search("Membro 11");
    assert_eq!(mock.calls().len(), calls);

    engine.search().await.unwrap();
    assert_eq!(engine.snapshot().total(), 1);
    assert_eq!(last_list_call(&mock).name_filter.as_deref(), Some("Membro 11"));
}

#[tokio::test]
async fn test_stale_listing_response_is_discarded() {
    let mock = roster(12);
    let engine = Arc::new(AdminListingEngine::new(mock.clone(), 5));
    engine.refresh().await.unwrap();

    // The page-2 request answers after the page-3 request.
    mock.queue_delays([Duration::from_millis(80), Duration::from_millis(5)]);
    let slow = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.go_to_page(2).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = engine.go_to_page(3).await.unwrap();

    assert_eq!(fast, QueryOutcome::Applied);
    assert_eq!(slow.await.unwrap().unwrap(), QueryOutcome::Stale);

    let state = engine.snapshot();
    assert_eq!(state.query().page, 3);
    assert_eq!(state.rows().len(), 2);
    assert_eq!(state.rows()[0].get(MemberField::Nome), "Membro 10");
}

#[tokio::test]
async fn test_admin_link_opens_update_gate() {
    let mock = roster(3);
    let config = ClientConfig::default();
    let issuer = TokenIssuer::new(mock.clone(), config.clone());
    let id = mock.member_ids()[1];

    let link = issuer.issue_for_existing(id).await.unwrap();
    let url = link.url(&config.public_url);
    assert!(url.starts_with("http://localhost:3000/update-member?token="));

    let parsed = CapabilityLink::parse(&url).unwrap();
    assert_eq!(parsed, link);

    let gate = RecordAccessGate::open(mock.clone(), &parsed, &config);
    assert_eq!(gate.operation(), Operation::Update);
    gate.fetch_self().await.unwrap();
    assert_eq!(gate.form().get(MemberField::Nome), "Membro 01");

    gate.set_field(MemberField::Nascimento, "17/05/1990").unwrap();
    gate.set_field(MemberField::Cep, "74000123").unwrap();
    gate.submit().await.unwrap();

    let saved = mock.member(id).unwrap();
    assert_eq!(saved.get(MemberField::Nascimento), "1990-05-17T00:00:00.000Z");
    assert_eq!(saved.get(MemberField::Cep), "74000-123");

    let now = Instant::now();
    assert_eq!(gate.notices(now)[0].channel, NoticeChannel::Banner);
    assert!(gate.notices(now + Duration::from_secs(3)).is_empty());
}

#[tokio::test]
async fn test_self_service_registration() {
    let mock = Arc::new(MockMemberService::new());
    let config = ClientConfig::default();
    let issuer = TokenIssuer::new(mock.clone(), config.clone());

    let link = issuer.issue_for_new("(62) 99641-5795").await.unwrap();
    assert_eq!(link.purpose, TokenPurpose::NewRecord);

    let parsed = CapabilityLink::parse(&link.path()).unwrap();
    let gate = RecordAccessGate::open(mock.clone(), &parsed, &config);
    assert_eq!(gate.form().get(MemberField::Celular), "(62) 99641-5795");
    assert!(gate.set_field(MemberField::TipoMembro, "Membro Comungante").is_err());

    gate.set_field(MemberField::Nome, "Ana Lima").unwrap();
    gate.submit().await.unwrap();
    assert_eq!(gate.state(), GateState::Success);
    assert!(gate.token_consumed());

    let created = mock.member(mock.member_ids()[0]).unwrap();
    assert_eq!(created.get(MemberField::Nome), "Ana Lima");
    assert_eq!(created.get(MemberField::TipoMembro), "");

    // The same number cannot register twice.
    assert!(issuer.issue_for_new("62996415795").await.is_err());
}
