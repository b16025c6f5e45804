//! member-roster - terminal shell for the member roster
//!
//! Drives the listing engine, the token issuer and the record gate against
//! the record service configured in the environment.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use member_roster::{
    format::DateConvention,
    listing::ListingState,
    AdminListingEngine, Args, CapabilityLink, CapabilityToken, ClientConfig, Command, FieldAccess,
    FieldSection, HttpMemberService, MemberField, MemberRecord, Notice, Operation, RecordAccessGate,
    TokenIssuer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("member_roster={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = args.client_config();
    info!(api = %config.api_url, "record service");
    let service = Arc::new(HttpMemberService::new(config.clone())?);

    match args.command {
        Command::List {
            page,
            sort_by,
            desc,
            nome,
        } => list(service, &config, page, &sort_by, desc, nome).await,
        Command::Issue { id, celular } => {
            let issuer = TokenIssuer::new(service, config.clone());
            let result = match celular {
                Some(ref celular) => issuer.issue_for_existing_to(id, celular).await,
                None => issuer.issue_for_existing(id).await,
            };
            print_notices(&issuer.notices(Instant::now()));
            let link = result?;
            println!("{}", link.url(&config.public_url));
            Ok(())
        }
        Command::RequestToken { celular } => {
            let issuer = TokenIssuer::new(service, config.clone());
            let result = issuer.issue_for_new(&celular).await;
            print_notices(&issuer.notices(Instant::now()));
            let link = result.map_err(|e| anyhow!(e.user_message()))?;
            println!("{}", link.url(&config.public_url));
            Ok(())
        }
        Command::Show { link } => {
            let link = CapabilityLink::parse(&link)?;
            let gate = RecordAccessGate::open(service, &link, &config);
            if gate.operation() == Operation::Update {
                gate.fetch_self().await.map_err(|e| anyhow!(e.user_message()))?;
            }
            print_record(&gate);
            Ok(())
        }
        Command::Save { link, set } => {
            let link = CapabilityLink::parse(&link)?;
            let gate = RecordAccessGate::open(service, &link, &config);
            if gate.operation() == Operation::Update {
                gate.fetch_self().await.map_err(|e| anyhow!(e.user_message()))?;
            }

            for assignment in &set {
                let (name, value) = assignment
                    .split_once('=')
                    .with_context(|| format!("expected FIELD=VALUE, got '{}'", assignment))?;
                let field = MemberField::from_name(name.trim())
                    .ok_or_else(|| anyhow!("unknown field '{}'", name.trim()))?;
                gate.set_field(field, value)?;
            }

            let result = gate.submit().await;
            print_notices(&gate.notices(Instant::now()));
            result.map_err(|e| anyhow!(e.user_message()))?;
            Ok(())
        }
        Command::Decode { token } => {
            let token = match CapabilityLink::parse(&token) {
                Ok(link) => link.token,
                Err(_) => CapabilityToken::new(token.trim()),
            };
            let claims = token.try_decode()?;
            println!("sub: {}", claims.subject);
            if let Some(exp) = claims.expires_at {
                match chrono::DateTime::from_timestamp(exp, 0) {
                    Some(at) => println!("exp: {} ({})", exp, at.to_rfc3339()),
                    None => println!("exp: {}", exp),
                }
            }
            println!("{}", serde_json::to_string_pretty(&claims.raw)?);
            Ok(())
        }
    }
}

async fn list(
    service: Arc<HttpMemberService>,
    config: &ClientConfig,
    page: u32,
    sort_by: &str,
    desc: bool,
    nome: Option<String>,
) -> anyhow::Result<()> {
    let field = MemberField::from_name(sort_by).ok_or_else(|| anyhow!("unknown column '{}'", sort_by))?;

    let mut state = ListingState::new(config.page_size);
    if state.query().sort_by != field {
        state.toggle_sort(field);
    }
    if desc {
        state.toggle_sort(field);
    }
    if let Some(nome) = nome {
        state.set_search_draft(nome);
        state.commit_search();
    }

    let engine = AdminListingEngine::from_state(service, state);
    engine.refresh().await?;
    if page != 1 {
        engine.go_to_page(page).await?;
    }

    let snapshot = engine.snapshot();
    if let Some(message) = snapshot.error() {
        bail!("{}", message);
    }

    let columns = [MemberField::Id, MemberField::Nome, MemberField::Email, MemberField::Celular];
    let rows: Vec<Vec<String>> = snapshot
        .rows()
        .iter()
        .map(|row| columns.iter().map(|c| row.get(*c).to_string()).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.label().chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", c.label(), w = *w))
        .collect();
    println!("{}", header.join("  "));
    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<w$}", v, w = *w))
            .collect();
        println!("{}", line.join("  "));
    }

    let query = snapshot.query();
    let window: Vec<String> = snapshot
        .page_window()
        .map(|p| if p == query.page { format!("[{}]", p) } else { p.to_string() })
        .collect();
    println!(
        "\n{} membros | página {} de {} | {} | ordem: {} {}",
        snapshot.total(),
        query.page,
        snapshot.total_pages().max(1),
        window.join(" "),
        query.sort_by,
        query.sort_order.as_str()
    );
    Ok(())
}

fn print_record(gate: &RecordAccessGate<HttpMemberService>) {
    let form: MemberRecord = gate.form();
    let mut section: Option<FieldSection> = None;
    for field in MemberField::ALL {
        if section != Some(field.section()) {
            println!("\n== {} ==", field.section().title());
            section = Some(field.section());
        }
        let marker = match gate.access(field) {
            FieldAccess::Editable => "",
            FieldAccess::LockedPrefilled(_) | FieldAccess::LockedBlank => " (bloqueado)",
        };
        println!(
            "{:<22}{}{}",
            format!("{}:", field.label()),
            form.display(field, DateConvention::SlashText),
            marker
        );
    }
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        eprintln!("[{:?}] {}", notice.level, notice.message);
    }
}
