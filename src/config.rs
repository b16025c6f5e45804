//! Configuration for the roster client
//!
//! CLI arguments and environment variable handling using clap. The library
//! itself consumes [`ClientConfig`]; [`Args`] only exists for the binary.

use crate::error::{Result, RosterError};
use crate::format::DEFAULT_COUNTRY_CODE;
use clap::{Parser, Subcommand};
use std::time::Duration;

/// Settings the library needs to talk to the record service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the record service HTTP API
    pub api_url: String,
    /// Origin capability links are built under
    pub public_url: String,
    /// Admin session bearer for listing and admin issuance
    pub admin_token: Option<String>,
    /// National country calling code
    pub country_code: String,
    /// Rows per listing page
    pub page_size: u32,
    /// Request timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Banner notice lifetime in milliseconds (default: 3000)
    pub notice_ttl_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            public_url: "http://localhost:3000".to_string(),
            admin_token: None,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            page_size: 10,
            timeout_ms: 30_000,
            notice_ttl_ms: 3_000,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("ROSTER_API_URL", &self.api_url), ("ROSTER_PUBLIC_URL", &self.public_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RosterError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        if self.country_code.is_empty() || !self.country_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(RosterError::Config(format!(
                "COUNTRY_CODE must be digits, got '{}'",
                self.country_code
            )));
        }

        if self.page_size == 0 || self.page_size > 100 {
            return Err(RosterError::Config("PAGE_SIZE must be between 1 and 100".to_string()));
        }

        if self.timeout_ms == 0 {
            return Err(RosterError::Config("REQUEST_TIMEOUT_MS must be positive".to_string()));
        }

        Ok(())
    }
}

/// member-roster - administer a member roster and its self-service links
#[derive(Parser, Debug, Clone)]
#[command(name = "member-roster")]
#[command(about = "Member roster administration and capability-link access")]
pub struct Args {
    /// Record service base URL
    #[arg(long, env = "ROSTER_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Origin capability links are built under
    #[arg(long, env = "ROSTER_PUBLIC_URL", default_value = "http://localhost:3000")]
    pub public_url: String,

    /// Admin session bearer token (listing and admin issuance)
    #[arg(long, env = "ROSTER_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// National country calling code
    #[arg(long, env = "COUNTRY_CODE", default_value = DEFAULT_COUNTRY_CODE)]
    pub country_code: String,

    /// Rows per listing page
    #[arg(long, env = "PAGE_SIZE", default_value = "10")]
    pub page_size: u32,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Banner notice lifetime in milliseconds
    #[arg(long, env = "NOTICE_TTL_MS", default_value = "3000")]
    pub notice_ttl_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List members (admin)
    List {
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: u32,
        /// Column to sort by
        #[arg(long, default_value = "nome")]
        sort_by: String,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Filter by name
        #[arg(long)]
        nome: Option<String>,
    },
    /// Issue an update link for an existing member (admin)
    Issue {
        /// Internal member id
        #[arg(long)]
        id: i64,
        /// Destination phone, for members without one on record
        #[arg(long)]
        celular: Option<String>,
    },
    /// Request a link to register a new member (self-service)
    RequestToken {
        /// Phone the link is bound to
        #[arg(long)]
        celular: String,
    },
    /// Show the record a link gives access to
    Show {
        /// Capability link (or its path)
        link: String,
    },
    /// Edit and submit the record a link gives access to
    Save {
        /// Capability link (or its path)
        link: String,
        /// Field assignments, e.g. `nome="Maria Souza"`
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        set: Vec<String>,
    },
    /// Print the informational payload of a token
    Decode {
        /// Token or link
        token: String,
    },
}

impl Args {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url.trim_end_matches('/').to_string(),
            public_url: self.public_url.trim_end_matches('/').to_string(),
            admin_token: self.admin_token.clone().filter(|t| !t.is_empty()),
            country_code: self.country_code.clone(),
            page_size: self.page_size,
            timeout_ms: self.request_timeout_ms,
            notice_ttl_ms: self.notice_ttl_ms,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let config = self.client_config();
        config.validate()?;

        let needs_admin = matches!(self.command, Command::List { .. } | Command::Issue { .. });
        if needs_admin && config.admin_token.is_none() {
            return Err(RosterError::Config(
                "ROSTER_ADMIN_TOKEN is required for admin commands".to_string(),
            ));
        }

        Ok(())
    }
}
