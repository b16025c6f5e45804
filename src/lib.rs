//! Member Roster - capability-link access to member records
//!
//! A member roster kept by a remote record service, reached two ways:
//!
//! ## Components
//!
//! - **Listing**: paginated, sorted, name-filtered admin view of the roster
//! - **Issuer**: mints update links (admin) and registration links (self-service)
//! - **Gate**: opens one record through a capability link, locking the fields
//!   the token does not entitle the holder to change
//! - **Format**: phone, postal code and date normalization between typed,
//!   displayed and stored forms
//!
//! The remote side is abstracted behind [`MemberService`]; [`HttpMemberService`]
//! talks to the real service and [`MockMemberService`] keeps a roster in memory.

pub mod config;
pub mod error;
pub mod format;
pub mod gate;
pub mod issuer;
pub mod listing;
pub mod notice;
pub mod policy;
pub mod record;
pub mod service;
pub mod token;

pub use config::{Args, ClientConfig, Command};
pub use error::{Result, RosterError};
pub use gate::{GateOutcome, GateState, RecordAccessGate};
pub use issuer::TokenIssuer;
pub use listing::{AdminListingEngine, ListPage, ListQuery, ListingState, QueryOutcome, SortOrder};
pub use notice::{Notice, NoticeBoard, NoticeChannel, NoticeLevel};
pub use policy::{AccessDecision, FieldAccess, Operation};
pub use record::{FieldKind, FieldSection, MemberField, MemberRecord};
pub use service::{HttpMemberService, MemberService, MockMemberService};
pub use token::{CapabilityLink, CapabilityToken, TokenClaims, TokenPurpose};
