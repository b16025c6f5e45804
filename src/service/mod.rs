//! Record service abstraction
//!
//! The core talks to the remote collection and record service only through
//! the [`MemberService`] trait:
//! - [`HttpMemberService`]: the real service over HTTP
//! - [`MockMemberService`]: in-memory roster for tests and demos

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpMemberService;
pub use mock::{MockCall, MockFailure, MockMemberService};
pub use traits::*;
