//! Page authentication guard: session resolution, role policy and the
//! legacy session cache older pages still read.

pub mod cache;
pub mod identity;
pub mod role;
pub mod session;

pub use cache::{MemorySessionCache, SessionCache};
pub use identity::{initials, LegacyRecord, UserIdentity};
pub use role::{authorize, RequiredRoles, Role};
pub use session::{
    AuthEvent, AuthMode, AuthOutcome, Redirect, RedirectReason, SessionContext, SessionResolver,
};
