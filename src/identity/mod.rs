//! Identity, sessions and admin authorization.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod gotrue;
mod authorizer;

pub use principal::{Identity, normalize_email};
pub use session::{Session, SessionManager, SessionTokens, IssuedSession, gen_id};
pub use provider::{AuthProvider, LocalAuthProvider, ResolvedSession, hash_password};
pub use gotrue::GoTrueAuthProvider;
pub use authorizer::{AdminCheck, DenyReason, check_allowlist, email_is_allowlisted, require_admin};
