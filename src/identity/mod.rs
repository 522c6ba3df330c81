//! Identity data model: roles, the reconciled user view, provider sessions and
//! the published (user, session, loading) triple.
//! Keep the public surface thin and split implementation across sub-modules.

mod session;
mod user;

pub use session::{AuthState, ProviderSession};
pub use user::{Location, ProfileUpdate, Role, UserIdentity};
