//! The session reconciler: merges the remote auth service, the cached snapshot
//! and live in-memory state into one published (user, session, loading) triple
//! under an explicit precedence policy.

mod core;
mod policy;
mod state;

pub use self::core::{PhoneVerify, Reconciler};
pub use policy::{PrecedencePolicy, Resolution, Source};
pub use state::StateCell;
