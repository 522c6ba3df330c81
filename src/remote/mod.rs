//! External collaborators: the remote auth service and the user-profile record
//! API, both behind object-safe async traits, plus a complete in-process
//! provider implementation.

mod api;
mod local;
mod profile;

pub use api::{
    AadhaarAction, ApiEnvelope, AuthApi, AuthEvent, AuthEventKind, NewUserAttrs, OtpStep,
    PhoneAction, RemoteError, RemoteResult, SignInPayload,
};
pub use local::LocalAuthApi;
pub use profile::{MemoryProfileStore, ProfileStore};
