//! Session and request plumbing: credential storage, the single-flight
//! refresh coordinator, and the authenticated request pipeline.

pub mod pipeline;
pub mod refresh;
pub mod store;
pub mod transport;

pub use pipeline::ApiClient;
pub use refresh::RefreshCoordinator;
pub use store::{CredentialStore, SessionStatus, TokenPair};
pub use transport::{ApiRequest, HttpTransport, Method, RawResponse, RequestBody, Transport};
