//! Queue-mediated request routing between the UI tier and the backend.
//!
//! A request travels `client_request` → forwarder → `backend_request` →
//! executor → `response` → router, keyed by one correlation key the whole
//! way.

pub mod config;
pub mod envelope;
pub mod executor;
pub mod forwarder;
pub mod router;
pub mod worker;

pub use config::{RelayConfig, RelayTopics};
pub use envelope::{
    Envelope, OrderRequest, RelayCommand, RelayReply, UserGetRequest,
    UserListRequest,
};
pub use executor::Executor;
pub use forwarder::Forwarder;
pub use router::{RelayClient, ResponseRouter};
