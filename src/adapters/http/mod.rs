//! HTTP-facing adapters: the outbound back-end client and the inbound
//! manager router.

pub mod backend_client;
pub mod router;

pub use backend_client::HttpBackendClient;
pub use router::{build_router, AppState};
