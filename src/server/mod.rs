//! HTTP surface: admin catalog CRUD, cluster create/solve, and the polling
//! task protocol for provisioner workers.

pub mod handlers;
pub mod state;

pub use handlers::create_router;
pub use state::AppState;
