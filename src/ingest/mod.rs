//! Public event-ingest listener
//!
//! A separate router from the API surface: poll pages post tracking beacons
//! here cross-origin, every endpoint responds 202, and recording failures
//! never reach the client.

pub mod handlers;
pub mod routes;

pub use routes::create_ingest_router;
