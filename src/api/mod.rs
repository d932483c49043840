//! HTTP surface: `POST /meter`, `GET /ping`, `GET /health`.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{build_router, start_server, AppState};
