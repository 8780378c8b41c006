//! Server-side components.
//!
//! This module contains:
//! - `api_error`   → JSON error envelope and status mapping
//! - `database`    → SQL store over SQLite/Postgres
//! - `handlers`    → Axum HTTP handlers
//! - `logging`     → Request logging middleware and health payload
//! - `routes`      → Router builder
//! - `validation`  → Request validation utilities

pub mod api_error;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod validation;

pub use api_error::{ApiError, ErrorCode};
pub use database::Database;
pub use handlers::AppState;
pub use routes::build_router;
pub use validation::{ValidationError, ValidationResult};
