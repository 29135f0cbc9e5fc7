//! # API crate: the HTTP backend for Flock
//!
//! Everything between the socket and the storage trait: authentication, the
//! PostgreSQL store, route handlers and settings. The `server` package only
//! wires these together.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`auth`] | Argon2 hashing, bearer-token sessions, the [`auth::CurrentUser`] extractor |
//! | [`db`] | PostgreSQL pool, embedded migrations, [`db::PgStore`] |
//! | [`error`] | [`ApiError`](error::ApiError) and its mapping onto HTTP statuses |
//! | [`routes`] | One axum router per resource, merged by [`routes::router`] |
//! | [`settings`] | Layered configuration: defaults, `config.toml`, environment |
//! | [`state`] | [`AppState`](state::AppState) shared by all handlers |
//!
//! ## Request flow
//!
//! A request carrying `Authorization: Bearer <token>` is resolved to a user by
//! [`auth::CurrentUser`]; the handler checks the user's permission flag for the
//! resource and action, then calls the [`store::ChurchStore`] held in the state.
//! Store errors convert into 400/404/409 responses; anything unexpected is
//! logged and answered with a generic 500.

pub mod auth;
pub mod db;
pub mod error;
pub mod routes;
pub mod settings;
pub mod state;

pub use routes::router;
pub use state::AppState;
