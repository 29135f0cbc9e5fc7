//! # Database module: PostgreSQL pool, migrations and the sqlx-backed store
//!
//! - [`connect`] opens a pool sized from [`crate::settings::Database`].
//! - [`migrate`] applies the embedded migrations under `packages/api/migrations`.
//! - [`PgStore`] implements [`store::ChurchStore`] on top of the pool.

mod pg;
mod pool;

pub use pg::PgStore;
pub use pool::{connect, migrate};
