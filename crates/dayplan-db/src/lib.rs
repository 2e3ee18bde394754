//! Persistence layer for dayplan: SQLite pool, embedded migrations, the
//! persisted model types and the query functions over them.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
