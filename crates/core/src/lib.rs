pub mod concurrency;
pub mod config;
pub mod errors;
pub mod models;
pub mod parameters;
pub mod query_hash;
pub mod traits;

pub use concurrency::{retry_on_conflict, CasOutcome, DEFAULT_CAS_ATTEMPTS};
pub use errors::*;
pub use query_hash::QueryHasher;
