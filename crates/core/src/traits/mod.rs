pub mod collaborators;
pub mod query_runner;
pub mod repository;
pub mod shared_store;

pub use collaborators::*;
pub use query_runner::*;
pub use repository::*;
pub use shared_store::*;
