pub mod executor;
pub mod runners;
pub mod service;

pub use executor::{ExecutionOutcome, ExecutorRepositories, ExecutorSettings, QueryExecutor};
pub use runners::{QueryRunnerRegistry, UrlRunner, UrlRunnerFactory, UrlRunnerOptions};
pub use service::WorkerService;
