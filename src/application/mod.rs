// Application layer - use cases and orchestration.
// The enforcer, import pipeline and report aggregator are composed by
// `LedgerService`, the only entry point clients should use.

mod cache;
pub mod enforcer;
pub mod error;
pub mod import;
pub mod reporting;
pub mod scope;
pub mod service;

pub use cache::{
    report_summary_key, Cache, MemoryCache, WriteGeneration, BUDGETS_KEY, REPORT_PREFIX,
};
pub use enforcer::*;
pub use error::*;
pub use import::*;
pub use reporting::*;
pub use scope::*;
pub use service::*;
