mod budget;
mod category;
mod error;
mod import;
mod money;
mod report;
mod transaction;

pub use budget::*;
pub use category::*;
pub use error::*;
pub use import::*;
pub use money::*;
pub use report::*;
pub use transaction::*;
