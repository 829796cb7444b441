pub use self::{portfolio::*, stats::*, transaction::*};

mod portfolio;
pub mod schema;
mod stats;
pub mod transaction;
