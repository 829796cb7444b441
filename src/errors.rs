pub use crate::gen::{SimConfigError, SimulationError};
pub use crate::imports::history::HistoryError;
pub use crate::model::schema::{SchemaError, SchemaReason};
pub use crate::model::{PortfolioError, UnknownTransactionKind};
pub use crate::util::period::PeriodError;
