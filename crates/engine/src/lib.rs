pub use budgets::Budget;
pub use categories::Category;
pub use error::EngineError;
pub use ops::{
    BudgetNew, BudgetPatch, BudgetProgress, Engine, EngineBuilder, INVALID_TRANSACTION_NAME,
    MonthlyTotals, TransactionFilter, TransactionNew, TransactionPatch,
};
pub use tags::Tag;
pub use transactions::Transaction;

mod budgets;
mod categories;
pub mod cycle;
mod error;
mod ops;
mod tags;
mod transaction_tags;
mod transactions;
pub mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
