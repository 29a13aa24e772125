use sea_orm::{ConnectionTrait, DatabaseConnection};

use crate::ResultEngine;

mod budgets;
mod categories;
mod reconcile;
mod tags;
mod transactions;

pub use budgets::{BudgetNew, BudgetPatch, BudgetProgress};
pub use transactions::{
    INVALID_TRANSACTION_NAME, MonthlyTotals, TransactionFilter, TransactionNew, TransactionPatch,
};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.database
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        // fail fast on a connection that cannot serve queries
        self.database.execute_unprepared("SELECT 1").await?;
        Ok(Engine {
            database: self.database,
        })
    }
}
