pub mod executor;
pub mod pool;
pub mod retry;

pub use executor::{UnitExecutor, UnitOutcome};
pub use pool::WorkerPool;
pub use retry::RetryPolicy;
