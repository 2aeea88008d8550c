pub mod pool;
pub mod queries;
pub mod queries_counters;
pub mod queries_spending;

pub use pool::create_pool;
