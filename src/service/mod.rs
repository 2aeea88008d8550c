pub mod aggregates;
pub mod ledger;
pub mod reconciler;

pub use aggregates::AggregateService;
pub use ledger::LedgerService;
pub use reconciler::ReconcilerService;
