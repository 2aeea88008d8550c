pub mod account;
pub mod assignment;
pub mod recon;
pub mod spending;

pub use account::{AdAccount, Batch, Customer, InvoiceEntity, NewAccount};
pub use assignment::{
    close_reason, open_reason, AssignDimension, AssignReason, AssignmentHistory,
};
pub use recon::{
    allocate_import, build_import_record, compute_day_deltas, decide_upsert, plan_profile_update,
    DayDeltaPlan, DeltaSegment, ProfileUpdatePlan, ResetAnomaly, SnapshotReading, UpsertDecision,
};
pub use spending::{
    ImportRequest, ImportRow, ImportSummary, RecalcOutcome, RepairSummary, SpendingRecord,
    SpendingRecordRow, SpendingSnapshot,
};
