use crate::error::ReconError;
use crate::models::{ImportRequest, ImportSummary, RecalcOutcome, RepairSummary, SpendingSnapshot};
use crate::service::{AggregateService, LedgerService, ReconcilerService};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::spending::SNAPSHOT_PERIODIC;

/// 错误分类 -> HTTP 状态码
fn status_for(e: &ReconError) -> StatusCode {
    match e {
        ReconError::NotFound(_) => StatusCode::NOT_FOUND,
        ReconError::NoData { .. } => StatusCode::BAD_REQUEST,
        ReconError::Conflict(_) => StatusCode::CONFLICT,
        ReconError::AllocationAnomaly { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ReconError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

fn error_response(e: ReconError) -> Response {
    let resp = ErrorResponse {
        success: false,
        message: e.to_string(),
    };
    (status_for(&e), Json(resp)).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 请求体: 按日重算
#[derive(Debug, Deserialize)]
pub struct RecalcRequest {
    pub account_id: i64,
    pub day: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct RecalcResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: RecalcOutcome,
}

/// 快照增量模式: 按当日快照重算消耗记录
pub async fn recalculate_day(
    State(reconciler): State<Arc<ReconcilerService>>,
    Json(req): Json<RecalcRequest>,
) -> Response {
    match reconciler.recalculate_day(req.account_id, req.day).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(RecalcResponse {
                success: true,
                outcome,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

/// 权威日总额导入确认 (逐行尽力而为, 行级失败在 errors 里)
pub async fn import_daily_totals(
    State(reconciler): State<Arc<ReconcilerService>>,
    Json(req): Json<ImportRequest>,
) -> Response {
    let total = req.rows.len();
    match reconciler.import_daily_totals(&req).await {
        Ok(summary) => {
            let message = format!(
                "Processed {} rows, {} failed",
                total,
                summary.errors.len()
            );
            (
                StatusCode::OK,
                Json(ImportResponse {
                    success: true,
                    message,
                    summary,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// 请求体: 落累计快照
#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub account_id: i64,
    pub day: NaiveDate,
    pub cumulative_amount: BigDecimal,
    pub snapshot_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub success: bool,
    pub snapshot: SpendingSnapshot,
}

pub async fn record_snapshot(
    State(reconciler): State<Arc<ReconcilerService>>,
    Json(req): Json<SnapshotRequest>,
) -> Response {
    let snapshot_type = req.snapshot_type.as_deref().unwrap_or(SNAPSHOT_PERIODIC);
    match reconciler
        .record_snapshot(req.account_id, req.day, &req.cumulative_amount, snapshot_type)
        .await
    {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(SnapshotResponse {
                success: true,
                snapshot,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// 请求体: 批量挂目标 (开票主体/客户通用)
#[derive(Debug, Deserialize)]
pub struct BulkLinkRequest {
    pub account_ids: Vec<i64>,
    pub target_id: i64,
    pub actor: Option<String>,
}

/// 请求体: 批量解绑
#[derive(Debug, Deserialize)]
pub struct BulkUnlinkRequest {
    pub account_ids: Vec<i64>,
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessedIdsResponse {
    pub success: bool,
    pub processed_ids: Vec<i64>,
}

fn processed_response(result: Result<Vec<i64>, ReconError>) -> Response {
    match result {
        Ok(processed_ids) => (
            StatusCode::OK,
            Json(ProcessedIdsResponse {
                success: true,
                processed_ids,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn link_invoice_entity(
    State(ledger): State<Arc<LedgerService>>,
    Json(req): Json<BulkLinkRequest>,
) -> Response {
    processed_response(
        ledger
            .bulk_link_invoice_entity(&req.account_ids, req.target_id, req.actor.as_deref())
            .await,
    )
}

pub async fn unlink_invoice_entity(
    State(ledger): State<Arc<LedgerService>>,
    Json(req): Json<BulkUnlinkRequest>,
) -> Response {
    processed_response(
        ledger
            .bulk_unlink_invoice_entity(&req.account_ids, req.actor.as_deref())
            .await,
    )
}

pub async fn assign_customer(
    State(ledger): State<Arc<LedgerService>>,
    Json(req): Json<BulkLinkRequest>,
) -> Response {
    processed_response(
        ledger
            .bulk_assign_customer(&req.account_ids, req.target_id, req.actor.as_deref())
            .await,
    )
}

pub async fn unassign_customer(
    State(ledger): State<Arc<LedgerService>>,
    Json(req): Json<BulkUnlinkRequest>,
) -> Response {
    processed_response(
        ledger
            .bulk_unassign_customer(&req.account_ids, req.actor.as_deref())
            .await,
    )
}

/// 请求体: 导出当日对账记录到服务器侧 CSV
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub account_id: i64,
    pub day: NaiveDate,
    pub output_path: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub records_exported: usize,
}

pub async fn export_day_records(
    State(reconciler): State<Arc<ReconcilerService>>,
    Json(req): Json<ExportRequest>,
) -> Response {
    match reconciler
        .export_day_records(req.account_id, req.day, std::path::Path::new(&req.output_path))
        .await
    {
        Ok(records_exported) => (
            StatusCode::OK,
            Json(ExportResponse {
                success: true,
                records_exported,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize)]
pub struct RepairResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: RepairSummary,
}

/// 批量修复所有冗余计数
pub async fn repair_counters(State(aggregates): State<Arc<AggregateService>>) -> Response {
    match aggregates.repair_all_counters().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(RepairResponse {
                success: true,
                summary,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
