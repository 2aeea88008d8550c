use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::RowError;

pub const SNAPSHOT_PERIODIC: &str = "PERIODIC";
pub const SNAPSHOT_DAY_FINAL: &str = "DAY_FINAL";

pub const SOURCE_SNAPSHOT: &str = "SNAPSHOT";
pub const SOURCE_IMPORT: &str = "IMPORT";

/// 消耗快照 (t_spending_snapshot): 当日累计读数, 只追加
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SpendingSnapshot {
    pub fid: i64,
    pub faccountid: i64,
    pub fday: NaiveDate,
    pub fcumulativeamount: BigDecimal, // 外部平台上报的当日累计值
    pub fobservedat: DateTime<Utc>,
    pub finvoiceentityid: Option<i64>, // 采集时刻的开票主体
    pub fcustomerid: Option<i64>,      // 采集时刻的客户
    pub fsnapshottype: String,
}

/// 对账产出的消耗记录 (插入/响应结构, 无主键)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingRecord {
    pub faccountid: i64,
    pub fday: NaiveDate,
    pub famount: BigDecimal,
    pub fcurrency: String,
    pub finvoiceentityid: Option<i64>,
    pub fcustomerid: Option<i64>,
    pub fperiodstart: DateTime<Utc>,
    pub fperiodend: DateTime<Utc>,
    pub fsource: String,
    pub fcreatedat: DateTime<Utc>,
}

/// 已落库的消耗记录行
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SpendingRecordRow {
    pub fid: i64,
    pub faccountid: i64,
    pub fday: NaiveDate,
    pub famount: BigDecimal,
    pub fcurrency: String,
    pub finvoiceentityid: Option<i64>,
    pub fcustomerid: Option<i64>,
    pub fperiodstart: DateTime<Utc>,
    pub fperiodend: DateTime<Utc>,
    pub fsource: String,
    pub fcreatedat: DateTime<Utc>,
}

/// 按日重算的结果
#[derive(Debug, Clone, Serialize)]
pub struct RecalcOutcome {
    pub records_created: usize,
    pub resets_skipped: usize, // 累计值回退/重复读数, 未生成记录
    pub records: Vec<SpendingRecord>,
}

/// 权威日总额导入的一行
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRow {
    pub external_account_id: String,
    pub account_name: String,
    pub new_status: Option<String>,
    pub new_amount: BigDecimal,       // 该账户当日权威总额
    pub existing_amount: Option<BigDecimal>,
    pub account_id: Option<i64>,
}

/// 权威日总额导入请求
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    pub day: NaiveDate,
    pub batch_id: Option<i64>,
    pub invoice_entity_id: Option<i64>,
    pub overwrite: bool,
    pub rows: Vec<ImportRow>,
}

/// 导入汇总: 逐行尽力而为, 单行失败进入 errors 不中断
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub accounts_created: usize,
    pub accounts_updated: usize,
    pub spending_created: usize,
    pub spending_updated: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

/// 计数器修复结果 (影响的行数)
#[derive(Debug, Clone, Serialize)]
pub struct RepairSummary {
    pub invoice_entities: u64,
    pub customers: u64,
    pub batches: u64,
    pub accounts: u64,
}
