use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// 服务错误分类
#[derive(Debug, Error)]
pub enum ReconError {
    /// 账户 / 开票主体 / 客户不存在
    #[error("{0} not found")]
    NotFound(String),

    /// 请求重算的当日没有任何快照
    #[error("no snapshots for account {account_id} on {day}")]
    NoData { account_id: i64, day: NaiveDate },

    /// 唯一标识冲突 (创建时外部ID重复)
    #[error("duplicate identifier: {0}")]
    Conflict(String),

    /// 分摊结果为负 (importedTotal 小于其他归属组合已记金额)
    #[error("negative allocation {allocated} for account {account_id} on {day}")]
    AllocationAnomaly {
        account_id: i64,
        day: NaiveDate,
        allocated: BigDecimal,
    },

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ReconError {
    /// 将唯一约束冲突翻译为 Conflict, 其他数据库错误原样透传
    pub fn from_db_unique(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            if db.code().as_deref() == Some("23505") {
                return ReconError::Conflict(what.to_string());
            }
        }
        ReconError::Db(e)
    }
}

/// 批量导入中单行的失败, 不中断整批
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row_index: usize,
    pub external_account_id: String,
    pub message: String,
}
