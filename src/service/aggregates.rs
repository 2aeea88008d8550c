use sqlx::PgPool;

use crate::db::queries_counters;
use crate::error::ReconError;
use crate::models::RepairSummary;

/// 聚合刷新服务
/// 日常路径由台账/对账在事务内按范围调用 queries_counters 的单目标重算;
/// 这里提供批量修复: 绕过增量路径的导入/迁移之后, 把所有
/// 冗余计数一次性对齐到事实数据, 对齐后的再次运行是不动点
pub struct AggregateService {
    pool: PgPool,
}

impl AggregateService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 全量修复所有冗余计数与累计消耗
    pub async fn repair_all_counters(&self) -> Result<RepairSummary, ReconError> {
        let mut tx = self.pool.begin().await?;

        let invoice_entities = queries_counters::repair_invoice_entity_counters(&mut *tx).await?;
        let customers = queries_counters::repair_customer_counters(&mut *tx).await?;
        let batches = queries_counters::repair_batch_counters(&mut *tx).await?;
        let accounts = queries_counters::repair_account_totals(&mut *tx).await?;

        tx.commit().await?;

        tracing::info!(
            "计数修复完成: 开票主体 {}, 客户 {}, 批次 {}, 账户 {}",
            invoice_entities,
            customers,
            batches,
            accounts
        );

        Ok(RepairSummary {
            invoice_entities,
            customers,
            batches,
            accounts,
        })
    }
}
