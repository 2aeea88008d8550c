use crate::db::{queries, queries_counters};
use crate::error::ReconError;
use crate::models::{close_reason, open_reason, AssignDimension, AssignmentHistory};
use chrono::Utc;
use indexmap::IndexSet;
use sqlx::{PgConnection, PgPool};

/// 分配台账服务
/// 维护账户与开票主体/客户两个独立维度的 "当前指针 + 追加历史":
/// 关旧行、开新行、改当前引用、刷计数 在同一个事务里完成,
/// 保证每个 (账户, 维度) 同一时刻最多一条生效历史行
pub struct LedgerService {
    pool: PgPool,
}

/// 在既有事务内把账户挂到开票主体 (权威导入建账时复用, 不另开事务)
pub(crate) async fn link_invoice_entity_tx(
    conn: &mut PgConnection,
    account_id: i64,
    entity_id: i64,
    actor: Option<&str>,
) -> Result<AssignmentHistory, ReconError> {
    let active = queries::active_invoice_link(&mut *conn, account_id).await?;

    // 重复挂到同一主体: 幂等, 直接返回生效行
    if let Some(a) = &active {
        if a.ftargetid == entity_id {
            return Ok(a.clone());
        }
    }

    let now = Utc::now();
    let had_prior = active.is_some();
    let old_target = active.as_ref().map(|a| a.ftargetid);

    if let Some(a) = active {
        queries::close_invoice_link(
            &mut *conn,
            a.fid,
            now,
            close_reason(AssignDimension::InvoiceEntity).as_str(),
        )
        .await?;
    }

    let opened = queries::open_invoice_link(
        &mut *conn,
        account_id,
        entity_id,
        now,
        actor,
        open_reason(AssignDimension::InvoiceEntity, had_prior).as_str(),
    )
    .await?;

    queries::set_account_invoice_entity(&mut *conn, account_id, Some(entity_id)).await?;

    // 计数统一走按范围重算, 新旧主体各刷一次
    queries_counters::refresh_invoice_entity_counters(&mut *conn, entity_id).await?;
    if let Some(old) = old_target {
        queries_counters::refresh_invoice_entity_counters(&mut *conn, old).await?;
    }

    Ok(opened)
}

/// 在既有事务内把账户分配给客户
pub(crate) async fn assign_customer_tx(
    conn: &mut PgConnection,
    account_id: i64,
    customer_id: i64,
    actor: Option<&str>,
) -> Result<AssignmentHistory, ReconError> {
    let active = queries::active_customer_assign(&mut *conn, account_id).await?;

    if let Some(a) = &active {
        if a.ftargetid == customer_id {
            return Ok(a.clone());
        }
    }

    let now = Utc::now();
    let had_prior = active.is_some();
    let old_target = active.as_ref().map(|a| a.ftargetid);

    if let Some(a) = active {
        queries::close_customer_assign(
            &mut *conn,
            a.fid,
            now,
            close_reason(AssignDimension::Customer).as_str(),
        )
        .await?;
    }

    let opened = queries::open_customer_assign(
        &mut *conn,
        account_id,
        customer_id,
        now,
        actor,
        open_reason(AssignDimension::Customer, had_prior).as_str(),
    )
    .await?;

    queries::set_account_customer(&mut *conn, account_id, Some(customer_id)).await?;

    queries_counters::refresh_customer_counters(&mut *conn, customer_id).await?;
    if let Some(old) = old_target {
        queries_counters::refresh_customer_counters(&mut *conn, old).await?;
    }

    Ok(opened)
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 把账户挂到开票主体
    pub async fn link_invoice_entity(
        &self,
        account_id: i64,
        entity_id: i64,
        actor: Option<&str>,
    ) -> Result<AssignmentHistory, ReconError> {
        let mut tx = self.pool.begin().await?;
        queries::advisory_lock_account(&mut *tx, account_id).await?;

        queries::get_account(&mut *tx, account_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("account {}", account_id)))?;
        queries::get_invoice_entity(&mut *tx, entity_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("invoice entity {}", entity_id)))?;

        let opened = link_invoice_entity_tx(&mut tx, account_id, entity_id, actor).await?;
        tx.commit().await?;
        Ok(opened)
    }

    /// 解除账户与开票主体的关联
    pub async fn unlink_invoice_entity(
        &self,
        account_id: i64,
        actor: Option<&str>,
    ) -> Result<(), ReconError> {
        let mut tx = self.pool.begin().await?;
        queries::advisory_lock_account(&mut *tx, account_id).await?;

        queries::get_account(&mut *tx, account_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("account {}", account_id)))?;

        let active = queries::active_invoice_link(&mut *tx, account_id)
            .await?
            .ok_or_else(|| {
                ReconError::NotFound(format!("active invoice link for account {}", account_id))
            })?;

        // 解绑只封口, 不改历史行原因
        queries::close_invoice_link(&mut *tx, active.fid, Utc::now(), &active.freason).await?;
        queries::set_account_invoice_entity(&mut *tx, account_id, None).await?;
        queries_counters::refresh_invoice_entity_counters(&mut *tx, active.ftargetid).await?;

        tx.commit().await?;
        tracing::info!(
            "账户 {} 与开票主体 {} 解绑, 操作人: {:?}",
            account_id,
            active.ftargetid,
            actor
        );
        Ok(())
    }

    /// 把账户分配给客户
    pub async fn assign_customer(
        &self,
        account_id: i64,
        customer_id: i64,
        actor: Option<&str>,
    ) -> Result<AssignmentHistory, ReconError> {
        let mut tx = self.pool.begin().await?;
        queries::advisory_lock_account(&mut *tx, account_id).await?;

        queries::get_account(&mut *tx, account_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("account {}", account_id)))?;
        queries::get_customer(&mut *tx, customer_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("customer {}", customer_id)))?;

        let opened = assign_customer_tx(&mut tx, account_id, customer_id, actor).await?;
        tx.commit().await?;
        Ok(opened)
    }

    /// 取消账户的客户分配
    pub async fn unassign_customer(
        &self,
        account_id: i64,
        actor: Option<&str>,
    ) -> Result<(), ReconError> {
        let mut tx = self.pool.begin().await?;
        queries::advisory_lock_account(&mut *tx, account_id).await?;

        queries::get_account(&mut *tx, account_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("account {}", account_id)))?;

        let active = queries::active_customer_assign(&mut *tx, account_id)
            .await?
            .ok_or_else(|| {
                ReconError::NotFound(format!("active customer assignment for account {}", account_id))
            })?;

        queries::close_customer_assign(&mut *tx, active.fid, Utc::now(), &active.freason).await?;
        queries::set_account_customer(&mut *tx, account_id, None).await?;
        queries_counters::refresh_customer_counters(&mut *tx, active.ftargetid).await?;

        tx.commit().await?;
        tracing::info!(
            "账户 {} 与客户 {} 解除分配, 操作人: {:?}",
            account_id,
            active.ftargetid,
            actor
        );
        Ok(())
    }

    /// 批量挂开票主体: 逐个套用单账户契约, 未知账户静默跳过
    /// (容忍客户端过期勾选), 返回按请求顺序去重后的成功ID
    pub async fn bulk_link_invoice_entity(
        &self,
        account_ids: &[i64],
        entity_id: i64,
        actor: Option<&str>,
    ) -> Result<Vec<i64>, ReconError> {
        queries::get_invoice_entity(&self.pool, entity_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("invoice entity {}", entity_id)))?;

        let mut processed: IndexSet<i64> = IndexSet::new();
        for &account_id in account_ids {
            match self.link_invoice_entity(account_id, entity_id, actor).await {
                Ok(_) => {
                    processed.insert(account_id);
                }
                Err(ReconError::NotFound(what)) => {
                    tracing::warn!("批量挂开票主体: 跳过 {}", what);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "批量挂开票主体 {} 完成: {}/{} 个账户",
            entity_id,
            processed.len(),
            account_ids.len()
        );
        Ok(processed.into_iter().collect())
    }

    /// 批量解绑开票主体, 无生效关联的账户静默跳过
    pub async fn bulk_unlink_invoice_entity(
        &self,
        account_ids: &[i64],
        actor: Option<&str>,
    ) -> Result<Vec<i64>, ReconError> {
        let mut processed: IndexSet<i64> = IndexSet::new();
        for &account_id in account_ids {
            match self.unlink_invoice_entity(account_id, actor).await {
                Ok(()) => {
                    processed.insert(account_id);
                }
                Err(ReconError::NotFound(what)) => {
                    tracing::warn!("批量解绑开票主体: 跳过 {}", what);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(processed.into_iter().collect())
    }

    /// 批量分配客户
    pub async fn bulk_assign_customer(
        &self,
        account_ids: &[i64],
        customer_id: i64,
        actor: Option<&str>,
    ) -> Result<Vec<i64>, ReconError> {
        queries::get_customer(&self.pool, customer_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("customer {}", customer_id)))?;

        let mut processed: IndexSet<i64> = IndexSet::new();
        for &account_id in account_ids {
            match self.assign_customer(account_id, customer_id, actor).await {
                Ok(_) => {
                    processed.insert(account_id);
                }
                Err(ReconError::NotFound(what)) => {
                    tracing::warn!("批量分配客户: 跳过 {}", what);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "批量分配客户 {} 完成: {}/{} 个账户",
            customer_id,
            processed.len(),
            account_ids.len()
        );
        Ok(processed.into_iter().collect())
    }

    /// 批量取消客户分配
    pub async fn bulk_unassign_customer(
        &self,
        account_ids: &[i64],
        actor: Option<&str>,
    ) -> Result<Vec<i64>, ReconError> {
        let mut processed: IndexSet<i64> = IndexSet::new();
        for &account_id in account_ids {
            match self.unassign_customer(account_id, actor).await {
                Ok(()) => {
                    processed.insert(account_id);
                }
                Err(ReconError::NotFound(what)) => {
                    tracing::warn!("批量取消客户分配: 跳过 {}", what);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(processed.into_iter().collect())
    }
}
