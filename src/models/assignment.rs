use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 分配维度: 开票主体 / 客户 两条独立历史
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignDimension {
    InvoiceEntity,
    Customer,
}

/// 历史行的变更原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignReason {
    Initial,
    Reassign,
    Migration,
}

impl AssignReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignReason::Initial => "INITIAL",
            AssignReason::Reassign => "REASSIGN",
            AssignReason::Migration => "MIGRATION",
        }
    }
}

/// 关闭旧生效行时写入的原因: 开票维度记 MIGRATION, 客户维度记 REASSIGN
pub fn close_reason(dim: AssignDimension) -> AssignReason {
    match dim {
        AssignDimension::InvoiceEntity => AssignReason::Migration,
        AssignDimension::Customer => AssignReason::Reassign,
    }
}

/// 新开生效行的原因: 无前任为 INITIAL, 有前任与关闭原因一致
pub fn open_reason(dim: AssignDimension, had_prior: bool) -> AssignReason {
    if !had_prior {
        return AssignReason::Initial;
    }
    close_reason(dim)
}

/// 分配历史行 (t_invoice_link_history / t_customer_assign_history 同构)
/// fendedat 为空表示当前生效; 每个账户每条历史同一时刻最多一条生效行
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AssignmentHistory {
    pub fid: i64,
    pub faccountid: i64,
    pub ftargetid: i64,
    pub fstartedat: DateTime<Utc>,
    pub fendedat: Option<DateTime<Utc>>,
    pub factor: Option<String>,
    pub freason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_reason_when_no_prior_target() {
        assert_eq!(
            open_reason(AssignDimension::InvoiceEntity, false),
            AssignReason::Initial
        );
        assert_eq!(
            open_reason(AssignDimension::Customer, false),
            AssignReason::Initial
        );
    }

    #[test]
    fn invoice_dimension_supersede_uses_migration() {
        assert_eq!(
            close_reason(AssignDimension::InvoiceEntity),
            AssignReason::Migration
        );
        assert_eq!(
            open_reason(AssignDimension::InvoiceEntity, true),
            AssignReason::Migration
        );
    }

    #[test]
    fn customer_dimension_supersede_uses_reassign() {
        assert_eq!(close_reason(AssignDimension::Customer), AssignReason::Reassign);
        assert_eq!(
            open_reason(AssignDimension::Customer, true),
            AssignReason::Reassign
        );
    }

    #[test]
    fn reason_text_matches_storage_values() {
        assert_eq!(AssignReason::Initial.as_str(), "INITIAL");
        assert_eq!(AssignReason::Reassign.as_str(), "REASSIGN");
        assert_eq!(AssignReason::Migration.as_str(), "MIGRATION");
    }
}
