//! `SeaORM` Entity for approval_flows table.

use super::sea_orm_active_enums::ApprovalRuleType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_flows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub rule_type: ApprovalRuleType,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))", nullable)]
    pub percentage_threshold: Option<Decimal>,
    pub specific_approver_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::companies::Entity",
        from = "Column::CompanyId",
        to = "super::companies::Column::Id"
    )]
    Companies,
    #[sea_orm(has_many = "super::approval_flow_steps::Entity")]
    ApprovalFlowSteps,
}

impl Related<super::companies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Companies.def()
    }
}

impl Related<super::approval_flow_steps::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalFlowSteps.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
