//! `SeaORM` Entity for approval_flow_steps table.
//!
//! Exactly one of `approver_role` and `approver_user_id` is set.

use super::sea_orm_active_enums::UserRole;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_flow_steps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub flow_id: Uuid,
    pub step_order: i32,
    pub approver_role: Option<UserRole>,
    pub approver_user_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_flows::Entity",
        from = "Column::FlowId",
        to = "super::approval_flows::Column::Id",
        on_delete = "Cascade"
    )]
    ApprovalFlows,
}

impl Related<super::approval_flows::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalFlows.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
