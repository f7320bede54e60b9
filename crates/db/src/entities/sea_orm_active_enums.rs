//! `SeaORM` active enums mapped to Postgres enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `user_role` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role")]
pub enum UserRole {
    /// Employee.
    #[sea_orm(string_value = "EMPLOYEE")]
    Employee,
    /// Manager.
    #[sea_orm(string_value = "MANAGER")]
    Manager,
    /// Admin.
    #[sea_orm(string_value = "ADMIN")]
    Admin,
}

/// `approval_rule_type` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "approval_rule_type")]
pub enum ApprovalRuleType {
    /// Everyone approves.
    #[sea_orm(string_value = "UNANIMOUS")]
    Unanimous,
    /// Threshold share approves.
    #[sea_orm(string_value = "PERCENTAGE")]
    Percentage,
    /// Specific approver decides.
    #[sea_orm(string_value = "SPECIFIC")]
    Specific,
    /// Threshold or specific approver.
    #[sea_orm(string_value = "HYBRID")]
    Hybrid,
}

/// `approval_status` enum, shared by expenses and approval requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "approval_status")]
pub enum ApprovalStatus {
    /// Pending.
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Approved.
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    /// Rejected.
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}
