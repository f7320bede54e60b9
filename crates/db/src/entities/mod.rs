//! `SeaORM` entity definitions.

pub mod approval_flow_steps;
pub mod approval_flows;
pub mod approval_requests;
pub mod companies;
pub mod expenses;
pub mod sea_orm_active_enums;
pub mod users;
