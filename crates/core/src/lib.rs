//! Core business logic for SpendFlow.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Storage is reached through the [`approval::ApprovalStore`] trait, implemented
//! here in memory and by `spendflow-db` for Postgres.
//!
//! # Modules
//!
//! - `approval` - Approval flows, request generation, decision evaluation and overrides

pub mod approval;
