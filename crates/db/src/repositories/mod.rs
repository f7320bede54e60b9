//! Repository implementations for data access.
//!
//! Repositories hide the `SeaORM` details behind the storage traits declared
//! in `spendflow-core`.

pub mod approval_store;

pub use approval_store::SeaOrmApprovalStore;
