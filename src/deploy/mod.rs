//! Deployment and rollback of object definitions

pub mod deployer;
pub mod transform;

pub use deployer::{ApplyOutcome, BatchOutcome, Deployer, RollbackOutcome};
pub use transform::prepare_for_idempotent_apply;
