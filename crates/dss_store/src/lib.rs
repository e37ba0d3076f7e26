//! Sea-orm backed persistence for the discovery and synchronization
//! service: schema migrations, the cell-indexed repository, and the store
//! facade implementing the `dss_core` traits.

pub mod config;
mod db;
pub mod migration;
pub mod store;

pub use config::{DatabaseConfig, DssConfig, LimitsConfig, PoolConfig};
pub use dss_core::*;
pub use migration::Migrator;
pub use store::DssStore;
