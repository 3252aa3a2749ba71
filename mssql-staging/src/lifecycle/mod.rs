//! Lifecycle operations the host drives.

pub mod database;
pub mod staging;
pub mod status;
pub mod virtual_db;

pub use database::InstanceDatabase;
pub use staging::StagingController;
pub use status::{StagingState, Status};
pub use virtual_db::VirtualController;
