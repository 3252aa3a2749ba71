//! Native backups: reading the catalog, choosing what to restore next and
//! remembering what was restored.

pub mod catalog;
pub mod checkpoint;
pub mod selection;

pub use catalog::{BackupHeader, BackupType, CatalogReader};
pub use checkpoint::{CheckpointStore, RestoreCheckpoint};
pub use selection::{select_next_backup, NotFound, Selection, SelectionMode};
