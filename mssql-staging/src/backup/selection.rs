//! Choosing the next backup set to restore.
//!
//! Pure functions over a scanned catalog and the last checkpoint; nothing
//! here talks to the host.

use super::catalog::{BackupHeader, BackupType};
use super::checkpoint::RestoreCheckpoint;
use crate::EngineError;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Start over from the newest full backup
    Resync,
    /// Apply whatever is newer than the checkpoint
    Incremental,
}

/// The backup set to apply next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub filename: String,
    pub position: u32,
    pub backup_type: BackupType,
    pub timestamp: NaiveDateTime,
}

impl Selection {
    /// Checkpoint to persist once this selection has been restored.
    pub fn checkpoint(&self) -> RestoreCheckpoint {
        RestoreCheckpoint {
            backup: self.timestamp,
            filename: self.filename.clone(),
            position: self.position,
        }
    }
}

impl From<&BackupHeader> for Selection {
    fn from(header: &BackupHeader) -> Self {
        Self {
            filename: header.filename.clone(),
            position: header.position,
            backup_type: header.backup_type,
            timestamp: header.start_timestamp,
        }
    }
}

/// Nothing eligible in the catalog; an operator-actionable outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    NoBackup,
    NoNewBackup { since: NaiveDateTime },
}

impl NotFound {
    pub fn into_error(self, location: &str) -> EngineError {
        match self {
            NotFound::NoBackup => EngineError::NoBackupFound {
                location: location.to_string(),
            },
            NotFound::NoNewBackup { since } => EngineError::NoNewBackupFound {
                since: since.to_string(),
            },
        }
    }
}

/// Pick the backup set that brings the staging database up to date with
/// the least restore work.
///
/// * `Resync` takes the newest full backup and ignores the checkpoint.
/// * `Incremental` without a checkpoint takes the newest backup of any type.
/// * `Incremental` with a checkpoint prefers the newest full backup taken
///   after it, then the newest differential taken after it.
///
/// Ties on the start timestamp go to the later position in the file.
pub fn select_next_backup(
    catalog: &[BackupHeader],
    checkpoint: Option<&RestoreCheckpoint>,
    mode: SelectionMode,
) -> Result<Selection, NotFound> {
    match (mode, checkpoint) {
        (SelectionMode::Resync, _) => {
            newest(catalog, |h| h.backup_type == BackupType::Full).ok_or(NotFound::NoBackup)
        }
        (SelectionMode::Incremental, None) => newest(catalog, |_| true).ok_or(NotFound::NoBackup),
        (SelectionMode::Incremental, Some(last)) => {
            let since = last.backup;
            newest(catalog, |h| {
                h.backup_type == BackupType::Full && h.start_timestamp > since
            })
            .or_else(|| {
                newest(catalog, |h| {
                    h.backup_type == BackupType::Differential && h.start_timestamp > since
                })
            })
            .ok_or(NotFound::NoNewBackup { since })
        }
    }
}

fn newest(catalog: &[BackupHeader], eligible: impl Fn(&BackupHeader) -> bool) -> Option<Selection> {
    catalog
        .iter()
        .filter(|h| eligible(h))
        .max_by_key(|h| (h.start_timestamp, h.position))
        .map(Selection::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn header(kind: BackupType, at: NaiveDateTime, position: u32, file: &str) -> BackupHeader {
        BackupHeader {
            backup_type: kind,
            position,
            database_name: "sales".into(),
            start_timestamp: at,
            filename: file.into(),
        }
    }

    fn checkpoint(at: NaiveDateTime) -> RestoreCheckpoint {
        RestoreCheckpoint {
            backup: at,
            filename: "old.bak".into(),
            position: 1,
        }
    }

    #[test]
    fn test_resync_takes_newest_full() {
        let catalog = vec![
            header(BackupType::Full, ts(1, 2), 1, "a.bak"),
            header(BackupType::Full, ts(3, 2), 1, "c.bak"),
            header(BackupType::Differential, ts(4, 2), 1, "d.bak"),
        ];
        let chosen = select_next_backup(&catalog, Some(&checkpoint(ts(5, 0))), SelectionMode::Resync)
            .unwrap();
        assert_eq!(chosen.filename, "c.bak");
        assert_eq!(chosen.timestamp, ts(3, 2));
    }

    #[test]
    fn test_resync_without_full_is_not_found() {
        let catalog = vec![header(BackupType::Differential, ts(4, 2), 1, "d.bak")];
        assert_eq!(
            select_next_backup(&catalog, None, SelectionMode::Resync),
            Err(NotFound::NoBackup)
        );
        assert_eq!(
            select_next_backup(&[], None, SelectionMode::Incremental),
            Err(NotFound::NoBackup)
        );
    }

    #[test]
    fn test_tie_goes_to_later_position() {
        let catalog = vec![
            header(BackupType::Full, ts(2, 2), 1, "multi.bak"),
            header(BackupType::Full, ts(2, 2), 3, "multi.bak"),
            header(BackupType::Full, ts(2, 2), 2, "multi.bak"),
        ];
        let chosen = select_next_backup(&catalog, None, SelectionMode::Resync).unwrap();
        assert_eq!(chosen.position, 3);
    }

    #[test]
    fn test_full_newer_than_checkpoint_beats_differential() {
        // Full at T1, Differential at T2 > T1, checkpoint at T0 < T1.
        let catalog = vec![
            header(BackupType::Full, ts(2, 0), 1, "a.bak"),
            header(BackupType::Differential, ts(3, 0), 1, "b.bak"),
        ];
        let chosen = select_next_backup(
            &catalog,
            Some(&checkpoint(ts(1, 0))),
            SelectionMode::Incremental,
        )
        .unwrap();

        assert_eq!(chosen.filename, "a.bak");
        assert_eq!(chosen.position, 1);
        assert_eq!(chosen.checkpoint().backup, ts(2, 0));
    }

    #[test]
    fn test_full_wins_over_every_differential() {
        let since = ts(1, 0);
        for diff_hour in [1, 5, 23] {
            let catalog = vec![
                header(BackupType::Differential, ts(2, diff_hour), 1, "d.bak"),
                header(BackupType::Full, ts(2, 12), 1, "f.bak"),
                header(BackupType::Full, ts(1, 0), 2, "f.bak"),
            ];
            let chosen =
                select_next_backup(&catalog, Some(&checkpoint(since)), SelectionMode::Incremental)
                    .unwrap();
            assert_eq!(chosen.backup_type, BackupType::Full);
            assert_eq!(chosen.filename, "f.bak");
        }
    }

    #[test]
    fn test_newest_differential_when_no_new_full() {
        let catalog = vec![
            header(BackupType::Full, ts(1, 0), 1, "a.bak"),
            header(BackupType::Differential, ts(2, 0), 1, "b.bak"),
            header(BackupType::Differential, ts(3, 0), 1, "c.bak"),
            header(BackupType::Log, ts(4, 0), 1, "d.trn"),
        ];
        let chosen = select_next_backup(
            &catalog,
            Some(&checkpoint(ts(1, 0))),
            SelectionMode::Incremental,
        )
        .unwrap();
        assert_eq!(chosen.filename, "c.bak");
        assert_eq!(chosen.backup_type, BackupType::Differential);
    }

    #[test]
    fn test_nothing_newer_than_checkpoint() {
        let catalog = vec![
            header(BackupType::Full, ts(1, 0), 1, "a.bak"),
            header(BackupType::Differential, ts(2, 0), 1, "b.bak"),
        ];
        let since = ts(2, 0);
        assert_eq!(
            select_next_backup(&catalog, Some(&checkpoint(since)), SelectionMode::Incremental),
            Err(NotFound::NoNewBackup { since })
        );
    }

    #[test]
    fn test_first_run_matches_resync_for_full_only_catalogs() {
        let catalog = vec![
            header(BackupType::Full, ts(1, 0), 1, "a.bak"),
            header(BackupType::Full, ts(4, 0), 2, "b.bak"),
            header(BackupType::Full, ts(4, 0), 1, "b.bak"),
        ];
        assert_eq!(
            select_next_backup(&catalog, None, SelectionMode::Incremental),
            select_next_backup(&catalog, None, SelectionMode::Resync)
        );
    }

    #[test]
    fn test_first_run_considers_every_type() {
        let catalog = vec![
            header(BackupType::Full, ts(1, 0), 1, "a.bak"),
            header(BackupType::Log, ts(2, 0), 1, "a.trn"),
        ];
        let chosen = select_next_backup(&catalog, None, SelectionMode::Incremental).unwrap();
        assert_eq!(chosen.backup_type, BackupType::Log);
    }

    #[test]
    fn test_not_found_maps_to_errors() {
        let err = NotFound::NoBackup.into_error("/backups/sales");
        assert!(matches!(err, EngineError::NoBackupFound { .. }));
        assert!(err.is_not_found());
    }
}
