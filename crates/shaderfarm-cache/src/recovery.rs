//! Backup-chain recovery.
//!
//! The chain is `Cache.dat` (active) → `Cache.bak` (previous good) →
//! `Cache.bak2` (previous-previous). A successful load rotates the chain
//! forward by one before any new persistence. A failed load rebuilds the
//! active file from `Cache.bak`; if that also fails the store starts empty.
//! Data loss is logged, never fatal.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::{codec, BACKUP2_FILE, BACKUP_FILE, CACHE_FILE};

/// How the store came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No cache file existed; first start.
    Started,
    /// Active file loaded cleanly; backups rotated.
    Fresh,
    /// Active file was corrupt; rebuilt from `Cache.bak`.
    RecoveredFromBackup,
    /// Active file and backup both unusable; starting empty.
    EmptyFallback,
}

/// Load the cache from `dir`, walking the backup chain on corruption.
///
/// Infallible by design: every failure path degrades to a smaller (possibly
/// empty) cache rather than an error.
pub fn load_with_recovery(dir: &Path) -> (LoadOutcome, HashMap<String, Vec<u8>>) {
    let dat = dir.join(CACHE_FILE);
    let bak = dir.join(BACKUP_FILE);

    if !dat.exists() {
        return (LoadOutcome::Started, HashMap::new());
    }

    match read_and_decode(&dat) {
        Ok(entries) => {
            rotate_backups(dir);
            (LoadOutcome::Fresh, entries)
        }
        Err(reason) => {
            warn!(file = %dat.display(), %reason, "active cache file unusable");
            if bak.exists() {
                // Rebuild the active file from the previous good copy.
                if let Err(e) = fs::copy(&bak, &dat) {
                    warn!(error = %e, "failed to restore cache from backup");
                } else if let Ok(entries) = read_and_decode(&dat) {
                    info!(
                        entries = entries.len(),
                        "cache recovered from backup copy"
                    );
                    return (LoadOutcome::RecoveredFromBackup, entries);
                }
            }
            if let Err(e) = fs::remove_file(&dat) {
                warn!(error = %e, "failed to remove corrupt cache file");
            }
            warn!("cache could not be recovered, starting empty");
            (LoadOutcome::EmptyFallback, HashMap::new())
        }
    }
}

fn read_and_decode(path: &Path) -> Result<HashMap<String, Vec<u8>>, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    codec::decode(&bytes).map_err(|e| e.to_string())
}

/// Rotate `bak` → `bak2` and `dat` → `bak`. Each copy is best-effort: a
/// failure leaves the previous file in place and is logged.
fn rotate_backups(dir: &Path) {
    let dat = dir.join(CACHE_FILE);
    let bak = dir.join(BACKUP_FILE);
    let bak2 = dir.join(BACKUP2_FILE);

    if bak.exists() {
        if let Err(e) = fs::copy(&bak, &bak2) {
            warn!(error = %e, "backup rotation bak -> bak2 failed");
        }
    }
    if let Err(e) = fs::copy(&dat, &bak) {
        warn!(error = %e, "backup rotation dat -> bak failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(pairs: &[(&str, &[u8])]) -> HashMap<String, Vec<u8>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    fn write_cache(path: &Path, map: &HashMap<String, Vec<u8>>) {
        fs::write(path, codec::encode(map)).unwrap();
    }

    #[test]
    fn test_started_when_no_file() {
        let dir = TempDir::new().unwrap();
        let (outcome, loaded) = load_with_recovery(dir.path());
        assert_eq!(outcome, LoadOutcome::Started);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_fresh_load_rotates_chain() {
        let dir = TempDir::new().unwrap();
        let map = entries(&[("k", b"v")]);
        write_cache(&dir.path().join(CACHE_FILE), &map);

        let (outcome, loaded) = load_with_recovery(dir.path());
        assert_eq!(outcome, LoadOutcome::Fresh);
        assert_eq!(loaded, map);
        // dat copied forward to bak
        assert_eq!(
            fs::read(dir.path().join(BACKUP_FILE)).unwrap(),
            fs::read(dir.path().join(CACHE_FILE)).unwrap()
        );
        assert!(!dir.path().join(BACKUP2_FILE).exists());
    }

    #[test]
    fn test_repeated_loads_advance_bak2_without_loss() {
        let dir = TempDir::new().unwrap();
        let map = entries(&[("k", b"v"), ("k2", b"v2")]);
        write_cache(&dir.path().join(CACHE_FILE), &map);

        let (first, loaded) = load_with_recovery(dir.path());
        assert_eq!(first, LoadOutcome::Fresh);
        assert_eq!(loaded, map);

        let (second, loaded) = load_with_recovery(dir.path());
        assert_eq!(second, LoadOutcome::Fresh);
        assert_eq!(loaded, map);

        // After two loads every link in the chain holds the same content.
        for name in [CACHE_FILE, BACKUP_FILE, BACKUP2_FILE] {
            let bytes = fs::read(dir.path().join(name)).unwrap();
            assert_eq!(codec::decode(&bytes).unwrap(), map);
        }
    }

    #[test]
    fn test_corrupt_dat_recovers_from_backup() {
        let dir = TempDir::new().unwrap();
        let good = entries(&[("cached", b"payload")]);
        write_cache(&dir.path().join(BACKUP_FILE), &good);
        fs::write(dir.path().join(CACHE_FILE), b"garbage not a cache").unwrap();

        let (outcome, loaded) = load_with_recovery(dir.path());
        assert_eq!(outcome, LoadOutcome::RecoveredFromBackup);
        assert_eq!(loaded, good);

        // Equivalent to loading Cache.bak directly: dat now carries bak's content.
        assert_eq!(
            fs::read(dir.path().join(CACHE_FILE)).unwrap(),
            fs::read(dir.path().join(BACKUP_FILE)).unwrap()
        );
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let good = entries(&[("cached", b"payload")]);
        write_cache(&dir.path().join(BACKUP_FILE), &good);
        fs::write(dir.path().join(CACHE_FILE), b"garbage").unwrap();

        let (first, loaded_first) = load_with_recovery(dir.path());
        assert_eq!(first, LoadOutcome::RecoveredFromBackup);

        // The repaired file now loads cleanly.
        let (second, loaded_second) = load_with_recovery(dir.path());
        assert_eq!(second, LoadOutcome::Fresh);
        assert_eq!(loaded_first, loaded_second);
    }

    #[test]
    fn test_both_corrupt_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CACHE_FILE), b"bad dat").unwrap();
        fs::write(dir.path().join(BACKUP_FILE), b"bad bak").unwrap();

        let (outcome, loaded) = load_with_recovery(dir.path());
        assert_eq!(outcome, LoadOutcome::EmptyFallback);
        assert!(loaded.is_empty());
        // Corrupt active file is removed so the next flush starts clean.
        assert!(!dir.path().join(CACHE_FILE).exists());
    }

    #[test]
    fn test_corrupt_dat_no_backup_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CACHE_FILE), b"bad dat").unwrap();

        let (outcome, loaded) = load_with_recovery(dir.path());
        assert_eq!(outcome, LoadOutcome::EmptyFallback);
        assert!(loaded.is_empty());
    }
}
