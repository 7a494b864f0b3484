use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dates::parse_date;
use crate::error::PipelineError;
use crate::models::CanonicalAlert;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub path: PathBuf,
    /// The dataset did not exist before this merge.
    pub created: bool,
    pub added: usize,
    /// Batch rows dropped because their `alert_id` was already present.
    pub skipped: usize,
    /// Skipped rows whose content differs from the stored row with the same id.
    pub collisions: usize,
    pub total: usize,
}

/// The cross-run consolidated dataset, persisted as one CSV table.
#[derive(Debug, Clone)]
pub struct ConsolidatedStore {
    path: PathBuf,
}

impl ConsolidatedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Vec<CanonicalAlert>, PipelineError> {
        if !self.exists() {
            return Err(PipelineError::persistence(&self.path, "dataset does not exist"));
        }
        read_alerts(&self.path)
    }

    /// Append the rows of `batch` whose `alert_id` is not stored yet.
    ///
    /// A batch that adds nothing leaves the file untouched. Writes replace the
    /// dataset atomically, so a failed merge keeps the previous content.
    pub fn merge(&self, batch: &[CanonicalAlert]) -> Result<MergeOutcome, PipelineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PipelineError::persistence(&self.path, e))?;
            }
        }
        let _lock = StoreLock::acquire(&self.path)?;

        let (batch, repeated) = dedup_batch(batch);
        if repeated > 0 {
            warn!(repeated, "batch contains repeated alert ids, keeping first occurrence");
        }

        if !self.exists() {
            if batch.is_empty() {
                debug!(path = %self.path.display(), "empty batch, dataset not created");
                return Ok(MergeOutcome {
                    path: self.path.clone(),
                    created: false,
                    added: 0,
                    skipped: repeated,
                    collisions: 0,
                    total: 0,
                });
            }
            write_alerts(&self.path, &batch)?;
            info!(path = %self.path.display(), rows = batch.len(), "created consolidated dataset");
            return Ok(MergeOutcome {
                path: self.path.clone(),
                created: true,
                added: batch.len(),
                skipped: repeated,
                collisions: 0,
                total: batch.len(),
            });
        }

        let mut dataset = read_alerts(&self.path)?;
        let existing: HashMap<&str, &CanonicalAlert> = dataset
            .iter()
            .map(|alert| (alert.alert_id.as_str(), alert))
            .collect();

        let mut fresh = Vec::new();
        let mut skipped = repeated;
        let mut collisions = 0;
        for alert in batch {
            match existing.get(alert.alert_id.as_str()) {
                Some(stored) => {
                    skipped += 1;
                    if stored.product_name != alert.product_name || stored.date != alert.date {
                        collisions += 1;
                        warn!(
                            alert_id = %alert.alert_id,
                            stored = %stored.product_name,
                            incoming = %alert.product_name,
                            "alert id already stored with different content"
                        );
                    }
                }
                None => fresh.push(alert),
            }
        }

        if fresh.is_empty() {
            info!(path = %self.path.display(), "no new alerts to add");
            return Ok(MergeOutcome {
                path: self.path.clone(),
                created: false,
                added: 0,
                skipped,
                collisions,
                total: dataset.len(),
            });
        }

        let added = fresh.len();
        dataset.extend(fresh);
        sort_by_date_desc(&mut dataset);
        write_alerts(&self.path, &dataset)?;

        info!(
            path = %self.path.display(),
            added,
            total = dataset.len(),
            "updated consolidated dataset"
        );

        Ok(MergeOutcome {
            path: self.path.clone(),
            created: false,
            added,
            skipped,
            collisions,
            total: dataset.len(),
        })
    }
}

/// Collapse repeated ids inside one batch, first occurrence wins.
fn dedup_batch(batch: &[CanonicalAlert]) -> (Vec<CanonicalAlert>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(batch.len());
    for alert in batch {
        if seen.insert(alert.alert_id.as_str()) {
            unique.push(alert.clone());
        }
    }
    let repeated = batch.len() - unique.len();
    (unique, repeated)
}

/// Newest first. Rows whose date cannot be parsed keep their relative order after the rest.
pub fn sort_by_date_desc(alerts: &mut [CanonicalAlert]) {
    // `None` orders below every date, so reversing puts it last.
    alerts.sort_by_cached_key(|alert| std::cmp::Reverse(parse_date(&alert.date)));
}

pub fn read_alerts(path: &Path) -> Result<Vec<CanonicalAlert>, PipelineError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| PipelineError::persistence(path, e))?;
    let mut alerts = Vec::new();
    for (line, result) in reader.deserialize::<CanonicalAlert>().enumerate() {
        let alert = result
            .map_err(|e| PipelineError::persistence(path, format!("row {}: {e}", line + 1)))?;
        alerts.push(alert);
    }
    Ok(alerts)
}

/// Write a canonical table through a sibling temp file and rename it into place.
pub fn write_alerts(path: &Path, alerts: &[CanonicalAlert]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::persistence(path, e))?;
        }
    }

    let temp_path = sibling(path, "tmp");
    let written = write_table(&temp_path, alerts).and_then(|_| {
        fs::rename(&temp_path, path).map_err(|e| PipelineError::persistence(path, e))
    });

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn write_table(temp_path: &Path, alerts: &[CanonicalAlert]) -> Result<(), PipelineError> {
    let file = File::create(temp_path).map_err(|e| PipelineError::persistence(temp_path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    for alert in alerts {
        writer
            .serialize(alert)
            .map_err(|e| PipelineError::persistence(temp_path, e))?;
    }
    let mut file = writer
        .into_inner()
        .map_err(|e| PipelineError::persistence(temp_path, e.error()))?;
    file.flush().map_err(|e| PipelineError::persistence(temp_path, e))?;
    file.sync_all().map_err(|e| PipelineError::persistence(temp_path, e))?;
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{suffix}"))
}

/// Exclusive marker file next to the dataset, removed when dropped.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(dataset: &Path) -> Result<Self, PipelineError> {
        let path = sibling(dataset, "lock");
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(PipelineError::StoreLocked {
                path: dataset.to_path_buf(),
            }),
            Err(err) => Err(PipelineError::persistence(dataset, err)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to release store lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, SourceDatabase};

    fn sample_alert(id: &str, date: &str) -> CanonicalAlert {
        CanonicalAlert {
            alert_id: id.to_string(),
            date: date.to_string(),
            product_name: format!("product {id}"),
            product_type: "milk and milk products".to_string(),
            hazard_type: "Listeria monocytogenes".to_string(),
            company: String::new(),
            country_origin: "France".to_string(),
            country_notification: "Belgium".to_string(),
            source_database: SourceDatabase::SourceB,
            source_id: id.trim_start_matches("B-").to_string(),
            details: "Classification: alert | For Attention:  | For Follow-Up: ".to_string(),
            original_data: r#"{"reference":"x"}"#.to_string(),
            category: Category::Dairy,
        }
    }

    fn ids(alerts: &[CanonicalAlert]) -> Vec<&str> {
        alerts.iter().map(|a| a.alert_id.as_str()).collect()
    }

    #[test]
    fn first_merge_creates_dataset_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("final").join("alerts.csv"));
        let batch = vec![sample_alert("B-1", "01/01/2024"), sample_alert("B-2", "03/01/2024")];

        let outcome = store.merge(&batch).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.added, 2);
        // Initial creation keeps batch order.
        assert_eq!(store.load().unwrap(), batch);
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("alerts.csv"));
        let batch = vec![sample_alert("B-1", "01/01/2024"), sample_alert("B-2", "02/01/2024")];

        store.merge(&batch).unwrap();
        let before = std::fs::read(store.path()).unwrap();
        let outcome = store.merge(&batch).unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.collisions, 0);
        assert_eq!(outcome.total, 2);
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn appends_only_new_ids_and_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("alerts.csv"));
        store
            .merge(&[sample_alert("B-1", "01/01/2024"), sample_alert("B-2", "not a date")])
            .unwrap();

        let outcome = store
            .merge(&[sample_alert("B-1", "01/01/2024"), sample_alert("B-3", "06/01/2024")])
            .unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.total, 3);

        let stored = store.load().unwrap();
        assert_eq!(ids(&stored), vec!["B-3", "B-1", "B-2"]);

        let unique: HashSet<&str> = stored.iter().map(|a| a.alert_id.as_str()).collect();
        assert_eq!(unique.len(), stored.len());
    }

    #[test]
    fn repeated_ids_inside_a_batch_are_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("alerts.csv"));
        let mut second = sample_alert("B-1", "05/01/2024");
        second.product_name = "a different product".to_string();

        let outcome = store.merge(&[sample_alert("B-1", "01/01/2024"), second]).unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.load().unwrap()[0].date, "01/01/2024");
    }

    #[test]
    fn reused_id_with_different_content_is_counted_as_collision() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("alerts.csv"));
        store.merge(&[sample_alert("A-0", "01/01/2024")]).unwrap();

        let mut reused = sample_alert("A-0", "02/02/2024");
        reused.product_name = "unrelated recall".to_string();
        let outcome = store.merge(&[reused]).unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.collisions, 1);
        assert_eq!(store.load().unwrap()[0].product_name, "product A-0");
    }

    #[test]
    fn held_lock_rejects_merge_and_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.csv");
        let store = ConsolidatedStore::new(&path);
        store.merge(&[sample_alert("B-1", "01/01/2024")]).unwrap();

        std::fs::write(dir.path().join("alerts.csv.lock"), "4242").unwrap();
        let result = store.merge(&[sample_alert("B-2", "02/01/2024")]);
        assert!(matches!(result, Err(PipelineError::StoreLocked { .. })));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn lock_and_temp_files_are_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("alerts.csv"));
        store.merge(&[sample_alert("B-1", "01/01/2024")]).unwrap();
        store.merge(&[sample_alert("B-2", "02/01/2024")]).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alerts.csv".to_string()]);
    }

    #[test]
    fn corrupt_dataset_is_a_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.csv");
        std::fs::write(&path, "alert_id,date\nB-1,01/01/2024\n").unwrap();
        let store = ConsolidatedStore::new(&path);

        let result = store.merge(&[sample_alert("B-2", "02/01/2024")]);
        assert!(matches!(result, Err(PipelineError::Persistence { .. })));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "alert_id,date\nB-1,01/01/2024\n"
        );
    }

    #[test]
    fn failed_write_keeps_previous_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.csv");
        let store = ConsolidatedStore::new(&path);
        store.merge(&[sample_alert("B-1", "01/01/2024")]).unwrap();
        let before = std::fs::read(&path).unwrap();

        // The temp file cannot be created over a directory.
        std::fs::create_dir(dir.path().join("alerts.csv.tmp")).unwrap();
        let result = store.merge(&[sample_alert("B-2", "02/01/2024")]);

        assert!(matches!(result, Err(PipelineError::Persistence { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!dir.path().join("alerts.csv.lock").exists());
    }

    #[test]
    fn missing_dataset_cannot_be_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("absent.csv"));
        assert!(matches!(store.load(), Err(PipelineError::Persistence { .. })));
    }

    #[test]
    fn empty_batch_does_not_create_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidatedStore::new(dir.path().join("alerts.csv"));
        let outcome = store.merge(&[]).unwrap();
        assert!(!outcome.created);
        assert!(!store.exists());
    }
}
