//! JSON-persisted store snapshots opened read-only for one pass.

use crate::{LabeledCollection, MemoryStore, StoreError, StorePath, StructuredStoreView};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A store opened read-only. The handle is released when dropped, so a
/// pass that unwinds out of an assertion still gives it back.
#[derive(Debug)]
pub struct OpenStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl OpenStore {
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let mut raw = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut raw))
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let inner: MemoryStore =
            serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        inner.validate()?;
        debug!(
            store = %path.display(),
            datasets = inner.dataset_count(),
            "opened structured store"
        );
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }
}

impl StructuredStoreView for OpenStore {
    fn probe(&self, path: &StorePath) -> Option<&LabeledCollection> {
        self.inner.probe(path)
    }

    fn members(&self, group: &StorePath) -> Option<BTreeSet<String>> {
        self.inner.members(group)
    }
}

impl Drop for OpenStore {
    fn drop(&mut self) {
        debug!(store = %self.path.display(), "released structured store");
    }
}

/// Opens the store at `path`, hands it to `pass`, and releases it on
/// every exit from `pass`.
pub fn with_read_only_store<R>(
    path: &Path,
    pass: impl FnOnce(&OpenStore) -> R,
) -> Result<R, StoreError> {
    let store = OpenStore::open_read_only(path)?;
    Ok(pass(&store))
}

/// Writes a snapshot in the format `OpenStore` reads. Used to stage
/// fixtures.
pub fn write_snapshot(path: &Path, store: &MemoryStore) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(store).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, raw).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{OpenStore, with_read_only_store, write_snapshot};
    use crate::{
        DimensionScale, LabeledCollection, MemoryStore, ResultCategory, StorePath,
        StructuredStoreView,
    };
    use asv_model::ExecutionId;

    fn sample_store() -> MemoryStore {
        let exec = ExecutionId::from_index(0);
        MemoryStore::new().with(
            StorePath::dataset(exec, ResultCategory::ResponseLevels, "f1"),
            LabeledCollection::vector(
                vec![0.1, 0.9],
                DimensionScale::numeric("response_levels", vec![1.0, 2.0]),
            ),
        )
    }

    #[test]
    fn snapshot_reopens_with_same_datasets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        write_snapshot(&path, &sample_store()).expect("write snapshot");

        let count = with_read_only_store(&path, |store| {
            let exec = ExecutionId::from_index(0);
            let levels = store
                .probe(&StorePath::dataset(exec, ResultCategory::ResponseLevels, "f1"))
                .expect("response levels present");
            assert_eq!(levels.values, vec![0.1, 0.9]);
            assert_eq!(
                levels.scales(0)[0].values.numeric(),
                Some(&[1.0, 2.0][..])
            );
            levels.len()
        })
        .expect("open store");
        assert_eq!(count, 2);
    }

    #[test]
    fn empty_numeric_scale_survives_a_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let exec = ExecutionId::from_index(0);
        let store = MemoryStore::new().with(
            StorePath::dataset(exec, ResultCategory::ProbabilityLevels, "f1"),
            LabeledCollection::vector(
                Vec::new(),
                DimensionScale::numeric("probability_levels", Vec::new()),
            ),
        );
        write_snapshot(&path, &store).expect("write snapshot");

        let labels = with_read_only_store(&path, |store| {
            store
                .probe(&StorePath::dataset(exec, ResultCategory::ProbabilityLevels, "f1"))
                .and_then(|levels| levels.scales(0)[0].values.numeric().map(<[f64]>::len))
        })
        .expect("open store");
        assert_eq!(labels, Some(0));
    }

    #[test]
    fn missing_file_is_reported_as_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = OpenStore::open_read_only(&dir.path().join("absent.json"))
            .expect_err("missing store");
        assert_eq!(err.reason_code(), "store_unavailable");
    }

    #[test]
    fn malformed_snapshot_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"datasets\": 3}").expect("write");
        let err = OpenStore::open_read_only(&path).expect_err("bad json");
        assert_eq!(err.reason_code(), "store_unavailable");
    }
}
