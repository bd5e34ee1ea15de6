//! Fragment collection.
//!
//! A [`LogSource`] supplies the fragments of one trip together with the
//! out-of-band [`CollectionStatus`]. Invalid or unfetchable records are
//! dropped here and counted, so the aggregator only ever sees valid input.

use std::collections::HashSet;
use std::fmt::Display;

use log::{debug, warn};
use uuid::Uuid;

use crate::{CollectionStatus, Fragment};

/// Maximum number of fragments retained per trip.
pub const MAX_FRAGMENTS: usize = 50;

/// Everything collected for one trip, ready for aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentBatch {
    pub fragments: Vec<Fragment>,
    pub status: CollectionStatus,
}

/// Upstream provider of route fragments.
pub trait LogSource {
    fn fetch_trip(&self, trip_ref: Uuid) -> Result<FragmentBatch, crate::SourceError>;
}

/// Turn per-record parse results into a batch for `trip_ref`.
///
/// Failed records are logged and counted. Fragments of other trips are
/// skipped silently, as are repeats of an id already collected (the first
/// occurrence wins). At most `cap` fragments are kept, earliest first;
/// `truncated` is set when more existed.
pub fn collect_fragments<E: Display>(
    trip_ref: Uuid,
    results: impl IntoIterator<Item = Result<Fragment, E>>,
    cap: usize,
) -> FragmentBatch {
    let mut status = CollectionStatus::complete();
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for result in results {
        match result {
            Ok(fragment) if fragment.trip_ref() == trip_ref => {
                if seen_ids.insert(fragment.id().to_string()) {
                    fragments.push(fragment);
                } else {
                    debug!(
                        "[collect] trip {}: skipping duplicate fragment {}",
                        trip_ref,
                        fragment.id()
                    );
                }
            }
            Ok(fragment) => {
                debug!(
                    "[collect] skipping fragment {} of trip {}",
                    fragment.id(),
                    fragment.trip_ref()
                );
            }
            Err(e) => {
                warn!("[collect] trip {}: dropping fragment: {}", trip_ref, e);
                status.record_failure(e.to_string());
            }
        }
    }

    if fragments.len() > cap {
        fragments.sort_by_key(|f| f.recorded_at());
        warn!(
            "[collect] trip {}: {} fragments found, keeping the first {}",
            trip_ref,
            fragments.len(),
            cap
        );
        fragments.truncate(cap);
        status.truncated = true;
    }

    FragmentBatch { fragments, status }
}

#[cfg(feature = "serde")]
pub use file::FileLogSource;

#[cfg(feature = "serde")]
mod file {
    use std::fs;
    use std::path::{Path, PathBuf};

    use log::info;
    use uuid::Uuid;

    use super::{collect_fragments, FragmentBatch, LogSource, MAX_FRAGMENTS};
    use crate::records::{fragments_for_trip, parse_search_response, trips_in, RouteRecord};
    use crate::SourceError;

    /// Reads exported log-search responses from disk.
    ///
    /// `path` is either one JSON file or a directory of `.json` files.
    #[derive(Debug, Clone)]
    pub struct FileLogSource {
        path: PathBuf,
        link_base: String,
        cap: usize,
    }

    impl FileLogSource {
        pub fn new(path: impl Into<PathBuf>, link_base: impl Into<String>) -> Self {
            Self {
                path: path.into(),
                link_base: link_base.into(),
                cap: MAX_FRAGMENTS,
            }
        }

        pub fn with_cap(mut self, cap: usize) -> Self {
            self.cap = cap;
            self
        }

        /// Load every record from the configured path.
        pub fn load_records(&self) -> Result<Vec<RouteRecord>, SourceError> {
            let mut records = Vec::new();
            for file in json_files(&self.path)? {
                let body = fs::read_to_string(&file)?;
                let page = parse_search_response(&body)
                    .map_err(|e| SourceError::Parse(format!("{}: {}", file.display(), e)))?;
                records.extend(page.records);
            }
            info!(
                "[FileLogSource] loaded {} records from {}",
                records.len(),
                self.path.display()
            );
            Ok(records)
        }

        /// Distinct trips present in the files, in first-seen order.
        pub fn trips(&self) -> Result<Vec<Uuid>, SourceError> {
            Ok(trips_in(&self.load_records()?))
        }

        /// Build the batch for one trip from already-loaded records.
        pub fn batch_from_records(&self, records: &[RouteRecord], trip_ref: Uuid) -> FragmentBatch {
            collect_fragments(
                trip_ref,
                fragments_for_trip(records, trip_ref, &self.link_base),
                self.cap,
            )
        }
    }

    impl LogSource for FileLogSource {
        fn fetch_trip(&self, trip_ref: Uuid) -> Result<FragmentBatch, SourceError> {
            let records = self.load_records()?;
            Ok(self.batch_from_records(&records, trip_ref))
        }
    }

    fn json_files(path: &Path) -> Result<Vec<PathBuf>, SourceError> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
            .collect();
        // read_dir order is platform-dependent
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Waypoint;
    use chrono::{Duration, TimeZone, Utc};

    fn trip() -> Uuid {
        Uuid::from_u128(0xbeef)
    }

    fn fragment(trip_ref: Uuid, id: &str, offset_secs: i64) -> Fragment {
        let base = Utc.with_ymd_and_hms(2026, 4, 1, 11, 0, 0).unwrap();
        Fragment::new(
            id,
            trip_ref,
            base + Duration::seconds(offset_secs),
            vec![Waypoint::new(1.0, 1.0).unwrap(), Waypoint::new(1.001, 1.0).unwrap()],
            "link",
        )
        .unwrap()
    }

    #[test]
    fn test_failures_are_counted() {
        let results: Vec<Result<Fragment, String>> = vec![
            Ok(fragment(trip(), "a", 0)),
            Err("record b: too few waypoints".to_string()),
            Ok(fragment(trip(), "c", 60)),
        ];
        let batch = collect_fragments(trip(), results, MAX_FRAGMENTS);

        assert_eq!(batch.fragments.len(), 2);
        assert_eq!(batch.status.failed_fragments, 1);
        assert!(batch.status.any_fragment_failed());
        assert!(!batch.status.truncated);
        assert_eq!(batch.status.failure_messages, vec!["record b: too few waypoints"]);
    }

    #[test]
    fn test_other_trips_are_skipped() {
        let results: Vec<Result<Fragment, String>> = vec![
            Ok(fragment(trip(), "a", 0)),
            Ok(fragment(Uuid::from_u128(1), "x", 0)),
        ];
        let batch = collect_fragments(trip(), results, MAX_FRAGMENTS);
        assert_eq!(batch.fragments.len(), 1);
        assert!(batch.status.is_complete());
    }

    #[test]
    fn test_repeated_id_kept_once() {
        let first = fragment(trip(), "a", 0);
        let later_copy = Fragment::new(
            first.id(),
            trip(),
            first.recorded_at() + Duration::seconds(30),
            first.waypoints().to_vec(),
            "other-link",
        )
        .unwrap();
        let results: Vec<Result<Fragment, String>> = vec![
            Ok(first),
            Ok(fragment(trip(), "b", 60)),
            Ok(later_copy),
        ];
        let batch = collect_fragments(trip(), results, MAX_FRAGMENTS);

        let ids: Vec<&str> = batch.fragments.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(batch.fragments[0].source_link(), "link");
        assert!(batch.status.is_complete());
    }

    #[test]
    fn test_cap_keeps_earliest_and_flags_truncation() {
        let results: Vec<Result<Fragment, String>> = (0..5)
            .rev()
            .map(|i| Ok(fragment(trip(), &format!("f{i}"), i * 60)))
            .collect();
        let batch = collect_fragments(trip(), results, 3);

        let ids: Vec<&str> = batch.fragments.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["f0", "f1", "f2"]);
        assert!(batch.status.truncated);
    }
}
