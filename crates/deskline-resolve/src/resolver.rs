//! Record resolver: bounded, mechanical lookup against the record source.

use std::sync::Arc;
use std::time::Duration;

use deskline_store::{Record, RecordSource};
use tracing::{debug, warn};

/// Outcome of one lookup. A store failure is indistinguishable from a miss.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Record),
    NotFound,
}

/// Looks up records by approximate name within a time allowance.
#[derive(Clone)]
pub struct RecordResolver {
    source: Arc<dyn RecordSource>,
}

impl RecordResolver {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self { source }
    }

    /// Case-insensitive, substring-tolerant lookup.
    ///
    /// A zero allowance, a blank name, a timeout or an unavailable store all
    /// resolve to `NotFound` without surfacing an error.
    pub async fn resolve(&self, name: &str, allowance: Duration) -> Resolution {
        let name = name.trim();
        if name.is_empty() || allowance.is_zero() {
            return Resolution::NotFound;
        }

        match tokio::time::timeout(allowance, self.source.find_by_approximate_name(name)).await {
            Ok(Some(record)) => {
                debug!("Resolved {:?} to {:?}", name, record.canonical_name);
                Resolution::Found(record)
            }
            Ok(None) => {
                debug!("No record matches {:?}", name);
                Resolution::NotFound
            }
            Err(_) => {
                warn!(
                    "Record lookup for {:?} exceeded {}ms",
                    name,
                    allowance.as_millis()
                );
                Resolution::NotFound
            }
        }
    }

    /// All canonical names, for the correction advisor. Empty on any failure.
    pub async fn candidate_names(&self, allowance: Duration) -> Vec<String> {
        if allowance.is_zero() {
            return Vec::new();
        }
        match tokio::time::timeout(allowance, self.source.list_all_names()).await {
            Ok(names) => names,
            Err(_) => {
                warn!("Name listing exceeded {}ms", allowance.as_millis());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_store::MemoryDirectory;

    fn record(name: &str) -> Record {
        Record {
            canonical_name: name.into(),
            office_location: "Room 7".into(),
            extension: "700".into(),
            presence_days: None,
            courses: Vec::new(),
        }
    }

    fn resolver(dir: MemoryDirectory) -> RecordResolver {
        RecordResolver::new(Arc::new(dir))
    }

    #[tokio::test]
    async fn test_resolve_hit_and_miss() {
        let r = resolver(MemoryDirectory::new(vec![record("Yin Bang-yen")]));
        let allowance = Duration::from_millis(500);

        assert!(matches!(
            r.resolve("yin bang-YEN", allowance).await,
            Resolution::Found(rec) if rec.canonical_name == "Yin Bang-yen"
        ));
        assert_eq!(r.resolve("Yin Bang-ching", allowance).await, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_a_miss() {
        let r = resolver(MemoryDirectory::unavailable());
        assert_eq!(
            r.resolve("Yin Bang-yen", Duration::from_millis(500)).await,
            Resolution::NotFound
        );
        assert!(r.candidate_names(Duration::from_millis(500)).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let dir = MemoryDirectory::new(vec![record("Lin Hao")])
            .with_latency(Duration::from_secs(2));
        let r = resolver(dir);

        let started = tokio::time::Instant::now();
        assert_eq!(
            r.resolve("Lin Hao", Duration::from_millis(300)).await,
            Resolution::NotFound
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_allowance_and_blank_name_skip_lookup() {
        let r = resolver(MemoryDirectory::new(vec![record("Lin Hao")]));
        assert_eq!(r.resolve("Lin Hao", Duration::ZERO).await, Resolution::NotFound);
        assert_eq!(
            r.resolve("   ", Duration::from_millis(500)).await,
            Resolution::NotFound
        );
        assert!(r.candidate_names(Duration::ZERO).await.is_empty());
    }
}
