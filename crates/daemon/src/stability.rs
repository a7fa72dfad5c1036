//! Stability checking module for verifying files are not being written to.
//!
//! Before dispatching a file, we verify it's stable (not being copied in)
//! by checking that its storage footprint is unchanged over a delay window.
//! This is a heuristic: a writer that pauses for the whole window produces
//! a false positive.

use crate::scan::CandidateFile;
use std::fs::Metadata;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Coarse size metric sampled twice per stability check.
///
/// Both the byte length and the allocated block count are compared, since
/// some filesystems lag updating one or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    /// Length in bytes.
    pub len: u64,
    /// Allocated 512-byte blocks (0 where the platform does not report them).
    pub blocks: u64,
}

impl Footprint {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            len: metadata.len(),
            blocks: allocated_blocks(metadata),
        }
    }
}

#[cfg(unix)]
fn allocated_blocks(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.blocks()
}

#[cfg(not(unix))]
fn allocated_blocks(_metadata: &Metadata) -> u64 {
    0
}

/// Result of a stability check on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityResult {
    /// Footprint remained unchanged during the stability window.
    Stable,
    /// Footprint changed during the stability window.
    Unstable {
        /// Footprint when first sampled.
        initial: Footprint,
        /// Footprint after waiting.
        current: Footprint,
    },
}

/// Compare two footprints and return the appropriate StabilityResult.
///
/// This is a pure function extracted for property testing.
#[inline]
pub fn compare_footprints(initial: Footprint, current: Footprint) -> StabilityResult {
    if initial == current {
        StabilityResult::Stable
    } else {
        StabilityResult::Unstable { initial, current }
    }
}

/// Sample the footprint of a single file.
pub async fn sample_footprint(path: &Path) -> Result<Footprint, std::io::Error> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(Footprint::from_metadata(&metadata))
}

/// Keep the candidates whose footprint does not change over `delay`.
///
/// Every candidate is sampled, then sampled again after the delay. Files
/// that changed or can no longer be read are logged and dropped; they come
/// back through the next poll. Discovery order is preserved.
pub async fn filter_stable(candidates: Vec<CandidateFile>, delay: Duration) -> Vec<CandidateFile> {
    if candidates.is_empty() {
        return candidates;
    }

    let mut initial = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match sample_footprint(&candidate.path).await {
            Ok(footprint) => initial.push((candidate, footprint)),
            Err(e) => tracing::warn!("Skipping {} ({}).", candidate.basename(), e),
        }
    }

    sleep(delay).await;

    let mut stable = Vec::with_capacity(initial.len());
    for (candidate, before) in initial {
        let after = match sample_footprint(&candidate.path).await {
            Ok(footprint) => footprint,
            Err(e) => {
                tracing::warn!("Skipping {} ({}).", candidate.basename(), e);
                continue;
            }
        };

        match compare_footprints(before, after) {
            StabilityResult::Stable => stable.push(candidate),
            StabilityResult::Unstable { initial, current } => {
                tracing::info!("Skipping {} (size changed).", candidate.basename());
                tracing::debug!(
                    file = %candidate.path.display(),
                    before_len = initial.len,
                    after_len = current.len,
                    before_blocks = initial.blocks,
                    after_blocks = current.blocks,
                    "footprint changed during stability window"
                );
            }
        }
    }

    stable
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn footprint_strategy() -> impl Strategy<Value = Footprint> {
        (any::<u64>(), any::<u64>()).prop_map(|(len, blocks)| Footprint { len, blocks })
    }

    proptest! {
        #[test]
        fn prop_stability_footprint_comparison(
            initial in footprint_strategy(),
            current in footprint_strategy(),
        ) {
            let result = compare_footprints(initial, current);

            if initial == current {
                prop_assert_eq!(result, StabilityResult::Stable);
            } else {
                prop_assert_eq!(result, StabilityResult::Unstable { initial, current });
            }
        }
    }

    #[test]
    fn test_block_change_alone_is_unstable() {
        let before = Footprint { len: 4096, blocks: 0 };
        let after = Footprint { len: 4096, blocks: 8 };
        assert_eq!(
            compare_footprints(before, after),
            StabilityResult::Unstable {
                initial: before,
                current: after
            }
        );
    }

    #[tokio::test]
    async fn test_filter_stable_empty_is_noop() {
        let start = std::time::Instant::now();
        let stable = filter_stable(Vec::new(), Duration::from_secs(5)).await;
        assert!(stable.is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_filter_stable_keeps_untouched_files_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.mkv");
        let b = temp_dir.path().join("b.mkv");
        std::fs::write(&a, vec![0u8; 2048]).unwrap();
        std::fs::write(&b, vec![0u8; 1024]).unwrap();

        let candidates = vec![CandidateFile::new(&a), CandidateFile::new(&b)];
        let stable = filter_stable(candidates.clone(), Duration::from_millis(20)).await;

        assert_eq!(stable, candidates);
    }

    #[tokio::test]
    async fn test_filter_stable_drops_growing_file() {
        let temp_dir = TempDir::new().unwrap();
        let growing = temp_dir.path().join("b.mp4");
        let idle = temp_dir.path().join("a.mkv");
        std::fs::write(&growing, vec![0u8; 1024]).unwrap();
        std::fs::write(&idle, vec![0u8; 1024]).unwrap();

        let writer_path = growing.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            file.write_all(&vec![1u8; 64 * 1024]).unwrap();
        });

        let stable = filter_stable(
            vec![CandidateFile::new(&growing), CandidateFile::new(&idle)],
            Duration::from_millis(300),
        )
        .await;
        writer.await.unwrap();

        assert_eq!(stable, vec![CandidateFile::new(&idle)]);
        assert!(growing.exists());
    }

    #[tokio::test]
    async fn test_filter_stable_drops_vanished_file() {
        let temp_dir = TempDir::new().unwrap();
        let doomed = temp_dir.path().join("c.mkv");
        std::fs::write(&doomed, b"data").unwrap();

        let remover_path = doomed.clone();
        let remover = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            std::fs::remove_file(&remover_path).unwrap();
        });

        let stable =
            filter_stable(vec![CandidateFile::new(&doomed)], Duration::from_millis(200)).await;
        remover.await.unwrap();

        assert!(stable.is_empty());
    }
}
