//! On-disk layout: `manifest.json` plus one `segment-<id>.json` per segment.
//!
//! Every file carries a schema version. Files are written to a temp name and
//! renamed into place, and the manifest is written after the segments it
//! names, so a crash leaves either the old or the new manifest in force.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use quarry_core::constants::INDEX_SCHEMA_VERSION;
use quarry_core::errors::{QuarryResult, StorageError};
use quarry_core::models::DocId;
use quarry_observability::events;

use crate::segment::Segment;
use crate::version::{IndexVersion, Tombstone};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    schema_version: u32,
    version: u64,
    next_segment_id: u64,
    segments: Vec<ManifestSegment>,
    tombstones: Vec<Tombstone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestSegment {
    id: u64,
    doc_ids: Vec<DocId>,
}

#[derive(Serialize)]
struct SegmentFileRef<'a> {
    schema_version: u32,
    segment: &'a Segment,
}

#[derive(Deserialize)]
struct SegmentFile {
    schema_version: u32,
    segment: Segment,
}

/// What `open` found on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub version: u64,
    pub loaded_segments: usize,
    pub dropped_segments: Vec<u64>,
    /// Live documents whose segment was dropped; re-ingest them.
    pub documents_to_reingest: Vec<DocId>,
    /// The manifest itself was unusable and the index restarted empty.
    pub manifest_rebuilt: bool,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_segments.is_empty() && !self.manifest_rebuilt
    }
}

/// State recovered from disk.
pub(crate) struct Loaded {
    pub version: IndexVersion,
    pub next_segment_id: u64,
    pub report: RecoveryReport,
}

pub(crate) struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn open(dir: &Path) -> QuarryResult<Self> {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn segment_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("segment-{id}.json"))
    }

    pub fn write_segment(&self, segment: &Segment) -> QuarryResult<()> {
        let file = SegmentFileRef {
            schema_version: INDEX_SCHEMA_VERSION,
            segment,
        };
        write_atomic(&self.segment_path(segment.id), &serde_json::to_vec(&file)?)
    }

    pub fn write_manifest(&self, version: &IndexVersion, next_segment_id: u64) -> QuarryResult<()> {
        let mut tombstones: Vec<Tombstone> = version.tombstones.iter().cloned().collect();
        tombstones.sort();
        let manifest = Manifest {
            schema_version: INDEX_SCHEMA_VERSION,
            version: version.version,
            next_segment_id,
            segments: version
                .segments
                .iter()
                .map(|s| {
                    let mut doc_ids: Vec<DocId> = s.docs.keys().cloned().collect();
                    doc_ids.sort();
                    ManifestSegment { id: s.id, doc_ids }
                })
                .collect(),
            tombstones,
        };
        write_atomic(
            &self.dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )
    }

    /// Best effort: a leftover file is ignored on load.
    pub fn remove_segment(&self, id: u64) {
        let path = self.segment_path(id);
        if let Err(e) = fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "stale segment file not removed");
        }
    }

    /// Load the manifest and its segments, dropping any unit that fails to
    /// parse or carries the wrong schema version.
    pub fn load(&self) -> QuarryResult<Loaded> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(Loaded {
                version: IndexVersion::default(),
                next_segment_id: 1,
                report: RecoveryReport::default(),
            });
        }

        let manifest: Manifest = match read_versioned(&manifest_path, |m: &Manifest| m.schema_version) {
            Ok(m) => m,
            Err(err) => {
                events::corrupted_unit_rebuilt(MANIFEST_FILE, &err.to_string());
                self.wipe()?;
                return Ok(Loaded {
                    version: IndexVersion::default(),
                    next_segment_id: 1,
                    report: RecoveryReport {
                        manifest_rebuilt: true,
                        ..RecoveryReport::default()
                    },
                });
            }
        };

        let mut report = RecoveryReport::default();
        let mut segments = Vec::with_capacity(manifest.segments.len());
        let mut dropped: HashSet<u64> = HashSet::new();
        for entry in &manifest.segments {
            let path = self.segment_path(entry.id);
            let loaded = read_versioned(&path, |f: &SegmentFile| f.schema_version).and_then(|f| {
                if f.segment.id == entry.id {
                    Ok(f.segment)
                } else {
                    Err(StorageError::CorruptedState {
                        unit: path.display().to_string(),
                        details: format!("segment id {} where {} expected", f.segment.id, entry.id),
                    })
                }
            });
            match loaded {
                Ok(segment) => segments.push(Arc::new(segment)),
                Err(err) => {
                    events::corrupted_unit_rebuilt(&path.display().to_string(), &err.to_string());
                    dropped.insert(entry.id);
                    report.dropped_segments.push(entry.id);
                    for doc_id in &entry.doc_ids {
                        let tomb = Tombstone {
                            segment_id: entry.id,
                            doc_id: doc_id.clone(),
                        };
                        if !manifest.tombstones.contains(&tomb) {
                            report.documents_to_reingest.push(doc_id.clone());
                        }
                    }
                    self.remove_segment(entry.id);
                }
            }
        }

        let tombstones: HashSet<Tombstone> = manifest
            .tombstones
            .into_iter()
            .filter(|t| !dropped.contains(&t.segment_id))
            .collect();
        let physical_docs = segments.iter().map(|s| s.doc_count()).sum();
        let live_length = segments
            .iter()
            .flat_map(|s| {
                s.docs
                    .iter()
                    .filter(|(id, _)| {
                        !tombstones.contains(&Tombstone {
                            segment_id: s.id,
                            doc_id: (*id).clone(),
                        })
                    })
                    .map(|(_, d)| d.length as u64)
            })
            .sum();

        report.version = manifest.version;
        report.loaded_segments = segments.len();
        report.documents_to_reingest.sort();
        report.documents_to_reingest.dedup();

        Ok(Loaded {
            version: IndexVersion {
                version: manifest.version,
                segments,
                tombstones: Arc::new(tombstones),
                physical_docs,
                live_length,
            },
            next_segment_id: manifest.next_segment_id.max(1),
            report,
        })
    }

    fn wipe(&self) -> QuarryResult<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json" || ext == "tmp") {
                fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            }
        }
        Ok(())
    }
}

fn io_err(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> QuarryResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn read_versioned<T: DeserializeOwned>(
    path: &Path,
    schema_of: impl Fn(&T) -> u32,
) -> Result<T, StorageError> {
    let unit = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| StorageError::CorruptedState {
        unit: unit.clone(),
        details: e.to_string(),
    })?;
    let value: T = serde_json::from_slice(&bytes).map_err(|e| StorageError::CorruptedState {
        unit: unit.clone(),
        details: e.to_string(),
    })?;
    let found = schema_of(&value);
    if found != INDEX_SCHEMA_VERSION {
        return Err(StorageError::SchemaMismatch {
            unit,
            expected: INDEX_SCHEMA_VERSION,
            found,
        });
    }
    Ok(value)
}
