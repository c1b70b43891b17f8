//! File-backed vector index.
//!
//! An index lives in a directory holding a single `index.json`. Builds write
//! a temporary sibling file and rename it into place, so readers only ever
//! observe the previous complete index or the new one.

use crate::embeddings::Encoder;
use crate::error::{BuildError, StorageError};
use crate::mmr::{mmr_select, MmrCandidate};
use crate::models::{Chunk, ScoredChunk, SearchOptions};
use crate::similarity::{cosine_with_magnitudes, magnitude};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub const INDEX_FILE_NAME: &str = "index.json";
pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub build_id: Uuid,
    pub encoder_model: String,
    pub dimensions: usize,
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    manifest: &'a IndexManifest,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct PersistedIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

#[derive(Debug)]
pub struct VectorIndex {
    location: PathBuf,
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
    magnitudes: Vec<f32>,
    by_id: HashMap<String, usize>,
}

impl VectorIndex {
    /// Builds an index from parallel chunk/embedding lists and persists it at
    /// `location`, replacing whatever index was there.
    pub fn build(
        location: &Path,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        encoder: &dyn Encoder,
    ) -> Result<Self, BuildError> {
        if chunks.is_empty() {
            return Err(BuildError::Empty);
        }
        if chunks.len() != embeddings.len() {
            return Err(BuildError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let dimensions = encoder.dimensions();
        if let Some((chunk, embedding)) = chunks
            .iter()
            .zip(embeddings.iter())
            .find(|(_, embedding)| embedding.len() != dimensions)
        {
            return Err(BuildError::DimensionMismatch {
                chunk_id: chunk.id.clone(),
                expected: dimensions,
                actual: embedding.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect::<Vec<_>>();

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            build_id: Uuid::new_v4(),
            encoder_model: encoder.model_id(),
            dimensions,
            entry_count: entries.len(),
            built_at: Utc::now(),
        };

        persist(location, &manifest, &entries)?;
        info!(
            location = %location.display(),
            entries = manifest.entry_count,
            build_id = %manifest.build_id,
            "vector index built"
        );

        Ok(Self::from_parts(location.to_path_buf(), manifest, entries))
    }

    /// Loads the index stored at `location`. A missing directory or index
    /// file is `Ok(None)`; anything present but unusable is an error.
    pub fn load(location: &Path, encoder: &dyn Encoder) -> Result<Option<Self>, StorageError> {
        let path = location.join(INDEX_FILE_NAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        let persisted: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: path.clone(),
                source,
            })?;

        let incompatible = |details: String| StorageError::Incompatible {
            path: path.clone(),
            details,
        };
        let manifest = &persisted.manifest;

        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(incompatible(format!(
                "format version {} is not {}",
                manifest.format_version, INDEX_FORMAT_VERSION
            )));
        }
        if manifest.encoder_model != encoder.model_id() || manifest.dimensions != encoder.dimensions() {
            return Err(incompatible(format!(
                "built with encoder {} ({} dims), current encoder is {} ({} dims)",
                manifest.encoder_model,
                manifest.dimensions,
                encoder.model_id(),
                encoder.dimensions()
            )));
        }
        if manifest.entry_count != persisted.entries.len() || persisted.entries.is_empty() {
            return Err(incompatible(format!(
                "manifest lists {} entries, file holds {}",
                manifest.entry_count,
                persisted.entries.len()
            )));
        }
        if let Some(entry) = persisted
            .entries
            .iter()
            .find(|entry| entry.embedding.len() != manifest.dimensions)
        {
            return Err(incompatible(format!(
                "entry {} has {} dims",
                entry.chunk.id,
                entry.embedding.len()
            )));
        }

        info!(
            location = %location.display(),
            entries = manifest.entry_count,
            build_id = %manifest.build_id,
            "vector index loaded"
        );

        Ok(Some(Self::from_parts(
            location.to_path_buf(),
            persisted.manifest,
            persisted.entries,
        )))
    }

    fn from_parts(location: PathBuf, manifest: IndexManifest, entries: Vec<IndexEntry>) -> Self {
        let magnitudes = entries.iter().map(|entry| magnitude(&entry.embedding)).collect();
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.chunk.id.clone(), position))
            .collect();

        Self {
            location,
            manifest,
            entries,
            magnitudes,
            by_id,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|position| &self.entries[*position].chunk)
    }

    pub fn embedding(&self, id: &str) -> Option<&[f32]> {
        self.by_id
            .get(id)
            .map(|position| self.entries[*position].embedding.as_slice())
    }

    /// Returns up to `options.top_k` chunks for `query_vector`, most relevant
    /// first, or in diversity-aware selection order when
    /// `options.diversify` is set.
    pub fn search(&self, query_vector: &[f32], options: &SearchOptions) -> Vec<ScoredChunk> {
        if options.top_k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let ranked = self.rank(query_vector);

        if !options.diversify {
            return ranked
                .into_iter()
                .take(options.top_k)
                .map(|(position, similarity)| self.scored(position, similarity))
                .collect();
        }

        let pool = ranked
            .iter()
            .take(options.fetch_k.max(options.top_k))
            .map(|(position, _)| MmrCandidate {
                position: *position,
                order: self.entries[*position].chunk.sequence_index,
                vector: &self.entries[*position].embedding,
            })
            .collect::<Vec<_>>();

        mmr_select(query_vector, &pool, options.top_k, options.lambda)
            .into_iter()
            .map(|(position, similarity)| self.scored(position, similarity))
            .collect()
    }

    /// All entries by descending similarity; equal scores keep document order.
    fn rank(&self, query_vector: &[f32]) -> Vec<(usize, f32)> {
        let query_mag = magnitude(query_vector);
        let mut ranked = self
            .entries
            .par_iter()
            .zip(self.magnitudes.par_iter())
            .enumerate()
            .map(|(position, (entry, entry_mag))| {
                let similarity =
                    cosine_with_magnitudes(query_vector, &entry.embedding, query_mag, *entry_mag);
                (position, similarity)
            })
            .collect::<Vec<_>>();

        ranked.sort_by(|left, right| {
            right.1.total_cmp(&left.1).then_with(|| {
                self.entries[left.0]
                    .chunk
                    .sequence_index
                    .cmp(&self.entries[right.0].chunk.sequence_index)
            })
        });
        ranked
    }

    fn scored(&self, position: usize, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: self.entries[position].chunk.clone(),
            similarity,
        }
    }
}

fn persist(location: &Path, manifest: &IndexManifest, entries: &[IndexEntry]) -> Result<(), StorageError> {
    fs::create_dir_all(location).map_err(|source| StorageError::Io {
        path: location.to_path_buf(),
        source,
    })?;

    let target = location.join(INDEX_FILE_NAME);
    let staging = location.join(format!(".{INDEX_FILE_NAME}.{}.tmp", manifest.build_id));

    let payload = serde_json::to_vec(&PersistedIndexRef { manifest, entries }).map_err(|source| {
        StorageError::Corrupt {
            path: staging.clone(),
            source,
        }
    })?;

    let written = fs::File::create(&staging).and_then(|mut file| {
        file.write_all(&payload)?;
        file.sync_all()
    });
    if let Err(source) = written {
        let _ = fs::remove_file(&staging);
        return Err(StorageError::Io {
            path: staging,
            source,
        });
    }

    if let Err(source) = fs::rename(&staging, &target) {
        let _ = fs::remove_file(&staging);
        return Err(StorageError::Io {
            path: target,
            source,
        });
    }

    Ok(())
}
