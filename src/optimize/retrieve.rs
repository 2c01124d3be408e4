//! Multi-hop candidate retrieval.
//!
//! Hop 1 pulls vector-nearest fragments, hop 2 expands along dependency
//! edges into the files a result depends on, hop 3 looks up definitions of
//! the symbols the query names. Candidates are deduplicated by fragment id;
//! visited-set tracking makes dependency cycles terminate naturally.

use crate::core::{EntityKind, Fragment, QueryEmbedding};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::optimize::intent::QueryIntent;
use crate::store::FragmentStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Default nearest-neighbor count for hop 1.
pub const DEFAULT_K: usize = 20;

/// Default hard cap on total candidates per query.
pub const DEFAULT_MAX_CANDIDATES: usize = 200;

/// Which hop produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Nearest neighbor of the query embedding.
    VectorSearch,
    /// Pulled in through a dependency edge.
    RelatedFiles,
    /// Matched a symbol or type named in the query.
    SymbolDefinition,
}

/// A retrieved fragment tagged with how it was found.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The fragment.
    pub fragment: Fragment,
    /// Which hop found it.
    pub provenance: Provenance,
}

/// Multi-hop retriever over the fragment store and vector index.
pub struct Retriever {
    store: Arc<dyn FragmentStore>,
    index: Arc<dyn VectorIndex>,
    /// Dependency-expansion depth (1 by default, 2 via config knob).
    depth: usize,
    /// Hard cap on total candidates per query.
    max_candidates: usize,
}

impl Retriever {
    /// Creates a retriever with default depth and candidate cap.
    #[must_use]
    pub fn new(store: Arc<dyn FragmentStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            store,
            index,
            depth: 1,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    /// Sets the dependency-expansion depth (clamped to 1 or 2).
    #[must_use]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth.clamp(1, 2);
        self
    }

    /// Sets the per-query candidate cap.
    #[must_use]
    pub const fn with_max_candidates(mut self, cap: usize) -> Self {
        self.max_candidates = cap;
        self
    }

    /// Retrieves candidates for a query, deduplicated by fragment id.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector index or fragment store fails.
    pub fn retrieve(
        &self,
        intent: &QueryIntent,
        query: &QueryEmbedding,
        k: usize,
    ) -> Result<Vec<Candidate>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        // Hop 1: vector nearest.
        let hits = self.index.search(&query.vector, k, None)?;
        for (id, _score) in hits {
            if candidates.len() >= self.max_candidates {
                break;
            }
            if let Some(fragment) = self.store.get(&id)?
                && visited.insert(fragment.id.clone())
            {
                candidates.push(Candidate {
                    fragment,
                    provenance: Provenance::VectorSearch,
                });
            }
        }
        let seeds = candidates.len();

        // Hop 2: dependency expansion, bounded by depth and the cap.
        let mut frontier: Vec<Fragment> =
            candidates.iter().map(|c| c.fragment.clone()).collect();
        for _ in 0..self.depth {
            if candidates.len() >= self.max_candidates {
                break;
            }
            let mut next_frontier = Vec::new();
            for fragment in &frontier {
                for dep in fragment
                    .metadata
                    .dependencies
                    .iter()
                    .chain(&fragment.metadata.imports)
                {
                    if candidates.len() >= self.max_candidates {
                        break;
                    }
                    for path in self.resolve_dependency(dep)? {
                        for related in self.store.fragments_for_file(&path)? {
                            if candidates.len() >= self.max_candidates {
                                break;
                            }
                            if visited.insert(related.id.clone()) {
                                next_frontier.push(related.clone());
                                candidates.push(Candidate {
                                    fragment: related,
                                    provenance: Provenance::RelatedFiles,
                                });
                            }
                        }
                    }
                }
            }
            frontier = next_frontier;
        }

        // Hop 3: symbol definitions for query entities.
        for entity in &intent.entities {
            if !matches!(entity.kind, EntityKind::Symbol | EntityKind::Type) {
                continue;
            }
            if candidates.len() >= self.max_candidates {
                break;
            }
            for fragment in self.store.find_symbol(&entity.value)? {
                if candidates.len() >= self.max_candidates {
                    break;
                }
                if visited.insert(fragment.id.clone()) {
                    candidates.push(Candidate {
                        fragment,
                        provenance: Provenance::SymbolDefinition,
                    });
                }
            }
        }

        debug!(
            total = candidates.len(),
            seeds,
            "retrieval complete"
        );
        Ok(candidates)
    }

    /// Resolves a dependency specifier to indexed file paths by matching the
    /// specifier's final segment against file stems.
    fn resolve_dependency(&self, specifier: &str) -> Result<Vec<String>> {
        let Some(stem) = dependency_stem(specifier) else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        for path in self.store.record_paths()? {
            if file_stem(&path).is_some_and(|s| s == stem) {
                matches.push(path);
            }
        }
        Ok(matches)
    }
}

/// Final meaningful segment of a dependency specifier: `./cache` -> `cache`,
/// `crate::core::fragment` -> `fragment`, `a.b.c` -> `c`.
fn dependency_stem(specifier: &str) -> Option<String> {
    let specifier = specifier.trim().trim_end_matches('/');
    let last = specifier
        .rsplit(['/', ':'])
        .next()?
        .rsplit('.')
        .next()?
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

/// Stem of a file path: `/repo/src/cache.ts` -> `cache`.
fn file_stem(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let stem = name.rsplit_once('.').map_or(name, |(s, _)| s);
    (!stem.is_empty()).then_some(stem)
}
