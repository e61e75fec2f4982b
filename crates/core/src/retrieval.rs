use crate::expansion::QueryExpander;
use crate::models::{
    ChunkKey, ChunkMetadata, IndexMatch, QueryFilters, RetrievalQuery, RetrievalResult, SourceKind,
};
use crate::traits::VectorIndex;
use crate::SearchError;
use std::collections::HashMap;
use tracing::debug;

/// Phrases marking a value-proposition question.
pub const PROMOTION_TRIGGERS: [&str; 5] =
    ["why", "should i use", "benefits", "advantages", "choose"];

// Empirical constants; recalibrate if the share of website copy in the corpus changes.
pub const PROMOTION_MULTIPLIER: f64 = 0.6;
pub const PROMOTED_FALLBACK_DISTANCE: f64 = 0.3;
pub const FALLBACK_RELEVANCE: f64 = 0.5;

pub fn is_promotion_query(query: &str) -> bool {
    let lowered = query.to_lowercase();
    PROMOTION_TRIGGERS
        .iter()
        .any(|trigger| lowered.contains(trigger))
}

/// Effective distance of website copy for value-proposition questions.
pub fn promote_distance(distance: Option<f64>) -> f64 {
    distance.map_or(PROMOTED_FALLBACK_DISTANCE, |distance| {
        distance * PROMOTION_MULTIPLIER
    })
}

/// `1 / (1 + distance)`; unknown distances rank as [`FALLBACK_RELEVANCE`].
pub fn distance_to_relevance(distance: Option<f64>) -> f64 {
    distance.map_or(FALLBACK_RELEVANCE, |distance| 1.0 / (1.0 + distance.max(0.0)))
}

pub struct Retriever<V>
where
    V: VectorIndex,
{
    index: V,
    expander: QueryExpander,
}

impl<V> Retriever<V>
where
    V: VectorIndex + Send + Sync,
{
    pub fn new(index: V) -> Self {
        Self {
            index,
            expander: QueryExpander::default(),
        }
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn working_queries(&self, query: &RetrievalQuery) -> Vec<String> {
        if query.use_expansion {
            self.expander.expand(&query.text)
        } else {
            vec![query.text.clone()]
        }
    }

    /// Convenience wrapper taking the request fields directly.
    pub async fn retrieve_context(
        &self,
        query: &str,
        top_k: usize,
        category_filter: Option<&str>,
        use_expansion: bool,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        let request = RetrievalQuery {
            text: query.to_string(),
            top_k,
            filters: QueryFilters {
                category: category_filter.map(str::to_string),
            },
            use_expansion,
        };
        self.retrieve(&request).await
    }

    /// Fans the question out over its working query set and returns at most `top_k`
    /// passages, one per logical chunk identity, most relevant first.
    pub async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        if query.text.trim().is_empty() || query.top_k == 0 {
            return Ok(Vec::new());
        }

        let queries = self.working_queries(query);
        let promote = is_promotion_query(&query.text);
        let per_query = self
            .index
            .query(&queries, query.top_k, &query.filters)
            .await?;

        if per_query.len() != queries.len() {
            return Err(SearchError::BackendResponse {
                backend: "index".to_string(),
                details: format!(
                    "{} result lists for {} queries",
                    per_query.len(),
                    queries.len()
                ),
            });
        }

        let mut table = MergeTable::default();
        for (variation, matches) in queries.iter().zip(per_query) {
            debug!(query = %variation, hits = matches.len(), promote, "merging lookup");
            for hit in matches {
                table.offer(adjust(hit, promote));
            }
        }

        Ok(table.into_ranked(query.top_k))
    }
}

fn adjust(hit: IndexMatch, promote: bool) -> IndexMatch {
    if promote && hit.metadata.document.source == SourceKind::Website {
        IndexMatch {
            distance: Some(promote_distance(hit.distance)),
            ..hit
        }
    } else {
        hit
    }
}

#[derive(Debug)]
struct MergedHit {
    text: String,
    metadata: ChunkMetadata,
    relevance: f64,
}

/// Per-request merge table keyed by logical chunk identity, in first-seen order.
#[derive(Debug, Default)]
struct MergeTable {
    positions: HashMap<ChunkKey, usize>,
    entries: Vec<MergedHit>,
}

impl MergeTable {
    /// Keeps the closer occurrence of an identity; equal ones keep the first seen.
    fn offer(&mut self, hit: IndexMatch) {
        let relevance = distance_to_relevance(hit.distance);
        let key = hit.metadata.key();

        match self.positions.get(&key) {
            Some(&position) => {
                let current = &mut self.entries[position];
                if relevance > current.relevance {
                    current.text = hit.text;
                    current.metadata = hit.metadata;
                    current.relevance = relevance;
                }
            }
            None => {
                self.positions.insert(key, self.entries.len());
                self.entries.push(MergedHit {
                    text: hit.text,
                    metadata: hit.metadata,
                    relevance,
                });
            }
        }
    }

    fn into_ranked(self, top_k: usize) -> Vec<RetrievalResult> {
        let mut entries = self.entries;
        entries.sort_by(|left, right| right.relevance.total_cmp(&left.relevance));
        entries
            .into_iter()
            .take(top_k)
            .map(|entry| RetrievalResult {
                text: entry.text,
                metadata: entry.metadata,
                relevance: entry.relevance,
            })
            .collect()
    }
}
