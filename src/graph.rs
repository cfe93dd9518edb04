//! Relationship graph construction.
//!
//! Each seed note is looked up on the "recommended" endpoint. Every seed and every
//! recommended note becomes a node (deduplicated by slug); recommendations whose
//! similarity exceeds the threshold become directed edges from the seed. Edges are
//! neither deduplicated nor symmetrized.

use std::{collections::HashMap, time::Duration};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{preview, rank_counts, ApiClient, Config, CountEntry, Note, Recommendation, Result};

/// Default similarity admission threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Number of tags kept in [`RecommendationStats::top_tags`].
pub const STATS_TOP_TAGS: usize = 10;

/// Number of months kept in [`RecommendationStats::date_distribution`].
pub const STATS_MONTHS: usize = 12;

/// Knobs of a graph build.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Recommendations strictly above this similarity become edges
    pub threshold: f64,
    /// Recommendation type selector sent as `type`
    pub rec_type: u32,
    /// Ask the service to leave out notes sharing a tag with the seed
    pub no_same_tag: bool,
    /// Pause between successive lookups
    pub seed_delay: Duration,
    /// Characters of content kept on main nodes
    pub preview_chars: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            rec_type: 1,
            no_same_tag: false,
            seed_delay: Duration::from_secs(1),
            preview_chars: 100,
        }
    }
}

impl GraphOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.similarity_threshold,
            seed_delay: Duration::from_millis(config.seed_delay_ms),
            ..Self::default()
        }
    }
}

/// Summary of one seed's recommendation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStats {
    pub total: usize,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    /// Recommendations strictly above the threshold
    pub high_similarity_count: usize,
    /// Most common tags among recommended notes
    pub top_tags: Vec<CountEntry>,
    /// Creation months (`YYYY-MM`) of recommended notes, most common first
    pub date_distribution: Vec<CountEntry>,
}

impl RecommendationStats {
    /// `None` for an empty list.
    pub fn compute(recommendations: &[Recommendation], threshold: f64) -> Option<Self> {
        if recommendations.is_empty() {
            return None;
        }

        let similarities: Vec<f64> = recommendations.iter().map(|r| r.similarity).collect();
        let max = similarities.iter().copied().fold(f64::MIN, f64::max);
        let min = similarities.iter().copied().fold(f64::MAX, f64::min);
        let mean = similarities.iter().sum::<f64>() / similarities.len() as f64;

        Some(Self {
            total: recommendations.len(),
            max,
            min,
            mean,
            high_similarity_count: similarities.iter().filter(|&&s| s > threshold).count(),
            top_tags: rank_counts(
                recommendations.iter().flat_map(|r| r.memo.tags.iter().cloned()),
                Some(STATS_TOP_TAGS),
            ),
            date_distribution: rank_counts(
                recommendations
                    .iter()
                    .filter(|r| !r.memo.created_at.is_empty())
                    .map(|r| r.memo.created_at.chars().take(7).collect::<String>()),
                Some(STATS_MONTHS),
            ),
        })
    }
}

/// What one seed's lookup produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    pub slug: String,
    pub recommendations: Vec<Recommendation>,
    pub stats: Option<RecommendationStats>,
    /// Why the lookup failed, if it did
    pub error: Option<String>,
}

impl SeedReport {
    /// At least one recommendation above the threshold.
    pub fn has_cluster(&self) -> bool {
        self.stats
            .as_ref()
            .is_some_and(|s| s.high_similarity_count > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_main_node: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl GraphNode {
    fn related(slug: &str) -> Self {
        Self {
            id: slug.to_string(),
            kind: "memo".to_string(),
            is_main_node: false,
            content_preview: None,
            tags: None,
            created_at: None,
        }
    }

    fn promote(&mut self, seed: &Note, preview_chars: usize) {
        self.is_main_node = true;
        self.content_preview = Some(preview(&seed.content, preview_chars));
        self.tags = Some(seed.tags.clone());
        self.created_at = Some(seed.created_at.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub similarity: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Node counts and edge counts of a finished graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub main_nodes: usize,
    /// Seeds with at least one recommendation above the threshold
    pub clusters: usize,
    pub failed_seeds: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    /// Seeds first, then recommended notes in order of first encounter
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub seeds: Vec<SeedReport>,
}

impl Graph {
    pub fn node(&self, slug: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == slug)
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            main_nodes: self.nodes.iter().filter(|n| n.is_main_node).count(),
            clusters: self.seeds.iter().filter(|s| s.has_cluster()).count(),
            failed_seeds: self.seeds.iter().filter(|s| s.error.is_some()).count(),
        }
    }
}

/// Accumulates seeds and their lookups into a [`Graph`].
pub struct GraphBuilder {
    options: GraphOptions,
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    seeds: Vec<SeedReport>,
}

impl GraphBuilder {
    pub fn new(options: GraphOptions) -> Self {
        Self {
            options,
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            seeds: Vec::new(),
        }
    }

    fn node_mut(&mut self, slug: &str) -> &mut GraphNode {
        let position = match self.index.get(slug) {
            Some(&position) => position,
            None => {
                self.nodes.push(GraphNode::related(slug));
                self.index.insert(slug.to_string(), self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[position]
    }

    /// Registers `seed` as a main node without recording a lookup.
    pub fn register_seed(&mut self, seed: &Note) {
        let preview_chars = self.options.preview_chars;
        self.node_mut(&seed.slug).promote(seed, preview_chars);
    }

    /// Records the outcome of `seed`'s lookup. A failed lookup leaves the seed
    /// as a node without edges.
    pub fn add_seed(&mut self, seed: &Note, lookup: Result<Vec<Recommendation>>) {
        self.register_seed(seed);

        let (recommendations, error) = match lookup {
            Ok(recommendations) => (recommendations, None),
            Err(e) => {
                warn!("Recommendation lookup failed for {}: {}", seed.slug, e);
                (Vec::new(), Some(e.to_string()))
            }
        };

        let threshold = self.options.threshold;
        for rec in &recommendations {
            let target = rec.memo.slug.as_str();
            self.node_mut(target);
            if rec.similarity > threshold && target != seed.slug {
                self.edges.push(GraphEdge {
                    source: seed.slug.clone(),
                    target: target.to_string(),
                    similarity: rec.similarity,
                    kind: "similarity".to_string(),
                });
            }
        }

        let stats = RecommendationStats::compute(&recommendations, threshold);
        debug!(
            "Seed {}: {} recommendations, {} above {}",
            seed.slug,
            recommendations.len(),
            stats.as_ref().map_or(0, |s| s.high_similarity_count),
            threshold
        );

        self.seeds.push(SeedReport {
            slug: seed.slug.clone(),
            recommendations,
            stats,
            error,
        });
    }

    pub fn finish(self) -> Graph {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
            seeds: self.seeds,
        }
    }
}

impl ApiClient {
    /// Looks up one note's recommendations and summarizes them.
    pub async fn analyze_recommendations(
        &self,
        slug: &str,
        options: &GraphOptions,
    ) -> Result<SeedReport> {
        let recommendations = self
            .recommendations(slug, options.rec_type, options.no_same_tag)
            .await?;
        let stats = RecommendationStats::compute(&recommendations, options.threshold);

        Ok(SeedReport {
            slug: slug.to_string(),
            recommendations,
            stats,
            error: None,
        })
    }

    /// Builds the similarity graph around `seeds`, one lookup per seed.
    ///
    /// Never fails: a seed whose lookup fails contributes no recommendations.
    pub async fn build_graph(&self, seeds: &[Note], options: &GraphOptions) -> Graph {
        info!(
            "Building relationship graph from {} seeds (threshold {})",
            seeds.len(),
            options.threshold
        );

        let mut builder = GraphBuilder::new(options.clone());
        for seed in seeds {
            builder.register_seed(seed);
        }

        for (i, seed) in seeds.iter().enumerate() {
            debug!("Seed {}/{}: {}", i + 1, seeds.len(), seed.slug);
            let lookup = self
                .recommendations(&seed.slug, options.rec_type, options.no_same_tag)
                .await;
            builder.add_seed(seed, lookup);

            if i + 1 < seeds.len() && !options.seed_delay.is_zero() {
                tokio::time::sleep(options.seed_delay).await;
            }
        }

        let graph = builder.finish();
        let summary = graph.summary();
        info!(
            "Graph built: {} nodes, {} edges, {} clusters, {} failed seeds",
            summary.total_nodes, summary.total_edges, summary.clusters, summary.failed_seeds
        );
        graph
    }
}
