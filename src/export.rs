//! Export of analysis reports and relationship graphs.
//!
//! Reports go to CSV (one row per note, lossy for tags) and JSON (the full
//! report). Graphs go to a JSON node/edge document. Files are written through a
//! temporary file in the target directory and then moved into place.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{AnalysisReport, FlomoError, Graph, GraphEdge, GraphNode, Result};

/// Column order of the row export.
pub const CSV_HEADER: [&str; 7] = [
    "slug",
    "created_at",
    "updated_at",
    "plain_text",
    "markdown",
    "word_count",
    "tags",
];

/// Delimiter joining tags into the single `tags` column.
pub const TAG_DELIMITER: &str = ",";

/// Writes one row per note.
pub fn write_csv<W: Write>(report: &AnalysisReport, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    for note in &report.notes {
        let word_count = note.word_count.to_string();
        let tags = note.tags.join(TAG_DELIMITER);
        csv.write_record([
            note.slug.as_str(),
            note.created_at.as_str(),
            note.updated_at.as_str(),
            note.plain_text.as_str(),
            note.markdown.as_str(),
            word_count.as_str(),
            tags.as_str(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Writes the row export to `path`.
pub fn export_csv(report: &AnalysisReport, path: &Path) -> Result<()> {
    let mut buffer = Vec::new();
    write_csv(report, &mut buffer)?;
    write_atomically(path, &buffer)?;
    info!("Exported {} notes to {}", report.notes.len(), path.display());
    Ok(())
}

/// Writes the full report as pretty-printed JSON to `path`.
pub fn export_json(report: &AnalysisReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    write_atomically(path, json.as_bytes())?;
    info!("Exported analysis to {}", path.display());
    Ok(())
}

/// Reads back a report written by [`export_json`].
pub fn read_json_report(path: &Path) -> Result<AnalysisReport> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub export_time: String,
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Seeds with at least one edge-worthy recommendation
    pub total_clusters: usize,
}

/// On-disk shape of a relationship graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

impl GraphDocument {
    pub fn new(graph: &Graph, export_time: DateTime<Local>) -> Self {
        let summary = graph.summary();
        Self {
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
            metadata: GraphMetadata {
                export_time: export_time.to_rfc3339(),
                total_nodes: summary.total_nodes,
                total_edges: summary.total_edges,
                total_clusters: summary.clusters,
            },
        }
    }
}

/// Writes `graph` as a node/edge document to `path`, stamped with the current time.
pub fn export_graph(graph: &Graph, path: &Path) -> Result<GraphDocument> {
    let document = GraphDocument::new(graph, Local::now());
    let json = serde_json::to_string_pretty(&document)?;
    write_atomically(path, json.as_bytes())?;
    info!(
        "Exported graph ({} nodes, {} edges) to {}",
        document.metadata.total_nodes,
        document.metadata.total_edges,
        path.display()
    );
    Ok(document)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.exists() {
        debug!("Creating export directory: {}", dir.display());
        fs::create_dir_all(&dir)?;
    }

    let mut temp_file = NamedTempFile::new_in(&dir).map_err(|e| {
        error!("Failed to create temporary file in {}: {}", dir.display(), e);
        FlomoError::Io(e)
    })?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;

    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        FlomoError::Io(e.error)
    })?;
    Ok(())
}
