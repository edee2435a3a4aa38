//! Graph ingest: whitespace-separated edge lists from local paths or
//! HTTP(S) resources.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use thiserror::Error;
use tracing::info;

use super::{Graph, GraphNode, InLink, VertexId};

/// Graph loading errors.
#[derive(Error, Debug)]
pub enum GraphError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed edge line
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Resource held no edges at all
    #[error("graph resource contains no edges")]
    Empty,
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Load a graph from a local path or an `http(s)://` URL.
pub async fn load_graph(resource: &str) -> GraphResult<Graph> {
    let text = if resource.starts_with("http://") || resource.starts_with("https://") {
        info!(resource, "fetching graph over HTTP");
        reqwest::get(resource).await?.error_for_status()?.text().await?
    } else {
        tokio::fs::read_to_string(Path::new(resource)).await?
    };
    parse_edge_list(&text)
}

/// Parse `src dst` edge lines. Blank lines and `#` comments are
/// skipped; duplicate edges collapse to one.
pub fn parse_edge_list(text: &str) -> GraphResult<Graph> {
    let mut edges = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let src = parse_vertex(fields.next(), index)?;
        let dst = parse_vertex(fields.next(), index)?;
        if fields.next().is_some() {
            return Err(GraphError::Parse {
                line: index + 1,
                reason: "expected exactly two vertex ids".to_string(),
            });
        }
        edges.push((src, dst));
    }
    if edges.is_empty() {
        return Err(GraphError::Empty);
    }
    Ok(from_edges(&edges))
}

/// Build a graph from directed edges. Every endpoint becomes a
/// vertex; teleport weight and initial rank are uniform `1/N`.
pub fn from_edges(edges: &[(VertexId, VertexId)]) -> Graph {
    let mut out_links: HashMap<VertexId, BTreeSet<VertexId>> = HashMap::new();
    let mut vertices: BTreeSet<VertexId> = BTreeSet::new();
    for &(src, dst) in edges {
        out_links.entry(src).or_default().insert(dst);
        vertices.insert(src);
        vertices.insert(dst);
    }

    let uniform = 1.0 / vertices.len().max(1) as f64;
    let out_degree =
        |v: VertexId| out_links.get(&v).map_or(0, |targets| targets.len() as u32);

    let mut graph: Graph = vertices
        .iter()
        .map(|&id| {
            let node = GraphNode {
                rank: uniform,
                e: uniform,
                in_links: HashMap::new(),
                out_degree: out_degree(id),
            };
            (id, node)
        })
        .collect();

    for (&src, targets) in &out_links {
        for &dst in targets {
            let link = InLink {
                rank: uniform,
                out_degree: out_degree(src),
            };
            if let Some(node) = graph.get_mut(&dst) {
                node.in_links.insert(src, link);
            }
        }
    }
    graph
}

fn parse_vertex(field: Option<&str>, index: usize) -> GraphResult<VertexId> {
    let field = field.ok_or_else(|| GraphError::Parse {
        line: index + 1,
        reason: "missing vertex id".to_string(),
    })?;
    field.parse::<VertexId>().map_err(|e| GraphError::Parse {
        line: index + 1,
        reason: format!("invalid vertex id {field:?}: {e}"),
    })
}
