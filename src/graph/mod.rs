//! Conversion graph and shortest-path resolution.
//!
//! Vertices are MIME types, edges are converters. The topology is built
//! once from a [`ConverterRegistry`] snapshot; choosing a new source MIME
//! type only reruns Dijkstra over the existing vertices.
//!
//! ```ignore
//! let mut graph = ConversionGraph::new(&registry);
//! graph.set_source_mime_type("text/csv");
//! match graph.route(Some("application/x-sheet"))? {
//!     Route::Path(path) => println!("{} steps", path.steps.len()),
//!     Route::AlreadyNative(_) => println!("nothing to do"),
//!     Route::NoPath => println!("unreachable"),
//! }
//! ```

mod queue;
mod vertex;

use crate::error::{Error, Result};
use crate::mime::MimeType;
use crate::registry::{ConverterEntry, ConverterRegistry};
use indexmap::IndexMap;
use queue::PriorityQueue;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use vertex::{Edge, Vertex, INFINITE};

/// Direction of a conversion relative to the native document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Foreign format into the native format.
    Import,
    /// Native format out to a foreign format.
    Export,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Import => f.write_str("import"),
            Direction::Export => f.write_str("export"),
        }
    }
}

/// One hop of a resolved path.
#[derive(Debug, Clone)]
pub struct PathStep {
    /// Converter performing the hop.
    pub entry: Arc<ConverterEntry>,
    /// Input MIME type.
    pub from: MimeType,
    /// Output MIME type.
    pub to: MimeType,
}

/// Cheapest converter sequence between two MIME types.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Source MIME type.
    pub source: MimeType,
    /// Destination MIME type.
    pub target: MimeType,
    /// Hops in execution order; `steps[i].to == steps[i + 1].from`.
    pub steps: Vec<PathStep>,
    /// Sum of the converter weights along the path.
    pub total_weight: u32,
}

/// Result of target resolution.
#[derive(Debug, Clone)]
pub enum Route {
    /// A chain of at least one converter.
    Path(ResolvedPath),
    /// The source already is the requested (or a native) type.
    AlreadyNative(MimeType),
    /// The target is unknown or unreachable.
    NoPath,
}

impl Route {
    /// The resolved path, if any.
    pub fn into_path(self) -> Option<ResolvedPath> {
        match self {
            Route::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Total weight; `Some(0)` for [`Route::AlreadyNative`].
    pub fn total_weight(&self) -> Option<u32> {
        match self {
            Route::Path(path) => Some(path.total_weight),
            Route::AlreadyNative(_) => Some(0),
            Route::NoPath => None,
        }
    }
}

/// Directed weighted multigraph of MIME types and converters.
pub struct ConversionGraph {
    vertices: Vec<Vertex>,
    index: IndexMap<MimeType, usize>,
    natives: Vec<usize>,
    source: Option<usize>,
    generation: u64,
}

impl ConversionGraph {
    /// Build the topology from `registry`.
    ///
    /// Native MIME types of all document handlers become vertices. Every
    /// import and export type of every converter becomes a vertex; edges are
    /// added only for available converters with a usable weight.
    pub fn new(registry: &ConverterRegistry) -> Self {
        let mut graph = Self {
            vertices: Vec::new(),
            index: IndexMap::new(),
            natives: Vec::new(),
            source: None,
            generation: registry.generation(),
        };

        for mime in registry.native_mime_types() {
            let v = graph.ensure_vertex(&mime);
            if !graph.natives.contains(&v) {
                graph.natives.push(v);
            }
        }

        let mut edge_count = 0usize;
        for entry in registry.converters() {
            let descriptor = entry.descriptor();
            let import: Vec<usize> = descriptor.import.iter().map(|m| graph.ensure_vertex(m)).collect();
            let export: Vec<usize> = descriptor.export.iter().map(|m| graph.ensure_vertex(m)).collect();

            let Some(weight) = descriptor.edge_weight() else {
                continue;
            };
            if !registry.is_available(entry) {
                log::debug!("Converter '{}' unavailable, no edges added", entry.name());
                continue;
            }
            for &from in &import {
                for &to in &export {
                    let added = graph.vertices[from].add_edge(Edge {
                        target: to,
                        entry: entry.clone(),
                        weight,
                    });
                    if added {
                        edge_count += 1;
                    }
                }
            }
        }

        log::debug!(
            "Built conversion graph: {} vertices, {} edges, {} native types",
            graph.vertices.len(),
            edge_count,
            graph.natives.len()
        );
        graph
    }

    fn ensure_vertex(&mut self, mime: &MimeType) -> usize {
        if let Some(&v) = self.index.get(mime) {
            return v;
        }
        let v = self.vertices.len();
        self.vertices.push(Vertex::new(mime.clone()));
        self.index.insert(mime.clone(), v);
        v
    }

    /// Registry generation this topology was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of MIME type vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of converter edges.
    pub fn edge_count(&self) -> usize {
        self.vertices.iter().map(|v| v.edges.len()).sum()
    }

    /// Whether `mime` is a vertex.
    pub fn contains(&self, mime: &str) -> bool {
        self.index.contains_key(mime)
    }

    /// All MIME types in insertion order.
    pub fn mime_types(&self) -> impl Iterator<Item = &MimeType> {
        self.index.keys()
    }

    /// Native MIME types known to the graph, in handler order.
    pub fn native_mime_types(&self) -> impl Iterator<Item = &MimeType> {
        self.natives.iter().map(move |&v| &self.vertices[v].mime)
    }

    /// Current source MIME type, if one is set and known.
    pub fn source_mime_type(&self) -> Option<&MimeType> {
        self.source.map(|v| &self.vertices[v].mime)
    }

    /// True once a known source MIME type has been set.
    pub fn is_valid(&self) -> bool {
        self.source.is_some()
    }

    /// Make `mime` the source and recompute shortest paths.
    ///
    /// Setting the current source again is a no-op. An unknown MIME type
    /// leaves the graph without a source.
    pub fn set_source_mime_type(&mut self, mime: &str) {
        let new_source = self.index.get(mime).copied();
        if new_source.is_some() && new_source == self.source {
            return;
        }
        self.source = new_source;
        match new_source {
            Some(source) => self.shortest_paths(source),
            None => {
                log::debug!("Source mimetype {} is not part of the conversion graph", mime);
                self.vertices.iter_mut().for_each(Vertex::reset);
            },
        }
    }

    fn shortest_paths(&mut self, source: usize) {
        self.vertices.iter_mut().for_each(Vertex::reset);
        self.vertices[source].weight = 0;

        let mut queue = PriorityQueue::new(&mut self.vertices);
        while !queue.is_empty() {
            let Some(u) = queue.extract_min(&mut self.vertices) else {
                break;
            };
            let base = self.vertices[u].weight;
            if base == INFINITE {
                // Everything still queued is unreachable
                break;
            }
            for i in 0..self.vertices[u].edges.len() {
                let (target, weight) = {
                    let edge = &self.vertices[u].edges[i];
                    (edge.target, edge.weight)
                };
                let candidate = base.saturating_add(weight);
                if candidate < self.vertices[target].weight {
                    self.vertices[target].weight = candidate;
                    self.vertices[target].predecessor = Some(u);
                    queue.key_decreased(&mut self.vertices, target);
                }
            }
        }
    }

    /// Shortest-path weight of `mime` from the current source.
    ///
    /// `None` for unknown or unreachable types.
    pub fn weight_of(&self, mime: &str) -> Option<u32> {
        let v = *self.index.get(mime)?;
        let vertex = &self.vertices[v];
        vertex.is_reached().then_some(vertex.weight)
    }

    /// Predecessor of `mime` on its shortest path.
    pub fn predecessor_of(&self, mime: &str) -> Option<&MimeType> {
        let v = *self.index.get(mime)?;
        self.vertices[v].predecessor.map(|p| &self.vertices[p].mime)
    }

    /// Resolve a route from the current source.
    ///
    /// With `Some(target)` the route ends at that MIME type. With `None` it
    /// ends at the cheapest reachable native type; ties go to the native
    /// type declared first. A zero total weight yields
    /// [`Route::AlreadyNative`].
    pub fn route(&self, to: Option<&str>) -> Result<Route> {
        let Some(source) = self.source else {
            return Ok(Route::NoPath);
        };

        let target = match to {
            Some(mime) => match self.index.get(mime) {
                Some(&v) if self.vertices[v].is_reached() => v,
                _ => return Ok(Route::NoPath),
            },
            None => match self.nearest_native() {
                Some(v) => v,
                None => return Ok(Route::NoPath),
            },
        };

        if self.vertices[target].weight == 0 {
            return Ok(Route::AlreadyNative(self.vertices[target].mime.clone()));
        }
        self.materialize(source, target).map(Route::Path)
    }

    fn nearest_native(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for &v in &self.natives {
            let weight = self.vertices[v].weight;
            if weight == INFINITE {
                continue;
            }
            if weight == 0 {
                return Some(v);
            }
            match best {
                Some(b) if self.vertices[b].weight <= weight => {},
                _ => best = Some(v),
            }
        }
        best
    }

    fn materialize(&self, source: usize, target: usize) -> Result<ResolvedPath> {
        let mut steps = Vec::new();
        let mut current = target;
        while current != source {
            if steps.len() > self.vertices.len() {
                return Err(Error::InconsistentGraph(format!(
                    "predecessor cycle while walking back from {}",
                    self.vertices[target].mime
                )));
            }
            let Some(pred) = self.vertices[current].predecessor else {
                return Err(Error::InconsistentGraph(format!(
                    "{} has no predecessor on the way to {}",
                    self.vertices[current].mime, self.vertices[source].mime
                )));
            };
            let Some(edge) = self.vertices[pred].find_edge(current) else {
                return Err(Error::InconsistentGraph(format!(
                    "no edge from {} to {}",
                    self.vertices[pred].mime, self.vertices[current].mime
                )));
            };
            steps.push(PathStep {
                entry: edge.entry.clone(),
                from: self.vertices[pred].mime.clone(),
                to: self.vertices[current].mime.clone(),
            });
            current = pred;
        }
        steps.reverse();

        Ok(ResolvedPath {
            source: self.vertices[source].mime.clone(),
            target: self.vertices[target].mime.clone(),
            steps,
            total_weight: self.vertices[target].weight,
        })
    }

    /// MIME types connected to `mime`, ignoring weights.
    ///
    /// [`Direction::Export`] follows edges forward: everything `mime` can be
    /// converted into. [`Direction::Import`] follows them backwards:
    /// everything that can be converted into `mime`. The result includes
    /// `mime` itself, and is empty if `mime` is not a vertex. Shortest-path
    /// state is neither read nor changed.
    pub fn reachable(&self, mime: &str, direction: Direction) -> BTreeSet<MimeType> {
        let Some(&start) = self.index.get(mime) else {
            return BTreeSet::new();
        };

        let adjacency: Vec<Vec<usize>> = match direction {
            Direction::Export => self
                .vertices
                .iter()
                .map(|v| v.edges.iter().map(|e| e.target).collect())
                .collect(),
            Direction::Import => {
                let mut reversed = vec![Vec::new(); self.vertices.len()];
                for (from, vertex) in self.vertices.iter().enumerate() {
                    for edge in &vertex.edges {
                        reversed[edge.target].push(from);
                    }
                }
                reversed
            },
        };

        let mut seen = vec![false; self.vertices.len()];
        let mut queue = VecDeque::new();
        seen[start] = true;
        queue.push_back(start);
        while let Some(v) = queue.pop_front() {
            for &next in &adjacency[v] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }

        seen.iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(v, _)| self.vertices[v].mime.clone())
            .collect()
    }

    /// Log the graph at debug level.
    pub fn dump(&self) {
        log::debug!("+++++++++ ConversionGraph +++++++++");
        log::debug!(
            "Source: {}",
            self.source_mime_type().map(MimeType::as_str).unwrap_or("<none>")
        );
        for vertex in &self.vertices {
            let weight = if vertex.is_reached() {
                vertex.weight.to_string()
            } else {
                "inf".to_string()
            };
            log::debug!("  {} (weight {})", vertex.mime, weight);
            for edge in &vertex.edges {
                log::debug!(
                    "    -> {} via '{}' (weight {})",
                    self.vertices[edge.target].mime,
                    edge.entry.name(),
                    edge.weight
                );
            }
        }
        log::debug!("+++++++++ ConversionGraph (done) +++++++++");
    }
}

impl fmt::Debug for ConversionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionGraph")
            .field("vertices", &self.vertices.len())
            .field("source", &self.source_mime_type())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;
    use crate::document::SharedDocument;
    use crate::registry::{ConverterDescriptor, ConverterFactory};

    fn factory() -> Arc<dyn ConverterFactory> {
        Arc::new(|| -> Option<Box<dyn Converter>> { None })
    }

    fn registry(converters: &[(&str, &str, &str, u32)]) -> ConverterRegistry {
        let mut registry = ConverterRegistry::new();
        for (name, from, to, weight) in converters {
            registry
                .register_converter(
                    ConverterDescriptor::new(name, &[*from], &[*to]).with_weight(*weight),
                    factory(),
                )
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_two_hop_beats_expensive_direct_edge() {
        let registry = registry(&[("ab", "A", "B", 1), ("bc", "B", "C", 1), ("ac", "A", "C", 5)]);
        let mut graph = ConversionGraph::new(&registry);
        graph.set_source_mime_type("A");

        let path = graph.route(Some("C")).unwrap().into_path().unwrap();
        assert_eq!(path.total_weight, 2);
        let names: Vec<&str> = path.steps.iter().map(|s| s.entry.name()).collect();
        assert_eq!(names, vec!["ab", "bc"]);
        assert_eq!(path.steps[0].to, path.steps[1].from);
        assert_eq!(graph.predecessor_of("C").map(MimeType::as_str), Some("B"));
    }

    #[test]
    fn test_parallel_edges_tie_goes_to_first_registered() {
        let registry = registry(&[("first", "A", "B", 2), ("second", "A", "B", 2)]);
        let mut graph = ConversionGraph::new(&registry);
        graph.set_source_mime_type("A");
        let path = graph.route(Some("B")).unwrap().into_path().unwrap();
        assert_eq!(path.steps[0].entry.name(), "first");
    }

    #[test]
    fn test_zero_weight_converter_creates_no_edge() {
        let registry = registry(&[("free", "A", "B", 0)]);
        let mut graph = ConversionGraph::new(&registry);
        graph.set_source_mime_type("A");
        assert!(graph.contains("B"));
        assert_eq!(graph.edge_count(), 0);
        assert!(matches!(graph.route(Some("B")).unwrap(), Route::NoPath));
    }

    #[test]
    fn test_unknown_source_invalidates() {
        let registry = registry(&[("ab", "A", "B", 1)]);
        let mut graph = ConversionGraph::new(&registry);
        graph.set_source_mime_type("A");
        assert!(graph.is_valid());
        graph.set_source_mime_type("Z");
        assert!(!graph.is_valid());
        assert_eq!(graph.weight_of("A"), None);
        assert!(matches!(graph.route(Some("B")).unwrap(), Route::NoPath));
    }

    #[test]
    fn test_nearest_native() {
        let mut registry = registry(&[("ab", "A", "B", 4), ("ac", "A", "C", 2)]);
        registry.register_document_handler("B", &["C"], Arc::new(|| -> Option<SharedDocument> { None }));
        let mut graph = ConversionGraph::new(&registry);

        graph.set_source_mime_type("A");
        let path = graph.route(None).unwrap().into_path().unwrap();
        assert_eq!(path.target, "C");

        graph.set_source_mime_type("B");
        assert!(matches!(graph.route(None).unwrap(), Route::AlreadyNative(m) if m == "B"));
    }

    #[test]
    fn test_reachable_directions() {
        let registry = registry(&[("ab", "A", "B", 1), ("bc", "B", "C", 1), ("dc", "D", "C", 1)]);
        let graph = ConversionGraph::new(&registry);

        let export: Vec<String> = graph
            .reachable("B", Direction::Export)
            .into_iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(export, vec!["B", "C"]);

        let import: Vec<String> = graph
            .reachable("C", Direction::Import)
            .into_iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(import, vec!["A", "B", "C", "D"]);
        assert!(graph.reachable("nope", Direction::Export).is_empty());
    }
}
