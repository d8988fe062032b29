//! Graph vertices and converter edges.

use crate::mime::MimeType;
use crate::registry::ConverterEntry;
use std::sync::Arc;

/// Weight of a vertex that has not been reached.
pub(crate) const INFINITE: u32 = u32::MAX;

/// Directed edge carrying one converter.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub target: usize,
    pub entry: Arc<ConverterEntry>,
    pub weight: u32,
}

/// One MIME type together with its shortest-path bookkeeping.
#[derive(Debug)]
pub(crate) struct Vertex {
    pub mime: MimeType,
    pub weight: u32,
    pub predecessor: Option<usize>,
    /// Position inside the priority queue while queued.
    pub heap_index: Option<usize>,
    pub edges: Vec<Edge>,
}

impl Vertex {
    pub fn new(mime: MimeType) -> Self {
        Self {
            mime,
            weight: INFINITE,
            predecessor: None,
            heap_index: None,
            edges: Vec::new(),
        }
    }

    /// Back to the state before any shortest-path run.
    pub fn reset(&mut self) {
        self.weight = INFINITE;
        self.predecessor = None;
        self.heap_index = None;
    }

    pub fn is_reached(&self) -> bool {
        self.weight != INFINITE
    }

    /// Add an edge. Zero weights never make it into the graph.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if edge.weight == 0 || edge.weight == INFINITE {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Cheapest edge to `target`; the first added wins ties.
    pub fn find_edge(&self, target: usize) -> Option<&Edge> {
        let mut best: Option<&Edge> = None;
        for edge in self.edges.iter().filter(|e| e.target == target) {
            match best {
                Some(b) if b.weight <= edge.weight => {},
                _ => best = Some(edge),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;
    use crate::registry::{ConverterDescriptor, ConverterFactory, ConverterRegistry};

    fn entries(weights: &[u32]) -> Vec<Arc<ConverterEntry>> {
        let mut registry = ConverterRegistry::new();
        for (i, w) in weights.iter().enumerate() {
            let factory: Arc<dyn ConverterFactory> = Arc::new(|| -> Option<Box<dyn Converter>> { None });
            registry
                .register_converter(
                    ConverterDescriptor::new(&format!("c{}", i), &["a"], &["b"]).with_weight(*w),
                    factory,
                )
                .unwrap();
        }
        registry.converters().to_vec()
    }

    #[test]
    fn test_zero_weight_edge_rejected() {
        let entry = entries(&[1]).remove(0);
        let mut vertex = Vertex::new(MimeType::from("a"));
        assert!(!vertex.add_edge(Edge {
            target: 1,
            entry,
            weight: 0
        }));
        assert!(vertex.edges.is_empty());
    }

    #[test]
    fn test_find_edge_prefers_cheapest_then_first() {
        let list = entries(&[3, 2, 2]);
        let mut vertex = Vertex::new(MimeType::from("a"));
        for entry in &list {
            vertex.add_edge(Edge {
                target: 1,
                entry: entry.clone(),
                weight: entry.descriptor().weight,
            });
        }
        let edge = vertex.find_edge(1).unwrap();
        assert_eq!(edge.entry.name(), "c1");
        assert!(vertex.find_edge(7).is_none());
    }

    #[test]
    fn test_reset() {
        let mut vertex = Vertex::new(MimeType::from("a"));
        vertex.weight = 4;
        vertex.predecessor = Some(2);
        vertex.heap_index = Some(0);
        vertex.reset();
        assert!(!vertex.is_reached());
        assert_eq!(vertex.predecessor, None);
        assert_eq!(vertex.heap_index, None);
    }
}
