//! Binary min-heap over vertex indices with decrease-key.
//!
//! Every queued vertex records its own heap position in
//! [`Vertex::heap_index`], so a decreased key can be sifted up in
//! O(log n) without searching. Keys are `(weight, vertex index)`, which
//! makes extraction order fully deterministic.

use super::vertex::Vertex;

pub(crate) struct PriorityQueue {
    heap: Vec<usize>,
}

impl PriorityQueue {
    /// Queue every vertex.
    pub fn new(vertices: &mut [Vertex]) -> Self {
        let mut queue = Self {
            heap: (0..vertices.len()).collect(),
        };
        for (pos, &v) in queue.heap.iter().enumerate() {
            vertices[v].heap_index = Some(pos);
        }
        for pos in (0..queue.heap.len() / 2).rev() {
            queue.sift_down(vertices, pos);
        }
        queue
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Index of the vertex with the smallest key.
    pub fn peek(&self) -> Option<usize> {
        self.heap.first().copied()
    }

    /// Remove and return the vertex with the smallest key.
    pub fn extract_min(&mut self, vertices: &mut [Vertex]) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let min = self.heap.swap_remove(0);
        vertices[min].heap_index = None;
        if let Some(&moved) = self.heap.first() {
            vertices[moved].heap_index = Some(0);
            self.sift_down(vertices, 0);
        }
        Some(min)
    }

    /// Restore the heap after `vertex`'s weight was lowered.
    pub fn key_decreased(&mut self, vertices: &mut [Vertex], vertex: usize) {
        if let Some(pos) = vertices[vertex].heap_index {
            self.sift_up(vertices, pos);
        }
    }

    fn less(vertices: &[Vertex], a: usize, b: usize) -> bool {
        (vertices[a].weight, a) < (vertices[b].weight, b)
    }

    fn swap(&mut self, vertices: &mut [Vertex], i: usize, j: usize) {
        self.heap.swap(i, j);
        vertices[self.heap[i]].heap_index = Some(i);
        vertices[self.heap[j]].heap_index = Some(j);
    }

    fn sift_up(&mut self, vertices: &mut [Vertex], mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !Self::less(vertices, self.heap[pos], self.heap[parent]) {
                break;
            }
            self.swap(vertices, pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, vertices: &mut [Vertex], mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.heap.len() && Self::less(vertices, self.heap[left], self.heap[smallest]) {
                smallest = left;
            }
            if right < self.heap.len() && Self::less(vertices, self.heap[right], self.heap[smallest]) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(vertices, pos, smallest);
            pos = smallest;
        }
    }
}
