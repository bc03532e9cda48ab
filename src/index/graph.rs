//! Multi-layer navigable-small-world proximity graph.
//!
//! The graph stores the vectors themselves; nodes are keyed by chunk id.
//! Construction follows the HNSW scheme: each node draws a top layer from
//! a geometric distribution, connects to up to `M` diverse near neighbors
//! per layer (`2M` on the ground layer), and queries run a greedy descent
//! through the upper layers followed by a bounded best-first search on
//! the ground layer. Distances are cosine distance (`1 - similarity`).
//!
//! Builds are deterministic: the level RNG is seeded, so a given
//! insertion sequence always produces the same graph. That determinism is
//! load-bearing for the on-disk image, which must reconstruct the graph
//! exactly.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::io::{Read, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{IndexError, Result};
use crate::format;
use crate::similarity::cosine_distance;

/// Seed for the level RNG. Fixed so insertion order alone determines the
/// graph shape.
const LEVEL_RNG_SEED: u64 = 0x5eed_c0de;

/// Hard cap on layer assignment; with M=16 the geometric draw virtually
/// never exceeds 8 layers, this only guards degenerate RNG output.
const MAX_LEVEL: usize = 32;

/// Candidate ordered for a max-heap (farthest first); used to bound the
/// working result set.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    node: usize,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.total_cmp(&other.distance)
    }
}

#[derive(Debug, Clone)]
struct GraphNode {
    id: String,
    vector: Vec<f32>,
    /// Neighbor lists per layer, ground layer first. Entry = (node
    /// ordinal, cosine distance between the endpoints).
    neighbors: Vec<Vec<(usize, f32)>>,
}

impl GraphNode {
    fn top_layer(&self) -> usize {
        self.neighbors.len() - 1
    }
}

/// Hierarchical proximity graph over chunk-id-keyed vectors.
pub struct ProximityGraph {
    dimensions: usize,
    m: usize,
    m0: usize,
    ef_construction: usize,
    level_multiplier: f64,
    nodes: Vec<GraphNode>,
    id_to_node: HashMap<String, usize>,
    entry_point: Option<usize>,
    max_layer: usize,
    rng: StdRng,
}

impl ProximityGraph {
    /// Creates an empty graph.
    ///
    /// `m` must be at least 2: the level multiplier is `1/ln(m)`.
    #[must_use]
    pub fn new(dimensions: usize, m: usize, ef_construction: usize, capacity: usize) -> Self {
        let m = m.max(2);
        Self {
            dimensions,
            m,
            m0: m * 2,
            ef_construction,
            level_multiplier: 1.0 / (m as f64).ln(),
            nodes: Vec::with_capacity(capacity),
            id_to_node: HashMap::with_capacity(capacity),
            entry_point: None,
            max_layer: 0,
            rng: StdRng::seed_from_u64(LEVEL_RNG_SEED),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The vector stored for `id`, if present.
    #[must_use]
    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        self.id_to_node
            .get(id)
            .map(|&node| self.nodes[node].vector.as_slice())
    }

    /// Drops all graph storage.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.id_to_node.clear();
        self.entry_point = None;
        self.max_layer = 0;
    }

    fn distance_to(&self, node: usize, query: &[f32]) -> f32 {
        cosine_distance(&self.nodes[node].vector, query)
    }

    /// Draws a top layer from the geometric distribution with multiplier
    /// `1/ln(M)`.
    fn random_level(&mut self) -> usize {
        let uniform: f64 = self.rng.random::<f64>().max(1e-15);
        ((-uniform.ln() * self.level_multiplier) as usize).min(MAX_LEVEL)
    }

    /// Walks greedily to the closest node on `layer`, starting at `start`.
    fn greedy_closest(&self, query: &[f32], mut current: usize, layer: usize) -> usize {
        let mut current_dist = self.distance_to(current, query);
        loop {
            let mut improved = false;
            if layer < self.nodes[current].neighbors.len() {
                for &(neighbor, _) in &self.nodes[current].neighbors[layer] {
                    let d = self.distance_to(neighbor, query);
                    if d < current_dist {
                        current = neighbor;
                        current_dist = d;
                        improved = true;
                    }
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first search of width `ef` on one layer. Returns the working
    /// set, unsorted.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[usize],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = HashSet::new();
        // Min-heap of nodes to expand, max-heap bounding the result set.
        let mut to_expand: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut result: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let candidate = Candidate {
                distance: self.distance_to(ep, query),
                node: ep,
            };
            to_expand.push(Reverse(candidate));
            result.push(candidate);
        }

        while let Some(Reverse(closest)) = to_expand.pop() {
            let farthest = result.peek().map_or(f32::MAX, |c| c.distance);
            if closest.distance > farthest && result.len() >= ef {
                break;
            }

            if layer >= self.nodes[closest.node].neighbors.len() {
                continue;
            }
            for &(neighbor, _) in &self.nodes[closest.node].neighbors[layer] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = self.distance_to(neighbor, query);
                let farthest = result.peek().map_or(f32::MAX, |c| c.distance);
                if d < farthest || result.len() < ef {
                    let candidate = Candidate { distance: d, node: neighbor };
                    to_expand.push(Reverse(candidate));
                    result.push(candidate);
                    if result.len() > ef {
                        result.pop();
                    }
                }
            }
        }

        result.into_vec()
    }

    /// Selects up to `m` neighbors, preferring diverse near candidates: a
    /// candidate is kept only while it is closer to the query than to any
    /// already-selected neighbor. Remaining slots are filled with the
    /// closest pruned candidates.
    fn select_neighbors(&self, mut candidates: Vec<Candidate>, m: usize) -> Vec<(usize, f32)> {
        if candidates.is_empty() || m == 0 {
            return Vec::new();
        }
        candidates.sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance));

        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(m);
        let mut pruned: Vec<(usize, f32)> = Vec::new();

        for candidate in &candidates {
            if selected.len() >= m {
                break;
            }
            let candidate_vec = &self.nodes[candidate.node].vector;
            let diverse = selected.iter().all(|&(chosen, _)| {
                cosine_distance(candidate_vec, &self.nodes[chosen].vector) >= candidate.distance
            });
            if diverse {
                selected.push((candidate.node, candidate.distance));
            } else {
                pruned.push((candidate.node, candidate.distance));
            }
        }

        for entry in pruned {
            if selected.len() >= m {
                break;
            }
            selected.push(entry);
        }
        selected
    }

    /// Adds the reverse edge `target -> source`, pruning the target's
    /// neighbor list back to `max_conn` with the diversity heuristic when
    /// it overflows.
    fn link_back(&mut self, target: usize, source: usize, distance: f32, layer: usize, max_conn: usize) {
        if target == source || max_conn == 0 {
            return;
        }
        let neighbors = &self.nodes[target].neighbors[layer];

        if let Some(existing) = neighbors.iter().position(|&(node, _)| node == source) {
            if distance < neighbors[existing].1 {
                self.nodes[target].neighbors[layer][existing].1 = distance;
            }
            return;
        }

        if neighbors.len() < max_conn {
            self.nodes[target].neighbors[layer].push((source, distance));
            return;
        }

        let mut candidates: Vec<Candidate> = neighbors
            .iter()
            .map(|&(node, dist)| Candidate { distance: dist, node })
            .collect();
        candidates.push(Candidate { distance, node: source });
        let pruned = self.select_neighbors(candidates, max_conn);
        self.nodes[target].neighbors[layer] = pruned;
    }

    /// Inserts a vector keyed by `id`.
    ///
    /// The caller guarantees the id is not already present and the vector
    /// length matches the graph's dimensions.
    pub fn insert(&mut self, id: String, vector: Vec<f32>) {
        debug_assert_eq!(vector.len(), self.dimensions);
        debug_assert!(!self.id_to_node.contains_key(&id));

        let node_id = self.nodes.len();
        let level = self.random_level();

        self.id_to_node.insert(id.clone(), node_id);
        self.nodes.push(GraphNode {
            id,
            vector,
            neighbors: vec![Vec::new(); level + 1],
        });

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node_id);
            self.max_layer = level;
            return;
        };

        let query = self.nodes[node_id].vector.clone();

        // Greedy descent through the layers above the new node's top.
        let mut current = entry;
        if level < self.max_layer {
            for layer in ((level + 1)..=self.max_layer).rev() {
                current = self.greedy_closest(&query, current, layer);
            }
        }

        // Beam search + diverse linking from the node's top down to ground.
        let mut entry_points = vec![current];
        for layer in (0..=level.min(self.max_layer)).rev() {
            let candidates =
                self.search_layer(&query, &entry_points, self.ef_construction, layer);
            let max_conn = if layer == 0 { self.m0 } else { self.m };
            let neighbors = self.select_neighbors(candidates, self.m);

            for &(neighbor, dist) in &neighbors {
                if layer < self.nodes[neighbor].neighbors.len() {
                    self.link_back(neighbor, node_id, dist, layer, max_conn);
                }
            }

            entry_points = neighbors.iter().map(|&(node, _)| node).collect();
            self.nodes[node_id].neighbors[layer] = neighbors;
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(node_id);
        }
    }

    /// Finds the `k` nearest nodes to `query` with beam width
    /// `max(ef_search, k)`. Returns `(node ordinal, cosine distance)` in
    /// ascending distance; node ordinals equal insertion order.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<(usize, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };

        let mut current = entry;
        for layer in (1..=self.max_layer).rev() {
            current = self.greedy_closest(query, current, layer);
        }

        let ef = ef_search.max(k);
        let mut results = self.search_layer(query, &[current], ef, 0);
        results.sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance));
        results
            .into_iter()
            .take(k)
            .map(|c| (c.node, c.distance))
            .collect()
    }

    // ==================== Graph image ====================

    /// Writes the graph image: entry point, then per node in insertion
    /// order its id, layer count, vector, and per-layer neighbor
    /// ordinals. Distances are not persisted; they are recomputed on load
    /// from the stored vectors, which reproduces them exactly.
    pub fn write_image(&self, w: &mut impl Write) -> Result<()> {
        let entry = self.entry_point.map_or(-1i32, |node| node as i32);
        format::write_i32(w, entry)?;
        format::write_u32(w, self.nodes.len() as u32)?;

        for node in &self.nodes {
            format::write_string(w, &node.id)?;
            format::write_u16(w, node.neighbors.len() as u16)?;
            format::write_vector(w, &node.vector)?;
            for layer in &node.neighbors {
                format::write_u16(w, layer.len() as u16)?;
                for &(neighbor, _) in layer {
                    format::write_u32(w, neighbor as u32)?;
                }
            }
        }
        Ok(())
    }

    /// Reconstructs a graph from its image.
    pub fn read_image(
        r: &mut impl Read,
        dimensions: usize,
        m: usize,
        ef_construction: usize,
    ) -> Result<Self> {
        let entry = format::read_i32(r)?;
        let node_count = format::read_u32(r)? as usize;

        let mut graph = Self::new(dimensions, m, ef_construction, node_count);

        // Pass 1: nodes, vectors, and raw neighbor ordinals.
        let mut raw_neighbors: Vec<Vec<Vec<usize>>> = Vec::with_capacity(node_count);
        for node_id in 0..node_count {
            let id = format::read_string(r)?;
            let layer_count = format::read_u16(r)? as usize;
            if layer_count == 0 {
                return Err(graph_image_error(format!(
                    "node {node_id} has no layers"
                )));
            }
            let vector = format::read_vector(r, dimensions)?;

            let mut layers = Vec::with_capacity(layer_count);
            for _ in 0..layer_count {
                let neighbor_count = format::read_u16(r)? as usize;
                let mut layer = Vec::with_capacity(neighbor_count);
                for _ in 0..neighbor_count {
                    layer.push(format::read_u32(r)? as usize);
                }
                layers.push(layer);
            }
            raw_neighbors.push(layers);

            graph.id_to_node.insert(id.clone(), node_id);
            graph.nodes.push(GraphNode {
                id,
                vector,
                neighbors: Vec::new(),
            });
        }

        // Pass 2: resolve neighbor distances now that every vector is in.
        for (node_id, layers) in raw_neighbors.into_iter().enumerate() {
            let mut resolved = Vec::with_capacity(layers.len());
            for layer in layers {
                let mut edges = Vec::with_capacity(layer.len());
                for neighbor in layer {
                    if neighbor >= node_count {
                        return Err(graph_image_error(format!(
                            "node {node_id} references missing neighbor {neighbor}"
                        )));
                    }
                    let dist = cosine_distance(
                        &graph.nodes[node_id].vector,
                        &graph.nodes[neighbor].vector,
                    );
                    edges.push((neighbor, dist));
                }
                resolved.push(edges);
            }
            graph.nodes[node_id].neighbors = resolved;
        }

        if entry >= 0 {
            let entry = entry as usize;
            if entry >= node_count {
                return Err(graph_image_error(format!(
                    "entry point {entry} out of range"
                )));
            }
            graph.entry_point = Some(entry);
            graph.max_layer = graph.nodes[entry].top_layer();
        } else if node_count > 0 {
            return Err(graph_image_error(
                "non-empty graph without an entry point".to_string(),
            ));
        }

        Ok(graph)
    }
}

fn graph_image_error(reason: String) -> IndexError {
    IndexError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("corrupt graph image: {reason}"),
    ))
}

impl std::fmt::Debug for ProximityGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximityGraph")
            .field("nodes", &self.nodes.len())
            .field("max_layer", &self.max_layer)
            .field("m", &self.m)
            .finish()
    }
}
