//! End-to-end merger scenarios: cross-format merging, deduplication, and
//! provenance tracking.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use code_vectors::{
    create, create_hnsw_with_capacity, normalized, Backend, ChunkKind, CodeChunk, HnswIndex,
    IndexConfig, IndexMerger, InMemoryIndex, VectorIndex,
};

const DIMENSIONS: usize = 128;
const MODEL_ID: &str = "test-model";

fn config() -> IndexConfig {
    IndexConfig::for_model(MODEL_ID, DIMENSIONS)
}

struct VectorSource {
    rng: StdRng,
}

impl VectorSource {
    fn new() -> Self {
        Self { rng: StdRng::seed_from_u64(42) }
    }

    fn next(&mut self) -> Vec<f32> {
        let v: Vec<f32> = (0..DIMENSIONS)
            .map(|_| self.rng.random_range(-1.0..1.0))
            .collect();
        normalized(&v)
    }
}

fn chunk(name: &str) -> CodeChunk {
    CodeChunk::of(name, ChunkKind::Method, "code", format!("{name}.java"), 1, 2).unwrap()
}

#[test]
fn s1_two_brute_force_sources_into_brute_force() {
    let mut vectors = VectorSource::new();

    let mut a = create(config());
    a.add(chunk("m1"), &vectors.next()).unwrap();
    a.add(chunk("m2"), &vectors.next()).unwrap();

    let mut b = create(config());
    b.add(chunk("m3"), &vectors.next()).unwrap();
    b.add(chunk("m4"), &vectors.next()).unwrap();

    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::InMemory, 1000);
    assert!(merger.add_index(&a, "group:lib1:1.0"));
    assert!(merger.add_index(&b, "group:lib2:1.0"));

    let merged = merger.build().unwrap();
    assert_eq!(merged.size(), 4);
    assert_eq!(merged.backend(), Backend::InMemory);
    assert!(merged.as_any().downcast_ref::<InMemoryIndex>().is_some());
}

#[test]
fn s2_duplicate_chunk_id_survives_once() {
    let mut vectors = VectorSource::new();

    let mut a = create(config());
    a.add(chunk("shared"), &vectors.next()).unwrap();
    a.add(chunk("u1"), &vectors.next()).unwrap();

    let mut b = create(config());
    b.add(chunk("shared"), &vectors.next()).unwrap();
    b.add(chunk("u2"), &vectors.next()).unwrap();

    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::InMemory, 1000);
    merger.add_index(&a, "group:lib1:1.0");
    merger.add_index(&b, "group:lib2:1.0");

    let merged = merger.build().unwrap();
    assert_eq!(merged.size(), 3);

    let shared = merged
        .entries()
        .into_iter()
        .find(|e| e.chunk.name == "shared")
        .unwrap();
    assert_eq!(shared.chunk.artifact.as_deref(), Some("group:lib1:1.0"));
}

#[test]
fn s3_incompatible_model_rejected() {
    let mut vectors = VectorSource::new();

    let mut compatible = create(config());
    compatible.add(chunk("m1"), &vectors.next()).unwrap();

    let mut incompatible = create(IndexConfig::for_model("different-model", DIMENSIONS));
    incompatible.add(chunk("m2"), &vectors.next()).unwrap();

    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::InMemory, 1000);
    assert!(merger.add_index(&compatible, "group:compatible:1.0"));
    assert!(!merger.add_index(&incompatible, "incompatible-coords"));

    let merged = merger.build().unwrap();
    assert_eq!(merged.size(), 1);
    assert_eq!(merger.rejected_artifacts(), &["incompatible-coords".to_string()]);
}

#[test]
fn s4_cross_backend_merge_to_graph() {
    let mut vectors = VectorSource::new();

    let mut memory = create(config());
    memory.add(chunk("inmem1"), &vectors.next()).unwrap();
    memory.add(chunk("inmem2"), &vectors.next()).unwrap();

    let mut graph = create_hnsw_with_capacity(config(), 100);
    graph.add(chunk("graph1"), &vectors.next()).unwrap();

    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::Hnsw, 1000);
    assert!(merger.add_index(&memory, "group:inmem-lib:1.0"));
    assert!(merger.add_index(&graph, "group:graph-lib:1.0"));

    let merged = merger.build().unwrap();
    assert_eq!(merged.size(), 3);
    assert_eq!(merged.backend(), Backend::Hnsw);
    assert!(merged.as_any().downcast_ref::<HnswIndex>().is_some());
}

#[test]
fn rejected_source_leaves_size_unchanged() {
    let mut vectors = VectorSource::new();
    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::InMemory, 1000);

    let mut incompatible = create(IndexConfig::for_model("other-model", DIMENSIONS));
    incompatible.add(chunk("x"), &vectors.next()).unwrap();

    let before = merger.pending_count();
    merger.add_index(&incompatible, "g:other:1");
    assert_eq!(merger.pending_count(), before);
    assert_eq!(merger.rejected_artifacts().len(), 1);
}

#[test]
fn union_of_ids_determines_merged_size() {
    let mut vectors = VectorSource::new();

    let mut a = create(config());
    for name in ["one", "two", "three"] {
        a.add(chunk(name), &vectors.next()).unwrap();
    }
    let mut b = create(config());
    for name in ["two", "three", "four"] {
        b.add(chunk(name), &vectors.next()).unwrap();
    }

    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::InMemory, 1000);
    merger.add_index(&a, "g:a:1");
    merger.add_index(&b, "g:b:1");

    // |ids(A) ∪ ids(B)| = 4
    let merged = merger.build().unwrap();
    assert_eq!(merged.size(), 4);
}

#[test]
fn provenance_visible_in_entries_and_search_results() {
    let mut vectors = VectorSource::new();
    let query = vectors.next();

    let mut a = create(config());
    a.add(chunk("lib1.method"), &query).unwrap();
    let mut b = create(config());
    b.add(chunk("lib2.method"), &vectors.next()).unwrap();

    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::InMemory, 1000);
    merger.add_index(&a, "com.example:lib1:1.0");
    merger.add_index(&b, "com.example:lib2:2.0");

    let merged = merger.build().unwrap();
    for entry in merged.entries() {
        let expected = if entry.chunk.name == "lib1.method" {
            "com.example:lib1:1.0"
        } else {
            "com.example:lib2:2.0"
        };
        assert_eq!(entry.chunk.artifact.as_deref(), Some(expected));
    }

    let results = merged.search(&query, 1).unwrap();
    assert_eq!(results[0].artifact_id.as_deref(), Some("com.example:lib1:1.0"));
}

#[test]
fn graph_sources_feed_the_merger_through_entries() {
    let mut vectors = VectorSource::new();

    let mut graph_a = create_hnsw_with_capacity(config(), 50);
    let mut graph_b = create_hnsw_with_capacity(config(), 50);
    for i in 0..5 {
        graph_a.add(chunk(&format!("a{i}")), &vectors.next()).unwrap();
        graph_b.add(chunk(&format!("b{i}")), &vectors.next()).unwrap();
    }

    let mut merger = IndexMerger::new(MODEL_ID, DIMENSIONS, Backend::Hnsw, 1000);
    merger.add_index(&graph_a, "g:a:1");
    merger.add_index(&graph_b, "g:b:1");
    assert_eq!(merger.pending_count(), 10);

    let merged = merger.build().unwrap();
    assert_eq!(merged.size(), 10);

    // Ordering guarantee: artifact order, then intra-artifact insertion order.
    let names: Vec<String> = merged.entries().into_iter().map(|e| e.chunk.name).collect();
    let expected: Vec<String> = (0..5)
        .map(|i| format!("a{i}"))
        .chain((0..5).map(|i| format!("b{i}")))
        .collect();
    assert_eq!(names, expected);
}
