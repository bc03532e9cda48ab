//! Contract tests exercised against both index backends.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use code_vectors::{
    create, create_hnsw_with_capacity, normalized, ChunkKind, CodeChunk, IndexConfig,
    ProviderError, VectorIndex,
};

const DIMENSIONS: usize = 128;
const MODEL_ID: &str = "test-model";

fn config() -> IndexConfig {
    IndexConfig::for_model(MODEL_ID, DIMENSIONS)
}

fn seeded_unit_vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let v: Vec<f32> = (0..DIMENSIONS).map(|_| rng.random_range(-1.0..1.0)).collect();
            normalized(&v)
        })
        .collect()
}

fn chunk(name: &str, kind: ChunkKind, file: &str) -> CodeChunk {
    CodeChunk::of(name, kind, format!("source of {name}"), file, 1, 5).unwrap()
}

fn both_backends(count: usize) -> Vec<(Box<dyn VectorIndex>, Vec<Vec<f32>>)> {
    let vectors = seeded_unit_vectors(count, 42);
    let mut backends: Vec<Box<dyn VectorIndex>> = vec![
        Box::new(create(config())),
        Box::new(create_hnsw_with_capacity(config(), count * 2)),
    ];
    for index in &mut backends {
        for (i, vector) in vectors.iter().enumerate() {
            index
                .add(chunk(&format!("m{i}"), ChunkKind::Method, &format!("f{}.java", i % 4)), vector)
                .unwrap();
        }
    }
    backends.into_iter().map(|b| (b, vectors.clone())).collect()
}

#[test]
fn size_counts_every_insertion() {
    for (index, _) in both_backends(20) {
        assert_eq!(index.size(), 20);
        assert!(!index.is_empty());
    }
}

#[test]
fn entries_preserve_ids_in_insertion_order() {
    for (index, vectors) in both_backends(15) {
        let entries = index.entries();
        assert_eq!(entries.len(), 15);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.chunk.name, format!("m{i}"));
            assert_eq!(entry.vector, vectors[i]);
        }
    }
}

#[test]
fn mutating_a_snapshot_does_not_touch_the_index() {
    for (index, vectors) in both_backends(5) {
        let mut snapshot = index.entries();
        snapshot[0].vector.iter_mut().for_each(|x| *x = 7.0);
        assert_eq!(index.entries()[0].vector, vectors[0]);
    }
}

#[test]
fn stats_totals_are_consistent() {
    for (index, _) in both_backends(20) {
        let stats = index.stats();
        assert_eq!(stats.total, 20);
        assert_eq!(stats.by_kind.values().sum::<usize>(), 20);
        assert_eq!(stats.file_count, 4);
        assert_eq!(stats.model_id, MODEL_ID);
        assert_eq!(stats.dimensions, DIMENSIONS);
    }
}

#[test]
fn search_returns_at_most_k_sorted_descending() {
    for (index, vectors) in both_backends(20) {
        let results = index.search(&vectors[3], 10).unwrap();
        assert!(results.len() <= 10);
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }

        // k larger than the corpus is capped at the corpus size.
        let all = index.search(&vectors[3], 500).unwrap();
        assert!(all.len() <= 20);
    }
}

#[test]
fn exact_query_ranks_its_own_chunk_first_on_brute_force() {
    let vectors = seeded_unit_vectors(20, 7);
    let mut index = create(config());
    for (i, vector) in vectors.iter().enumerate() {
        index
            .add(chunk(&format!("m{i}"), ChunkKind::Method, "f.java"), vector)
            .unwrap();
    }

    let results = index.search(&vectors[11], 5).unwrap();
    assert_eq!(results[0].chunk.name, "m11");
    assert!(results[0].similarity >= 1.0 - 1e-5);
    assert!(results[0].similarity <= 1.0); // the clamp caps float drift
}

#[test]
fn exact_query_reaches_top_five_on_graph() {
    let vectors = seeded_unit_vectors(20, 7);
    let mut index = create_hnsw_with_capacity(config(), 64);
    for (i, vector) in vectors.iter().enumerate() {
        index
            .add(chunk(&format!("m{i}"), ChunkKind::Method, "f.java"), vector)
            .unwrap();
    }

    let results = index.search(&vectors[11], 5).unwrap();
    assert!(results.iter().any(|r| r.chunk.name == "m11"));
}

#[test]
fn search_by_kind_returns_only_that_kind() {
    let vectors = seeded_unit_vectors(24, 5);
    let query = vectors[0].clone();
    let provider = Arc::new(move |_: &str| -> Result<Vec<f32>, ProviderError> {
        Ok(query.clone())
    });

    let mut backends: Vec<Box<dyn VectorIndex>> = vec![
        Box::new(create(config())),
        Box::new(create_hnsw_with_capacity(config(), 64)),
    ];
    for index in &mut backends {
        for (i, vector) in vectors.iter().enumerate() {
            let kind = if i % 3 == 0 { ChunkKind::Class } else { ChunkKind::Method };
            index
                .add(chunk(&format!("c{i}"), kind, "f.java"), vector)
                .unwrap();
        }
        index.set_embedding_provider(provider.clone());

        let results = index.search_by_kind("query", ChunkKind::Class, 4).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 4);
        assert!(results.iter().all(|r| r.chunk.kind == ChunkKind::Class));
    }
}

#[test]
fn top_k_ordering_holds_for_random_corpus() {
    // Scenario S6: every consecutive pair is non-increasing.
    for (index, _) in both_backends(20) {
        let query = seeded_unit_vectors(1, 999).remove(0);
        let results = index.search(&query, 10).unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }
}

#[test]
fn duplicates_only_groups_of_two_or_more() {
    for (index, _) in both_backends(20) {
        for group in index.find_duplicates(0.95) {
            assert!(group.count >= 2);
            assert_eq!(group.count, group.chunks.len());
        }
    }
}

#[test]
fn near_identical_vectors_form_a_duplicate_group() {
    let base = seeded_unit_vectors(1, 11).remove(0);
    let mut shifted = base.clone();
    shifted[0] += 0.0005;
    let shifted = normalized(&shifted);
    let fillers = seeded_unit_vectors(8, 77);

    let mut backends: Vec<Box<dyn VectorIndex>> = vec![
        Box::new(create(config())),
        Box::new(create_hnsw_with_capacity(config(), 32)),
    ];
    for index in &mut backends {
        index.add(chunk("dup-a", ChunkKind::Method, "a.java"), &base).unwrap();
        index.add(chunk("dup-b", ChunkKind::Method, "b.java"), &shifted).unwrap();
        for (i, filler) in fillers.iter().enumerate() {
            index
                .add(chunk(&format!("fill{i}"), ChunkKind::Method, "f.java"), filler)
                .unwrap();
        }

        let groups = index.find_duplicates(0.999);
        assert_eq!(groups.len(), 1, "backend {:?}", index.backend());
        let names: Vec<_> = groups[0].chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["dup-a", "dup-b"]);
    }
}

#[test]
fn anomalies_empty_below_five_chunks() {
    let vectors = seeded_unit_vectors(4, 3);
    let mut backends: Vec<Box<dyn VectorIndex>> = vec![
        Box::new(create(config())),
        Box::new(create_hnsw_with_capacity(config(), 16)),
    ];
    for index in &mut backends {
        for (i, vector) in vectors.iter().enumerate() {
            index
                .add(chunk(&format!("m{i}"), ChunkKind::Method, "f.java"), vector)
                .unwrap();
        }
        assert!(index.find_anomalies(0.99).is_empty());
    }
}

#[test]
fn orthogonal_outlier_is_anomalous() {
    // Cluster along axis 0, outlier along axis 90.
    let mut cluster = Vec::new();
    for i in 0..6 {
        let mut v = vec![0.0f32; DIMENSIONS];
        v[0] = 1.0;
        v[1] = i as f32 * 0.01;
        cluster.push(normalized(&v));
    }
    let mut outlier = vec![0.0f32; DIMENSIONS];
    outlier[90] = 1.0;

    let mut backends: Vec<Box<dyn VectorIndex>> = vec![
        Box::new(create(config())),
        Box::new(create_hnsw_with_capacity(config(), 16)),
    ];
    for index in &mut backends {
        for (i, vector) in cluster.iter().enumerate() {
            index
                .add(chunk(&format!("c{i}"), ChunkKind::Method, "f.java"), vector)
                .unwrap();
        }
        index.add(chunk("outlier", ChunkKind::Method, "o.java"), &outlier).unwrap();

        let anomalies = index.find_anomalies(0.5);
        assert_eq!(anomalies.len(), 1, "backend {:?}", index.backend());
        assert_eq!(anomalies[0].name, "outlier");
    }
}

#[test]
fn missing_provider_fails_loudly_on_both_backends() {
    for (index, _) in both_backends(3) {
        assert!(index.search_text("query", 3).is_err());
        assert!(index.search_by_kind("query", ChunkKind::Method, 3).is_err());
    }
}

#[test]
fn model_hash_is_stable_across_backends() {
    for (index, _) in both_backends(1) {
        assert_eq!(index.model_hash(), code_vectors::format::model_hash(MODEL_ID));
    }
}
