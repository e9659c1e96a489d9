//! Similarity primitives
//!
//! Pure functions shared by the cleanup passes and the store's search path.

/// Cosine similarity of two vectors, in [-1, 1].
///
/// Returns 0.0 ("not similar") when either vector has zero magnitude or the
/// lengths differ. Corpora built up under changing embedding models carry
/// mixed dimensionalities; those records must be skipped, not crashed on.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Greedy single-link clustering over input order.
///
/// For each unvisited item a new group is started; any unvisited item whose
/// similarity to *any* current member reaches `threshold` joins it, repeated
/// until the group stops growing. Deterministic for a fixed input order.
/// Only groups of size >= 2 are returned (a singleton is not a duplicate);
/// results are index groups into `items`.
pub fn group_by_similarity<T, F>(items: &[T], threshold: f32, similarity: F) -> Vec<Vec<usize>>
where
    F: Fn(&T, &T) -> f32,
{
    let mut visited = vec![false; items.len()];
    let mut groups = Vec::new();

    for i in 0..items.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut group = vec![i];

        let mut grew = true;
        while grew {
            grew = false;
            for j in 0..items.len() {
                if visited[j] {
                    continue;
                }
                if group
                    .iter()
                    .any(|&m| similarity(&items[m], &items[j]) >= threshold)
                {
                    visited[j] = true;
                    group.push(j);
                    grew = true;
                }
            }
        }

        if group.len() >= 2 {
            groups.push(group);
        }
    }

    groups
}
