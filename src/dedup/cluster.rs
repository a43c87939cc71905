//! Similarity clustering of candidate questions.
//!
//! Candidates whose question embeddings have cosine similarity at or above the
//! threshold are unioned in a disjoint-set forest; the resulting roots define
//! the equivalence classes. Membership is therefore transitive even when the
//! measured similarity is not.

/// Similarity at or above which two questions are treated as the same question.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.95;

/// Flat-array union-find with path compression.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    /// Creates `n` singleton sets `{0}, {1}, …, {n-1}`.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    /// Returns the root of `x`, pointing every node on the path directly at it.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merges the sets of `x` and `y`; the root of `x` becomes the root of both.
    ///
    /// Returns `false` if they were already in the same set.
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return false;
        }
        self.parent[root_y] = root_x;
        true
    }
}

/// Cosine similarity of two vectors.
///
/// Vectors of different length, or with zero norm, have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Partitions embedded items into equivalence classes by similarity threshold.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityClusterer {
    threshold: f32,
}

impl Default for SimilarityClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl SimilarityClusterer {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Partitions the indices `0..embeddings.len()` into disjoint classes.
    ///
    /// Every unordered pair is compared once, O(n²). Classes are ordered by
    /// their smallest member and members are ascending, so the output depends
    /// only on the input order.
    pub fn partition(&self, embeddings: &[Vec<f32>]) -> Vec<Vec<usize>> {
        let n = embeddings.len();
        let mut sets = DisjointSet::new(n);

        for i in 0..n {
            for j in (i + 1)..n {
                if cosine_similarity(&embeddings[i], &embeddings[j]) >= self.threshold {
                    sets.union(i, j);
                }
            }
        }

        let mut classes: Vec<Vec<usize>> = Vec::new();
        let mut class_of_root: Vec<Option<usize>> = vec![None; n];
        for i in 0..n {
            let root = sets.find(i);
            match class_of_root[root] {
                Some(class) => classes[class].push(i),
                None => {
                    class_of_root[root] = Some(classes.len());
                    classes.push(vec![i]);
                }
            }
        }
        classes
    }
}
