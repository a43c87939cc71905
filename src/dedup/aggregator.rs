//! Chunk-level aggregation of candidates from several generator models.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::models::{
    CandidateTriplet, CanonicalBlock, CanonicalTriplet, DocumentId, GeneratedBlock, QuestionType,
};
use crate::ollama::OllamaClientTrait;

use super::cluster::SimilarityClusterer;
use super::selector::select_representative;

/// All candidates for one chunk of one document under one question type.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkGroup {
    pub chunk: String,
    pub question_type: QuestionType,
    pub document_id: DocumentId,
    pub candidates: Vec<CandidateTriplet>,
}

/// Counters accumulated while canonicalising chunk groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub chunks: usize,
    pub candidates: usize,
    pub rejected_items: usize,
    pub classes: usize,
    pub embedding_failures: usize,
}

impl AggregationStats {
    pub fn absorb(&mut self, other: AggregationStats) {
        self.chunks += other.chunks;
        self.candidates += other.candidates;
        self.rejected_items += other.rejected_items;
        self.classes += other.classes;
        self.embedding_failures += other.embedding_failures;
    }
}

/// Groups the blocks of several model files by exact chunk text.
///
/// `sources` pairs each model identifier with the blocks read from that
/// model's file. Groups come back sorted lexicographically by chunk text,
/// which is also their block index. Chunk metadata is taken from the first
/// block seen for that chunk. Chunk texts are compared byte for byte: two
/// chunks differing only in whitespace form two groups.
pub fn group_by_chunk<'a, I>(sources: I, stats: &mut AggregationStats) -> Vec<ChunkGroup>
where
    I: IntoIterator<Item = (&'a str, Vec<GeneratedBlock>)>,
{
    let mut groups: BTreeMap<String, ChunkGroup> = BTreeMap::new();

    for (model, blocks) in sources {
        for block in blocks {
            let group = groups
                .entry(block.chunk.clone())
                .or_insert_with(|| ChunkGroup {
                    chunk: block.chunk.clone(),
                    question_type: block.question_type,
                    document_id: block.document_id,
                    candidates: Vec::new(),
                });

            for item in &block.response {
                match CandidateTriplet::from_item(item, model) {
                    Some(candidate) => group.candidates.push(candidate),
                    None => stats.rejected_items += 1,
                }
            }
        }
    }

    groups.into_values().collect()
}

/// Runs similarity clustering and representative selection over chunk groups.
pub struct ChunkAggregator<'a> {
    client: &'a dyn OllamaClientTrait,
    embedding_model: &'a str,
    clusterer: SimilarityClusterer,
}

impl<'a> ChunkAggregator<'a> {
    pub fn new(
        client: &'a dyn OllamaClientTrait,
        embedding_model: &'a str,
        clusterer: SimilarityClusterer,
    ) -> Self {
        Self {
            client,
            embedding_model,
            clusterer,
        }
    }

    /// Canonicalises every group, numbering blocks in group order.
    pub fn aggregate(&self, groups: &[ChunkGroup], stats: &mut AggregationStats) -> Vec<CanonicalBlock> {
        groups
            .iter()
            .enumerate()
            .map(|(block_index, group)| CanonicalBlock {
                block_index,
                chunk: group.chunk.clone(),
                question_type: group.question_type,
                document_id: group.document_id,
                result: self.canonicalize(group, stats),
            })
            .collect()
    }

    /// Produces one canonical triplet per equivalence class of the group.
    ///
    /// Candidates whose question cannot be embedded are left out of this
    /// chunk; the rest of the chunk is still processed.
    pub fn canonicalize(&self, group: &ChunkGroup, stats: &mut AggregationStats) -> Vec<CanonicalTriplet> {
        stats.chunks += 1;
        stats.candidates += group.candidates.len();

        let mut embedded: Vec<&CandidateTriplet> = Vec::with_capacity(group.candidates.len());
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(group.candidates.len());
        for candidate in &group.candidates {
            match self.client.embed(self.embedding_model, &candidate.question) {
                Ok(vector) => {
                    embedded.push(candidate);
                    embeddings.push(vector);
                }
                Err(e) => {
                    stats.embedding_failures += 1;
                    warn!(
                        document_id = %group.document_id,
                        model = %candidate.model,
                        error = %e,
                        "embedding failed; candidate excluded from clustering"
                    );
                }
            }
        }

        let classes = self.clusterer.partition(&embeddings);
        debug!(
            document_id = %group.document_id,
            candidates = embedded.len(),
            classes = classes.len(),
            "clustered chunk"
        );

        let canonical: Vec<CanonicalTriplet> = classes
            .iter()
            .filter_map(|members| {
                let class: Vec<&CandidateTriplet> = members.iter().map(|&i| embedded[i]).collect();
                select_representative(&class)
            })
            .collect();
        stats.classes += canonical.len();
        canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::models::{Metric, QaItem};
    use crate::ollama::{CompletionRequest, OllamaError};

    struct MockEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockEmbedder {
        fn new(vectors: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: vectors
                    .iter()
                    .map(|(q, v)| (q.to_string(), v.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl OllamaClientTrait for MockEmbedder {
        fn generate(&self, _request: &CompletionRequest) -> Result<String, OllamaError> {
            Err(OllamaError::Api {
                message: "not used".to_string(),
            })
        }

        fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, OllamaError> {
            self.calls.lock().unwrap().push(text.to_string());
            self.vectors
                .get(text)
                .cloned()
                .ok_or(OllamaError::Http { status: 500 })
        }
    }

    fn scored_item(question: &str, scores: [f64; 5]) -> QaItem {
        let mut item = QaItem::new(question, format!("answer to {question}"), "ctx", Vec::new());
        for (metric, score) in Metric::ALL.into_iter().zip(scores) {
            item.set_score(metric, score);
        }
        item
    }

    fn block(chunk: &str, items: Vec<QaItem>) -> GeneratedBlock {
        GeneratedBlock {
            chunk: chunk.to_string(),
            response: items,
            question_type: QuestionType::YesNo,
            document_id: DocumentId::new(7),
            llm: None,
        }
    }

    #[test]
    fn group_by_chunk_merges_models_and_sorts_chunks() {
        let mut stats = AggregationStats::default();
        let groups = group_by_chunk(
            vec![
                ("mixtral", vec![block("b chunk", vec![scored_item("q1", [1.0; 5])])]),
                (
                    "llama3.3",
                    vec![
                        block("a chunk", vec![scored_item("q2", [1.0; 5])]),
                        block("b chunk", vec![scored_item("q3", [1.0; 5])]),
                    ],
                ),
            ],
            &mut stats,
        );

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].chunk, "a chunk");
        assert_eq!(groups[1].chunk, "b chunk");
        let models: Vec<&str> = groups[1].candidates.iter().map(|c| c.model.as_str()).collect();
        assert_eq!(models, vec!["mixtral", "llama3.3"]);
    }

    #[test]
    fn group_by_chunk_uses_exact_text_and_drops_invalid_items() {
        let mut stats = AggregationStats::default();
        let invalid = QaItem::new("q", "", "ctx", Vec::new());
        let groups = group_by_chunk(
            vec![(
                "mixtral",
                vec![
                    block("chunk", vec![scored_item("q1", [1.0; 5]), invalid]),
                    block("chunk ", vec![scored_item("q2", [1.0; 5])]),
                ],
            )],
            &mut stats,
        );

        assert_eq!(groups.len(), 2);
        assert_eq!(stats.rejected_items, 1);
        assert_eq!(groups[0].candidates.len(), 1);
    }

    #[test]
    fn canonicalize_merges_near_duplicates_across_models() {
        let client = MockEmbedder::new(&[
            ("Is net metering available?", vec![1.0, 0.0]),
            ("Is net metering offered?", vec![0.97, 0.243]),
            ("When does the rule take effect?", vec![0.4, 0.9165]),
        ]);
        let mut stats = AggregationStats::default();
        let groups = group_by_chunk(
            vec![
                (
                    "gemma3:27b",
                    vec![block(
                        "chunk",
                        vec![scored_item("Is net metering available?", [8.0, 7.0, 9.0, 8.0, 9.0])],
                    )],
                ),
                (
                    "yi:34b",
                    vec![block(
                        "chunk",
                        vec![
                            scored_item("Is net metering offered?", [9.0, 9.0, 8.0, 5.0, 6.0]),
                            scored_item("When does the rule take effect?", [5.0, 5.0, 5.0, 8.0, 8.0]),
                        ],
                    )],
                ),
            ],
            &mut stats,
        );

        let aggregator = ChunkAggregator::new(&client, "llama3", SimilarityClusterer::new(0.95));
        let blocks = aggregator.aggregate(&groups, &mut stats);

        assert_eq!(blocks.len(), 1);
        let result = &blocks[0].result;
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].question, "Is net metering available?");
        assert_eq!(result[0].answer, "answer to Is net metering offered?");
        assert_eq!(result[0].model, "yi:34b");
        assert_eq!(result[1].question, "When does the rule take effect?");
        assert_eq!(stats.classes, 2);
        assert_eq!(stats.candidates, 3);
    }

    #[test]
    fn embedding_failure_excludes_only_that_candidate() {
        let client = MockEmbedder::new(&[("known", vec![1.0, 0.0])]);
        let group = ChunkGroup {
            chunk: "chunk".to_string(),
            question_type: QuestionType::Factual,
            document_id: DocumentId::new(1),
            candidates: vec![
                CandidateTriplet::from_item(&scored_item("unknown", [9.0; 5]), "m").unwrap(),
                CandidateTriplet::from_item(&scored_item("known", [1.0; 5]), "m").unwrap(),
            ],
        };

        let mut stats = AggregationStats::default();
        let aggregator = ChunkAggregator::new(&client, "llama3", SimilarityClusterer::default());
        let result = aggregator.canonicalize(&group, &mut stats);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].question, "known");
        assert_eq!(stats.embedding_failures, 1);
        assert_eq!(client.calls.lock().unwrap().len(), 2);
    }
}
