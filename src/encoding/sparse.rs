/// BM25 sparse encoder
///
/// Fitted once over the catalog description corpus. The vocabulary is the sorted set
/// of distinct tokens, so term indices depend only on the corpus content, not on
/// document order or hash state.
///
/// BM25 is split across the two sides of the inner product:
/// - document side: tf·(k1+1) / (tf + k1·(1 - b + b·dl/avgdl))
/// - query side:    idf(t) = ln(N - df + 0.5) - ln(df + 0.5)
///
/// Negative idf values (terms in more than half the corpus) are replaced by
/// `epsilon * mean_idf`, keeping every vocabulary term positively weighted.

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use super::{EncodingError, SparseVector};
use crate::config::SparseConfig;

/// Which BM25 side `SparseEncoder::embed` produces for query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryWeighting {
    /// Document-side tf saturation weights (how the deployed catalog bot encodes queries)
    Document,
    /// Query-side idf weights
    Idf,
}

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "above", "after", "again", "all", "am", "an", "and", "any", "are", "as",
        "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
        "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
        "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
        "him", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
        "more", "most", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
        "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should", "so",
        "some", "such", "than", "that", "the", "their", "theirs", "them", "then", "there",
        "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
        "very", "was", "we", "were", "what", "when", "where", "which", "while", "who",
        "whom", "why", "will", "with", "you", "your", "yours",
    ]
    .into_iter()
    .collect()
});

static STEMMER: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::English));

/// Lowercase, split on non-alphanumeric, drop stop words and single characters,
/// then reduce each token to its English stem.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(*t))
        .map(|t| STEMMER.stem(t).into_owned())
        .collect()
}

/// Corpus-fitted BM25 encoder. Immutable after [`SparseEncoder::fit`].
#[derive(Debug, Clone)]
pub struct SparseEncoder {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    avgdl: f32,
    k1: f32,
    b: f32,
    weighting: QueryWeighting,
}

impl SparseEncoder {
    /// Fit term statistics over the full description corpus.
    ///
    /// Fails with [`EncodingError::EmptyCorpus`] when there are no documents.
    pub fn fit<S: AsRef<str>>(corpus: &[S], config: &SparseConfig) -> Result<Self, EncodingError> {
        if corpus.is_empty() {
            return Err(EncodingError::EmptyCorpus);
        }

        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_len = 0usize;
        for doc in corpus {
            let tokens = tokenize(doc.as_ref());
            total_len += tokens.len();
            let distinct: HashSet<String> = tokens.into_iter().collect();
            for term in distinct {
                *doc_freq.entry(term).or_default() += 1;
            }
        }

        let n = corpus.len() as f32;
        let raw_idf: Vec<f32> = doc_freq
            .values()
            .map(|&df| {
                let df = df as f32;
                (n - df + 0.5).ln() - (df + 0.5).ln()
            })
            .collect();

        let mean_idf = if raw_idf.is_empty() {
            0.0
        } else {
            raw_idf.iter().sum::<f32>() / raw_idf.len() as f32
        };
        let floor = match config.epsilon * mean_idf {
            f if f > 0.0 => f,
            _ => config.epsilon,
        };
        let idf = raw_idf
            .into_iter()
            .map(|v| if v < 0.0 { floor } else { v })
            .collect();

        let vocabulary = doc_freq
            .into_keys()
            .enumerate()
            .map(|(i, term)| (term, i as u32))
            .collect::<HashMap<_, _>>();

        let encoder = SparseEncoder {
            avgdl: total_len as f32 / n,
            vocabulary,
            idf,
            k1: config.k1,
            b: config.b,
            weighting: config.query_weighting,
        };

        tracing::info!(
            documents = corpus.len(),
            vocabulary = encoder.dimension(),
            avgdl = encoder.avgdl,
            "BM25 sparse encoder fitted"
        );

        Ok(encoder)
    }

    /// Encode query text using the configured weighting.
    ///
    /// Out-of-vocabulary terms are ignored; blank text yields an empty vector.
    pub fn embed(&self, text: &str) -> SparseVector {
        match self.weighting {
            QueryWeighting::Document => self.embed_document(text),
            QueryWeighting::Idf => self.embed_query(text),
        }
    }

    /// Document-side weights (tf saturation with length normalization).
    pub fn embed_document(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let dl = tokens.len() as f32;
        let length_norm = if self.avgdl > 0.0 { dl / self.avgdl } else { 0.0 };

        let mut tf: HashMap<u32, f32> = HashMap::new();
        for token in &tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *tf.entry(idx).or_default() += 1.0;
            }
        }

        let entries = tf.into_iter().map(|(idx, tf)| {
            let weight =
                tf * (self.k1 + 1.0) / (tf + self.k1 * (1.0 - self.b + self.b * length_norm));
            (idx, weight)
        });
        SparseVector::new(self.dimension(), entries)
    }

    /// Query-side weights: the idf of each distinct in-vocabulary term.
    pub fn embed_query(&self, text: &str) -> SparseVector {
        let distinct: HashSet<u32> = tokenize(text)
            .iter()
            .filter_map(|t| self.vocabulary.get(t).copied())
            .collect();
        let entries = distinct.into_iter().map(|idx| (idx, self.idf[idx as usize]));
        SparseVector::new(self.dimension(), entries)
    }

    /// Vocabulary size, i.e. the dimension of every produced vector.
    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    pub fn term_index(&self, term: &str) -> Option<u32> {
        self.vocabulary.get(term).copied()
    }
}
