// ---------------------------------------------------------------------------
// Text utilities: tokenizer, title overlap scores, TF-IDF vectorizer
// ---------------------------------------------------------------------------
//
// Pure functions over course titles. The TF-IDF vocabulary is fitted once on
// the catalog and stored alphabetically so lookups are a binary search and
// the serialized form is stable.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::cosine::normalize_l2;

// ---------------------------------------------------------------------------
// Stop words
// ---------------------------------------------------------------------------

const STOP_WORDS: &[&str] = &[
	"a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
	"been", "being", "between", "both", "but", "by", "can", "could", "do", "does", "each",
	"for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "into",
	"is", "it", "its", "me", "more", "most", "my", "no", "not", "of", "on", "one", "only",
	"or", "other", "our", "out", "over", "own", "she", "so", "some", "such", "than", "that",
	"the", "their", "them", "then", "there", "these", "they", "this", "those", "through",
	"to", "too", "under", "up", "very", "was", "we", "were", "what", "when", "where",
	"which", "while", "who", "why", "will", "with", "would", "you", "your",
];

pub fn is_stop_word(token: &str) -> bool {
	STOP_WORDS.binary_search(&token).is_ok()
}

// ---------------------------------------------------------------------------
// Tokenizing
// ---------------------------------------------------------------------------

/// Lowercase, replace punctuation with spaces, split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
	text.to_lowercase()
		.chars()
		.map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
		.collect::<String>()
		.split_whitespace()
		.map(|t| t.to_string())
		.collect()
}

/// Tokens that carry meaning: two or more characters, not a stop word.
pub fn content_tokens(text: &str) -> Vec<String> {
	tokenize(text)
		.into_iter()
		.filter(|t| t.chars().count() >= 2 && !is_stop_word(t))
		.collect()
}

fn token_set(text: &str) -> HashSet<String> {
	let content: HashSet<String> = content_tokens(text).into_iter().collect();
	if content.is_empty() {
		tokenize(text).into_iter().collect()
	} else {
		content
	}
}

/// Jaccard index of the two texts' token sets. Returns a value in [0, 1].
pub fn token_overlap_score(a: &str, b: &str) -> f64 {
	let tokens_a = token_set(a);
	let tokens_b = token_set(b);

	if tokens_a.is_empty() && tokens_b.is_empty() {
		return 1.0;
	}
	if tokens_a.is_empty() || tokens_b.is_empty() {
		return 0.0;
	}

	let intersection = tokens_a.intersection(&tokens_b).count();
	let union = tokens_a.union(&tokens_b).count();

	intersection as f64 / union as f64
}

/// Share of `query` tokens that also occur in `candidate`. Returns a value in
/// [0, 1]; 0 when the query has no tokens.
pub fn token_coverage(query: &str, candidate: &str) -> f64 {
	let query_tokens = token_set(query);
	if query_tokens.is_empty() {
		return 0.0;
	}
	let candidate_tokens: HashSet<String> = tokenize(candidate).into_iter().collect();
	let covered = query_tokens
		.iter()
		.filter(|t| candidate_tokens.contains(*t))
		.count();
	covered as f64 / query_tokens.len() as f64
}

// ---------------------------------------------------------------------------
// TF-IDF
// ---------------------------------------------------------------------------

/// Fitted TF-IDF transform over titles.
///
/// `vocabulary` is sorted; `idf[i]` is the weight of `vocabulary[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
	vocabulary: Vec<String>,
	idf: Vec<f64>,
}

impl TfIdfVectorizer {
	/// Fit on a corpus. Keeps the `max_features` most frequent terms (ties
	/// alphabetical) and uses smoothed IDF: `ln((1 + n) / (1 + df)) + 1`.
	pub fn fit<S: AsRef<str>>(documents: &[S], max_features: usize) -> Self {
		let n = documents.len() as f64;
		let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
		let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();

		for doc in documents {
			let tokens = content_tokens(doc.as_ref());
			let unique: BTreeSet<&String> = tokens.iter().collect();
			for term in unique {
				*doc_freq.entry(term.clone()).or_insert(0) += 1;
			}
			for term in tokens {
				*term_counts.entry(term).or_insert(0) += 1;
			}
		}

		let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
		// BTreeMap iteration is alphabetical and the sort is stable, so ties
		// stay alphabetical.
		ranked.sort_by(|a, b| b.1.cmp(&a.1));
		ranked.truncate(max_features);

		let mut vocabulary: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
		vocabulary.sort();

		let idf = vocabulary
			.iter()
			.map(|term| {
				let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
				((1.0 + n) / (1.0 + df)).ln() + 1.0
			})
			.collect();

		Self { vocabulary, idf }
	}

	/// True when the vocabulary is sorted and unique and every term has a
	/// finite weight. Checked after loading a persisted artifact.
	pub fn is_consistent(&self) -> bool {
		self.vocabulary.windows(2).all(|w| w[0] < w[1])
			&& self.vocabulary.len() == self.idf.len()
			&& self.idf.iter().all(|w| w.is_finite())
	}

	pub fn dim(&self) -> usize {
		self.vocabulary.len()
	}

	pub fn vocabulary(&self) -> &[String] {
		&self.vocabulary
	}

	pub fn idf(&self) -> &[f64] {
		&self.idf
	}

	/// L2-normalized TF-IDF vector for `text`. Terms outside the fitted
	/// vocabulary are ignored.
	pub fn transform(&self, text: &str) -> Vec<f64> {
		let mut vector = vec![0.0; self.vocabulary.len()];
		if vector.is_empty() {
			return vector;
		}
		for token in content_tokens(text) {
			if let Ok(idx) = self.vocabulary.binary_search(&token) {
				vector[idx] += self.idf[idx];
			}
		}
		normalize_l2(&mut vector);
		vector
	}
}
