//! Hybrid lexical + structural retrieval over tool records.
//!
//! Three signals are combined with fixed weights:
//! - BM25 over name, description and tags, squashed into `[0, 1)`;
//! - Jaccard overlap between the query and record token sets;
//! - a name signal: `1.0` when the query contains the literal tool name,
//!   otherwise the IDF-weighted share of the name's tokens present in the
//!   query. A namespace prefix shared by every tool carries almost no IDF.
//!
//! Query verbs are expanded with their action synonyms (`put` also looks for
//! `insert`) at `synonym_weight`. Literal terms always weigh `1.0`.
//!
//! All per-term sums iterate in sorted term order so that scores are
//! bit-identical across runs and processes.

use crate::registry::{Registry, ToolRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "is", "it", "me", "my", "of",
    "on", "or", "please", "the", "this", "that", "to", "with",
];

/// Action verbs that name the same operation. Order is irrelevant.
const SYNONYMS: &[&[&str]] = &[
    &["insert", "add", "put", "place"],
    &["get", "read", "fetch", "retrieve", "show"],
    &["create", "make", "new"],
    &["set", "change", "apply"],
    &["delete", "remove", "erase"],
    &["find", "search", "locate"],
    &["export", "output"],
    &["open", "load"],
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalWeights {
    pub lexical_weight: f64,
    pub overlap_weight: f64,
    pub name_weight: f64,
    pub k1: f64,
    pub b: f64,
    /// BM25 value that maps to a lexical signal of 0.5.
    pub lexical_saturation: f64,
    /// Weight of a term reached only through [`SYNONYMS`].
    pub synonym_weight: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            lexical_weight: 0.5,
            overlap_weight: 0.2,
            name_weight: 0.3,
            k1: 1.5,
            b: 0.75,
            lexical_saturation: 2.0,
            synonym_weight: 0.8,
        }
    }
}

impl RetrievalWeights {
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("lexical_weight", self.lexical_weight),
            ("overlap_weight", self.overlap_weight),
            ("name_weight", self.name_weight),
            ("k1", self.k1),
            ("b", self.b),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("retrieval.{name} must be a non-negative number"));
            }
        }
        if self.b > 1.0 {
            return Err("retrieval.b must be within [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.synonym_weight) {
            return Err("retrieval.synonym_weight must be within [0, 1]".into());
        }
        if !self.lexical_saturation.is_finite() || self.lexical_saturation <= 0.0 {
            return Err("retrieval.lexical_saturation must be positive".into());
        }
        if self.lexical_weight + self.overlap_weight + self.name_weight <= 0.0 {
            return Err("at least one retrieval weight must be positive".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Query terms occur in the name, description or tags.
    Lexical,
    /// Some of the tool name's tokens occur in the query.
    NameTokens,
    /// The query contains the literal tool name.
    ExactName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalCandidate {
    pub tool_id: String,
    pub score: f64,
    pub matched_signals: BTreeSet<Signal>,
    /// Query terms, synonyms included, found in the record. Sorted.
    pub matched_terms: Vec<String>,
}

/// Descending score, then ascending `tool_id`.
pub fn rank_order(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.tool_id.cmp(&b.tool_id))
}

/// Lowercased alphanumeric runs, stopwords removed. `_` splits words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty() && !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Identifier-shaped words: `_` joins, anything else non-alphanumeric splits,
/// so `hwp_insert_text/hwp_get_text` yields both names.
fn identifier_words(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Literal terms at `1.0`, plus synonyms not already present at `weight`.
fn expand_terms(terms: &BTreeSet<String>, weight: f64) -> BTreeMap<String, f64> {
    let mut expanded: BTreeMap<String, f64> =
        terms.iter().map(|term| (term.clone(), 1.0)).collect();
    if weight <= 0.0 {
        return expanded;
    }
    for term in terms {
        let Some(group) = SYNONYMS.iter().find(|group| group.contains(&term.as_str())) else {
            continue;
        };
        for synonym in group.iter() {
            expanded.entry((*synonym).to_string()).or_insert(weight);
        }
    }
    expanded
}

#[derive(Debug, Clone)]
struct IndexedTool {
    tool_id: String,
    name: String,
    term_frequency: BTreeMap<String, u32>,
    length: usize,
    name_tokens: BTreeSet<String>,
}

/// Corpus statistics for one registry snapshot.
#[derive(Debug, Clone)]
pub struct RetrievalIndex {
    tools: Vec<IndexedTool>,
    idf: BTreeMap<String, f64>,
    average_length: f64,
    weights: RetrievalWeights,
}

impl RetrievalIndex {
    pub fn new(registry: &Registry, weights: RetrievalWeights) -> Self {
        Self::from_records(registry.records(), weights)
    }

    pub fn from_records(records: &[ToolRecord], weights: RetrievalWeights) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        let mut tools = Vec::with_capacity(records.len());

        for record in records {
            let tokens = tokenize(&record.search_text());
            let mut term_frequency = BTreeMap::new();
            for token in &tokens {
                *term_frequency.entry(token.clone()).or_insert(0u32) += 1;
            }
            for term in term_frequency.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
            tools.push(IndexedTool {
                tool_id: record.tool_id.clone(),
                name: record.name.to_lowercase(),
                length: tokens.len(),
                term_frequency,
                name_tokens: tokenize(&record.name).into_iter().collect(),
            });
        }

        let total = tools.len().max(1) as f64;
        let idf = document_frequency
            .into_iter()
            .map(|(term, count)| {
                let count = count as f64;
                (term, (1.0 + (total - count + 0.5) / (count + 0.5)).ln())
            })
            .collect();
        let total_length: usize = tools.iter().map(|tool| tool.length).sum();
        let average_length = if tools.is_empty() {
            1.0
        } else {
            (total_length as f64 / tools.len() as f64).max(1.0)
        };

        Self {
            tools,
            idf,
            average_length,
            weights,
        }
    }

    /// Every tool with non-zero relevance, best first.
    pub fn score(&self, query: &str) -> Vec<RetrievalCandidate> {
        let query_terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        let query_words = identifier_words(query);
        if query_terms.is_empty() && query_words.is_empty() {
            return Vec::new();
        }
        let expanded = expand_terms(&query_terms, self.weights.synonym_weight);

        let mut candidates: Vec<RetrievalCandidate> = self
            .tools
            .iter()
            .filter_map(|tool| self.score_tool(tool, &query_terms, &expanded, &query_words))
            .collect();
        candidates.sort_by(rank_order);
        candidates
    }

    fn idf(&self, term: &str) -> f64 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    fn score_tool(
        &self,
        tool: &IndexedTool,
        query_terms: &BTreeSet<String>,
        expanded: &BTreeMap<String, f64>,
        query_words: &BTreeSet<String>,
    ) -> Option<RetrievalCandidate> {
        let weights = &self.weights;
        let mut matched_terms = Vec::new();
        let mut bm25 = 0.0;
        for (term, term_weight) in expanded {
            let Some(&frequency) = tool.term_frequency.get(term) else {
                continue;
            };
            matched_terms.push(term.clone());
            let frequency = f64::from(frequency);
            let length_ratio = tool.length as f64 / self.average_length;
            let denominator =
                frequency + weights.k1 * (1.0 - weights.b + weights.b * length_ratio);
            bm25 += term_weight * self.idf(term) * (frequency * (weights.k1 + 1.0)) / denominator;
        }
        let lexical = bm25 / (bm25 + weights.lexical_saturation);

        // Overlap counts literal query terms only.
        let literal_matches = matched_terms
            .iter()
            .filter(|term| query_terms.contains(*term))
            .count();
        let union = query_terms.len() + tool.term_frequency.len() - literal_matches;
        let overlap = if union == 0 {
            0.0
        } else {
            literal_matches as f64 / union as f64
        };

        let exact_name = query_words.contains(&tool.name);
        let mut name_hits = 0usize;
        let mut name_mass = 0.0;
        let mut hit_mass = 0.0;
        for token in &tool.name_tokens {
            let idf = self.idf(token);
            name_mass += idf;
            if let Some(term_weight) = expanded.get(token) {
                name_hits += 1;
                hit_mass += term_weight * idf;
            }
        }
        let name = if exact_name {
            1.0
        } else if name_mass > 0.0 {
            hit_mass / name_mass
        } else {
            0.0
        };

        let score = weights.lexical_weight * lexical
            + weights.overlap_weight * overlap
            + weights.name_weight * name;
        if score <= 0.0 {
            return None;
        }

        let mut matched_signals = BTreeSet::new();
        if !matched_terms.is_empty() {
            matched_signals.insert(Signal::Lexical);
        }
        if name_hits > 0 {
            matched_signals.insert(Signal::NameTokens);
        }
        if exact_name {
            matched_signals.insert(Signal::ExactName);
        }

        Some(RetrievalCandidate {
            tool_id: tool.tool_id.clone(),
            score,
            matched_signals,
            matched_terms,
        })
    }
}
