//! A full-text inverted index scored with BM25, adapted from the teacher's
//! `rag/search.rs::Bm25Index`. Candidate selection differs from the teacher
//! on purpose: the teacher unions documents containing *any* query term;
//! this index requires *all* terms (AND-of-terms), matching the retriever
//! contract's "tokenize query into an AND-of-terms expression".

use std::collections::{HashMap, HashSet};

const K1: f32 = 1.2;
const B: f32 = 0.75;

#[derive(Default)]
pub struct FulltextIndex {
    documents: HashMap<String, Vec<String>>,
    document_frequencies: HashMap<String, usize>,
    inverted_index: HashMap<String, HashSet<String>>,
    doc_count: usize,
    avg_doc_length: f32,
}

impl FulltextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty() && s.len() > 1)
            .map(String::from)
            .collect()
    }

    pub fn add_document(&mut self, id: &str, content: &str) {
        let tokens = Self::tokenize(content);
        let unique_terms: HashSet<_> = tokens.iter().cloned().collect();
        for term in &unique_terms {
            *self.document_frequencies.entry(term.clone()).or_insert(0) += 1;
            self.inverted_index.entry(term.clone()).or_default().insert(id.to_string());
        }
        self.documents.insert(id.to_string(), tokens);
        self.doc_count += 1;
        let total_tokens: usize = self.documents.values().map(|v| v.len()).sum();
        self.avg_doc_length = total_tokens as f32 / self.doc_count as f32;
    }

    pub fn remove_document(&mut self, id: &str) {
        if let Some(tokens) = self.documents.remove(id) {
            let unique_terms: HashSet<_> = tokens.into_iter().collect();
            for term in unique_terms {
                if let Some(df) = self.document_frequencies.get_mut(&term) {
                    *df = df.saturating_sub(1);
                    if *df == 0 {
                        self.document_frequencies.remove(&term);
                    }
                }
                if let Some(docs) = self.inverted_index.get_mut(&term) {
                    docs.remove(id);
                    if docs.is_empty() {
                        self.inverted_index.remove(&term);
                    }
                }
            }
            self.doc_count = self.doc_count.saturating_sub(1);
            self.avg_doc_length = if self.doc_count > 0 {
                self.documents.values().map(|v| v.len()).sum::<usize>() as f32 / self.doc_count as f32
            } else {
                0.0
            };
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.document_frequencies.get(term).copied().unwrap_or(0) as f32;
        let n = self.doc_count as f32;
        if df == 0.0 || n == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_document(&self, doc_id: &str, query_terms: &[String]) -> f32 {
        let doc_tokens = match self.documents.get(doc_id) {
            Some(tokens) => tokens,
            None => return 0.0,
        };
        let doc_len = doc_tokens.len() as f32;
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for token in doc_tokens {
            *term_freq.entry(token.as_str()).or_insert(0) += 1;
        }
        let mut score = 0.0;
        for term in query_terms {
            let tf = term_freq.get(term.as_str()).copied().unwrap_or(0) as f32;
            let idf = self.idf(term);
            let numerator = tf * (K1 + 1.0);
            let denominator = tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_length.max(1.0));
            score += idf * numerator / denominator;
        }
        score
    }

    /// AND-of-terms candidate selection: a document must contain every
    /// query term to be scored at all.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let query_terms = Self::tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut candidates: Option<HashSet<String>> = None;
        for term in &query_terms {
            let docs = self.inverted_index.get(term).cloned().unwrap_or_default();
            candidates = Some(match candidates {
                Some(current) => current.intersection(&docs).cloned().collect(),
                None => docs,
            });
            if candidates.as_ref().map(|c| c.is_empty()).unwrap_or(true) {
                return Vec::new();
            }
        }

        let mut results: Vec<(String, f32)> = candidates
            .unwrap_or_default()
            .into_iter()
            .map(|id| {
                let score = self.score_document(&id, &query_terms);
                (id, score)
            })
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_all_query_terms_present() {
        let mut index = FulltextIndex::new();
        index.add_document("a", "rust programming language");
        index.add_document("b", "rust is fast");
        index.add_document("c", "python programming language");

        let results = index.search("rust programming", 10);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn empty_query_yields_no_results() {
        let mut index = FulltextIndex::new();
        index.add_document("a", "hello world");
        assert!(index.search("", 10).is_empty());
    }

    #[test]
    fn remove_document_drops_it_from_results() {
        let mut index = FulltextIndex::new();
        index.add_document("a", "rust programming");
        index.remove_document("a");
        assert!(index.search("rust", 10).is_empty());
    }
}
