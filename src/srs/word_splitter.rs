//! 句子拆词：从文献例句中提取候选生词，供前端点选。
//!
//! 支持连字符词（state-of-the-art）、带撇号的词（researcher's）
//! 以及字母后接数字的术语（COVID19）。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::constants::{MAX_SPLIT_WORD_LEN, MIN_SPLIT_WORD_LEN};

// ASCII 词边界：中文紧挨英文时也要能切开
const WORD_PATTERN: &str = r"(?-u:\b)[a-zA-Z]+(?:-[a-zA-Z]+)*'[a-zA-Z]+(?-u:\b)|(?-u:\b)[a-zA-Z]+(?:-[a-zA-Z]+)+(?-u:\b)|(?-u:\b)[a-zA-Z]+[0-9]+(?-u:\b)|(?-u:\b)[a-zA-Z]{2,}(?-u:\b)";

const STOPWORDS: &[&str] = &[
    // articles
    "a", "an", "the",
    // pronouns
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your",
    "his", "its", "our", "their", "this", "that", "these", "those", "who", "which", "what",
    "where", "when", "why", "how",
    // prepositions
    "in", "on", "at", "by", "for", "with", "from", "to", "of", "as", "into", "through", "during",
    "before", "after", "above", "below", "between", "under", "again", "further", "then", "once",
    // conjunctions
    "and", "but", "or", "nor", "so", "yet",
    // auxiliaries
    "is", "am", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "can", "could", "should", "may", "might", "must",
    // adverbs
    "not", "no", "yes", "here", "there", "now", "just", "also", "very", "well", "too", "only",
    "even",
    // quantifiers and misc
    "all", "any", "each", "every", "both", "few", "more", "most", "other", "some", "such", "own",
    "same", "than", "about", "against", "along", "among", "around", "because",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(WORD_PATTERN).expect("word pattern is valid"))
}

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SplitOptions {
    pub filter_stopwords: bool,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            filter_stopwords: true,
            min_length: MIN_SPLIT_WORD_LEN,
            max_length: MAX_SPLIT_WORD_LEN,
        }
    }
}

pub fn is_stopword(word: &str) -> bool {
    stopwords().contains(word.to_ascii_lowercase().as_str())
}

pub fn split_sentence(sentence: &str, options: &SplitOptions) -> Vec<String> {
    if sentence.trim().is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut words = Vec::new();

    for m in word_regex().find_iter(sentence) {
        let word = m.as_str();
        let len = word.chars().count();
        if len < options.min_length || len > options.max_length {
            continue;
        }
        if options.filter_stopwords && is_stopword(word) {
            continue;
        }
        if word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        // 去重但保留首次出现的顺序（区分大小写）
        if seen.insert(word) {
            words.push(word.to_string());
        }
    }

    words
}
