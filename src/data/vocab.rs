use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::corpus::{Case, Sentence};
use crate::error::PasaError;
use crate::io::{read_json_gz, write_json_gz};

pub const PAD: &str = "<PAD>";
pub const UNK: &str = "<UNK>";

pub const NA: &str = "NA";
pub const GA: &str = "GA";
pub const O: &str = "O";
pub const NI: &str = "NI";
pub const PRD: &str = "PRD";

pub type WordFreqs = HashMap<String, usize>;

/// Adds the word counts of `corpus` to `freqs`.
pub fn count_words(freqs: &mut WordFreqs, corpus: &[Sentence]) {
    for word in corpus.iter().flat_map(|s| s.words.iter()) {
        *freqs.entry(word.form.clone()).or_insert(0) += 1;
    }
}

/// Bidirectional mapping between strings and dense ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocab {
    w2i: HashMap<String, usize>,
    i2w: Vec<String>,
}

impl Vocab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Word vocabulary holding the padding and unknown entries.
    pub fn init_words() -> Self {
        let mut vocab = Self::new();
        vocab.add_word(PAD);
        vocab.add_word(UNK);
        vocab
    }

    /// Label vocabulary for predicate-argument structures.
    pub fn pas_labels() -> Self {
        let mut vocab = Self::new();
        for label in [NA, GA, O, NI, PRD] {
            vocab.add_word(label);
        }
        vocab
    }

    pub fn add_word(&mut self, word: &str) -> usize {
        if let Some(&id) = self.w2i.get(word) {
            return id;
        }
        let id = self.i2w.len();
        self.w2i.insert(word.to_string(), id);
        self.i2w.push(word.to_string());
        id
    }

    /// Adds every word seen more than `cut_off` times, most frequent first.
    pub fn add_vocab(&mut self, word_freqs: &WordFreqs, cut_off: usize) {
        let mut words: Vec<(&String, &usize)> =
            word_freqs.iter().filter(|(_, &freq)| freq > cut_off).collect();
        words.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (word, _) in words {
            self.add_word(word);
        }
    }

    pub fn get_id(&self, word: &str) -> Option<usize> {
        self.w2i.get(word).copied()
    }

    pub fn id_or_unk(&self, word: &str) -> usize {
        self.get_id(word)
            .or_else(|| self.get_id(UNK))
            .unwrap_or_default()
    }

    pub fn get_word(&self, id: usize) -> Option<&str> {
        self.i2w.get(id).map(String::as_str)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.w2i.contains_key(word)
    }

    pub fn size(&self) -> usize {
        self.i2w.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_gz(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json_gz(path)
    }
}

/// Label ids resolved once from a label vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasLabels {
    pub na: usize,
    pub prd: usize,
    cases: [usize; 3],
    size: usize,
}

impl PasLabels {
    pub fn from_vocab(vocab: &Vocab) -> Result<Self, PasaError> {
        let id = |label: &str| {
            vocab
                .get_id(label)
                .ok_or_else(|| PasaError::MissingLabel(label.to_string()))
        };
        Ok(Self {
            na: id(NA)?,
            prd: id(PRD)?,
            cases: [id(GA)?, id(O)?, id(NI)?],
            size: vocab.size(),
        })
    }

    pub fn case_id(&self, case: Case) -> usize {
        self.cases[case.index()]
    }

    pub fn case_of(&self, label: usize) -> Option<Case> {
        Case::ALL.into_iter().find(|&c| self.case_id(c) == label)
    }

    /// Labels a non-predicate word may receive.
    pub fn argument_labels(&self) -> [usize; 4] {
        [self.na, self.cases[0], self.cases[1], self.cases[2]]
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
