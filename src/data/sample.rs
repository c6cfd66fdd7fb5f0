use serde::{Deserialize, Serialize};

use super::corpus::{Case, Sentence};
use super::vocab::{PasLabels, Vocab};

/// Width of the context window taken around the predicate.
pub const PRD_WINDOW: usize = 5;

/// Feature tensors and gold labels of one sentence.
///
/// Every per-predicate field is indexed `[predicate][word]`, predicates in
/// sentence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Position of the sentence in its corpus.
    pub sent_index: usize,
    pub n_words: usize,
    pub word_ids: Vec<usize>,
    pub prd_indices: Vec<usize>,
    /// Argument window followed by the predicate window.
    pub x_w: Vec<Vec<Vec<usize>>>,
    pub x_p: Vec<Vec<usize>>,
    pub y: Vec<Vec<usize>>,
}

impl Sample {
    pub fn new(
        sent_index: usize,
        sentence: &Sentence,
        vocab_word: &Vocab,
        labels: &PasLabels,
        window: usize,
    ) -> Self {
        let word_ids: Vec<usize> = sentence
            .words
            .iter()
            .map(|w| vocab_word.id_or_unk(&w.form))
            .collect();

        let mut prd_indices = Vec::new();
        let mut y = Vec::new();
        for prd in sentence.predicates() {
            let mut label_seq = vec![labels.na; sentence.len()];
            label_seq[prd.index] = labels.prd;
            for case in Case::ALL {
                if let Some(arg) = prd.case_arg_index[case.index()] {
                    label_seq[arg] = labels.case_id(case);
                }
            }
            prd_indices.push(prd.index);
            y.push(label_seq);
        }

        let x_w = word_phi(&word_ids, &prd_indices, window);
        let x_p = posit_phi(word_ids.len(), &prd_indices, window);

        Self {
            sent_index,
            n_words: word_ids.len(),
            word_ids,
            prd_indices,
            x_w,
            x_p,
            y,
        }
    }

    pub fn n_prds(&self) -> usize {
        self.prd_indices.len()
    }

    /// Number of word ids per position.
    pub fn n_features(&self) -> usize {
        self.x_w
            .first()
            .and_then(|rows| rows.first())
            .map_or(0, Vec::len)
    }
}

fn word_phi(word_ids: &[usize], prd_indices: &[usize], window: usize) -> Vec<Vec<Vec<usize>>> {
    let slide = window / 2;
    let p_slide = PRD_WINDOW / 2;
    let padded = |slide: usize| {
        let mut ids = vec![0; slide];
        ids.extend_from_slice(word_ids);
        ids.extend(std::iter::repeat(0).take(slide));
        ids
    };
    let a_sent = padded(slide);
    let p_sent = padded(p_slide);

    prd_indices
        .iter()
        .map(|&prd| {
            let prd_ctx = &p_sent[prd..prd + PRD_WINDOW];
            (0..word_ids.len())
                .map(|arg| {
                    let mut phi = a_sent[arg..arg + window].to_vec();
                    phi.extend_from_slice(prd_ctx);
                    phi
                })
                .collect()
        })
        .collect()
}

fn posit_phi(n_words: usize, prd_indices: &[usize], window: usize) -> Vec<Vec<usize>> {
    let slide = window / 2;
    prd_indices
        .iter()
        .map(|&prd| (0..n_words).map(|arg| mark(prd, arg, slide)).collect())
        .collect()
}

/// 0 inside the predicate's window, 1 outside.
fn mark(prd: usize, arg: usize, slide: usize) -> usize {
    if prd.abs_diff(arg) <= slide {
        0
    } else {
        1
    }
}

pub fn build_samples(
    corpus: &[Sentence],
    vocab_word: &Vocab,
    labels: &PasLabels,
    window: usize,
) -> Vec<Sample> {
    corpus
        .iter()
        .enumerate()
        .map(|(i, sent)| Sample::new(i, sent, vocab_word, labels, window))
        .collect()
}

/// One (predicate, candidate word, case) decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSample {
    pub sent_index: usize,
    /// Position of the predicate in `Sample::prd_indices`.
    pub prd: usize,
    pub arg: usize,
    pub case: Case,
    pub x: Vec<usize>,
    pub mark: usize,
    pub y: usize,
}

impl PairSample {
    pub fn from_sample(sample: &Sample, labels: &PasLabels) -> Vec<PairSample> {
        let mut pairs = Vec::new();
        for (p, &prd_index) in sample.prd_indices.iter().enumerate() {
            for arg in (0..sample.n_words).filter(|&w| w != prd_index) {
                for case in Case::ALL {
                    pairs.push(PairSample {
                        sent_index: sample.sent_index,
                        prd: p,
                        arg,
                        case,
                        x: sample.x_w[p][arg].clone(),
                        mark: sample.x_p[p][arg],
                        y: usize::from(sample.y[p][arg] == labels.case_id(case)),
                    });
                }
            }
        }
        pairs
    }
}
