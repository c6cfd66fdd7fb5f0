use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::data::{Case, PasLabels};

const LOG_FLOOR: f32 = 1e-12;

/// A decoded label sequence and its log-probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub labels: Vec<usize>,
    pub score: f32,
}

/// Per-case scores over the words of one predicate, plus the score a word
/// must beat to take the case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleScores {
    /// `[case][word]`
    pub scores: [Vec<f32>; 3],
    pub null: [f32; 3],
}

/// Turns per-word label distributions into label sequences in which every
/// case appears at most once per predicate.
#[derive(Debug, Clone)]
pub struct Decoder {
    labels: PasLabels,
    n_best: usize,
}

impl Decoder {
    pub fn new(labels: PasLabels, n_best: usize) -> Self {
        Self {
            labels,
            n_best: n_best.max(1),
        }
    }

    pub fn labels(&self) -> &PasLabels {
        &self.labels
    }

    /// Decodes every predicate of a sentence; `probs` is `[prd][word][label]`.
    pub fn decode(&self, probs: &[Vec<Vec<f32>>], prd_indices: &[usize]) -> Vec<Vec<usize>> {
        probs
            .iter()
            .zip(prd_indices)
            .map(|(p, &prd)| self.argmax(p, prd))
            .collect()
    }

    /// Most probable label per word, then only the most probable word of each
    /// case keeps it.
    pub fn argmax(&self, probs: &[Vec<f32>], prd_index: usize) -> Vec<usize> {
        let candidates = self.labels.argument_labels();
        let mut labels = Vec::with_capacity(probs.len());
        for (w, dist) in probs.iter().enumerate() {
            if w == prd_index {
                labels.push(self.labels.prd);
                continue;
            }
            let best = candidates
                .iter()
                .copied()
                .max_by(|&a, &b| prob(dist, a).total_cmp(&prob(dist, b)).then(b.cmp(&a)))
                .unwrap_or(self.labels.na);
            labels.push(best);
        }

        for case in Case::ALL {
            let id = self.labels.case_id(case);
            let keep = (0..labels.len())
                .filter(|&w| labels[w] == id)
                .max_by(|&a, &b| prob(&probs[a], id).total_cmp(&prob(&probs[b], id)).then(b.cmp(&a)));
            if let Some(keep) = keep {
                for (w, label) in labels.iter_mut().enumerate() {
                    if *label == id && w != keep {
                        *label = self.labels.na;
                    }
                }
            }
        }
        labels
    }

    /// Top-N label sequences by summed log-probability.
    ///
    /// A word ranked below the `n_best + 2` best words of a case cannot take
    /// that case in any of the top N sequences (the other two cases block at
    /// most two better words), so the search enumerates every assignment over
    /// those words exactly.
    pub fn n_best(&self, probs: &[Vec<f32>], prd_index: usize) -> Vec<Candidate> {
        let na = self.labels.na;
        let base: f32 = probs
            .iter()
            .enumerate()
            .filter(|&(w, _)| w != prd_index)
            .map(|(_, dist)| log_prob(dist, na))
            .sum();

        let options = Case::ALL.map(|case| {
            let id = self.labels.case_id(case);
            let mut words: Vec<(Option<usize>, f32)> = probs
                .iter()
                .enumerate()
                .filter(|&(w, _)| w != prd_index)
                .map(|(w, dist)| (Some(w), log_prob(dist, id) - log_prob(dist, na)))
                .collect();
            words.sort_by(|a, b| b.1.total_cmp(&a.1));
            words.truncate(self.n_best + Case::ALL.len() - 1);
            words.push((None, 0.0));
            words
        });

        let mut assignments: Vec<([Option<usize>; 3], f32)> = Vec::new();
        for &(ga, ga_gain) in &options[0] {
            for &(o, o_gain) in &options[1] {
                if o.is_some() && o == ga {
                    continue;
                }
                for &(ni, ni_gain) in &options[2] {
                    if ni.is_some() && (ni == ga || ni == o) {
                        continue;
                    }
                    assignments.push(([ga, o, ni], base + ga_gain + o_gain + ni_gain));
                }
            }
        }
        assignments.sort_by(|a, b| b.1.total_cmp(&a.1));
        assignments.truncate(self.n_best);

        assignments
            .into_iter()
            .map(|(assign, score)| Candidate {
                labels: self.assignment_labels(&assign, probs.len(), prd_index),
                score,
            })
            .collect()
    }

    /// Greedy best-first assignment of (case, word) pairs that beat the null
    /// score; each case and each word is used once.
    pub fn decode_roles(&self, roles: &RoleScores, n_words: usize, prd_index: usize) -> Vec<usize> {
        let mut pairs: Vec<(Case, usize, f32)> = Vec::new();
        for case in Case::ALL {
            let null = roles.null[case.index()];
            for (w, &score) in roles.scores[case.index()].iter().enumerate() {
                if w != prd_index && w < n_words && score > null {
                    pairs.push((case, w, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        let mut assign = [None; 3];
        for (case, w, _) in pairs {
            if assign[case.index()].is_none() && !assign.contains(&Some(w)) {
                assign[case.index()] = Some(w);
            }
        }
        self.assignment_labels(&assign, n_words, prd_index)
    }

    fn assignment_labels(&self, assign: &[Option<usize>; 3], n_words: usize, prd_index: usize) -> Vec<usize> {
        let mut labels = vec![self.labels.na; n_words];
        if prd_index < n_words {
            labels[prd_index] = self.labels.prd;
        }
        for case in Case::ALL {
            if let Some(w) = assign[case.index()] {
                labels[w] = self.labels.case_id(case);
            }
        }
        labels
    }
}

fn prob(dist: &[f32], label: usize) -> f32 {
    dist.get(label).copied().unwrap_or(0.0)
}

fn log_prob(dist: &[f32], label: usize) -> f32 {
    prob(dist, label).max(LOG_FLOOR).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Vocab;

    fn decoder(n_best: usize) -> Decoder {
        Decoder::new(PasLabels::from_vocab(&Vocab::pas_labels()).unwrap(), n_best)
    }

    // label order: NA GA O NI PRD
    fn dist(na: f32, ga: f32, o: f32, ni: f32) -> Vec<f32> {
        vec![na, ga, o, ni, 0.0]
    }

    #[test]
    fn argmax_marks_predicate_and_best_labels() {
        let probs = vec![
            dist(0.1, 0.7, 0.1, 0.1),
            dist(0.2, 0.2, 0.2, 0.2),
            dist(0.1, 0.1, 0.1, 0.7),
        ];
        assert_eq!(decoder(1).argmax(&probs, 1), vec![1, 4, 3]);
    }

    #[test]
    fn argmax_keeps_each_case_once() {
        let probs = vec![
            dist(0.1, 0.6, 0.2, 0.1),
            dist(0.1, 0.8, 0.05, 0.05),
            dist(0.0, 0.0, 0.0, 0.0),
        ];
        assert_eq!(decoder(1).argmax(&probs, 2), vec![0, 1, 4]);
    }

    #[test]
    fn n_best_is_sorted_and_constrained() {
        let probs = vec![
            dist(0.1, 0.6, 0.2, 0.1),
            dist(0.1, 0.8, 0.05, 0.05),
            dist(0.0, 0.0, 0.0, 0.0),
            dist(0.9, 0.05, 0.03, 0.02),
        ];
        let d = decoder(4);
        let best = d.n_best(&probs, 2);
        assert_eq!(best.len(), 4);
        assert!(best.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(best[0].labels, vec![2, 1, 4, 0]);

        for cand in &best {
            for case in Case::ALL {
                let id = d.labels().case_id(case);
                assert!(cand.labels.iter().filter(|&&l| l == id).count() <= 1);
            }
            assert_eq!(cand.labels[2], 4);
        }
    }

    #[test]
    fn n_best_top_matches_argmax_when_unambiguous() {
        let probs = vec![
            dist(0.05, 0.9, 0.03, 0.02),
            dist(0.9, 0.05, 0.03, 0.02),
            dist(0.1, 0.1, 0.7, 0.1),
        ];
        let d = decoder(3);
        assert_eq!(d.n_best(&probs, 1)[0].labels, d.argmax(&probs, 1));
    }

    fn sequence_score(probs: &[Vec<f32>], labels: &[usize], prd_index: usize) -> f32 {
        labels
            .iter()
            .enumerate()
            .filter(|&(w, _)| w != prd_index)
            .map(|(w, &l)| log_prob(&probs[w], l))
            .sum()
    }

    #[test]
    fn n_best_top_is_never_worse_than_argmax() {
        // greedy case-by-case search would give GA to word 0 and lose O
        let probs = vec![
            dist(0.01, 0.30, 0.69, 0.0),
            dist(0.40, 0.60, 0.0, 0.0),
            dist(0.0, 0.0, 0.0, 0.0),
        ];
        let d = decoder(1);
        let argmax = d.argmax(&probs, 2);
        let best = d.n_best(&probs, 2);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].labels, vec![2, 1, 4]);
        assert_eq!(best[0].labels, argmax);
        assert!(best[0].score >= sequence_score(&probs, &argmax, 2) - 1e-4);
    }

    #[test]
    fn n_best_matches_exhaustive_search() {
        let probs = vec![
            dist(0.10, 0.50, 0.30, 0.10),
            dist(0.20, 0.45, 0.25, 0.10),
            dist(0.0, 0.0, 0.0, 0.0),
            dist(0.30, 0.20, 0.20, 0.30),
            dist(0.25, 0.25, 0.25, 0.25),
        ];
        let d = decoder(6);
        let best = d.n_best(&probs, 2);

        let words = [None, Some(0), Some(1), Some(3), Some(4)];
        let mut scores = Vec::new();
        for ga in words {
            for o in words {
                for ni in words {
                    let used: Vec<usize> = [ga, o, ni].into_iter().flatten().collect();
                    if (1..used.len()).any(|i| used[..i].contains(&used[i])) {
                        continue;
                    }
                    let labels = d.assignment_labels(&[ga, o, ni], probs.len(), 2);
                    scores.push(sequence_score(&probs, &labels, 2));
                }
            }
        }
        scores.sort_by(|a, b| b.total_cmp(a));

        assert_eq!(best.len(), 6);
        for (cand, expected) in best.iter().zip(&scores) {
            assert!((cand.score - expected).abs() < 1e-4);
            assert!((cand.score - sequence_score(&probs, &cand.labels, 2)).abs() < 1e-4);
        }
    }

    #[test]
    fn role_decoding_respects_null_and_uniqueness() {
        let roles = RoleScores {
            scores: [vec![0.9, 0.0, 0.8], vec![0.95, 0.0, 0.6], vec![0.1, 0.0, 0.2]],
            null: [0.5, 0.5, 0.5],
        };
        // O takes word 0 first, GA falls back to word 2, NI stays empty
        assert_eq!(decoder(1).decode_roles(&roles, 3, 1), vec![2, 4, 1]);
    }
}
