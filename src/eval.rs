use std::fmt;
use std::ops::AddAssign;
use tracing::info;

use crate::data::{Case, CaseType, PasLabels, Sample, Sentence};

/// Correct / predicted / gold counts for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    pub correct: usize,
    pub predicted: usize,
    pub gold: usize,
}

impl Counter {
    pub fn add(&mut self, sys: bool, gold: bool) {
        if sys && gold {
            self.correct += 1;
        }
        if sys {
            self.predicted += 1;
        }
        if gold {
            self.gold += 1;
        }
    }

    pub fn precision(&self) -> f64 {
        ratio(self.correct, self.predicted)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.correct, self.gold)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

impl AddAssign for Counter {
    fn add_assign(&mut self, other: Counter) {
        self.correct += other.correct;
        self.predicted += other.predicted;
        self.gold += other.gold;
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "F1: {:.2}  P: {:.2} ({}/{})  R: {:.2} ({}/{})",
            self.f1() * 100.0,
            self.precision() * 100.0,
            self.correct,
            self.predicted,
            self.recall() * 100.0,
            self.correct,
            self.gold
        )
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Running evaluation counters, per case and per case type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Eval {
    pub nll: f64,
    pub cases: [Counter; 3],
    /// Only filled by sample-level evaluation.
    pub types: [[Counter; 2]; 3],
}

impl Eval {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares flattened label sequences position by position.
    pub fn update_labels(&mut self, sys: &[usize], gold: &[usize], labels: &PasLabels) {
        for (&s, &g) in sys.iter().zip(gold) {
            for case in Case::ALL {
                let id = labels.case_id(case);
                self.cases[case.index()].add(s == id, g == id);
            }
        }
    }

    /// Binary pair decisions, `1` meaning "fills the case".
    pub fn update_pairs(&mut self, sys: &[usize], gold: &[usize], cases: &[usize]) {
        for ((&s, &g), &c) in sys.iter().zip(gold).zip(cases) {
            if let Some(counter) = self.cases.get_mut(c) {
                counter.add(s == 1, g == 1);
            }
        }
    }

    /// Ranking slot choices laid out `[row][case]`; `null` is the empty slot.
    pub fn update_slots(&mut self, sys: &[usize], gold: &[usize], null: usize) {
        for (i, (&s, &g)) in sys.iter().zip(gold).enumerate() {
            let counter = &mut self.cases[i % Case::ALL.len()];
            if s != null && s == g {
                counter.correct += 1;
            }
            if s != null {
                counter.predicted += 1;
            }
            if g != null {
                counter.gold += 1;
            }
        }
    }

    /// Sample-level update with case-type breakdown; the predicate position
    /// is never counted.
    pub fn update_sample(
        &mut self,
        sentence: &Sentence,
        sample: &Sample,
        sys: &[Vec<usize>],
        labels: &PasLabels,
    ) {
        for ((&prd, gold_seq), sys_seq) in sample.prd_indices.iter().zip(&sample.y).zip(sys) {
            for (w, (&s, &g)) in sys_seq.iter().zip(gold_seq).enumerate() {
                if w == prd {
                    continue;
                }
                let case_type = sentence.case_type(prd, w);
                for case in Case::ALL {
                    let id = labels.case_id(case);
                    let (is_sys, is_gold) = (s == id, g == id);
                    self.cases[case.index()].add(is_sys, is_gold);
                    self.types[case.index()][case_type.index()].add(is_sys, is_gold);
                }
            }
        }
    }

    /// Micro-averaged counts over all cases.
    pub fn all(&self) -> Counter {
        let mut total = Counter::default();
        for counter in self.cases {
            total += counter;
        }
        total
    }

    pub fn all_f1(&self) -> f64 {
        self.all().f1()
    }

    pub fn type_total(&self, case_type: CaseType) -> Counter {
        let mut total = Counter::default();
        for case in Case::ALL {
            total += self.types[case.index()][case_type.index()];
        }
        total
    }

    pub fn show_results(&self) {
        info!("\tNLL: {:.6}  ALL {}", self.nll, self.all());
        for case in Case::ALL {
            info!("\t  {:<3}{}", case.label(), self.cases[case.index()]);
        }
        if self.type_total(CaseType::Dep).gold + self.type_total(CaseType::Zero).gold > 0 {
            for case_type in CaseType::ALL {
                info!("\t  {:?}  {}", case_type, self.type_total(case_type));
            }
        }
    }
}

impl AddAssign for Eval {
    fn add_assign(&mut self, other: Eval) {
        self.nll += other.nll;
        for c in 0..3 {
            self.cases[c] += other.cases[c];
            for t in 0..2 {
                self.types[c][t] += other.types[c][t];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Vocab;

    fn labels() -> PasLabels {
        PasLabels::from_vocab(&Vocab::pas_labels()).unwrap()
    }

    #[test]
    fn f1_of_empty_counter_is_zero() {
        let c = Counter::default();
        assert_eq!(c.f1(), 0.0);
    }

    #[test]
    fn label_update_counts_each_case() {
        let mut eval = Eval::new();
        // NA GA O NI PRD = 0 1 2 3 4
        eval.update_labels(&[1, 2, 0, 3], &[1, 0, 2, 3], &labels());
        assert_eq!(eval.cases[0], Counter { correct: 1, predicted: 1, gold: 1 });
        assert_eq!(eval.cases[1], Counter { correct: 0, predicted: 1, gold: 1 });
        assert_eq!(eval.all(), Counter { correct: 2, predicted: 3, gold: 3 });
        assert!((eval.all_f1() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn pair_update_uses_row_case() {
        let mut eval = Eval::new();
        eval.update_pairs(&[1, 1, 0], &[1, 0, 1], &[0, 2, 2]);
        assert_eq!(eval.cases[0].correct, 1);
        assert_eq!(eval.cases[2], Counter { correct: 0, predicted: 1, gold: 1 });
    }

    #[test]
    fn slot_update_ignores_null() {
        let mut eval = Eval::new();
        // one row: GA -> 2, O -> null, NI -> 1 ; gold GA -> 2, O -> 0, NI -> null
        eval.update_slots(&[2, 5, 1], &[2, 0, 5], 5);
        assert_eq!(eval.cases[0], Counter { correct: 1, predicted: 1, gold: 1 });
        assert_eq!(eval.cases[1], Counter { correct: 0, predicted: 0, gold: 1 });
        assert_eq!(eval.cases[2], Counter { correct: 0, predicted: 1, gold: 0 });
    }

    #[test]
    fn sample_update_skips_predicate_and_tracks_types() {
        let sents = crate::data::test_corpus();
        let vocab = Vocab::init_words();
        let sample = Sample::new(0, &sents[0], &vocab, &labels(), 5);
        let mut eval = Eval::new();
        // perfect prediction
        eval.update_sample(&sents[0], &sample, &sample.y.clone(), &labels());
        assert_eq!(eval.all(), Counter { correct: 2, predicted: 2, gold: 2 });
        assert_eq!(eval.type_total(CaseType::Dep).gold, 2);
        assert_eq!(eval.type_total(CaseType::Zero).gold, 0);
    }

    #[test]
    fn evals_add_up() {
        let mut a = Eval::new();
        a.nll = 1.0;
        a.cases[0].correct = 1;
        let mut b = Eval::new();
        b.nll = 0.5;
        b.cases[0].correct = 2;
        a += b;
        assert_eq!(a.nll, 1.5);
        assert_eq!(a.cases[0].correct, 3);
    }
}
