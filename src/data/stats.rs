use std::fmt;

use super::corpus::{Case, CaseType, Sentence};

/// Corpus-level counts logged after loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub n_sents: usize,
    pub n_words: usize,
    pub n_prds: usize,
    /// `[case][case type]`
    pub n_args: [[usize; 2]; 3],
}

impl CorpusStats {
    pub fn n_args_total(&self) -> usize {
        self.n_args.iter().flatten().sum()
    }
}

pub fn corpus_statistics(corpus: &[Sentence]) -> CorpusStats {
    let mut stats = CorpusStats {
        n_sents: corpus.len(),
        ..Default::default()
    };
    for sent in corpus {
        stats.n_words += sent.len();
        for prd in sent.predicates() {
            stats.n_prds += 1;
            for case in Case::ALL {
                if let Some(arg) = prd.case_arg_index[case.index()] {
                    let case_type = sent.case_type(prd.index, arg);
                    stats.n_args[case.index()][case_type.index()] += 1;
                }
            }
        }
    }
    stats
}

impl fmt::Display for CorpusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sents: {}  Words: {}  Predicates: {}  Arguments: {}",
            self.n_sents,
            self.n_words,
            self.n_prds,
            self.n_args_total()
        )?;
        for case in Case::ALL {
            let counts = self.n_args[case.index()];
            write!(
                f,
                "  {}: {} (Dep {} / Zero {})",
                case.label(),
                counts.iter().sum::<usize>(),
                counts[CaseType::Dep.index()],
                counts[CaseType::Zero.index()]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::corpus::tests::parse_doc;

    #[test]
    fn counts_predicates_and_arguments_by_type() {
        let stats = corpus_statistics(&parse_doc());
        assert_eq!(stats.n_sents, 2);
        assert_eq!(stats.n_words, 7);
        assert_eq!(stats.n_prds, 1);
        assert_eq!(stats.n_args[Case::Ga.index()], [1, 0]);
        assert_eq!(stats.n_args[Case::O.index()], [1, 0]);
        assert_eq!(stats.n_args_total(), 2);
        assert!(stats.to_string().contains("GA: 1 (Dep 1 / Zero 0)"));
    }
}
