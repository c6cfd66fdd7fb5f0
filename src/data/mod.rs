mod batch;
mod corpus;
mod sample;
mod stats;
mod vocab;

pub use batch::{grid_batches, pair_batches, sequence_batches, GridBatch, PairBatch, SeqBatch};
pub use corpus::{load_ntc, Case, CaseType, Chunk, NtcReader, Sentence, Word};
pub use sample::{build_samples, PairSample, Sample, PRD_WINDOW};
pub use stats::{corpus_statistics, CorpusStats};
pub use vocab::{count_words, PasLabels, Vocab, WordFreqs, GA, NA, NI, O, PAD, PRD, UNK};

#[cfg(test)]
pub(crate) use corpus::tests::parse_doc as test_corpus;
