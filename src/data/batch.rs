use std::collections::BTreeMap;

use super::sample::{PairSample, Sample};

/// Predicate rows of equal sentence length, flattened row-major.
#[derive(Debug, Clone)]
pub struct SeqBatch {
    pub n_rows: usize,
    pub n_words: usize,
    pub n_features: usize,
    /// `[n_rows, n_words, n_features]`
    pub x_w: Vec<usize>,
    /// `[n_rows, n_words]`
    pub x_p: Vec<usize>,
    /// `[n_rows, n_words]`
    pub y: Vec<usize>,
}

impl SeqBatch {
    fn from_rows(samples: &[Sample], rows: &[(usize, usize)]) -> Self {
        let (first_sample, _) = rows[0];
        let n_words = samples[first_sample].n_words;
        let n_features = samples[first_sample].n_features();
        let mut batch = SeqBatch {
            n_rows: rows.len(),
            n_words,
            n_features,
            x_w: Vec::with_capacity(rows.len() * n_words * n_features),
            x_p: Vec::with_capacity(rows.len() * n_words),
            y: Vec::with_capacity(rows.len() * n_words),
        };
        for &(s, p) in rows {
            let sample = &samples[s];
            batch.x_w.extend(sample.x_w[p].iter().flatten());
            batch.x_p.extend_from_slice(&sample.x_p[p]);
            batch.y.extend_from_slice(&sample.y[p]);
        }
        batch
    }

    /// All predicate rows of a single sample.
    pub fn from_sample(sample: &Sample) -> Self {
        let rows: Vec<(usize, usize)> = (0..sample.n_prds()).map(|p| (0, p)).collect();
        Self::from_rows(std::slice::from_ref(sample), &rows)
    }
}

/// One row per (sample, predicate); rows of equal length are cut into
/// chunks of at most `batch_size`.
pub fn sequence_batches(samples: &[Sample], batch_size: usize) -> Vec<SeqBatch> {
    let mut rows: Vec<(usize, usize)> = samples
        .iter()
        .enumerate()
        .flat_map(|(s, sample)| (0..sample.n_prds()).map(move |p| (s, p)))
        .collect();
    rows.sort_by_key(|&(s, _)| samples[s].n_words);

    let mut batches = Vec::new();
    for group in rows.chunk_by(|a, b| samples[a.0].n_words == samples[b.0].n_words) {
        for chunk in group.chunks(batch_size.max(1)) {
            batches.push(SeqBatch::from_rows(samples, chunk));
        }
    }
    batches
}

/// Whole sentences sharing (`n_prds`, `n_words`).
#[derive(Debug, Clone)]
pub struct GridBatch {
    pub n_sents: usize,
    pub n_prds: usize,
    pub n_words: usize,
    pub n_features: usize,
    /// `[n_sents * n_prds, n_words, n_features]`
    pub x_w: Vec<usize>,
    /// `[n_sents * n_prds, n_words]`
    pub x_p: Vec<usize>,
    /// `[n_sents * n_prds, n_words]`
    pub y: Vec<usize>,
}

impl GridBatch {
    fn from_samples(samples: &[&Sample]) -> Self {
        let first = samples[0];
        let mut batch = GridBatch {
            n_sents: samples.len(),
            n_prds: first.n_prds(),
            n_words: first.n_words,
            n_features: first.n_features(),
            x_w: Vec::new(),
            x_p: Vec::new(),
            y: Vec::new(),
        };
        for sample in samples {
            batch.x_w.extend(sample.x_w.iter().flatten().flatten());
            batch.x_p.extend(sample.x_p.iter().flatten());
            batch.y.extend(sample.y.iter().flatten());
        }
        batch
    }

    pub fn from_sample(sample: &Sample) -> Self {
        Self::from_samples(&[sample])
    }
}

pub fn grid_batches(samples: &[Sample], batch_size: usize) -> Vec<GridBatch> {
    let mut groups: BTreeMap<(usize, usize), Vec<&Sample>> = BTreeMap::new();
    for sample in samples.iter().filter(|s| s.n_prds() > 0) {
        groups
            .entry((sample.n_prds(), sample.n_words))
            .or_default()
            .push(sample);
    }
    groups
        .values()
        .flat_map(|group| group.chunks(batch_size.max(1)))
        .map(GridBatch::from_samples)
        .collect()
}

#[derive(Debug, Clone)]
pub struct PairBatch {
    pub n_rows: usize,
    pub n_features: usize,
    /// `[n_rows, n_features]`
    pub x: Vec<usize>,
    pub mark: Vec<usize>,
    pub case: Vec<usize>,
    pub y: Vec<usize>,
}

impl PairBatch {
    pub fn from_pairs(pairs: &[PairSample]) -> Self {
        let n_features = pairs.first().map_or(0, |p| p.x.len());
        PairBatch {
            n_rows: pairs.len(),
            n_features,
            x: pairs.iter().flat_map(|p| p.x.iter().copied()).collect(),
            mark: pairs.iter().map(|p| p.mark).collect(),
            case: pairs.iter().map(|p| p.case.index()).collect(),
            y: pairs.iter().map(|p| p.y).collect(),
        }
    }
}

pub fn pair_batches(pairs: &[PairSample], batch_size: usize) -> Vec<PairBatch> {
    pairs
        .chunks(batch_size.max(1))
        .map(PairBatch::from_pairs)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PasLabels, Vocab};

    fn sample(sent_index: usize, n_words: usize, n_prds: usize) -> Sample {
        let n_features = 3;
        Sample {
            sent_index,
            n_words,
            word_ids: vec![sent_index; n_words],
            prd_indices: (0..n_prds).collect(),
            x_w: vec![vec![vec![sent_index; n_features]; n_words]; n_prds],
            x_p: vec![vec![1; n_words]; n_prds],
            y: vec![vec![0; n_words]; n_prds],
        }
    }

    #[test]
    fn sequence_batches_group_by_length() {
        let samples = vec![sample(0, 4, 2), sample(1, 3, 1), sample(2, 4, 1), sample(3, 5, 0)];
        let batches = sequence_batches(&samples, 2);
        let shapes: Vec<(usize, usize)> = batches.iter().map(|b| (b.n_rows, b.n_words)).collect();
        assert_eq!(shapes, vec![(1, 3), (2, 4), (1, 4)]);

        let b = &batches[1];
        assert_eq!(b.x_w.len(), 2 * 4 * 3);
        assert_eq!(b.y.len(), 2 * 4);
        // rows keep corpus order inside a length group
        assert!(b.x_w.iter().all(|&id| id == 0));
        assert!(batches[2].x_w.iter().all(|&id| id == 2));
    }

    #[test]
    fn grid_batches_group_by_predicates_and_length() {
        let samples = vec![sample(0, 4, 2), sample(1, 4, 2), sample(2, 4, 1), sample(3, 2, 0)];
        let batches = grid_batches(&samples, 8);
        let shapes: Vec<(usize, usize, usize)> =
            batches.iter().map(|b| (b.n_sents, b.n_prds, b.n_words)).collect();
        assert_eq!(shapes, vec![(1, 1, 4), (2, 2, 4)]);
        assert_eq!(batches[1].x_p.len(), 2 * 2 * 4);
    }

    #[test]
    fn pair_batches_are_consecutive_chunks() {
        let labels = PasLabels::from_vocab(&Vocab::pas_labels()).unwrap();
        let mut s = sample(0, 3, 1);
        s.y[0] = vec![4, 1, 0];
        // 2 candidate words x 3 cases
        let pairs = PairSample::from_sample(&s, &labels);
        let batches = pair_batches(&pairs, 4);

        let rows: Vec<usize> = batches.iter().map(|b| b.n_rows).collect();
        assert_eq!(rows, vec![4, 2]);
        assert_eq!(batches[0].n_features, 3);
        assert_eq!(batches[0].x.len(), 4 * 3);
        assert_eq!(batches[0].case, vec![0, 1, 2, 0]);
        // word 1 fills GA only
        assert_eq!(batches[0].y, vec![1, 0, 0, 0]);
        assert_eq!(batches[1].y, vec![0, 0]);
    }

    #[test]
    fn single_sample_batch_has_every_predicate() {
        let b = SeqBatch::from_sample(&sample(7, 6, 3));
        assert_eq!((b.n_rows, b.n_words, b.n_features), (3, 6, 3));
    }
}
