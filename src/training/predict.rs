use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

use crate::data::{Sample, Sentence};
use crate::decoder::{Candidate, Decoder, RoleScores};
use crate::error::{PasaError, Result};
use crate::eval::Eval;
use crate::model::{
    BaseModel, GridModel, LabelOutputs, LabelScorer, MentionPairModel, RankingModel, RerankModel, RerankSample,
    RoleScorer, StackingModel, StackingSample,
};

/// Model outputs and decoded labels for one sentence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub sent_index: usize,
    pub prd_indices: Vec<usize>,
    /// Decoded label sequence per predicate.
    pub labels: Vec<Vec<usize>>,
    /// Label distributions `[prd][word][label]` of sequence models.
    pub label_probs: Vec<Vec<Vec<f32>>>,
    /// Hidden states `[prd][word][dim]` behind `label_probs`.
    pub hidden: Vec<Vec<Vec<f32>>>,
    /// Case scores of role-scoring models, one per predicate.
    pub role_scores: Vec<RoleScores>,
    /// N-best candidates per predicate, filled by the reranker.
    pub n_best: Vec<Vec<Candidate>>,
}

impl Prediction {
    fn empty(sample: &Sample) -> Self {
        Self {
            sent_index: sample.sent_index,
            ..Self::default()
        }
    }

    fn from_label_outputs(sample: &Sample, outputs: LabelOutputs, decoder: &Decoder) -> Self {
        Self {
            sent_index: sample.sent_index,
            prd_indices: sample.prd_indices.clone(),
            labels: decoder.decode(&outputs.probs, &sample.prd_indices),
            label_probs: outputs.probs,
            hidden: outputs.hidden,
            ..Self::default()
        }
    }
}

/// Saved label outputs keyed by sentence index. Predictions without label
/// distributions are left out.
pub fn outputs_by_sentence(predictions: Vec<Prediction>) -> BTreeMap<usize, LabelOutputs> {
    predictions
        .into_iter()
        .filter(|p| !p.label_probs.is_empty())
        .map(|p| {
            let outputs = LabelOutputs {
                probs: p.label_probs,
                hidden: p.hidden,
            };
            (p.sent_index, outputs)
        })
        .collect()
}

/// Anything that turns a sample into decoded predicate-argument labels.
pub trait Predictor<B: Backend> {
    fn predict(&self, sample: &Sample, decoder: &Decoder, device: &B::Device) -> Result<Prediction>;
}

fn predict_labels<B: Backend, M: LabelScorer<B>>(
    model: &M,
    sample: &Sample,
    decoder: &Decoder,
    device: &B::Device,
) -> Result<Prediction> {
    let outputs = model.label_outputs(sample, device)?;
    Ok(Prediction::from_label_outputs(sample, outputs, decoder))
}

fn predict_roles<B: Backend, M: RoleScorer<B>>(
    model: &M,
    sample: &Sample,
    decoder: &Decoder,
    device: &B::Device,
) -> Result<Prediction> {
    let role_scores = model.role_scores(sample, decoder.labels(), device)?;
    let labels = role_scores
        .iter()
        .zip(&sample.prd_indices)
        .map(|(roles, &prd)| decoder.decode_roles(roles, sample.n_words, prd))
        .collect();
    Ok(Prediction {
        sent_index: sample.sent_index,
        prd_indices: sample.prd_indices.clone(),
        labels,
        role_scores,
        ..Prediction::default()
    })
}

impl<B: Backend> Predictor<B> for BaseModel<B> {
    fn predict(&self, sample: &Sample, decoder: &Decoder, device: &B::Device) -> Result<Prediction> {
        predict_labels(self, sample, decoder, device)
    }
}

impl<B: Backend> Predictor<B> for GridModel<B> {
    fn predict(&self, sample: &Sample, decoder: &Decoder, device: &B::Device) -> Result<Prediction> {
        predict_labels(self, sample, decoder, device)
    }
}

impl<B: Backend> Predictor<B> for MentionPairModel<B> {
    fn predict(&self, sample: &Sample, decoder: &Decoder, device: &B::Device) -> Result<Prediction> {
        predict_roles(self, sample, decoder, device)
    }
}

impl<B: Backend> Predictor<B> for RankingModel<B> {
    fn predict(&self, sample: &Sample, decoder: &Decoder, device: &B::Device) -> Result<Prediction> {
        predict_roles(self, sample, decoder, device)
    }
}

/// A base model producing N-best lists and a reranker choosing among them.
pub struct Reranker<'a, B: Backend> {
    pub base: &'a BaseModel<B>,
    pub model: &'a RerankModel<B>,
}

impl<B: Backend> Predictor<B> for Reranker<'_, B> {
    fn predict(&self, sample: &Sample, decoder: &Decoder, device: &B::Device) -> Result<Prediction> {
        let LabelOutputs {
            probs: label_probs,
            hidden,
        } = self.base.label_outputs(sample, device)?;
        let mut labels = Vec::with_capacity(sample.n_prds());
        let mut n_best = Vec::with_capacity(sample.n_prds());
        for (p, (probs, &prd)) in label_probs.iter().zip(&sample.prd_indices).enumerate() {
            let candidates = decoder.n_best(probs, prd);
            let rerank = RerankSample::new(sample, p, candidates, decoder.labels());
            let chosen = self.model.choose(&rerank, device)?;
            let best = rerank
                .candidates
                .get(chosen)
                .map(|c| c.labels.clone())
                .unwrap_or_else(|| decoder.argmax(probs, prd));
            labels.push(best);
            n_best.push(rerank.candidates);
        }
        Ok(Prediction {
            sent_index: sample.sent_index,
            prd_indices: sample.prd_indices.clone(),
            labels,
            label_probs,
            hidden,
            n_best,
            ..Prediction::default()
        })
    }
}

/// A stacking model reading the saved outputs of the sentences it labels.
pub struct Stacker<'a, B: Backend> {
    pub model: &'a StackingModel<B>,
    pub outputs: &'a BTreeMap<usize, LabelOutputs>,
}

impl<B: Backend> Stacker<'_, B> {
    /// The stacking view of `sample`.
    pub fn stack(&self, sample: &Sample) -> Result<StackingSample> {
        let outputs = self.outputs.get(&sample.sent_index).ok_or_else(|| {
            PasaError::Shape(format!("no saved outputs for sentence {}", sample.sent_index))
        })?;
        StackingSample::new(sample, outputs)
    }
}

impl<B: Backend> Predictor<B> for Stacker<'_, B> {
    fn predict(&self, sample: &Sample, decoder: &Decoder, device: &B::Device) -> Result<Prediction> {
        let outputs = self.model.stack_outputs(&self.stack(sample)?, device)?;
        Ok(Prediction::from_label_outputs(sample, outputs, decoder))
    }
}

/// Runs `predictor` over every sample; samples without predicates yield an
/// empty prediction.
pub fn predict_one_epoch<B: Backend, P: Predictor<B>>(
    predictor: &P,
    samples: &[Sample],
    decoder: &Decoder,
    device: &B::Device,
) -> Result<Vec<Prediction>> {
    let start = Instant::now();
    let predictions = samples
        .iter()
        .map(|sample| {
            if sample.n_prds() == 0 {
                Ok(Prediction::empty(sample))
            } else {
                predictor.predict(sample, decoder, device)
            }
        })
        .collect::<Result<Vec<_>>>()?;
    info!("\tTime: {:.2?}", start.elapsed());
    Ok(predictions)
}

/// Sample-level evaluation of `predictions` against the gold labels.
pub fn evaluate_predictions(
    corpus: &[Sentence],
    samples: &[Sample],
    predictions: &[Prediction],
    decoder: &Decoder,
) -> Result<Eval> {
    if samples.len() != predictions.len() {
        return Err(PasaError::Shape(format!(
            "{} predictions for {} samples",
            predictions.len(),
            samples.len()
        )));
    }
    let mut eval = Eval::new();
    for (sample, prediction) in samples.iter().zip(predictions) {
        if prediction.labels.is_empty() {
            continue;
        }
        let sentence = corpus.get(sample.sent_index).ok_or_else(|| {
            PasaError::Shape(format!("sample refers to missing sentence {}", sample.sent_index))
        })?;
        eval.update_sample(sentence, sample, &prediction.labels, decoder.labels());
    }
    Ok(eval)
}

/// Predicts and evaluates one split, logging the results. Returns the
/// overall F1 along with the predictions.
pub fn eval_one_epoch<B: Backend, P: Predictor<B>>(
    predictor: &P,
    corpus: &[Sentence],
    samples: &[Sample],
    decoder: &Decoder,
    device: &B::Device,
) -> Result<(f64, Vec<Prediction>)> {
    let predictions = predict_one_epoch(predictor, samples, decoder, device)?;
    let eval = evaluate_predictions(corpus, samples, &predictions, decoder)?;
    eval.show_results();
    Ok((eval.all_f1(), predictions))
}
