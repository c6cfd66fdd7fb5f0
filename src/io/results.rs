use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{read_bincode_gz, write_bincode_gz};
use crate::data::{Case, PasLabels, Sentence};
use crate::training::Prediction;

/// Writes the predicted predicate-argument structures one sentence at a
/// time:
///
/// ```text
/// # S-ID:950101003-001
/// 彼 は 本 を 読ん だ
/// 4:読ん	GA:0:彼	O:2:本	NI:-
/// ```
pub fn save_pas_results(
    path: &Path,
    corpus: &[Sentence],
    predictions: &[Prediction],
    labels: &PasLabels,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut out = BufWriter::new(file);

    for prediction in predictions {
        let Some(sentence) = corpus.get(prediction.sent_index) else {
            continue;
        };
        let form = |i: usize| sentence.words.get(i).map_or("?", |w| w.form.as_str());

        writeln!(out, "# S-ID:{}", sentence.id)?;
        let forms: Vec<&str> = sentence.words.iter().map(|w| w.form.as_str()).collect();
        writeln!(out, "{}", forms.join(" "))?;
        for (&prd, seq) in prediction.prd_indices.iter().zip(&prediction.labels) {
            write!(out, "{}:{}", prd, form(prd))?;
            for case in Case::ALL {
                let id = labels.case_id(case);
                match seq.iter().position(|&l| l == id) {
                    Some(arg) => write!(out, "\t{}:{}:{}", case.label(), arg, form(arg))?,
                    None => write!(out, "\t{}:-", case.label())?,
                }
            }
            writeln!(out)?;
        }
        writeln!(out)?;
    }
    out.flush().with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

/// Raw model outputs and decoded labels, gzip-compressed bincode.
pub fn save_outputs(path: &Path, predictions: &[Prediction]) -> Result<()> {
    write_bincode_gz(path, &predictions)
}

pub fn load_outputs(path: &Path) -> Result<Vec<Prediction>> {
    read_bincode_gz(path)
}
