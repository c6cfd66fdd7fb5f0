use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;
use walkdir::WalkDir;

use crate::error::PasaError;

/// The three argument roles that are analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Case {
    Ga,
    O,
    Ni,
}

impl Case {
    pub const ALL: [Case; 3] = [Case::Ga, Case::O, Case::Ni];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Case> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Case::Ga => "GA",
            Case::O => "O",
            Case::Ni => "NI",
        }
    }

    fn from_key(key: &str) -> Option<Case> {
        match key {
            "ga" => Some(Case::Ga),
            "o" => Some(Case::O),
            "ni" => Some(Case::Ni),
            _ => None,
        }
    }
}

/// Syntactic relation between an argument and its predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseType {
    /// Same chunk, or one chunk directly depends on the other.
    Dep,
    /// Any other intra-sentential argument.
    Zero,
}

impl CaseType {
    pub const ALL: [CaseType; 2] = [CaseType::Dep, CaseType::Zero];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub index: usize,
    pub form: String,
    pub chunk_index: usize,
    pub arg_id: Option<String>,
    pub is_prd: bool,
    /// Word index of the GA / O / NI argument, when it is inside the sentence.
    pub case_arg_index: [Option<usize>; 3],
    #[serde(skip)]
    case_arg_ids: [Option<String>; 3],
}

impl Word {
    pub fn has_args(&self) -> bool {
        self.case_arg_index.iter().any(Option::is_some)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub head: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub id: String,
    pub words: Vec<Word>,
    pub chunks: Vec<Chunk>,
}

impl Sentence {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Predicates with at least one intra-sentential argument.
    pub fn predicates(&self) -> impl Iterator<Item = &Word> {
        self.words.iter().filter(|w| w.is_prd && w.has_args())
    }

    pub fn case_type(&self, prd_index: usize, arg_index: usize) -> CaseType {
        let pc = self.words[prd_index].chunk_index;
        let ac = self.words[arg_index].chunk_index;
        let head = |c: usize| self.chunks.get(c).and_then(|chunk| chunk.head);
        if pc == ac || head(ac) == Some(pc) || head(pc) == Some(ac) {
            CaseType::Dep
        } else {
            CaseType::Zero
        }
    }
}

/// Reads NTC-style documents.
pub struct NtcReader {
    attr_re: Regex,
}

impl NtcReader {
    pub fn new() -> Result<Self, PasaError> {
        Ok(Self {
            attr_re: Regex::new(r#"([A-Za-z_]+)="([^"]*)""#)?,
        })
    }

    pub fn parse(&self, text: &str, path: &Path) -> Result<Vec<Sentence>, PasaError> {
        let mut sentences = Vec::new();
        let mut builder = SentenceBuilder::default();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim_end();
            let err = |message: String| PasaError::Corpus {
                path: path.to_path_buf(),
                line: line_no + 1,
                message,
            };

            if line.is_empty() {
                continue;
            }
            // A word whose surface form is `#` still has tab-separated columns.
            if let Some(rest) = line.strip_prefix('#').filter(|_| !line.contains('\t')) {
                builder.id = parse_sentence_id(rest);
            } else if line == "EOS" {
                let finished = std::mem::take(&mut builder);
                if !finished.words.is_empty() {
                    let index = sentences.len();
                    sentences.push(finished.finish(index));
                }
            } else if let Some(rest) = line.strip_prefix("* ") {
                let chunk = parse_chunk(rest).ok_or_else(|| err(format!("bad chunk header: {:?}", line)))?;
                builder.chunks.push(chunk);
            } else {
                let cols: Vec<&str> = line.split('\t').collect();
                if cols.len() < 2 {
                    return Err(err(format!("word line needs at least 2 columns: {:?}", line)));
                }
                if builder.chunks.is_empty() {
                    builder.chunks.push(Chunk { index: 0, head: None });
                }
                let annotation = cols[cols.len() - 1];
                let word = self.parse_word(builder.words.len(), cols[0], annotation, builder.chunks.len() - 1);
                builder.words.push(word);
            }
        }

        // A trailing sentence without EOS is kept.
        if !builder.words.is_empty() {
            let index = sentences.len();
            sentences.push(builder.finish(index));
        }

        Ok(sentences)
    }

    fn parse_word(&self, index: usize, form: &str, annotation: &str, chunk_index: usize) -> Word {
        let mut word = Word {
            index,
            form: form.to_string(),
            chunk_index,
            arg_id: None,
            is_prd: false,
            case_arg_index: [None; 3],
            case_arg_ids: [None, None, None],
        };
        if annotation == "_" {
            return word;
        }
        for cap in self.attr_re.captures_iter(annotation) {
            let (key, value) = (&cap[1], &cap[2]);
            match key {
                "id" => word.arg_id = Some(value.to_string()),
                "type" => word.is_prd = value == "pred",
                _ => {
                    if let Some(case) = Case::from_key(key) {
                        word.case_arg_ids[case.index()] = Some(value.to_string());
                    }
                }
            }
        }
        word
    }
}

#[derive(Default)]
struct SentenceBuilder {
    id: Option<String>,
    words: Vec<Word>,
    chunks: Vec<Chunk>,
}

impl SentenceBuilder {
    fn finish(mut self, index: usize) -> Sentence {
        let id_to_index: HashMap<String, usize> = self
            .words
            .iter()
            .filter_map(|w| w.arg_id.clone().map(|id| (id, w.index)))
            .collect();

        for word in self.words.iter_mut().filter(|w| w.is_prd) {
            for case in Case::ALL {
                let arg = word.case_arg_ids[case.index()]
                    .as_ref()
                    .and_then(|id| id_to_index.get(id).copied())
                    .filter(|&arg| arg != word.index);
                word.case_arg_index[case.index()] = arg;
            }
        }

        Sentence {
            id: self.id.unwrap_or_else(|| index.to_string()),
            words: self.words,
            chunks: self.chunks,
        }
    }
}

fn parse_sentence_id(rest: &str) -> Option<String> {
    let rest = rest.trim();
    let id = match rest.find("S-ID:") {
        Some(pos) => rest[pos + 5..].split_whitespace().next().unwrap_or(""),
        None => rest,
    };
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn parse_chunk(rest: &str) -> Option<Chunk> {
    let mut fields = rest.split_whitespace();
    let index = fields.next()?.parse::<usize>().ok()?;
    let head_field = fields.next()?;
    let head = head_field
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .parse::<i64>()
        .ok()?;
    let head = usize::try_from(head).ok();
    Some(Chunk { index, head })
}

/// Loads a corpus file, or every file under a directory in path order.
pub fn load_ntc(path: &Path, data_size: Option<usize>) -> Result<Vec<Sentence>> {
    let reader = NtcReader::new()?;
    let mut files: Vec<_> = if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };
    files.sort();

    let mut corpus = Vec::new();
    for file in &files {
        let text = fs::read_to_string(file)
            .with_context(|| format!("Failed to read corpus file: {:?}", file))?;
        let sentences = reader.parse(&text, file)?;
        corpus.extend(sentences);
        if let Some(limit) = data_size {
            if corpus.len() >= limit {
                corpus.truncate(limit);
                break;
            }
        }
    }

    info!("Loaded {} sentences from {} file(s) under {:?}", corpus.len(), files.len(), path);
    Ok(corpus)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const DOC: &str = "\
# S-ID:950101003-001 KNP:96/10/27
* 0 2D
彼	名詞	id=\"1\"
は	助詞	_
* 1 2D
本	名詞	id=\"2\"
を	助詞	_
* 2 -1D
読ん	動詞	type=\"pred\" alt=\"active\" ga=\"1\" o=\"2\" ni=\"9\"
だ	助動詞	_
EOS
# S-ID:950101003-002
* 0 -1D
雨	名詞	_
EOS
";

    pub(crate) fn parse_doc() -> Vec<Sentence> {
        NtcReader::new().unwrap().parse(DOC, Path::new("doc.ntc")).unwrap()
    }

    #[test]
    fn parses_sentences_and_words() {
        let sents = parse_doc();
        assert_eq!(sents.len(), 2);
        assert_eq!(sents[0].id, "950101003-001");
        assert_eq!(sents[0].len(), 6);
        assert_eq!(sents[0].chunks.len(), 3);
        assert_eq!(sents[0].chunks[2].head, None);
        assert_eq!(sents[0].words[2].form, "本");
        assert_eq!(sents[0].words[2].chunk_index, 1);
    }

    #[test]
    fn resolves_intra_sentential_arguments_only() {
        let sents = parse_doc();
        let prd = &sents[0].words[4];
        assert!(prd.is_prd);
        assert_eq!(prd.case_arg_index, [Some(0), Some(2), None]);
        assert_eq!(sents[0].predicates().count(), 1);
        assert_eq!(sents[1].predicates().count(), 0);
    }

    #[test]
    fn classifies_case_types_by_chunk_dependency() {
        let sents = parse_doc();
        // chunk 0 -> chunk 2 (the predicate's chunk)
        assert_eq!(sents[0].case_type(4, 0), CaseType::Dep);

        let mut sent = sents[0].clone();
        sent.chunks[0].head = Some(1);
        assert_eq!(sent.case_type(4, 0), CaseType::Zero);
    }

    #[test]
    fn word_line_without_annotation_is_an_error() {
        let err = NtcReader::new()
            .unwrap()
            .parse("* 0 -1D\nonlyform\nEOS\n", Path::new("x"))
            .unwrap_err();
        assert!(err.to_string().starts_with("x:2:"));
    }

    #[test]
    fn hash_surface_form_is_a_word() {
        let text = "# S-ID:1\n* 0 -1D\n#\t記号\t_\n行く\t動詞\ttype=\"pred\"\nEOS\n";
        let sents = NtcReader::new().unwrap().parse(text, Path::new("x")).unwrap();
        assert_eq!(sents.len(), 1);
        assert_eq!(sents[0].id, "1");
        assert_eq!(sents[0].len(), 2);
        assert_eq!(sents[0].words[0].form, "#");
    }

    #[test]
    fn bad_chunk_header_is_an_error() {
        let result = NtcReader::new().unwrap().parse("* zero 1D\n", Path::new("x"));
        assert!(matches!(result, Err(PasaError::Corpus { line: 1, .. })));
    }

    #[test]
    fn loads_directory_with_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("a.ntc"), DOC).unwrap();
        fs::write(dir.path().join("b.ntc"), DOC).unwrap();
        let all = load_ntc(dir.path(), None).unwrap();
        assert_eq!(all.len(), 4);
        let some = load_ntc(dir.path(), Some(3)).unwrap();
        assert_eq!(some.len(), 3);
    }
}
