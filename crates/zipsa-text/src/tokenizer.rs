//! Keyword tokenizer for the sparse index.
//!
//! Text is segmented into tagged morphemes, content morphemes (nouns, verbs,
//! adjectives, roots) are kept, stopwords dropped and synonym aliases
//! replaced by their canonical form. The output is the space-joined token
//! stream stored in `tokenized_text` and used as the keyword query.
//!
//! Segmentation is dictionary driven: domain terms (breed names, proper
//! nouns) are matched longest-first, across word boundaries for multi-word
//! terms, and emitted as a single token with inner whitespace removed.
//! Hangul words not covered by the dictionary are split into stem and
//! trailing particle or ending with fixed suffix tables. Latin words are
//! lowercased and Snowball-stemmed.

use anyhow::{Context, Result};
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Part-of-speech tag of one morpheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Noun,
    ProperNoun,
    Verb,
    Adjective,
    Root,
    Particle,
    Ending,
    Number,
}

impl Tag {
    /// Content tags survive into the keyword stream.
    pub fn is_content(self) -> bool {
        matches!(self, Tag::Noun | Tag::ProperNoun | Tag::Verb | Tag::Adjective | Tag::Root)
    }

    /// Parse the Sejong-style tags used in the dictionary file.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "NNG" | "NNB" | "NR" | "NP" => Some(Tag::Noun),
            "NNP" => Some(Tag::ProperNoun),
            "VV" | "VX" => Some(Tag::Verb),
            "VA" => Some(Tag::Adjective),
            "XR" => Some(Tag::Root),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morpheme {
    pub form: String,
    pub tag: Tag,
}

impl Morpheme {
    fn new(form: impl Into<String>, tag: Tag) -> Self {
        Self { form: form.into(), tag }
    }
}

// Longest first so that e.g. "에서는" wins over "는".
const PARTICLES: &[&str] = &[
    "에서부터", "으로부터", "에게서", "에서는", "으로는", "까지는", "에서도", "이라고", "이라는", "한테서",
    "에서", "에게", "한테", "으로", "부터", "까지", "처럼", "보다", "이나", "이랑", "라고", "라는", "마다", "조차",
    "은", "는", "이", "가", "을", "를", "에", "의", "도", "만", "와", "과", "로", "랑", "께",
];

const HADA_SUFFIXES: &[&str] = &[
    "했습니다", "합니다", "했어요", "할까요", "했나요", "하나요", "한가요", "하면서", "하지만", "했는데", "하는데", "해서", "해요", "했다", "하다", "하는",
    "하게", "하고", "하지", "하면", "하며", "하니", "할", "한", "함", "해",
];

const PREDICATE_ENDINGS: &[&str] = &[
    "었습니다", "았습니다", "습니다", "었어요", "았어요", "였어요", "으면서", "는데요", "어서", "아서", "어요", "아요",
    "지만", "는데", "면서", "으면", "었다", "았다", "였다", "겠다", "세요", "니다", "나요", "거나", "기에", "다",
];

/// Immutable tokenizer resources: domain dictionary, stopwords, synonyms.
///
/// Built once and shared behind an `Arc`; reloading means building a new one.
#[derive(Debug, Clone, Default)]
pub struct TokenizerConfig {
    dictionary: HashMap<String, Tag>,
    longest_term_chars: usize,
    max_term_words: usize,
    stopwords: HashSet<String>,
    synonyms: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ResourcePaths<'a> {
    pub dictionary: Option<&'a Path>,
    pub stopwords: Option<&'a Path>,
    pub synonyms: Option<&'a Path>,
}

impl TokenizerConfig {
    /// Base segmentation only: no domain terms, no filtering, no replacement.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new<D, S, Y>(dictionary: D, stopwords: S, synonyms: Y) -> Self
    where
        D: IntoIterator<Item = (String, Tag)>,
        S: IntoIterator<Item = String>,
        Y: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut config = Self::default();
        for (term, tag) in dictionary {
            config.add_term(&term, tag);
        }
        config.stopwords = stopwords.into_iter().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect();
        for (canonical, aliases) in synonyms {
            let canonical = compact(&canonical.to_lowercase());
            for alias in aliases {
                let alias_key = compact(&alias.to_lowercase());
                if alias_key.is_empty() || alias_key == canonical { continue; }
                // Aliases must segment as one token to be replaceable.
                config.dictionary.entry(alias_key.clone()).or_insert(Tag::Noun);
                config.note_term_shape(&alias);
                config.synonyms.insert(alias_key, canonical.clone());
            }
        }
        config
    }

    /// Load resources from disk. A missing or unreadable file is logged and
    /// treated as empty; this never fails.
    pub fn load(paths: &ResourcePaths<'_>) -> Self {
        let dictionary = paths.dictionary.and_then(|p| load_or_warn("dictionary", p, read_dictionary)).unwrap_or_default();
        let stopwords = paths.stopwords.and_then(|p| load_or_warn("stopwords", p, read_stopwords)).unwrap_or_default();
        let synonyms = paths.synonyms.and_then(|p| load_or_warn("synonyms", p, read_synonyms)).unwrap_or_default();
        let config = Self::new(dictionary, stopwords, synonyms);
        debug!(
            terms = config.dictionary.len(),
            stopwords = config.stopwords.len(),
            synonyms = config.synonyms.len(),
            "tokenizer resources loaded"
        );
        config
    }

    pub fn term_count(&self) -> usize { self.dictionary.len() }

    fn add_term(&mut self, term: &str, tag: Tag) {
        let key = compact(&term.to_lowercase());
        if key.is_empty() { return; }
        self.note_term_shape(term);
        self.dictionary.insert(key, tag);
    }

    fn note_term_shape(&mut self, term: &str) {
        self.longest_term_chars = self.longest_term_chars.max(compact(term).chars().count());
        self.max_term_words = self.max_term_words.max(term.split_whitespace().count());
    }

    /// Longest dictionary term that is a prefix of `s`, as (term, tag).
    fn longest_prefix<'s>(&self, s: &'s str) -> Option<(&'s str, Tag)> {
        let mut ends: Vec<usize> = s.char_indices().map(|(i, c)| i + c.len_utf8()).take(self.longest_term_chars).collect();
        ends.reverse();
        ends.into_iter().find_map(|end| self.dictionary.get(&s[..end]).map(|tag| (&s[..end], *tag)))
    }
}

fn load_or_warn<T>(what: &str, path: &Path, read: fn(&Path) -> Result<T>) -> Option<T> {
    match read(path) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(resource = what, path = %path.display(), error = %e, "tokenizer resource unavailable; continuing without it");
            None
        }
    }
}

/// `term<TAB>TAG` per line; `#` starts a comment; a missing tag means `NNG`.
pub fn parse_dictionary(text: &str) -> Vec<(String, Tag)> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| {
            let mut parts = line.splitn(2, '\t');
            let term = parts.next().unwrap_or_default().trim().to_string();
            let tag = parts.next().and_then(Tag::from_code).unwrap_or(Tag::Noun);
            (term, tag)
        })
        .filter(|(term, _)| !term.is_empty())
        .collect()
}

fn read_dictionary(path: &Path) -> Result<Vec<(String, Tag)>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_dictionary(&text))
}

fn read_stopwords(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')).map(String::from).collect())
}

fn read_synonyms(path: &Path) -> Result<Vec<(String, Vec<String>)>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let table: std::collections::BTreeMap<String, Vec<String>> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(table.into_iter().collect())
}

fn compact(s: &str) -> String {
    s.split_whitespace().collect()
}

fn is_hangul(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c) || ('\u{3131}'..='\u{318E}').contains(&c)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Script {
    Hangul,
    Latin,
    Digit,
    Other,
}

fn script_of(c: char) -> Script {
    if is_hangul(c) {
        Script::Hangul
    } else if c.is_ascii_digit() || c.is_numeric() {
        Script::Digit
    } else if c.is_alphabetic() && c.is_ascii() || ('\u{00C0}'..='\u{024F}').contains(&c) {
        Script::Latin
    } else {
        Script::Other
    }
}

/// Split a word where the script changes ("CT촬영" → "ct", "촬영").
fn script_runs(word: &str) -> Vec<(Script, &str)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<Script> = None;
    for (i, c) in word.char_indices() {
        let s = script_of(c);
        match current {
            Some(prev) if prev != s => {
                runs.push((prev, &word[start..i]));
                start = i;
                current = Some(s);
            }
            None => current = Some(s),
            _ => {}
        }
    }
    if let Some(s) = current {
        runs.push((s, &word[start..]));
    }
    runs
}

pub struct Tokenizer {
    config: Arc<TokenizerConfig>,
    stemmer: Stemmer,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").field("terms", &self.config.term_count()).finish()
    }
}

impl Tokenizer {
    pub fn new(config: Arc<TokenizerConfig>) -> Self {
        Self { config, stemmer: Stemmer::create(Algorithm::English) }
    }

    pub fn config(&self) -> &Arc<TokenizerConfig> { &self.config }

    /// Keyword stream for `text`: content morphemes, stopwords removed,
    /// synonyms canonicalized, joined by single spaces.
    pub fn tokenize(&self, text: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        for m in self.segment(text) {
            if !m.tag.is_content() || self.config.stopwords.contains(&m.form) {
                continue;
            }
            let form = self.config.synonyms.get(&m.form).cloned().unwrap_or(m.form);
            out.push(form);
        }
        out.join(" ")
    }

    /// Tagged morphemes in text order.
    pub fn segment(&self, text: &str) -> Vec<Morpheme> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered.unicode_words().collect();
        let mut out = Vec::new();
        let mut i = 0;
        while i < words.len() {
            if let Some(consumed) = self.match_multiword(&words[i..], &mut out) {
                i += consumed;
                continue;
            }
            self.analyze_word(words[i], &mut out);
            i += 1;
        }
        out
    }

    /// Match a dictionary term spanning two or more words. Returns the number
    /// of words consumed.
    fn match_multiword(&self, words: &[&str], out: &mut Vec<Morpheme>) -> Option<usize> {
        let max = self.config.max_term_words.min(words.len());
        for n in (2..=max).rev() {
            let head: String = words[..n - 1].concat();
            let joined = format!("{}{}", head, words[n - 1]);
            let Some((term, tag)) = self.config.longest_prefix(&joined) else { continue };
            if term.len() <= head.len() {
                continue;
            }
            let rest = &joined[term.len()..];
            if rest.is_empty() {
                out.push(Morpheme::new(term, tag));
                return Some(n);
            }
            if PARTICLES.contains(&rest) || PREDICATE_ENDINGS.contains(&rest) {
                out.push(Morpheme::new(term, tag));
                out.push(Morpheme::new(rest, if PARTICLES.contains(&rest) { Tag::Particle } else { Tag::Ending }));
                return Some(n);
            }
        }
        None
    }

    fn analyze_word(&self, word: &str, out: &mut Vec<Morpheme>) {
        for (script, run) in script_runs(word) {
            match script {
                Script::Digit => out.push(Morpheme::new(run, Tag::Number)),
                Script::Latin => match self.config.dictionary.get(run) {
                    Some(tag) => out.push(Morpheme::new(run, *tag)),
                    None => out.push(Morpheme::new(self.stemmer.stem(run).into_owned(), Tag::Noun)),
                },
                Script::Hangul => self.analyze_hangul(run, out),
                Script::Other => {
                    if let Some(tag) = self.config.dictionary.get(run) {
                        out.push(Morpheme::new(run, *tag));
                    }
                }
            }
        }
    }

    fn analyze_hangul(&self, run: &str, out: &mut Vec<Morpheme>) {
        if run.is_empty() {
            return;
        }
        if let Some((term, tag)) = self.config.longest_prefix(run) {
            out.push(Morpheme::new(term, tag));
            let rest = &run[term.len()..];
            if rest.is_empty() {
                return;
            }
            if PARTICLES.contains(&rest) {
                out.push(Morpheme::new(rest, Tag::Particle));
            } else if HADA_SUFFIXES.contains(&rest) || PREDICATE_ENDINGS.contains(&rest) {
                // term + 하다 derivation: the term already carries the meaning
                out.push(Morpheme::new(rest, Tag::Ending));
            } else {
                self.analyze_hangul(rest, out);
            }
            return;
        }
        if let Some(stem) = strip_any(run, HADA_SUFFIXES).filter(|s| !s.is_empty()) {
            out.push(Morpheme::new(stem, Tag::Root));
            out.push(Morpheme::new(&run[stem.len()..], Tag::Ending));
            return;
        }
        if let Some(stem) = strip_any(run, PREDICATE_ENDINGS).filter(|s| !s.is_empty()) {
            // lemma form, so "알려주세요" meets the stopword "알려주다"
            out.push(Morpheme::new(format!("{stem}다"), self.predicate_tag(stem)));
            out.push(Morpheme::new(&run[stem.len()..], Tag::Ending));
            return;
        }
        if let Some(stem) = self.strip_particle(run) {
            out.push(Morpheme::new(stem, Tag::Noun));
            out.push(Morpheme::new(&run[stem.len()..], Tag::Particle));
            return;
        }
        out.push(Morpheme::new(run, Tag::Noun));
    }

    /// Stem left by the longest particle that can plausibly follow it.
    ///
    /// One-syllable particles collide with the last syllable of many nouns
    /// (사과, 포도, 아이), so they are only split off a dictionary term or a
    /// stem of two or more syllables whose final consonant fits the particle.
    fn strip_particle<'a>(&self, word: &'a str) -> Option<&'a str> {
        PARTICLES
            .iter()
            .filter_map(|p| word.strip_suffix(p).map(|stem| (stem, *p)))
            .filter(|(stem, _)| !stem.is_empty())
            .filter(|(stem, p)| {
                p.chars().count() > 1
                    || self.config.dictionary.contains_key(*stem)
                    || (stem.chars().count() >= 2 && particle_fits(stem, p))
            })
            .max_by_key(|(_, p)| p.len())
            .map(|(stem, _)| stem)
    }

    fn predicate_tag(&self, stem: &str) -> Tag {
        match self.config.dictionary.get(&format!("{stem}다")) {
            Some(Tag::Adjective) => Tag::Adjective,
            _ => Tag::Verb,
        }
    }
}

/// Strip the longest matching suffix, returning the remaining stem.
fn strip_any<'a>(word: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes
        .iter()
        .filter_map(|s| word.strip_suffix(s))
        .max_by_key(|stem| std::cmp::Reverse(stem.len()))
}

/// Paired particles pick their form by whether the preceding syllable ends
/// in a consonant: 이/가, 을/를, 은/는, 과/와, 이랑/랑, and 로 after a vowel or ㄹ.
fn particle_fits(stem: &str, particle: &str) -> bool {
    let coda = stem.chars().last().and_then(final_consonant);
    match particle {
        "이" | "을" | "은" | "과" => coda.is_some(),
        "가" | "를" | "는" | "와" | "랑" => coda.is_none(),
        "로" => matches!(coda, None | Some(RIEUL)),
        _ => true,
    }
}

const RIEUL: u32 = 8;

/// Index of the final consonant (jongseong) of a precomposed syllable.
fn final_consonant(c: char) -> Option<u32> {
    let code = u32::from(c);
    if !(0xAC00..=0xD7A3).contains(&code) {
        return None;
    }
    Some((code - 0xAC00) % 28).filter(|j| *j != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_tokenizer() -> Tokenizer {
        let dictionary = parse_dictionary(
            "# breeds and care terms\n고양이\tNNG\n브리티시 숏헤어\tNNP\n털빠짐\tNNG\n사료\tNNG\n알레르기\tNNG\n조용하다\tVA\n작다\tVA\n",
        );
        let stopwords = vec!["것".to_string(), "추천".to_string(), "알려주다".to_string()];
        let synonyms = vec![("고양이".to_string(), vec!["냥이".to_string(), "야옹이".to_string()])];
        Tokenizer::new(Arc::new(TokenizerConfig::new(dictionary, stopwords, synonyms)))
    }

    #[test]
    fn empty_and_blank_input_yield_empty_output() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize(""), "");
        assert_eq!(t.tokenize("   \n\t "), "");
        assert_eq!(t.tokenize("?!..."), "");
    }

    #[test]
    fn particles_and_punctuation_are_dropped() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize("고양이는 사료를!"), "고양이 사료");
    }

    #[test]
    fn multiword_domain_terms_stay_whole() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize("브리티시 숏헤어는 털빠짐이 심한가요?"), "브리티시숏헤어 털빠짐 심");
    }

    #[test]
    fn synonyms_are_canonicalized() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize("냥이 사료"), "고양이 사료");
        assert_eq!(t.tokenize("야옹이가"), "고양이");
    }

    #[test]
    fn stopwords_are_removed() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize("사료 추천"), "사료");
    }

    #[test]
    fn hada_derivations_reduce_to_roots() {
        let t = domain_tokenizer();
        let morphemes = t.segment("활발한");
        assert_eq!(morphemes[0], Morpheme::new("활발", Tag::Root));
        assert_eq!(t.tokenize("활발한 고양이"), "활발 고양이");
    }

    #[test]
    fn predicates_are_emitted_as_lemmas() {
        let t = domain_tokenizer();
        assert_eq!(t.segment("먹어요"), vec![Morpheme::new("먹다", Tag::Verb), Morpheme::new("어요", Tag::Ending)]);
        assert_eq!(t.segment("작아요")[0], Morpheme::new("작다", Tag::Adjective));
    }

    #[test]
    fn conjugated_stopword_verbs_are_dropped() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize("사료 추천 알려주세요"), "사료");
    }

    #[test]
    fn nouns_ending_in_particle_syllables_stay_whole() {
        let t = Tokenizer::new(Arc::new(TokenizerConfig::empty()));
        assert_eq!(t.tokenize("사과 포도 바나나 아이"), "사과 포도 바나나 아이");
        assert_eq!(t.tokenize("고양이 사과"), "고양 사과");
    }

    #[test]
    fn particles_still_split_from_unknown_nouns() {
        let t = Tokenizer::new(Arc::new(TokenizerConfig::empty()));
        assert_eq!(t.tokenize("장난감이 간식을 사료가 치즈를 집사에게"), "장난감 간식 사료 치즈 집사");
    }

    #[test]
    fn particle_form_follows_the_final_consonant() {
        assert!(particle_fits("장난감", "이"));
        assert!(!particle_fits("사료", "이"));
        assert!(particle_fits("사료", "가"));
        assert!(particle_fits("연필", "로"));
        assert!(!particle_fits("간식", "로"));
    }

    #[test]
    fn latin_words_are_lowercased_and_stemmed() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize("Cats grooming"), "cat groom");
        assert_eq!(t.tokenize("CT촬영"), "ct 촬영");
    }

    #[test]
    fn numbers_are_dropped() {
        let t = domain_tokenizer();
        assert_eq!(t.tokenize("3살 고양이"), "살 고양이");
    }

    #[test]
    fn tokenization_is_deterministic() {
        let t = domain_tokenizer();
        let text = "브리티시 숏헤어 냥이는 알레르기가 있는 집사에게 괜찮을까요?";
        assert_eq!(t.tokenize(text), t.tokenize(text));
    }

    #[test]
    fn missing_resources_degrade_to_base_segmentation() {
        let config = TokenizerConfig::load(&ResourcePaths {
            dictionary: Some(Path::new("/nonexistent/dict.txt")),
            stopwords: Some(Path::new("/nonexistent/stop.txt")),
            synonyms: Some(Path::new("/nonexistent/syn.json")),
        });
        assert_eq!(config.term_count(), 0);
        let t = Tokenizer::new(Arc::new(config));
        assert_eq!(t.tokenize("사료 추천"), "사료 추천");
    }

    #[test]
    fn dictionary_tags_parse() {
        let parsed = parse_dictionary("메인쿤\tNNP\n먹다\tVV\n무명\n\n# c\n");
        assert_eq!(parsed, vec![
                ("메인쿤".to_string(), Tag::ProperNoun),
                ("먹다".to_string(), Tag::Verb),
                ("무명".to_string(), Tag::Noun),
            ]);
    }
}
