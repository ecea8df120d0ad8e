use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Turns raw text into the ordered sequence of normalized terms the index stores.
///
/// The index and the query path must share one normalizer, otherwise query terms
/// will not line up with indexed terms.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> Vec<String>;
}

impl<F> Normalizer for F
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn normalize(&self, text: &str) -> Vec<String> {
        self(text)
    }
}

/// NFKC + lowercase + word extraction, then optional stopword removal and stemming.
pub struct TextNormalizer {
    stemmer: Option<Stemmer>,
    stopwords: Option<HashSet<String>>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::english()
    }
}

impl TextNormalizer {
    /// English stopwords and the English Snowball stemmer.
    pub fn english() -> Self {
        Self {
            stemmer: Some(Stemmer::create(Algorithm::English)),
            stopwords: Some(ENGLISH_STOPWORDS.iter().map(|w| w.to_string()).collect()),
        }
    }

    /// Lowercased words only.
    pub fn plain() -> Self {
        Self { stemmer: None, stopwords: None }
    }

    pub fn with_stemmer(mut self, algorithm: Option<Algorithm>) -> Self {
        self.stemmer = algorithm.map(Stemmer::create);
        self
    }

    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stopwords = Some(words.into_iter().map(Into::into).collect());
        self
    }

    pub fn without_stopwords(mut self) -> Self {
        self.stopwords = None;
        self
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.as_ref().is_some_and(|s| s.contains(token))
    }
}

/// Which stages of [`TextNormalizer::english`] a snapshot was built with. Stored in
/// `meta.json` so queries are normalized the same way as the indexed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerSettings {
    pub stem: bool,
    pub stopwords: bool,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self { stem: true, stopwords: true }
    }
}

impl NormalizerSettings {
    pub fn normalizer(&self) -> TextNormalizer {
        let mut n = TextNormalizer::english();
        if !self.stem {
            n = n.with_stemmer(None);
        }
        if !self.stopwords {
            n = n.without_stopwords();
        }
        n
    }
}

impl Normalizer for TextNormalizer {
    fn normalize(&self, text: &str) -> Vec<String> {
        let folded = text.nfkc().collect::<String>().to_lowercase();
        WORD.find_iter(&folded)
            .map(|m| m.as_str())
            .filter(|token| !self.is_stopword(token))
            .map(|token| match &self.stemmer {
                Some(stemmer) => stemmer.stem(token).into_owned(),
                None => token.to_string(),
            })
            .filter(|token| !token.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_normalizer_stems() {
        let t = TextNormalizer::english().normalize("Running, runner's run!");
        assert!(t.iter().any(|w| w == "run"));
    }

    #[test]
    fn plain_keeps_stopwords_and_inflection() {
        let t = TextNormalizer::plain().normalize("The Running dogs");
        assert_eq!(t, vec!["the", "running", "dogs"]);
    }

    #[test]
    fn digits_and_punctuation_are_dropped() {
        let t = TextNormalizer::plain().normalize("CO2 levels, 2024: rising!");
        assert_eq!(t, vec!["co2", "levels", "rising"]);
    }

    #[test]
    fn custom_stopwords_without_stemming() {
        let n = TextNormalizer::plain().with_stopwords(["dan", "yang"]);
        assert_eq!(n.normalize("energi dan iklim yang berubah"), vec!["energi", "iklim", "berubah"]);
        let n = TextNormalizer::english().with_stemmer(None).without_stopwords();
        assert_eq!(n.normalize("the runners"), vec!["the", "runners"]);
    }

    #[test]
    fn settings_rebuild_the_matching_normalizer() {
        let text = "The rivers are warming";
        assert_eq!(NormalizerSettings::default().normalizer().normalize(text), TextNormalizer::english().normalize(text));
        let unstemmed = NormalizerSettings { stem: false, stopwords: true }.normalizer();
        assert_eq!(unstemmed.normalize(text), vec!["rivers", "warming"]);
        let everything = NormalizerSettings { stem: false, stopwords: false }.normalizer();
        assert_eq!(everything.normalize(text), vec!["the", "rivers", "are", "warming"]);
    }

    #[test]
    fn closures_are_normalizers() {
        let ws = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(ws.normalize("a b"), vec!["a", "b"]);
    }
}
