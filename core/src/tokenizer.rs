use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

use crate::Token;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref ENGLISH: HashSet<&'static str> = {
        // Contractions are listed by the fragments they split into.
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could","couldn",
            "d","did","didn","do","does","doesn","doing","don","down","during",
            "each","few","for","from","further",
            "had","hadn","has","hasn","have","haven","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","isn","it","its","itself",
            "let","ll","m","me","more","most","mustn","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "re","s","same","shan","she","should","shouldn","so","some","such",
            "t","than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","wasn","we","were","weren","what","when","where","which","while","who","whom","why","with","would","wouldn",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Stopword set applied by the analyzer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopwordProfile {
    #[default]
    English,
    /// Keep every fragment.
    Empty,
}

impl StopwordProfile {
    pub fn is_stopword(self, token: &str) -> bool {
        match self {
            StopwordProfile::English => ENGLISH.contains(token),
            StopwordProfile::Empty => false,
        }
    }
}

/// Analyze text with the English stopword profile.
pub fn analyze(text: &str) -> Vec<Token> {
    analyze_with(text, StopwordProfile::English)
}

/// Split NFKC-normalized text into lowercase letter/digit runs and drop stopwords.
///
/// Repeated words stay repeated in the output; callers that need a set dedupe themselves.
pub fn analyze_with(text: &str, profile: StopwordProfile) -> Vec<Token> {
    let normalized = text.nfkc().collect::<String>();
    RE.find_iter(&normalized)
        .map(|m| m.as_str().to_lowercase())
        .filter(|token| !profile.is_stopword(token))
        .collect()
}
