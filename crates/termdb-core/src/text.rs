//! Title normalization shared by index build and query.
//!
//! Build and query must go through [`tokenize`]; any divergence between the
//! two silently breaks shard-key matching.

/// English stop words dropped before phrase pairs are formed.
pub const STOP_WORDS: &[&str] = &[
    "a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercases, splits digit/letter runs apart and strips everything that is
/// not a letter, digit or whitespace. Words are separated by single spaces.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

pub fn tokenize(text: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            spaced.push(' ');
            prev = None;
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if let Some(p) = prev {
            if p.is_numeric() != c.is_numeric() {
                spaced.push(' ');
            }
        }
        spaced.push(c);
        prev = Some(c);
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

/// Tokens with stop words removed, in original order.
pub fn content_words<S: AsRef<str>>(words: &[S]) -> Vec<&str> {
    words.iter().map(AsRef::as_ref).filter(|w| !is_stop_word(w)).collect()
}

pub fn is_numeric(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

/// `"007"` → `"7"`, `"000"` → `"0"`.
pub fn strip_leading_zeros(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() && !digits.is_empty() { "0" } else { trimmed }
}

/// First `n` characters of `s` (char based, never splits a code point).
pub fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
