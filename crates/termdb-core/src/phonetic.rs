//! Metaphone encoding used to bucket words that sound alike.
//!
//! Codes are only used for sharding, never for scoring, so the encoder
//! favors stability over linguistic completeness. Non-ASCII letters are
//! ignored.

fn is_vowel(c: u8) -> bool {
    matches!(c, b'A' | b'E' | b'I' | b'O' | b'U')
}

/// `E`, `I`, `Y` soften a preceding `C` or `G`.
fn makes_soft(c: u8) -> bool {
    matches!(c, b'E' | b'I' | b'Y')
}

/// Letters after which an `H` is silent.
fn affects_h(c: u8) -> bool {
    matches!(c, b'C' | b'G' | b'P' | b'S' | b'T')
}

/// Encodes a single word. Returns an empty string when the word has no ASCII letters.
pub fn metaphone(word: &str) -> String {
    let w: Vec<u8> = word.bytes().filter(u8::is_ascii_alphabetic).map(|b| b.to_ascii_uppercase()).collect();
    let mut code = String::with_capacity(w.len());
    if w.is_empty() {
        return code;
    }
    let at = |i: usize| -> u8 { w.get(i).copied().unwrap_or(0) };

    let mut i = 0;
    match (at(0), at(1)) {
        (b'A', b'E') => { code.push('E'); i = 2; }
        (b'G' | b'K' | b'P', b'N') => { code.push('N'); i = 2; }
        (b'W', b'R') => { code.push('R'); i = 2; }
        (b'W', b'H') => { code.push('W'); i = 2; }
        (b'X', _) => { code.push('S'); i = 1; }
        (c, _) if is_vowel(c) => { code.push(c as char); i = 1; }
        _ => {}
    }

    while i < w.len() {
        let c = w[i];
        let prev = if i > 0 { at(i - 1) } else { 0 };
        let next = at(i + 1);
        let after = at(i + 2);
        let mut skip = 0;

        if c == prev && c != b'C' {
            i += 1;
            continue;
        }

        match c {
            b'A' | b'E' | b'I' | b'O' | b'U' => {}
            b'B' => {
                if !(prev == b'M' && i + 1 == w.len()) { code.push('B'); }
            }
            b'C' => {
                if makes_soft(next) {
                    if next == b'I' && after == b'A' {
                        code.push('X');
                    } else if prev != b'S' {
                        code.push('S');
                    }
                } else if next == b'H' {
                    code.push(if after == b'R' || prev == b'S' { 'K' } else { 'X' });
                    skip = 1;
                } else {
                    code.push('K');
                }
            }
            b'D' => {
                if next == b'G' && makes_soft(after) {
                    code.push('J');
                    skip = 1;
                } else {
                    code.push('T');
                }
            }
            b'G' => {
                if next == b'H' {
                    // silent, as in "night"
                } else if next == b'N' {
                    let rest_is_ned = after == b'E' && at(i + 3) == b'D' && i + 4 == w.len();
                    if !(i + 2 == w.len() || rest_is_ned) { code.push('K'); }
                } else if makes_soft(next) && prev != b'G' {
                    code.push('J');
                } else {
                    code.push('K');
                }
            }
            b'H' => {
                if is_vowel(next) && !affects_h(prev) { code.push('H'); }
            }
            b'K' => {
                if prev != b'C' { code.push('K'); }
            }
            b'P' => code.push(if next == b'H' { 'F' } else { 'P' }),
            b'Q' => code.push('K'),
            b'S' => {
                if next == b'I' && (after == b'O' || after == b'A') {
                    code.push('X');
                } else if next == b'H' {
                    code.push('X');
                    skip = 1;
                } else {
                    code.push('S');
                }
            }
            b'T' => {
                if next == b'I' && (after == b'O' || after == b'A') {
                    code.push('X');
                } else if next == b'H' {
                    code.push('0');
                    skip = 1;
                } else if !(next == b'C' && after == b'H') {
                    code.push('T');
                }
            }
            b'V' => code.push('F'),
            b'W' | b'Y' => {
                if is_vowel(next) { code.push(c as char); }
            }
            b'X' => code.push_str("KS"),
            b'Z' => code.push('S'),
            other => code.push(other as char),
        }
        i += 1 + skip;
    }
    code
}

/// Phrase code: word codes concatenated in sorted word order, so the code of
/// a pair does not depend on the order the words appear in.
pub fn phrase_code<S: AsRef<str>>(words: &[S]) -> String {
    let mut sorted: Vec<&str> = words.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.into_iter().map(metaphone).collect()
}
