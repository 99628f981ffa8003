//! Edit distances over Unicode scalar values.
use termdb_core::options::DistanceAlgorithm;

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() { return b.len(); }
    if b.is_empty() { return a.len(); }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Optimal string alignment distance: insertions, deletions, substitutions
/// and transpositions of adjacent characters, no substring edited twice.
pub fn damerau(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 { return m; }
    if m == 0 { return n; }
    let mut d = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in d.iter_mut().enumerate() { row[0] = i; }
    for (j, cell) in d[0].iter_mut().enumerate() { *cell = j; }
    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[i - 2][j - 2] + 1);
            }
            d[i][j] = best;
        }
    }
    d[n][m]
}

/// Levenshtein, except that two equal-length strings differing only by one
/// swap of adjacent characters are at distance 1.
pub fn fast(a: &str, b: &str) -> usize {
    if is_single_swap(a, b) { 1 } else { levenshtein(a, b) }
}

fn is_single_swap(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len() != b.len() { return false; }
    let diff: Vec<usize> = (0..a.len()).filter(|&i| a[i] != b[i]).collect();
    matches!(diff.as_slice(), [i, j] if *j == i + 1 && a[*i] == b[*j] && a[*j] == b[*i])
}

pub fn distance(algorithm: DistanceAlgorithm, a: &str, b: &str) -> usize {
    match algorithm {
        DistanceAlgorithm::Fast => fast(a, b),
        DistanceAlgorithm::Damerau => damerau(a, b),
    }
}

/// `(1 - d / maxLen) * 100`; two empty strings are identical.
pub fn similarity(d: usize, a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 { return 100.0; }
    (1.0 - d as f64 / max_len as f64) * 100.0
}
