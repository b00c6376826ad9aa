use std::collections::HashSet;

/// Canonical form of a market title: lower-cased, only `a-z`, `0-9` and single
/// spaces, no leading or trailing whitespace.
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Jaccard similarity of the word sets of two titles, in `[0, 1]`.
///
/// Titles that normalize to the same string score exactly 1, including two
/// empty titles. Repeated words count once.
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);

    if norm_a == norm_b {
        return 1.0;
    }

    let words_a: HashSet<&str> = norm_a.split_whitespace().collect();
    let words_b: HashSet<&str> = norm_b.split_whitespace().collect();

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    // union > 0 here: at least one side is non-empty once the titles differ.
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize("  Hello, World!! "), "hello world");
        assert_eq!(normalize("Will BTC\thit\n$100k?"), "will btc hit 100k");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("?!..."), "");
    }

    #[test]
    fn normalize_drops_non_ascii_letters() {
        assert_eq!(normalize("Pokémon Série"), "pokmon srie");
    }

    #[test]
    fn identical_titles_score_one() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("Fed cuts rates", "Fed cuts rates"), 1.0);
        assert_eq!(similarity("FED cuts rates!", "fed  cuts rates"), 1.0);
    }

    #[test]
    fn partial_overlap_is_strictly_between_zero_and_one() {
        let s = similarity("will the fed cut rates", "fed rate cut decision");
        assert!(s > 0.0 && s < 1.0, "similarity={s}");
        // {fed, cut} over {will, the, fed, cut, rates, rate, decision}
        assert!((s - 2.0 / 7.0).abs() < 1e-12, "similarity={s}");
    }

    #[test]
    fn disjoint_titles_score_zero() {
        assert_eq!(similarity("apples", "oranges"), 0.0);
        assert_eq!(similarity("", "oranges"), 0.0);
    }

    #[test]
    fn repeated_words_count_once() {
        assert_eq!(similarity("yes yes yes no", "yes no"), 1.0);
        let s = similarity("trump trump wins", "trump loses");
        assert!((s - 1.0 / 3.0).abs() < 1e-12, "similarity={s}");
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("Will X happen", "X occurs?"),
            ("Bitcoin above 100k in 2025", "BTC > 100k by end of 2025"),
            ("", "anything"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a:?} vs {b:?}");
        }
    }
}
