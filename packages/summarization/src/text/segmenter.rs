//! Sentence-bounded text segmentation.
//!
//! Splits long text into chunks that never cut a sentence in half, so a
//! summarization prompt always sees complete statements. Periods that do
//! not end a sentence (abbreviations, decimal numbers, URLs, email
//! addresses) are masked with a placeholder before boundary detection and
//! restored afterwards.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::text::tokens::{normalize_whitespace, CHARS_PER_TOKEN};

// Private-use codepoint standing in for protected periods; never occurs in
// real document text.
const SENTINEL: char = '\u{E000}';
const SENTINEL_STR: &str = "\u{E000}";

/// Abbreviations whose trailing period must not end a sentence.
/// Multi-period entries ("e.g", "a.m") are protected in full.
const PROTECTED_ABBREVIATIONS: &[&str] = &[
    "Dr", "Mr", "Mrs", "Ms", "Prof", "Sr", "Jr", "St", "vs", "etc", "e.g", "i.e", "a.m", "p.m",
    "U.S", "U.K", "Inc", "Ltd", "Co", "Corp", "No", "Vol", "Fig", "approx",
];

static ABBREVIATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = PROTECTED_ABBREVIATIONS
        .iter()
        .map(|abbr| regex::escape(abbr))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\.")).expect("abbreviation pattern is valid")
});

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\.\d").expect("decimal pattern is valid"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://|www\.)\S+").expect("url pattern is valid"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern is valid")
});

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["')\]]*\s+"#).expect("sentence pattern is valid"));

/// Split `text` into whitespace-normalized sentences.
///
/// A sentence ends at a run of `.`/`!`/`?` (plus any closing quotes or
/// brackets) followed by whitespace. Trailing text without terminal
/// punctuation is returned as a final sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let masked = mask_protected(text);
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_END_RE.find_iter(&masked) {
        let sentence = unmask(&masked[start..boundary.end()]);
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }
    let tail = unmask(&masked[start..]);
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Split `text` into sentence-bounded chunks of at most `max_tokens`
/// estimated tokens.
///
/// A single sentence that alone exceeds the budget is emitted as its own
/// oversized chunk; losing a sentence is worse than exceeding the budget.
/// When `overlap_tokens > 0`, each chunk after the first is seeded with a
/// trailing slice of the previous chunk (whole words, roughly
/// `overlap_tokens` worth) as carried-over context. The seed is dropped
/// when keeping it would push the new chunk over budget.
pub fn split_into_chunks(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    // True while `current` holds only carried-over overlap, no new sentence.
    let mut seed_only = true;

    for sentence in sentences {
        let sentence_tokens = sentence.len().div_ceil(CHARS_PER_TOKEN);

        if sentence_tokens > max_tokens {
            if !seed_only && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = overlap_tail(&sentence, overlap_tokens);
            seed_only = true;
            chunks.push(sentence);
            continue;
        }

        let joined_len = if current.is_empty() {
            sentence.len()
        } else {
            current.len() + 1 + sentence.len()
        };
        if joined_len.div_ceil(CHARS_PER_TOKEN) > max_tokens {
            if seed_only {
                // The seed alone already crowds out this sentence.
                current.clear();
            } else {
                let closed = std::mem::take(&mut current);
                current = overlap_tail(&closed, overlap_tokens);
                chunks.push(closed);
                seed_only = true;
                let seeded_len = if current.is_empty() {
                    sentence.len()
                } else {
                    current.len() + 1 + sentence.len()
                };
                if seeded_len.div_ceil(CHARS_PER_TOKEN) > max_tokens {
                    current.clear();
                }
            }
        }

        if current.is_empty() {
            current = sentence;
        } else {
            current.push(' ');
            current.push_str(&sentence);
        }
        seed_only = false;
    }

    if !seed_only && !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn mask_protected(text: &str) -> String {
    let masked = URL_RE.replace_all(text, |caps: &Captures| {
        // Terminal punctuation after a URL belongs to the sentence, not
        // the address.
        let (core, trail) = split_trailing_punct(&caps[0]);
        format!("{}{}", core.replace('.', SENTINEL_STR), trail)
    });
    let masked = EMAIL_RE.replace_all(&masked, |caps: &Captures| {
        caps[0].replace('.', SENTINEL_STR)
    });
    let masked = DECIMAL_RE.replace_all(&masked, |caps: &Captures| {
        caps[0].replace('.', SENTINEL_STR)
    });
    let masked = ABBREVIATION_RE.replace_all(&masked, |caps: &Captures| {
        caps[0].replace('.', SENTINEL_STR)
    });
    masked.into_owned()
}

fn unmask(masked: &str) -> String {
    normalize_whitespace(masked).replace(SENTINEL, ".")
}

fn split_trailing_punct(s: &str) -> (&str, &str) {
    let cut = s
        .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '"', '\''])
        .len();
    s.split_at(cut)
}

/// Trailing whole words of `chunk` totalling at most `overlap_tokens`
/// estimated tokens.
fn overlap_tail(chunk: &str, overlap_tokens: usize) -> String {
    if overlap_tokens == 0 {
        return String::new();
    }
    let budget = overlap_tokens * CHARS_PER_TOKEN;
    let mut picked: Vec<&str> = Vec::new();
    let mut used = 0;
    for word in chunk.split_whitespace().rev() {
        let cost = word.len() + usize::from(!picked.is_empty());
        if used + cost > budget {
            break;
        }
        used += cost;
        picked.push(word);
    }
    picked.reverse();
    picked.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::tokens::estimate_tokens;
    use proptest::prelude::*;

    #[test]
    fn test_abbreviations_do_not_end_sentences() {
        let text = "Dr. Smith visited Washington. He arrived at 3 p.m. yesterday.";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "Dr. Smith visited Washington.",
                "He arrived at 3 p.m. yesterday.",
            ]
        );
    }

    #[test]
    fn test_decimals_survive_intact() {
        let sentences = split_sentences("Prices rose 3.5 percent. Then they fell.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("3.5"));
    }

    #[test]
    fn test_urls_survive_intact() {
        let sentences = split_sentences("Docs live at https://example.com/guide.html. Read them.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("https://example.com/guide.html"));
    }

    #[test]
    fn test_emails_survive_intact() {
        let sentences = split_sentences("Write to dev@example.com. Thanks in advance.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("dev@example.com"));
    }

    #[test]
    fn test_punctuation_runs_and_unterminated_tail() {
        let sentences = split_sentences("Really?! Yes. Fine");
        assert_eq!(sentences, vec!["Really?!", "Yes.", "Fine"]);
    }

    #[test]
    fn test_blank_input() {
        assert!(split_sentences("   \n\t ").is_empty());
        assert!(split_into_chunks("", 10, 0).is_empty());
    }

    #[test]
    fn test_oversized_sentence_passes_through_whole() {
        let sentence = "word ".repeat(60).trim_end().to_string();
        let chunks = split_into_chunks(&sentence, 10, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], sentence);
        assert!(estimate_tokens(&chunks[0]) > 10);
    }

    #[test]
    fn test_chunks_respect_budget() {
        let text = "The quick brown fox jumps. ".repeat(20);
        let chunks = split_into_chunks(&text, 12, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                estimate_tokens(chunk) <= 12,
                "chunk over budget: {chunk:?}"
            );
        }
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let text = "alpha beta gamma delta epsilon zeta. omega psi chi.";
        let chunks = split_into_chunks(text, 10, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "alpha beta gamma delta epsilon zeta.");
        assert!(
            chunks[1].starts_with("zeta."),
            "expected overlap seed, got {:?}",
            chunks[1]
        );
    }

    #[test]
    fn test_no_overlap_reconstructs_content() {
        let text = "One sentence here. Another   follows!\nA third one? Plus a trailing fragment";
        let chunks = split_into_chunks(text, 6, 0);
        assert_eq!(chunks.join(" "), normalize_whitespace(text));
    }

    proptest! {
        // Rejoined chunks lose no content when overlap is off.
        #[test]
        fn prop_chunks_reconstruct(
            // Alphabet avoids words the abbreviation masker would protect.
            sentences in prop::collection::vec("[xyz]{2,8}( [xyz]{2,8}){0,5}\\.", 1..12),
            max_tokens in 4usize..20,
        ) {
            let text = sentences.join(" ");
            let chunks = split_into_chunks(&text, max_tokens, 0);
            prop_assert_eq!(chunks.join(" "), normalize_whitespace(&text));
        }

        // Every chunk fits the budget unless it is a single oversized sentence.
        #[test]
        fn prop_budget_or_single_sentence(
            sentences in prop::collection::vec("[xyz]{2,8}( [xyz]{2,8}){0,8}\\.", 1..12),
            max_tokens in 4usize..20,
        ) {
            let text = sentences.join(" ");
            for chunk in split_into_chunks(&text, max_tokens, 0) {
                let fits = estimate_tokens(&chunk) <= max_tokens;
                let single_sentence = chunk.matches('.').count() <= 1;
                prop_assert!(fits || single_sentence, "chunk {:?}", chunk);
            }
        }
    }
}
