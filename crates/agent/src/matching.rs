//! Text matching shared by extraction, dispatch and selection: identifier
//! shapes, ordinals, and tolerant name lookup.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email regex")
});

static HEX_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{32}\b").expect("valid hex id regex"));

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:number|no\.?|option|#)\s*)?(\d{1,2})(?:st|nd|rd|th)?(?:\s+one)?$")
        .expect("valid ordinal regex")
});

const ORDINAL_WORDS: [(&str, usize); 10] = [
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
];

/// Lowercases and collapses everything but letters, digits and `@.-_` into single spaces.
pub fn normalize(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || matches!(character, '@' | '.' | '-' | '_') {
            normalized.extend(character.to_lowercase());
        } else {
            normalized.push(' ');
        }
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn find_email(text: &str) -> Option<&str> {
    EMAIL_RE.find(text).map(|found| found.as_str().trim_end_matches('.'))
}

pub fn is_email(text: &str) -> bool {
    find_email(text.trim()).is_some_and(|found| found.len() == text.trim().len())
}

pub fn find_hex_ids(text: &str) -> Vec<&str> {
    HEX_ID_RE.find_iter(text).map(|found| found.as_str()).collect()
}

/// 32 hex characters: an internal backend id, never a human-facing name.
pub fn is_hex_id(text: &str) -> bool {
    let text = text.trim();
    text.len() == 32 && text.chars().all(|character| character.is_ascii_hexdigit())
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Zero-based position named by `text` ("2", "#2", "2nd", "second", "the last one").
pub fn parse_ordinal(text: &str, len: usize) -> Option<usize> {
    let normalized = normalize(text).replace('#', " ");
    let trimmed = normalized
        .trim_start_matches("the ")
        .trim_end_matches(" please")
        .trim_end_matches(" one")
        .trim();

    let position = if let Some(captures) = ORDINAL_RE.captures(trimmed) {
        captures.get(1).and_then(|digits| digits.as_str().parse::<usize>().ok())
    } else if trimmed == "last" {
        Some(len)
    } else {
        ORDINAL_WORDS.iter().find(|(word, _)| *word == trimmed).map(|(_, position)| *position)
    }?;

    (1..=len).contains(&position).then(|| position - 1)
}

/// Indices of `names` that match `query`, best tier only: exact, then
/// containment in either direction, then edit distance within `max_distance`.
pub fn match_names<S: AsRef<str>>(query: &str, names: &[S], max_distance: usize) -> Vec<usize> {
    let query = normalize(query);
    if query.is_empty() {
        return Vec::new();
    }
    let normalized: Vec<String> = names.iter().map(|name| normalize(name.as_ref())).collect();

    let exact: Vec<usize> = positions(&normalized, |name| *name == query);
    if !exact.is_empty() {
        return exact;
    }

    let contained: Vec<usize> =
        positions(&normalized, |name| name.contains(&query) || query.contains(name.as_str()));
    if !contained.is_empty() {
        return contained;
    }

    let distances: Vec<usize> =
        normalized.iter().map(|name| strsim::levenshtein(name, &query)).collect();
    let Some(best) = distances.iter().copied().filter(|distance| *distance <= max_distance).min()
    else {
        return Vec::new();
    };
    positions(&distances, |distance| *distance == best)
}

/// A known name mentioned somewhere inside a longer utterance, tolerating typos.
pub fn find_known_name<S: AsRef<str>>(
    utterance: &str,
    names: &[S],
    max_distance: usize,
) -> Option<usize> {
    let text = normalize(utterance);
    let words: Vec<&str> = text.split(' ').collect();

    let mut best: Option<(usize, usize)> = None;
    let mut tied = false;
    for (index, name) in names.iter().enumerate() {
        let name = normalize(name.as_ref());
        if name.is_empty() {
            continue;
        }
        let distance = if text.contains(&name) {
            0
        } else {
            let width = word_count(&name);
            if width > words.len() {
                continue;
            }
            words
                .windows(width)
                .map(|window| strsim::levenshtein(&window.join(" "), &name))
                .min()
                .unwrap_or(usize::MAX)
        };
        if distance > max_distance {
            continue;
        }
        match best {
            Some((_, current)) if distance > current => {}
            Some((_, current)) if distance == current => tied = true,
            _ => {
                best = Some((index, distance));
                tied = false;
            }
        }
    }

    best.filter(|_| !tied).map(|(index, _)| index)
}

fn positions<T>(items: &[T], predicate: impl Fn(&T) -> bool) -> Vec<usize> {
    items.iter().enumerate().filter(|(_, item)| predicate(item)).map(|(index, _)| index).collect()
}

#[cfg(test)]
mod tests {
    use super::{
        find_email, find_hex_ids, find_known_name, is_email, is_hex_id, match_names, normalize,
        parse_ordinal,
    };

    const EXAMS: [&str; 3] =
        ["Serengeti Practice Exam", "Serengeti Certification", "Biology Midterm"];

    #[test]
    fn normalize_keeps_identifier_punctuation() {
        assert_eq!(normalize("  Show ME  ana.lima@example.com!! "), "show me ana.lima@example.com");
    }

    #[test]
    fn detects_identifier_shapes() {
        assert_eq!(find_email("my id is a@b.com."), Some("a@b.com"));
        assert!(is_email("ana.lima@example.com"));
        assert!(!is_email("email ana.lima@example.com"));
        assert!(is_hex_id("0123456789abcdef0123456789ABCDEF"));
        assert!(!is_hex_id("0123456789abcdef"));
        assert_eq!(find_hex_ids("attempt 0123456789abcdef0123456789abcdef please").len(), 1);
    }

    #[test]
    fn ordinals_resolve_within_bounds() {
        assert_eq!(parse_ordinal("2", 3), Some(1));
        assert_eq!(parse_ordinal("#3", 3), Some(2));
        assert_eq!(parse_ordinal("the second one", 3), Some(1));
        assert_eq!(parse_ordinal("1st", 3), Some(0));
        assert_eq!(parse_ordinal("last", 3), Some(2));
        assert_eq!(parse_ordinal("4", 3), None);
        assert_eq!(parse_ordinal("0", 3), None);
        assert_eq!(parse_ordinal("biology", 3), None);
    }

    #[test]
    fn name_matching_prefers_the_tightest_tier() {
        assert_eq!(match_names("serengeti certification", &EXAMS, 3), vec![1]);
        assert_eq!(match_names("serengeti", &EXAMS, 3), vec![0, 1]);
        assert_eq!(match_names("Biology Midtrem", &EXAMS, 3), vec![2]);
        assert!(match_names("chemistry", &EXAMS, 3).is_empty());
    }

    #[test]
    fn known_names_are_found_inside_sentences() {
        assert_eq!(find_known_name("schedule the biology midterm for ana", &EXAMS, 2), Some(2));
        assert_eq!(find_known_name("results for serengeti certifcation", &EXAMS, 2), Some(1));
        assert_eq!(find_known_name("list everything", &EXAMS, 2), None);
    }
}
