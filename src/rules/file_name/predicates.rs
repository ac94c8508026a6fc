use chrono::Datelike;

/// Earliest year accepted as a release year.
pub const MIN_YEAR: i32 = 1900;

/// Four digits between [`MIN_YEAR`] and next year, inclusive.
pub fn is_plausible_year(candidate: &str) -> bool {
    if candidate.len() != 4 {
        return false;
    }
    let max = chrono::Local::now().year() + 1;
    candidate.parse::<i32>().is_ok_and(|year| (MIN_YEAR..=max).contains(&year))
}

/// At least two words, all of them alphabetic.
pub fn is_title(candidate: &str) -> bool {
    let mut words = 0;
    for word in candidate.split_whitespace() {
        if !word.chars().all(|c| c.is_ascii_alphabetic()) {
            return false;
        }
        words += 1;
    }
    words >= 2
}

/// Lower-cased alphanumeric words of `text`.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Every word of `candidate` occurs in `known` (case-insensitive).
pub fn all_words_known(known: &[String], candidate: &str) -> bool {
    let mut found = false;
    for word in candidate.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()) {
        if !known.iter().any(|k| k.eq_ignore_ascii_case(word)) {
            return false;
        }
        found = true;
    }
    found
}
