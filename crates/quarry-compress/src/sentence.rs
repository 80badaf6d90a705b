use quarry_core::SentenceSpan;

/// Words that end in a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "e.g", "i.e", "cf", "fig", "al",
    "approx", "dept", "inc", "ltd",
];

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// True if the word before a period is an abbreviation or a single-letter initial.
fn ends_with_abbreviation(prefix: &str) -> bool {
    let Some(word) = prefix.split_whitespace().last() else {
        return false;
    };
    let word = word
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    let mut chars = word.chars();
    let single_letter =
        matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic());
    single_letter || ABBREVIATIONS.contains(&word.as_str())
}

/// Split text into sentence spans (byte ranges into `text`, whitespace trimmed).
///
/// A sentence ends at `.`, `!` or `?` (plus any trailing closing quotes or
/// brackets) followed by whitespace and a character that is not lowercase, or
/// at a blank line. Periods after common abbreviations and single-letter
/// initials do not end a sentence. Text without terminal punctuation is one
/// sentence.
pub fn split_sentences(text: &str) -> Vec<SentenceSpan> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];

        if c == '\n' && chars.get(i + 1).is_some_and(|(_, next)| *next == '\n') {
            push_trimmed(text, start, pos, &mut spans);
            start = pos;
            i += 2;
            continue;
        }

        if !is_terminal(c) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && (is_terminal(chars[j].1) || is_closing(chars[j].1)) {
            j += 1;
        }
        let end = chars.get(j).map_or(text.len(), |(p, _)| *p);
        let followed_by_space = chars.get(j).is_none_or(|(_, ch)| ch.is_whitespace());
        let continues_lowercase = chars[j..]
            .iter()
            .find(|(_, ch)| !ch.is_whitespace())
            .is_some_and(|(_, ch)| ch.is_lowercase());
        let abbreviation = c == '.' && j == i + 1 && ends_with_abbreviation(&text[start..pos]);

        if followed_by_space && !continues_lowercase && !abbreviation {
            push_trimmed(text, start, end, &mut spans);
            start = end;
        }
        i = j;
    }

    push_trimmed(text, start, text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<SentenceSpan>) {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        let s = start + leading;
        spans.push(SentenceSpan::new(s, s + trimmed.len()));
    }
}
