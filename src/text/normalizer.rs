//! Cleanup of raw OCR output: control characters, stray symbols, page
//! markers and broken punctuation spacing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::panic::catch_unwind;

/// Standalone page markers: "12", "Page 3", "page 3 of 10", "- Page 4 -", "3/10".
static PAGE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:-\s*)?(?:page\s*)?\d+(?:\s*(?:of|/)\s*\d+)?(?:\s*-)?$")
        .expect("static regex")
});

static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Punctuation kept by the first two allow-list passes.
const PUNCTUATION: &[char] = &[
    '.', ',', ':', ';', '!', '?', '-', '(', ')', '[', ']', '{', '}', '"', '\'', '/', '\\',
];

/// Punctuation kept by the final, strictest pass.
const CORE_PUNCTUATION: &[char] = &['.', ',', ':', ';', '!', '?', '-', '(', ')', '"', '\'', '/'];

const LEADING_STRIP: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '-', '/', '\\'];
const TRAILING_STRIP: &[char] = &[',', ';', ':', '-', '(', '[', '{', '/', '\\'];

/// Upper bound on normalization rounds. Output is normally stable after one
/// or two; later rounds only pick up markers exposed by letter joining.
const MAX_ROUNDS: usize = 8;

/// Normalize raw OCR text. Never fails: if a pass panics the input is
/// returned unchanged.
///
/// Running the result through `normalize` again yields the same string.
pub fn normalize(raw: &str) -> String {
    catch_unwind(|| normalize_to_fixed_point(raw)).unwrap_or_else(|_| {
        tracing::warn!("Text normalization panicked, returning raw text");
        raw.to_string()
    })
}

fn normalize_to_fixed_point(raw: &str) -> String {
    let mut current = normalize_once(raw);
    for _ in 1..MAX_ROUNDS {
        let next = normalize_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn normalize_once(raw: &str) -> String {
    let text = strip_non_printable(raw);
    let text = collapse_whitespace(&text);
    let text = apply_allow_lists(&text);
    let text = space_punctuation(&text);
    let lines: Vec<String> = text.split(['\n', '\r']).filter_map(clean_line).collect();
    finish(&lines.join("\n"))
}

/// Drop control and invisible formatting characters, keeping newline,
/// carriage return and tab.
pub(crate) fn strip_non_printable(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, '\n' | '\r' | '\t') || is_printable(c))
        .collect()
}

fn is_printable(c: char) -> bool {
    !c.is_control()
        && !matches!(
            c,
            '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{2028}'..='\u{202E}' | '\u{2060}' | '\u{FEFF}'
        )
}

/// Horizontal whitespace becomes single spaces; runs of newlines or
/// carriage returns collapse to one of each.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = None;
    for c in text.chars() {
        let c = if c.is_whitespace() && c != '\n' && c != '\r' {
            ' '
        } else {
            c
        };
        if matches!(c, ' ' | '\n' | '\r') && last == Some(c) {
            continue;
        }
        out.push(c);
        last = Some(c);
    }
    out
}

/// Three allow-list passes, each narrower than the one before.
fn apply_allow_lists(text: &str) -> String {
    let passes: [fn(char) -> bool; 3] = [
        // text, any whitespace, known punctuation
        |c| c.is_alphanumeric() || c.is_whitespace() || PUNCTUATION.contains(&c),
        // same, but the only whitespace left is space and line breaks
        |c| c.is_alphanumeric() || matches!(c, ' ' | '\n' | '\r') || PUNCTUATION.contains(&c),
        // letters, ASCII digits, core punctuation; brackets and exotic
        // numerals such as superscripts go
        |c| {
            c.is_alphabetic()
                || c.is_ascii_digit()
                || matches!(c, ' ' | '\n' | '\r')
                || CORE_PUNCTUATION.contains(&c)
        },
    ];

    passes
        .iter()
        .fold(text.to_string(), |acc, keep| acc.chars().filter(|&c| keep(c)).collect())
}

/// No space before `.,;:!?)`, none after `(`, and one space after `.,;!?`
/// when a word follows. Decimal and thousands separators are left alone.
fn space_punctuation(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);

    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let next = chars[i + 1..].iter().find(|&&n| n != ' ');
            if matches!(next, Some('.' | ',' | ';' | ':' | '!' | '?' | ')')) {
                continue;
            }
            if out.ends_with('(') || out.ends_with(' ') {
                continue;
            }
        }

        out.push(c);

        if matches!(c, '.' | ',' | ';' | '!' | '?') {
            if let Some(&next) = chars.get(i + 1) {
                let prev_is_digit = i > 0 && chars[i - 1].is_ascii_digit();
                let separator = matches!(c, '.' | ',') && prev_is_digit && next.is_ascii_digit();
                if next.is_alphanumeric() && !separator {
                    out.push(' ');
                }
            }
        }
    }

    out
}

/// Per-line cleanup. `None` drops the line.
fn clean_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || PAGE_MARKER_RE.is_match(line) {
        return None;
    }

    let line = line
        .trim_start_matches(|c: char| LEADING_STRIP.contains(&c) || c.is_whitespace())
        .trim_end_matches(|c: char| TRAILING_STRIP.contains(&c) || c.is_whitespace());

    let line = collapse_repeated_punctuation(line);
    let line = join_split_letters(&line);

    let mut chars = line.chars();
    let keep = match (chars.next(), chars.next()) {
        (None, _) => false,
        (Some(c), None) => c.is_alphanumeric(),
        _ => true,
    };
    keep.then_some(line)
}

fn collapse_repeated_punctuation(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last = None;
    for c in line.chars() {
        if PUNCTUATION.contains(&c) && last == Some(c) {
            continue;
        }
        out.push(c);
        last = Some(c);
    }
    out
}

/// Rejoin words that recognition split into single letters ("w o r d").
fn join_split_letters(line: &str) -> String {
    let is_letter = |t: &str| {
        let mut chars = t.chars();
        matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
    };

    let mut out = String::with_capacity(line.len());
    let mut prev_letter = false;
    for (i, token) in line.split_whitespace().enumerate() {
        let letter = is_letter(token);
        if i > 0 && !(letter && prev_letter) {
            out.push(' ');
        }
        out.push_str(token);
        prev_letter = letter;
    }
    out
}

fn finish(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    BLANK_LINES_RE
        .replace_all(&text, "\n\n")
        .trim()
        .to_string()
}
