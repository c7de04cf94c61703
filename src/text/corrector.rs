//! Heuristic repair of normalized OCR text.

use crate::config::CorrectionPasses;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::normalizer::strip_non_printable;

static SPACE_BEFORE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([.,;:!?])").expect("static regex"));
static MISSING_SPACE_AFTER_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.,;!?])(\p{L})").expect("static regex"));
/// Title glued to a name: "MrSmith" becomes "Mr Smith". Only an uppercase
/// follower splits, so words that merely start with a title ("Drake",
/// "Street", "Professor", "Msg") are left whole.
static TITLE_ABBREVIATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(Mrs|Mr|Ms|Dr|Prof|St)(\p{Lu})").expect("static regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    MultiChar,
    SingleChar,
}

/// A literal substring substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorrectionRule {
    pub pattern: &'static str,
    pub replacement: &'static str,
    pub scope: RuleScope,
}

const fn multi(pattern: &'static str, replacement: &'static str) -> CorrectionRule {
    CorrectionRule {
        pattern,
        replacement,
        scope: RuleScope::MultiChar,
    }
}

const fn single(pattern: &'static str, replacement: &'static str) -> CorrectionRule {
    CorrectionRule {
        pattern,
        replacement,
        scope: RuleScope::SingleChar,
    }
}

/// The default rule table. Multi-character rules run first, then
/// single-character rules, each group in the order listed here.
///
/// `0 -> O` followed by `O -> 0` leaves every `O` and `0` as `0`. The pair is
/// kept as declared; disable `char_rules` to skip it.
pub static CORRECTION_RULES: &[CorrectionRule] = &[
    multi("\u{FB00}", "ff"),
    multi("\u{FB01}", "fi"),
    multi("\u{FB02}", "fl"),
    multi("\u{FB03}", "ffi"),
    multi("\u{FB04}", "ffl"),
    multi(" tbe ", " the "),
    multi("Tbe ", "The "),
    multi(" tlie ", " the "),
    multi(" teh ", " the "),
    multi(" adn ", " and "),
    multi(" wlth ", " with "),
    multi("''", "\""),
    multi(",,", ","),
    single("|", "I"),
    single("\u{2018}", "'"),
    single("\u{2019}", "'"),
    single("\u{201C}", "\""),
    single("\u{201D}", "\""),
    single("0", "O"),
    single("O", "0"),
];

/// Function words that may legitimately repeat back to back.
const REPEATABLE_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Fixed phrase repairs, applied after everything else has settled.
const DOMAIN_PHRASES: &[(&str, &str)] = &[
    ("e. g.", "e.g."),
    ("i. e.", "i.e."),
    ("a. m.", "a.m."),
    ("p. m.", "p.m."),
    ("U. S.", "U.S."),
    ("Ph. D.", "Ph.D."),
];

#[derive(Debug, Clone)]
pub struct TextCorrector {
    rules: Vec<CorrectionRule>,
    passes: CorrectionPasses,
}

impl Default for TextCorrector {
    fn default() -> Self {
        Self::new(CorrectionPasses::default())
    }
}

impl TextCorrector {
    pub fn new(passes: CorrectionPasses) -> Self {
        Self::with_rules(CORRECTION_RULES.to_vec(), passes)
    }

    /// Use a custom rule table. Declaration order is preserved within each scope.
    pub fn with_rules(rules: Vec<CorrectionRule>, passes: CorrectionPasses) -> Self {
        Self { rules, passes }
    }

    pub fn rules(&self) -> &[CorrectionRule] {
        &self.rules
    }

    /// Correct normalized text. Never fails: a panicking pass yields the
    /// input unchanged.
    pub fn correct(&self, text: &str) -> String {
        catch_unwind(AssertUnwindSafe(|| self.correct_inner(text))).unwrap_or_else(|_| {
            tracing::warn!("Text correction panicked, returning input");
            text.to_string()
        })
    }

    fn correct_inner(&self, text: &str) -> String {
        let mut text = text.to_string();

        if self.passes.rule_table {
            text = self.apply_rules(&text, RuleScope::MultiChar);
        }
        if self.passes.char_rules {
            text = self.apply_rules(&text, RuleScope::SingleChar);
        }
        if self.passes.spacing {
            text = collapse_letter_gaps(&text);
            text = SPACE_BEFORE_PUNCT_RE.replace_all(&text, "$1").into_owned();
            text = MISSING_SPACE_AFTER_PUNCT_RE
                .replace_all(&text, "$1 $2")
                .into_owned();
            text = TITLE_ABBREVIATION_RE
                .replace_all(&text, "$1 $2")
                .into_owned();
        }
        if self.passes.duplicate_words {
            text = text
                .split('\n')
                .map(remove_duplicate_words)
                .collect::<Vec<_>>()
                .join("\n");
        }

        text = strip_non_printable(&text)
            .replace("\r\n", "\n")
            .replace('\r', "\n");
        text = BLANK_LINES_RE.replace_all(&text, "\n\n").into_owned();

        if self.passes.domain_phrases {
            for (pattern, replacement) in DOMAIN_PHRASES {
                text = text.replace(pattern, replacement);
            }
        }
        if self.passes.sentence_closing && needs_closing_period(&text) {
            text.push('.');
        }

        text
    }

    fn apply_rules(&self, text: &str, scope: RuleScope) -> String {
        self.rules
            .iter()
            .filter(|rule| rule.scope == scope && !rule.pattern.is_empty())
            .fold(text.to_string(), |acc, rule| {
                acc.replace(rule.pattern, rule.replacement)
            })
    }
}

/// Runs of two or more spaces between letters become one space.
fn collapse_letter_gaps(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ' ' {
            let run_end = chars[i..]
                .iter()
                .position(|&n| n != ' ')
                .map_or(chars.len(), |p| i + p);
            let run = run_end - i;
            let between_letters = i > 0
                && chars[i - 1].is_alphabetic()
                && chars.get(run_end).is_some_and(|n| n.is_alphabetic());
            let keep = if run >= 2 && between_letters { 1 } else { run };
            out.extend(std::iter::repeat(' ').take(keep));
            i = run_end;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Case-folded token with surrounding punctuation removed.
fn word_form(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Drop a token that repeats either of the two previously kept words.
/// Common function words may follow themselves directly.
fn remove_duplicate_words(line: &str) -> String {
    let mut kept: Vec<(String, String)> = Vec::new();

    for token in line.split(' ') {
        let form = word_form(token);
        if form.is_empty() {
            kept.push((token.to_string(), form));
            continue;
        }

        let mut recent = kept.iter().rev().filter(|(_, f)| !f.is_empty()).map(|(_, f)| f);
        let prev = recent.next();
        let prev2 = recent.next();

        let repeats_prev = prev == Some(&form) && !REPEATABLE_WORDS.contains(&form.as_str());
        let repeats_prev2 = prev2 == Some(&form);

        if repeats_prev || repeats_prev2 {
            // Keep sentence punctuation that was attached to the dropped word
            let suffix: String = token
                .chars()
                .rev()
                .take_while(|c| !c.is_alphanumeric())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            if let Some((last, _)) = kept.last_mut() {
                if !suffix.is_empty() && last.ends_with(|c: char| c.is_alphanumeric()) {
                    last.push_str(&suffix);
                }
            }
            continue;
        }

        kept.push((token.to_string(), form));
    }

    kept.into_iter()
        .map(|(token, _)| token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn needs_closing_period(text: &str) -> bool {
    let word_count = text.split_whitespace().count();
    let Some(last) = text.chars().last() else {
        return false;
    };
    if word_count <= 3 || !last.is_alphanumeric() {
        return false;
    }

    let segments: Vec<&str> = text.split(". ").filter(|s| !s.trim().is_empty()).collect();
    segments.len() > 1 || segments.first().is_some_and(|s| s.split_whitespace().count() > 5)
}
