//! Offline provider built from keyword rules and token overlap.
//!
//! Deterministic and dependency-free at runtime, so the chat REPL works
//! without network access. Quality is modest; it understands short,
//! direct orders ("2 lattes and a club sandwich with extra bacon, room 412")
//! and numbered or named replies to clarification questions.

use async_trait::async_trait;
use regex::Regex;
use roomservice_dialog::{PendingQuery, QueryKind};
use std::collections::HashSet;
use std::sync::OnceLock;

use super::{
    Intent, IntentClassification, NluError, NluHint, NluProvider, Relatedness,
    ReplyInterpretation, SemanticCandidate,
};
use crate::catalog::Catalog;
use crate::draft::{LineItem, OrderDraft};
use crate::matching::{normalize, similarity};

const MENU_INQUIRY_WORDS: &[&str] = &[
    "menu", "food", "dish", "ingredient", "vegetarian", "vegan", "allergy", "allergen", "spicy",
    "price", "cost", "gluten",
];
const ORDER_ACTION_WORDS: &[&str] = &[
    "send", "bring", "deliver", "get", "want", "order", "place", "have", "like",
];
const MENU_ITEM_WORDS: &[&str] = &[
    "sandwich", "water", "pizza", "salad", "burger", "juice", "pie", "fries", "bottle", "coffee",
    "tea", "latte",
];
const UNSUPPORTED_WORDS: &[&str] = &[
    "cancel", "status", "ready", "check", "track", "change", "modify", "gym", "pool", "spa",
    "housekeeping", "clean", "towel", "towels", "wake-up", "checkout", "wifi", "internet", "parking",
];
const VAGUE_PHRASES: &[&str] = &["something good", "anything", "whatever", "something nice"];

// Ignored when comparing descriptive text.
const CONTEXT_WORDS: &[&str] = &["with", "and", "item", "category", "description"];

const BASE_SCORE: f64 = 0.25;
const BOOST_MULTIPLIER: f64 = 1.2;
const REDUCTION_MULTIPLIER: f64 = 0.5;
const MENU_ITEM_FACTOR: f64 = 0.7;
const MAX_BOOST_SCORE: f64 = 0.99;
const MIN_WINNING_SCORE: f64 = 0.5;

const REMOVE_WORDS: &[&str] = &[
    "remove", "drop", "delete", "skip", "nevermind", "never mind", "forget it", "no thanks",
    "without it", "take it off", "none",
];
const REMOVE_EXACT: &[&str] = &["no", "nope", "nah"];
const YES_WORDS: &[&str] = &["yes", "yeah", "yep", "ok", "okay", "sure", "fine", "sounds good"];
const ORDINALS: &[(&str, usize)] = &[
    ("first", 1),
    ("1st", 1),
    ("second", 2),
    ("2nd", 2),
    ("third", 3),
    ("3rd", 3),
];
const NUMBER_WORDS: &[(&str, u32)] = &[
    ("a", 1),
    ("an", 1),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];
const FILLER_WORDS: &[&str] = &[
    "i", "i'd", "id", "we", "we'd", "like", "want", "can", "could", "would", "get", "me", "us",
    "please", "send", "bring", "have", "order", "to", "some", "of", "the", "up", "also", "and",
    "plus", "for", "may",
];

fn room_pattern() -> Option<&'static Regex> {
    static ROOM: OnceLock<Option<Regex>> = OnceLock::new();
    ROOM.get_or_init(|| {
        Regex::new(r"(?i)\b(?:room|rm)\s*(?:number\s*|no\.?\s*)?#?\s*(\d{1,4})\b").ok()
    })
    .as_ref()
}

fn segment_pattern() -> Option<&'static Regex> {
    static SEGMENT: OnceLock<Option<Regex>> = OnceLock::new();
    SEGMENT
        .get_or_init(|| Regex::new(r"[,;]|\s&\s|\s\+\s").ok())
        .as_ref()
}

/// Keyword and pattern based provider.
#[derive(Debug, Clone, Default)]
pub struct LexicalNlu {
    item_names: Vec<String>,
    vocabulary: HashSet<String>,
}

impl LexicalNlu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Teach the provider the menu's item names.
    pub fn with_catalog(mut self, catalog: &Catalog) -> Self {
        for name in catalog.names() {
            let normalized = normalize(name);
            for token in normalized.split_whitespace() {
                if token.len() > 2 {
                    self.vocabulary.insert(token.to_string());
                }
            }
            self.item_names.push(name.to_string());
        }
        self
    }

    fn mentions_menu_item(&self, tokens: &[&str]) -> bool {
        tokens.iter().any(|t| {
            contains_word(MENU_ITEM_WORDS, t) || self.vocabulary.contains(*t) || {
                let singular = singular(t);
                self.vocabulary.contains(singular.as_str())
            }
        })
    }

    fn score_intents(&self, text: &str) -> IntentClassification {
        let normalized = normalize(text);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let has = |words: &[&str]| tokens.iter().any(|t| contains_word(words, t));

        let mut new_order = BASE_SCORE;
        let mut inquiry = BASE_SCORE;
        let mut unsupported = BASE_SCORE;
        let mut unknown = BASE_SCORE;

        let menu_item = self.mentions_menu_item(&tokens);
        let quantity = tokens.iter().any(|t| parse_quantity(t).is_some() && *t != "a");

        if has(MENU_INQUIRY_WORDS) || normalized.contains("what s") || text.trim_end().ends_with('?') {
            inquiry = boost(inquiry);
        }
        if (has(ORDER_ACTION_WORDS) || quantity) && menu_item {
            new_order = boost(new_order);
            inquiry = (inquiry * REDUCTION_MULTIPLIER).clamp(0.0, 1.0);
        }
        if has(UNSUPPORTED_WORDS) {
            unsupported = boost(unsupported);
            inquiry = (inquiry * REDUCTION_MULTIPLIER).clamp(0.0, 1.0);
        }
        if !menu_item {
            new_order = (new_order * MENU_ITEM_FACTOR).clamp(0.0, 1.0);
        }
        if VAGUE_PHRASES.iter().any(|p| normalized.contains(p)) {
            unknown = boost(unknown);
        }

        // Ties resolve in this order.
        let ranked = [
            (Intent::UnsupportedAction, unsupported),
            (Intent::NewOrder, new_order),
            (Intent::GeneralInquiry, inquiry),
            (Intent::Unknown, unknown),
        ];
        let (intent, score) = ranked
            .iter()
            .copied()
            .fold((Intent::Unknown, f64::MIN), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });
        if score < MIN_WINNING_SCORE {
            IntentClassification::new(Intent::Unknown, 1.0 - score)
        } else {
            IntentClassification::new(intent, score)
        }
    }

    /// Map a singular or plural phrase onto a menu name when one matches exactly.
    fn canonical_name(&self, phrase: &str) -> String {
        let key = normalize(phrase);
        let singular_key = singular_phrase(&key);
        self.item_names
            .iter()
            .find(|name| {
                let name_key = normalize(name);
                name_key == key || name_key == singular_key
            })
            .cloned()
            .unwrap_or_else(|| phrase.to_string())
    }

    fn parse_segment(&self, segment: &str) -> Option<LineItem> {
        let lowered = segment.to_lowercase();
        let (item_part, modifications) = split_modifications(&lowered);
        let tokens: Vec<&str> = item_part.split_whitespace().collect();

        let (quantity, start) = match tokens.iter().position(|t| parse_quantity(t).is_some()) {
            Some(pos) => (parse_quantity(tokens[pos]).unwrap_or(1), pos + 1),
            None => {
                let first_vocab = tokens.iter().position(|t| {
                    self.vocabulary.contains(*t) || self.vocabulary.contains(singular(t).as_str())
                });
                let first_content = tokens.iter().position(|t| !contains_word(FILLER_WORDS, t));
                (1, first_vocab.or(first_content)?)
            }
        };

        let mut words: Vec<&str> = tokens[start..]
            .iter()
            .copied()
            .skip_while(|t| contains_word(&["of", "the"], t))
            .collect();
        while words.last().is_some_and(|t| contains_word(FILLER_WORDS, t)) {
            words.pop();
        }
        if words.is_empty() {
            return None;
        }
        let phrase = words
            .join(" ")
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_string();
        if phrase.is_empty() {
            return None;
        }
        Some(LineItem::new(self.canonical_name(&phrase), quantity).with_modifications(modifications))
    }

    fn extract(&self, text: &str) -> Option<OrderDraft> {
        let mut remaining = text.to_string();
        let mut room_number = None;
        if let Some(pattern) = room_pattern() {
            if let Some(captures) = pattern.captures(text) {
                room_number = captures.get(1).and_then(|m| m.as_str().parse().ok());
                if let Some(whole) = captures.get(0) {
                    remaining.replace_range(whole.range(), " ");
                }
            }
        }

        let pieces: Vec<String> = match segment_pattern() {
            Some(pattern) => pattern.split(&remaining).map(str::to_string).collect(),
            None => vec![remaining],
        };
        let items: Vec<LineItem> = pieces
            .iter()
            .flat_map(|piece| split_on_counted_and(piece))
            .filter_map(|segment| self.parse_segment(&segment))
            .collect();

        if items.is_empty() {
            return None;
        }
        Some(OrderDraft {
            room_number,
            items,
            special_instructions: None,
        })
    }

    fn interpret(&self, query: &PendingQuery, text: &str) -> ReplyInterpretation {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return ReplyInterpretation::unclear();
        }
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let options = query.options();

        if REMOVE_EXACT.contains(&normalized.as_str())
            || REMOVE_WORDS.iter().any(|w| contains_phrase(&normalized, w))
        {
            return ReplyInterpretation::remove(0.9);
        }

        if query.kind() == QueryKind::QuantityAdjustment {
            if let Some(option) = query.find_option(&normalized) {
                return ReplyInterpretation::select(option.label, 0.95);
            }
        } else {
            if let Ok(index) = normalized.parse::<usize>() {
                if let Some(option) = index.checked_sub(1).and_then(|i| options.get(i)) {
                    return ReplyInterpretation::select(option.label.clone(), 0.95);
                }
            }
            for (word, index) in ORDINALS {
                if tokens.contains(word) {
                    if let Some(option) = options.get(index - 1) {
                        return ReplyInterpretation::select(option.label.clone(), 0.9);
                    }
                }
            }
            if let Some(option) = options.iter().find(|o| normalize(&o.label) == normalized) {
                return ReplyInterpretation::select(option.label.clone(), 0.95);
            }
            if let Some(option) = options
                .iter()
                .find(|o| contains_phrase(&normalized, &normalize(&o.label)))
            {
                return ReplyInterpretation::select(option.label.clone(), 0.85);
            }
        }

        let affirmative = YES_WORDS.iter().any(|w| contains_phrase(&normalized, w));
        if affirmative {
            if options.len() == 1 {
                return ReplyInterpretation::select(options[0].label.clone(), 0.8);
            }
            if options.is_empty() {
                // Confirming a removal-only question.
                return ReplyInterpretation::remove(0.85);
            }
        }

        ReplyInterpretation::unclear()
    }
}

#[async_trait]
impl NluProvider for LexicalNlu {
    fn name(&self) -> &str {
        "Lexical"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn classify_intent(
        &self,
        text: &str,
        _hint: &NluHint,
    ) -> Result<IntentClassification, NluError> {
        Ok(self.score_intents(text))
    }

    async fn extract_order(
        &self,
        text: &str,
        _menu_context: &str,
        _hint: &NluHint,
    ) -> Result<Option<OrderDraft>, NluError> {
        Ok(self.extract(text))
    }

    async fn interpret_reply(
        &self,
        query: &PendingQuery,
        text: &str,
        _hint: &NluHint,
    ) -> Result<ReplyInterpretation, NluError> {
        Ok(self.interpret(query, text))
    }

    async fn semantic_search(
        &self,
        query: &str,
        candidates: &[SemanticCandidate],
        _hint: &NluHint,
    ) -> Result<Vec<Relatedness>, NluError> {
        let mut ranked: Vec<Relatedness> = candidates
            .iter()
            .map(|c| Relatedness::new(c.label.clone(), token_overlap(query, &c.text)))
            .filter(|r| r.score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(ranked)
    }
}

fn boost(score: f64) -> f64 {
    (score * BOOST_MULTIPLIER).max(MAX_BOOST_SCORE).clamp(0.0, 1.0)
}

fn contains_word(words: &[&str], token: &str) -> bool {
    words.contains(&token) || {
        let singular = singular(token);
        singular != token && words.contains(&singular.as_str())
    }
}

/// Whole-word phrase containment on normalized text.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let padded = format!(" {} ", haystack);
    padded.contains(&format!(" {} ", phrase))
}

fn parse_quantity(token: &str) -> Option<u32> {
    if let Ok(n) = token.parse::<u32>() {
        return (1..1000).contains(&n).then_some(n);
    }
    NUMBER_WORDS
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, n)| *n)
}

fn singular(token: &str) -> String {
    if token.len() > 4 && token.ends_with("ies") {
        format!("{}y", &token[..token.len() - 3])
    } else if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

fn singular_phrase(phrase: &str) -> String {
    match phrase.rsplit_once(' ') {
        Some((head, last)) => format!("{} {}", head, singular(last)),
        None => singular(phrase),
    }
}

/// Split "x with a and b" / "x without c" into the item part and modifications.
fn split_modifications(segment: &str) -> (String, Vec<String>) {
    let padded = format!(" {} ", segment);
    for (marker, prefix) in [(" without ", "no "), (" with ", "")] {
        if let Some(pos) = padded.find(marker) {
            let item = padded[..pos].trim().to_string();
            let rest = &padded[pos + marker.len()..];
            let modifications = rest
                .split(" and ")
                .flat_map(|part| part.split(" with "))
                .map(|m| trim_trailing_filler(m.trim_matches(|c: char| !c.is_alphanumeric())))
                .filter(|m| !m.is_empty())
                .map(|m| format!("{}{}", prefix, m))
                .collect();
            return (item, modifications);
        }
    }
    (segment.trim().to_string(), Vec::new())
}

fn trim_trailing_filler(text: &str) -> String {
    let mut words: Vec<&str> = text.split_whitespace().collect();
    while words.last().is_some_and(|t| contains_word(FILLER_WORDS, t)) {
        words.pop();
    }
    words.join(" ")
}

/// Split on " and " only where the next word starts a new counted item.
fn split_on_counted_and(piece: &str) -> Vec<String> {
    let words: Vec<&str> = piece.split_whitespace().collect();
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let next_counts = words
            .get(i + 1)
            .map(|n| parse_quantity(&n.to_lowercase()).is_some())
            .unwrap_or(false);
        if word.eq_ignore_ascii_case("and") && next_counts && !current.is_empty() {
            segments.push(current.join(" "));
            current.clear();
        } else {
            current.push(word);
        }
    }
    if !current.is_empty() {
        segments.push(current.join(" "));
    }
    segments
}

fn content_tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .filter(|t| t.len() > 2 && !contains_word(FILLER_WORDS, t) && !contains_word(CONTEXT_WORDS, t))
        .map(singular)
        .collect()
}

/// Share of query tokens that appear (or nearly appear) in the candidate.
fn token_overlap(query: &str, candidate: &str) -> f64 {
    let wanted = content_tokens(query);
    if wanted.is_empty() {
        return 0.0;
    }
    let offered = content_tokens(candidate);
    let hits = wanted
        .iter()
        .filter(|w| offered.iter().any(|o| o == *w || similarity(o, w) > 0.8))
        .count();
    hits as f64 / wanted.len() as f64
}
