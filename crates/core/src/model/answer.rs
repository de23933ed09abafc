use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::ids::QuestionId;

//
// ─── ANSWER ────────────────────────────────────────────────────────────────────
//

/// A recorded answer. Shape follows the question type: checkboxes produce a
/// list, everything else a single string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Multiple(Vec<String>),
}

impl Answer {
    #[must_use]
    pub fn single(value: impl Into<String>) -> Self {
        Self::Single(value.into())
    }

    #[must_use]
    pub fn multiple<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multiple(values.into_iter().map(Into::into).collect())
    }

    /// True when the answer carries nothing the user actually entered.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Answer::Single(value) => value.trim().is_empty(),
            Answer::Multiple(values) => values.is_empty(),
        }
    }

    /// Exact match. A list matches when any selected option matches.
    #[must_use]
    pub fn equals(&self, expected: &str) -> bool {
        match self {
            Answer::Single(value) => value == expected,
            Answer::Multiple(values) => values.iter().any(|v| v == expected),
        }
    }

    /// Substring match. A list matches when any selected option contains it.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            Answer::Single(value) => value.contains(needle),
            Answer::Multiple(values) => values.iter().any(|v| v.contains(needle)),
        }
    }
}

//
// ─── RESPONSES ─────────────────────────────────────────────────────────────────
//

/// Latest answer per question. Re-answering overwrites; nothing is ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Responses(BTreeMap<QuestionId, Answer>);

impl Responses {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `answer`, returning the value it replaced.
    pub fn record(&mut self, question_id: QuestionId, answer: Answer) -> Option<Answer> {
        self.0.insert(question_id, answer)
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&Answer> {
        self.0.get(question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &Answer)> {
        self.0.iter()
    }
}

//
// ─── VARIABLES ─────────────────────────────────────────────────────────────────
//

/// Named integer accumulators driven by `add_variable` actions.
///
/// Missing variables read as zero, matching how branching rules treat a
/// variable nobody has touched yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, i64>);

impl Variables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> i64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    /// Adds `amount` to `name` and returns the new value.
    pub fn add(&mut self, name: &str, amount: i64) -> i64 {
        let slot = self.0.entry(name.to_owned()).or_insert(0);
        *slot = slot.saturating_add(amount);
        *slot
    }

    /// Overwrites every variable present in `other`; others are kept.
    pub fn merge(&mut self, other: &Variables) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), *value);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for Variables {
    fn from_iter<T: IntoIterator<Item = (K, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // The server hands back PHP-encoded maps where numbers are sometimes
        // strings. Entries that are not numeric at all are dropped.
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .filter_map(|(name, value)| lenient_i64(&value).map(|v| (name, v)))
                .collect(),
        ))
    }
}

/// Reads an integer from a JSON number or numeric string.
pub(crate) fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn re_answering_overwrites() {
        let mut responses = Responses::new();
        responses.record(QuestionId::new("q1"), Answer::single("a"));
        let previous = responses.record(QuestionId::new("q1"), Answer::single("b"));

        assert_eq!(previous, Some(Answer::single("a")));
        assert_eq!(responses.len(), 1);
        assert_eq!(
            responses.get(&QuestionId::new("q1")),
            Some(&Answer::single("b"))
        );
    }

    #[test]
    fn multiple_answer_matching() {
        let answer = Answer::multiple(["red", "dark blue"]);
        assert!(answer.equals("red"));
        assert!(!answer.equals("blue"));
        assert!(answer.contains("blue"));
        assert!(!Answer::multiple(Vec::<String>::new()).equals(""));
    }

    #[test]
    fn blank_answers() {
        assert!(Answer::single("   ").is_blank());
        assert!(Answer::Multiple(Vec::new()).is_blank());
        assert!(!Answer::single("x").is_blank());
    }

    #[test]
    fn variables_default_to_zero_and_accumulate() {
        let mut vars = Variables::new();
        assert_eq!(vars.get("score"), 0);
        vars.add("score", 2);
        assert_eq!(vars.add("score", 3), 5);
    }

    #[test]
    fn merge_keeps_untouched_keys() {
        let mut vars: Variables = [("score", 1), ("bonus", 4)].into_iter().collect();
        let server: Variables = [("score", 10)].into_iter().collect();
        vars.merge(&server);
        assert_eq!(vars.get("score"), 10);
        assert_eq!(vars.get("bonus"), 4);
    }

    #[test]
    fn variables_decode_numeric_strings() {
        let vars: Variables =
            serde_json::from_value(json!({"score": "7", "level": 2, "junk": "abc"})).unwrap();
        assert_eq!(vars.get("score"), 7);
        assert_eq!(vars.get("level"), 2);
        assert_eq!(vars.iter().count(), 2);
    }

    #[test]
    fn answer_shape_follows_json() {
        let single: Answer = serde_json::from_value(json!("yes")).unwrap();
        let multiple: Answer = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(single, Answer::single("yes"));
        assert_eq!(multiple, Answer::multiple(["a", "b"]));
    }
}
