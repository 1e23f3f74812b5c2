//! Prompt templates with named `{slot}` placeholders.

use std::collections::HashMap;

use crate::error::TemplateError;
use crate::models::RequestKind;

const EXPLAIN_TEMPLATE: &str = "\
You are a patient study assistant. Explain the concept below in plain, clear language,
using examples and analogies an undergraduate student would follow.

QUESTION:
{question}

Additional context (may be empty):
{context}

Give a clear, easy-to-follow explanation.
";

const SUMMARIZE_TEMPLATE: &str = "\
Summarize these notes as short bullet points. Cover the key topics, definitions,
formulas and important ideas.

NOTES:
{notes}
";

const QUIZ_TEMPLATE: &str = "\
Write {count} multiple-choice questions based on the content below.

CONTENT:
{content}

Difficulty: {difficulty}

For each question include:
- four options labelled A, B, C and D
- the correct answer
- a one-line explanation

Format the questions so they are ready to use in an exam.
";

const RAG_ANSWER_TEMPLATE: &str = "\
You are a tutor. Answer the question using ONLY the notes below.

NOTES:
{context}

QUESTION:
{question}

Give a clear, accurate answer and point to the relevant note lines where it helps.
";

/// A prompt with named `{slot}` placeholders. `{{` and `}}` are literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self, TemplateError> {
        let template = Self { text: text.into() };
        template.slot_names()?;
        Ok(template)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Slot names in order of first appearance.
    pub fn slot_names(&self) -> Result<Vec<String>, TemplateError> {
        let mut names: Vec<String> = Vec::new();
        for piece in Pieces::new(&self.text) {
            if let Piece::Slot(name) = piece? {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Substitute every slot in a single pass.
    ///
    /// Values are inserted verbatim and never rescanned, so braces inside a
    /// value are left alone. Every slot must have a value; extra values are
    /// ignored.
    pub fn fill(&self, values: &[(&str, String)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.text.len());
        for piece in Pieces::new(&self.text) {
            match piece? {
                Piece::Literal(s) => out.push_str(s),
                Piece::Slot(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| TemplateError::MissingSlot(name.to_string()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

enum Piece<'a> {
    Literal(&'a str),
    Slot(&'a str),
}

struct Pieces<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Pieces<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Pieces<'a> {
    type Item = Result<Piece<'a>, TemplateError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }

        if rest.starts_with("{{") {
            self.pos += 2;
            return Some(Ok(Piece::Literal("{")));
        }
        if rest.starts_with("}}") {
            self.pos += 2;
            return Some(Ok(Piece::Literal("}")));
        }
        if rest.starts_with('{') {
            let start = self.pos;
            return match rest.find('}') {
                Some(close) => {
                    self.pos += close + 1;
                    Some(Ok(Piece::Slot(rest[1..close].trim())))
                }
                None => {
                    self.pos = self.text.len();
                    Some(Err(TemplateError::Unterminated(start)))
                }
            };
        }

        let len = rest.find(['{', '}']).unwrap_or(rest.len());
        // A lone '}' is kept as text.
        let len = if len == 0 { 1 } else { len };
        self.pos += len;
        Some(Ok(Piece::Literal(&rest[..len])))
    }
}

/// Maps each request kind to its prompt template.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    templates: HashMap<RequestKind, PromptTemplate>,
}

impl PromptRegistry {
    /// Registry holding the built-in study-assistant prompts.
    pub fn builtin() -> Self {
        let templates = [
            (RequestKind::Explain, EXPLAIN_TEMPLATE),
            (RequestKind::Summarize, SUMMARIZE_TEMPLATE),
            (RequestKind::Quiz, QUIZ_TEMPLATE),
            (RequestKind::RagAnswer, RAG_ANSWER_TEMPLATE),
        ]
        .into_iter()
        .map(|(kind, text)| {
            (
                kind,
                PromptTemplate {
                    text: text.to_string(),
                },
            )
        })
        .collect();
        Self { templates }
    }

    pub fn get(&self, kind: RequestKind) -> Option<&PromptTemplate> {
        self.templates.get(&kind)
    }

    /// Replace the template for `kind`.
    pub fn register(&mut self, kind: RequestKind, template: PromptTemplate) {
        self.templates.insert(kind, template);
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, RequestParams};

    #[test]
    fn test_fill_slots() {
        let t = PromptTemplate::new("Q: {question}\nC: {context}").unwrap();
        let out = t
            .fill(&[("question", "What is entropy?".into()), ("context", "".into())])
            .unwrap();
        assert_eq!(out, "Q: What is entropy?\nC: ");
    }

    #[test]
    fn test_missing_slot_is_error() {
        let t = PromptTemplate::new("{notes}").unwrap();
        assert_eq!(
            t.fill(&[("question", "x".into())]),
            Err(TemplateError::MissingSlot("notes".to_string()))
        );
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let t = PromptTemplate::new("{a}|{b}").unwrap();
        let out = t
            .fill(&[("a", "{b}".into()), ("b", "set {x}".into())])
            .unwrap();
        assert_eq!(out, "{b}|set {x}");
    }

    #[test]
    fn test_escaped_braces() {
        let t = PromptTemplate::new("json: {{\"k\": {v}}} }").unwrap();
        assert_eq!(t.slot_names().unwrap(), vec!["v"]);
        assert_eq!(t.fill(&[("v", "1".into())]).unwrap(), "json: {\"k\": 1} }");
    }

    #[test]
    fn test_unterminated_slot() {
        assert_eq!(
            PromptTemplate::new("hello {name"),
            Err(TemplateError::Unterminated(6))
        );
    }

    #[test]
    fn test_builtin_templates_match_request_slots() {
        let registry = PromptRegistry::builtin();
        let samples = [
            RequestParams::explain("What is a cell?"),
            RequestParams::summarize("notes"),
            RequestParams::quiz("content", 3, Difficulty::Hard),
            RequestParams::rag_answer("q", "ctx"),
        ];

        for params in samples {
            let template = registry.get(params.kind()).unwrap();
            let mut expected: Vec<String> =
                params.slots().iter().map(|(k, _)| k.to_string()).collect();
            let mut actual = template.slot_names().unwrap();
            expected.sort();
            actual.sort();
            assert_eq!(actual, expected, "slots for {}", params.kind());
            assert!(template.fill(&params.slots()).is_ok());
        }
    }

    #[test]
    fn test_quiz_prompt_contents() {
        let registry = PromptRegistry::builtin();
        let params = RequestParams::quiz("Newton's laws", 5, Difficulty::Easy);
        let prompt = registry
            .get(RequestKind::Quiz)
            .unwrap()
            .fill(&params.slots())
            .unwrap();
        assert!(prompt.contains("Write 5 multiple-choice questions"));
        assert!(prompt.contains("Difficulty: easy"));
        assert!(prompt.contains("Newton's laws"));
    }
}
