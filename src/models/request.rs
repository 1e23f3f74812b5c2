//! Generation requests and their responses.

use serde::{Deserialize, Serialize};

/// The kind of generation request, each bound to one prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Explain,
    Summarize,
    Quiz,
    RagAnswer,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [
        RequestKind::Explain,
        RequestKind::Summarize,
        RequestKind::Quiz,
        RequestKind::RagAnswer,
    ];
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Explain => write!(f, "explain"),
            RequestKind::Summarize => write!(f, "summarize"),
            RequestKind::Quiz => write!(f, "quiz"),
            RequestKind::RagAnswer => write!(f, "rag_answer"),
        }
    }
}

/// Quiz difficulty level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!(
                "unknown difficulty: {} (expected easy, medium, or hard)",
                s
            )),
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// Parameters of a request. The variant determines the request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestParams {
    Explain {
        question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    Summarize {
        notes: String,
    },
    Quiz {
        content: String,
        count: u32,
        difficulty: Difficulty,
    },
    RagAnswer {
        question: String,
        context: String,
    },
}

impl RequestParams {
    pub fn explain(question: impl Into<String>) -> Self {
        RequestParams::Explain {
            question: question.into(),
            context: None,
        }
    }

    pub fn summarize(notes: impl Into<String>) -> Self {
        RequestParams::Summarize {
            notes: notes.into(),
        }
    }

    pub fn quiz(content: impl Into<String>, count: u32, difficulty: Difficulty) -> Self {
        RequestParams::Quiz {
            content: content.into(),
            count,
            difficulty,
        }
    }

    pub fn rag_answer(question: impl Into<String>, context: impl Into<String>) -> Self {
        RequestParams::RagAnswer {
            question: question.into(),
            context: context.into(),
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            RequestParams::Explain { .. } => RequestKind::Explain,
            RequestParams::Summarize { .. } => RequestKind::Summarize,
            RequestParams::Quiz { .. } => RequestKind::Quiz,
            RequestParams::RagAnswer { .. } => RequestKind::RagAnswer,
        }
    }

    /// Check the parameter constraints that the type system does not enforce.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RequestParams::Explain { question, .. } | RequestParams::RagAnswer { question, .. } => {
                if question.trim().is_empty() {
                    return Err("question cannot be empty".to_string());
                }
            }
            RequestParams::Summarize { notes } => {
                if notes.trim().is_empty() {
                    return Err("notes cannot be empty".to_string());
                }
            }
            RequestParams::Quiz { content, count, .. } => {
                if *count < 1 {
                    return Err("quiz count must be at least 1".to_string());
                }
                if content.trim().is_empty() {
                    return Err("quiz content cannot be empty".to_string());
                }
            }
        }
        Ok(())
    }

    /// Named slot values for template filling.
    ///
    /// The explain context is the only optional slot; it becomes an empty string.
    pub fn slots(&self) -> Vec<(&'static str, String)> {
        match self {
            RequestParams::Explain { question, context } => vec![
                ("question", question.clone()),
                ("context", context.clone().unwrap_or_default()),
            ],
            RequestParams::Summarize { notes } => vec![("notes", notes.clone())],
            RequestParams::Quiz {
                content,
                count,
                difficulty,
            } => vec![
                ("content", content.clone()),
                ("count", count.to_string()),
                ("difficulty", difficulty.to_string()),
            ],
            RequestParams::RagAnswer { question, context } => vec![
                ("question", question.clone()),
                ("context", context.clone()),
            ],
        }
    }
}

/// An accepted request. Yields exactly one `Response` or one `AgentError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub params: RequestParams,
    pub submitted_at: String,
}

impl Request {
    pub fn new(params: RequestParams) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            params,
            submitted_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.params.kind()
    }
}

/// The reply to a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub kind: RequestKind,
    pub text: String,
    pub completed_at: String,
}

impl Response {
    pub fn for_request(request: &Request, text: String) -> Self {
        Self {
            request_id: request.id.clone(),
            kind: request.kind(),
            text,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_params_kind() {
        assert_eq!(RequestParams::explain("q").kind(), RequestKind::Explain);
        assert_eq!(RequestParams::summarize("n").kind(), RequestKind::Summarize);
        assert_eq!(
            RequestParams::quiz("c", 3, Difficulty::Easy).kind(),
            RequestKind::Quiz
        );
        assert_eq!(
            RequestParams::rag_answer("q", "ctx").kind(),
            RequestKind::RagAnswer
        );
    }

    #[test]
    fn test_quiz_count_validation() {
        let params = RequestParams::quiz("photosynthesis", 0, Difficulty::Medium);
        assert!(params.validate().is_err());
        let params = RequestParams::quiz("photosynthesis", 1, Difficulty::Medium);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_explain_context_defaults_to_empty() {
        let slots = RequestParams::explain("what is entropy?").slots();
        assert!(slots.contains(&("context", String::new())));
    }

    #[test]
    fn test_params_wire_format() {
        let params = RequestParams::quiz("cells", 5, Difficulty::Hard);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["kind"], "quiz");
        assert_eq!(json["difficulty"], "hard");

        let parsed: RequestParams =
            serde_json::from_str(r#"{"kind":"explain","question":"why?"}"#).unwrap();
        assert_eq!(parsed, RequestParams::explain("why?"));
    }

    #[test]
    fn test_response_matches_request() {
        let request = Request::new(RequestParams::summarize("notes"));
        let response = Response::for_request(&request, "summary".to_string());
        assert_eq!(response.request_id, request.id);
        assert_eq!(response.kind, RequestKind::Summarize);
    }
}
