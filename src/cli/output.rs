use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::error::AgentError;
use crate::models::{OutputFormat, Response, RetrievalResults, RetrievedChunk};
use crate::services::{AssistantStatus, DocumentSummary, GroundedAnswer, IndexReport};
use crate::utils::preview;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_retrieval(&self, results: &RetrievalResults) -> String;
    fn format_response(&self, response: &Response) -> String;
    fn format_answer(&self, answer: &GroundedAnswer) -> String;
    fn format_agent_error(&self, error: &AgentError) -> String;
    fn format_index_stats(&self, stats: &IndexStats) -> String;
    fn format_documents(&self, documents: &[DocumentSummary]) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub daemon_running: bool,
    pub daemon_pid: Option<u32>,
    pub daemon_idle_secs: Option<u64>,
    pub requests_served: Option<u64>,
    pub ollama_url: String,
    pub ollama_version: Option<String>,
    pub embedding_model: String,
    pub assistant: Option<AssistantStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub chunks_created: u64,
    pub chunks_replaced: u64,
    pub duration_ms: u64,
    pub documents: Vec<IndexReport>,
}

impl IndexStats {
    pub fn record(&mut self, report: IndexReport) {
        self.files_indexed += 1;
        self.chunks_created += report.chunks as u64;
        self.chunks_replaced += report.replaced as u64;
        self.documents.push(report);
    }
}

pub struct TextFormatter;

impl TextFormatter {
    fn write_chunks(output: &mut String, chunks: &[RetrievedChunk]) {
        for (i, result) in chunks.iter().enumerate() {
            writeln!(
                output,
                "{}. [Score: {:.3}] document {} #{}",
                i + 1,
                result.score,
                short_id(&result.chunk.document_id),
                result.chunk.ordinal
            )
            .unwrap();
            writeln!(output, "   ---").unwrap();
            for line in preview(&result.chunk.text, PREVIEW_CHARS).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }
    }
}

impl Formatter for TextFormatter {
    fn format_retrieval(&self, results: &RetrievalResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();
        Self::write_chunks(&mut output, &results.results);
        output
    }

    fn format_response(&self, response: &Response) -> String {
        format!("{}\n", response.text.trim_end())
    }

    fn format_answer(&self, answer: &GroundedAnswer) -> String {
        let mut output = self.format_response(&answer.response);
        if answer.sources.is_empty() {
            writeln!(output, "\n(no matching notes were found)").unwrap();
        } else {
            writeln!(output, "\nSources").unwrap();
            writeln!(output, "-------").unwrap();
            Self::write_chunks(&mut output, &answer.sources);
        }
        output
    }

    fn format_agent_error(&self, error: &AgentError) -> String {
        format!("{}\n", error.as_reply())
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        writeln!(output, "Indexing Complete").unwrap();
        writeln!(output, "-----------------").unwrap();
        writeln!(output, "Files scanned: {}", stats.files_scanned).unwrap();
        writeln!(output, "Files indexed: {}", stats.files_indexed).unwrap();
        writeln!(output, "Files skipped: {}", stats.files_skipped).unwrap();
        writeln!(output, "Chunks created: {}", stats.chunks_created).unwrap();
        if stats.chunks_replaced > 0 {
            writeln!(output, "Chunks replaced: {}", stats.chunks_replaced).unwrap();
        }
        writeln!(output, "Duration: {}ms", stats.duration_ms).unwrap();
        output
    }

    fn format_documents(&self, documents: &[DocumentSummary]) -> String {
        if documents.is_empty() {
            return "No documents indexed.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Indexed Documents").unwrap();
        writeln!(output, "-----------------").unwrap();
        for doc in documents {
            writeln!(output, "  {} ({} chunks)", doc.document_id, doc.chunks).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let daemon_status = if status.daemon_running {
            "[RUNNING]"
        } else {
            "[STOPPED]"
        };
        writeln!(output, "Daemon:        {}", daemon_status).unwrap();
        if let Some(pid) = status.daemon_pid {
            writeln!(output, "  PID:         {}", pid).unwrap();
        }
        if let Some(idle) = status.daemon_idle_secs {
            writeln!(output, "  Idle:        {}s", idle).unwrap();
        }
        if let Some(served) = status.requests_served {
            writeln!(output, "  Served:      {}", served).unwrap();
        }
        writeln!(output).unwrap();

        let ollama_status = match status.ollama_version {
            Some(ref v) => format!("[CONNECTED] v{}", v),
            None => "[DISCONNECTED]".to_string(),
        };
        writeln!(output, "Ollama:        {}", ollama_status).unwrap();
        writeln!(output, "  URL:         {}", status.ollama_url).unwrap();
        writeln!(output, "  Embedding:   {}", status.embedding_model).unwrap();

        if let Some(ref a) = status.assistant {
            writeln!(output, "  Generation:  {}", a.generation_model).unwrap();
            writeln!(output).unwrap();
            writeln!(output, "Index:").unwrap();
            if let Some(ref collection) = a.collection {
                writeln!(output, "  Collection:  {}", collection).unwrap();
            }
            writeln!(output, "  Documents:   {}", a.documents).unwrap();
            writeln!(output, "  Chunks:      {}", a.chunks).unwrap();
            writeln!(output, "  Dimension:   {}", a.dimension).unwrap();
            writeln!(output, "  Queued:      {}", a.pending_requests).unwrap();

            if let Some(ref m) = a.metrics {
                writeln!(output).unwrap();
                writeln!(output, "Generation metrics:").unwrap();
                writeln!(output, "  Requests:    {}", m.total_requests).unwrap();
                writeln!(output, "  Avg Latency: {}ms", m.avg_latency_ms).unwrap();
                if m.error_rate > 0.0 {
                    writeln!(output, "  Error Rate:  {:.1}%", m.error_rate).unwrap();
                }
                for k in &m.by_kind {
                    writeln!(
                        output,
                        "  {:<12} {} calls, {} failed, {}ms avg",
                        format!("{}:", k.kind),
                        k.requests,
                        k.failures,
                        k.avg_latency_ms
                    )
                    .unwrap();
                }
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &impl Serialize) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_retrieval(&self, results: &RetrievalResults) -> String {
        self.render(results)
    }

    fn format_response(&self, response: &Response) -> String {
        self.render(response)
    }

    fn format_answer(&self, answer: &GroundedAnswer) -> String {
        self.render(answer)
    }

    fn format_agent_error(&self, error: &AgentError) -> String {
        self.render(&serde_json::json!({
            "error": error.cause,
            "kind": error.kind,
            "reply": error.as_reply(),
        }))
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        self.render(stats)
    }

    fn format_documents(&self, documents: &[DocumentSummary]) -> String {
        self.render(&serde_json::json!({ "documents": documents }))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn write_chunks(output: &mut String, chunks: &[RetrievedChunk]) {
        for (i, result) in chunks.iter().enumerate() {
            writeln!(output, "### {}. Score: {:.3}\n", i + 1, result.score).unwrap();
            writeln!(
                output,
                "**Document:** `{}` (chunk {})\n",
                result.chunk.document_id, result.chunk.ordinal
            )
            .unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", result.chunk.text).unwrap();
            writeln!(output, "```\n").unwrap();
        }
    }
}

impl Formatter for MarkdownFormatter {
    fn format_retrieval(&self, results: &RetrievalResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();
        Self::write_chunks(&mut output, &results.results);
        output
    }

    fn format_response(&self, response: &Response) -> String {
        let mut output = String::new();
        writeln!(output, "## {}\n", title_for(&response.kind.to_string())).unwrap();
        writeln!(output, "{}", response.text.trim_end()).unwrap();
        output
    }

    fn format_answer(&self, answer: &GroundedAnswer) -> String {
        let mut output = self.format_response(&answer.response);
        writeln!(output, "\n## Sources\n").unwrap();
        if answer.sources.is_empty() {
            writeln!(output, "*No matching notes were found.*").unwrap();
        } else {
            Self::write_chunks(&mut output, &answer.sources);
        }
        output
    }

    fn format_agent_error(&self, error: &AgentError) -> String {
        format!("> ⚠️ {}\n", error.as_reply())
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        writeln!(output, "## Indexing Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Files scanned | {} |", stats.files_scanned).unwrap();
        writeln!(output, "| Files indexed | {} |", stats.files_indexed).unwrap();
        writeln!(output, "| Files skipped | {} |", stats.files_skipped).unwrap();
        writeln!(output, "| Chunks created | {} |", stats.chunks_created).unwrap();
        writeln!(output, "| Chunks replaced | {} |", stats.chunks_replaced).unwrap();
        writeln!(output, "| Duration | {}ms |", stats.duration_ms).unwrap();
        output
    }

    fn format_documents(&self, documents: &[DocumentSummary]) -> String {
        if documents.is_empty() {
            return "## Documents\n\n*No documents indexed.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Documents\n").unwrap();
        writeln!(output, "| Document | Chunks |").unwrap();
        writeln!(output, "|----------|--------|").unwrap();
        for doc in documents {
            writeln!(output, "| `{}` | {} |", doc.document_id, doc.chunks).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let daemon_status = if status.daemon_running { "✅" } else { "❌" };
        writeln!(output, "### Daemon {}\n", daemon_status).unwrap();
        if let Some(idle) = status.daemon_idle_secs {
            writeln!(output, "- **Idle:** {}s", idle).unwrap();
        }
        if let Some(served) = status.requests_served {
            writeln!(output, "- **Requests served:** {}", served).unwrap();
        }
        writeln!(output).unwrap();

        let ollama_status = if status.ollama_version.is_some() {
            "✅"
        } else {
            "❌"
        };
        writeln!(output, "### Ollama {}\n", ollama_status).unwrap();
        writeln!(output, "- **URL:** `{}`", status.ollama_url).unwrap();
        writeln!(output, "- **Embedding:** {}", status.embedding_model).unwrap();

        if let Some(ref a) = status.assistant {
            writeln!(output, "- **Generation:** {}\n", a.generation_model).unwrap();
            writeln!(output, "### Index\n").unwrap();
            if let Some(ref collection) = a.collection {
                writeln!(output, "- **Collection:** {}", collection).unwrap();
            }
            writeln!(output, "- **Documents:** {}", a.documents).unwrap();
            writeln!(output, "- **Chunks:** {}", a.chunks).unwrap();
            if let Some(ref m) = a.metrics {
                writeln!(output, "- **Requests:** {}", m.total_requests).unwrap();
                writeln!(output, "- **Avg Latency:** {}ms", m.avg_latency_ms).unwrap();
                if m.error_rate > 0.0 {
                    writeln!(output, "- **Error Rate:** {:.1}%", m.error_rate).unwrap();
                }
                if !m.by_kind.is_empty() {
                    writeln!(output, "\n| Kind | Calls | Failed | Avg Latency |").unwrap();
                    writeln!(output, "|------|-------|--------|-------------|").unwrap();
                    for k in &m.by_kind {
                        writeln!(
                            output,
                            "| {} | {} | {} | {}ms |",
                            k.kind, k.requests, k.failures, k.avg_latency_ms
                        )
                        .unwrap();
                    }
                }
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn title_for(kind: &str) -> String {
    match kind {
        "explain" => "Explanation".to_string(),
        "summarize" => "Summary".to_string(),
        "quiz" => "Quiz".to_string(),
        "rag_answer" => "Answer".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Request, RequestKind, RequestParams};

    fn answer(sources: Vec<RetrievedChunk>) -> GroundedAnswer {
        let request = Request::new(RequestParams::rag_answer("q", "ctx"));
        GroundedAnswer {
            response: Response::for_request(&request, "ATP is made in mitochondria.".to_string()),
            sources,
        }
    }

    #[test]
    fn test_text_answer_lists_sources() {
        let source = RetrievedChunk {
            chunk: Chunk::new("0123456789abcdef", "Mitochondria produce ATP.".to_string(), 2, 0, 25),
            score: 0.91,
        };
        let out = TextFormatter.format_answer(&answer(vec![source]));
        assert!(out.starts_with("ATP is made in mitochondria.\n"));
        assert!(out.contains("[Score: 0.910] document 01234567 #2"));
        assert!(out.contains("Mitochondria produce ATP."));
    }

    #[test]
    fn test_agent_error_rendered_as_reply() {
        let err = AgentError::new(RequestKind::Explain, "timed out");
        assert_eq!(
            TextFormatter.format_agent_error(&err),
            "[Error from explain agent] timed out\n"
        );
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new(false).format_agent_error(&err)).unwrap();
        assert_eq!(json["kind"], "explain");
    }

    #[test]
    fn test_markdown_response_title() {
        let out = MarkdownFormatter.format_answer(&answer(Vec::new()));
        assert!(out.starts_with("## Answer\n"));
        assert!(out.contains("*No matching notes were found.*"));
    }

    #[test]
    fn test_empty_documents() {
        assert_eq!(
            TextFormatter.format_documents(&[]),
            "No documents indexed.\n"
        );
    }
}
