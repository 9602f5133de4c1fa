//! Command interpreter: free-text chat instructions → structured commands.
//!
//! Flow:
//! ```text
//! "@aura add a window on wall_12 …"
//!        │ strip trigger
//!        ▼
//! classify() ── complex ──► CompletionService (multi-solution mode)
//!        │                        │ 2–3 ranked candidates, human-reviewed
//!     simple                      ▼
//!        │                  SamaranganSolutions broadcast
//!        ▼
//! CompletionService (single-action mode)
//!        │ one DesignCommand + narrative
//!        ▼
//! mutation engine → version ledger → room broadcast
//! ```
//!
//! The completion service is an opaque text/JSON black box; this module owns
//! prompt assembly, classification, and response parsing. A failed or
//! malformed completion surfaces as an assistant chat message downstream,
//! never as a dropped connection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::DesignCommand;
use crate::model::ProjectData;

/// Marker that routes a chat message to the assistant.
pub const TRIGGER: &str = "@aura";

/// Leading keywords that mark a complex, multi-solution change request.
const COMPLEX_KEYWORDS: &[&str] = &[
    "make", "add", "increase", "decrease", "enlarge", "move", "shift", "change", "design",
    "create",
];

/// Maximum number of candidate fixes surfaced per complex command.
const MAX_SOLUTIONS: usize = 3;

/// Strip the trigger marker; `None` when the message is plain chat.
pub fn strip_trigger(body: &str) -> Option<&str> {
    let trimmed = body.trim_start();
    let rest = trimmed.strip_prefix(TRIGGER)?;
    let rest = rest.trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// How a command body is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// One directly-applied mutation (or an informational answer).
    Simple,
    /// Several human-reviewed candidate fixes.
    Complex,
}

/// Classify a command body against the project it targets.
///
/// A leading complex-change keyword routes to the multi-solution path —
/// unless the body names a concrete entity id that exists in the project
/// (e.g. "add a window on wall_12"), which is a direct instruction and goes
/// down the single-action path.
pub fn classify(body: &str, data: &ProjectData) -> CommandClass {
    let lowered = body.trim().to_lowercase();
    let first_word = lowered.split_whitespace().next().unwrap_or("");
    if !COMPLEX_KEYWORDS.contains(&first_word) {
        return CommandClass::Simple;
    }

    let names_entity = body
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .any(|token| data.references_entity(token));
    if names_entity {
        CommandClass::Simple
    } else {
        CommandClass::Complex
    }
}

/// Completion mode requested from the external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// One structured command plus a narrative.
    SingleAction,
    /// An array of ranked candidate fixes.
    MultiSolution,
}

/// A request to the external completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub mode: CompletionMode,
    /// System prompt describing the expected JSON shape.
    pub prompt: String,
    /// The user's instruction, trigger marker removed.
    pub instruction: String,
    /// The full project document as JSON context.
    pub project_context: serde_json::Value,
}

/// Failure reported by the external completion service.
#[derive(Debug, Clone)]
pub struct CompletionError(pub String);

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CompletionError {}

/// The external text/JSON completion service, treated as a black box.
///
/// Implementations wrap whatever backend serves completions; this crate
/// never talks HTTP itself. The service applies its own timeout policy —
/// a timeout surfaces here as an ordinary `CompletionError`.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Impact summary attached to each candidate fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSummary {
    pub cost: String,
    pub structure: String,
    pub vastu: String,
    pub sustainability: String,
}

/// One ranked candidate fix for a complex change.
///
/// Candidates are surfaced to the room for manual selection; nothing here
/// is applied until a human picks one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionCandidate {
    pub rank: u32,
    pub title: String,
    pub summary: String,
    /// The geometric diff: commands that would realize this candidate.
    pub diff: Vec<DesignCommand>,
    pub impact: ImpactSummary,
}

/// Interpreter output, ready for the session layer to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// A single action to apply (or `InfoOnly`), plus the assistant
    /// narrative for the chat log.
    Action {
        command: DesignCommand,
        narrative: String,
    },
    /// Ranked candidate fixes for manual selection, plus the narrative.
    Solutions {
        narrative: String,
        candidates: Vec<SolutionCandidate>,
    },
}

/// Interpreter failures.
#[derive(Debug, Clone)]
pub enum InterpreterError {
    /// The completion service failed or timed out.
    Service(String),
    /// The completion returned text this module cannot parse.
    Malformed(String),
}

impl std::fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpreterError::Service(e) => write!(f, "Completion service error: {e}"),
            InterpreterError::Malformed(e) => write!(f, "Malformed completion: {e}"),
        }
    }
}

impl std::error::Error for InterpreterError {}

/// Expected multi-solution response shape.
#[derive(Deserialize)]
struct SolutionsCompletion {
    narrative: String,
    solutions: Vec<SolutionCandidate>,
}

const SINGLE_ACTION_PROMPT: &str = "You are an architectural design assistant. \
Answer with one JSON object: {\"action\": ADD_WALL|MODIFY_WALL|DELETE_WALL|\
ADD_WINDOW|MOVE_FURNITURE|INFO_ONLY, \"payload\": {...}, \"narrative\": \"...\"}. \
Write the narrative in the language of the instruction.";

const MULTI_SOLUTION_PROMPT: &str = "You are an architectural design assistant. \
Propose 2-3 ranked alternative fixes for the requested change. Answer with one \
JSON object: {\"narrative\": \"...\", \"solutions\": [{\"rank\": 1, \"title\": \
\"...\", \"summary\": \"...\", \"diff\": [commands], \"impact\": {\"cost\": \
\"...\", \"structure\": \"...\", \"vastu\": \"...\", \"sustainability\": \
\"...\"}}]}.";

/// Turns chat instructions into structured commands or candidate fixes.
pub struct CommandInterpreter<S: ?Sized> {
    completion: std::sync::Arc<S>,
}

impl<S: CompletionService + ?Sized> CommandInterpreter<S> {
    pub fn new(completion: std::sync::Arc<S>) -> Self {
        Self { completion }
    }

    /// Interpret a command body (trigger already stripped) against the
    /// project's current document.
    pub async fn interpret(
        &self,
        instruction: &str,
        data: &ProjectData,
    ) -> Result<Interpretation, InterpreterError> {
        let project_context = serde_json::to_value(data)
            .map_err(|e| InterpreterError::Malformed(e.to_string()))?;

        match classify(instruction, data) {
            CommandClass::Simple => {
                let raw = self
                    .completion
                    .complete(CompletionRequest {
                        mode: CompletionMode::SingleAction,
                        prompt: SINGLE_ACTION_PROMPT.to_string(),
                        instruction: instruction.to_string(),
                        project_context,
                    })
                    .await
                    .map_err(|e| InterpreterError::Service(e.0))?;
                parse_action(&raw)
            }
            CommandClass::Complex => {
                let raw = self
                    .completion
                    .complete(CompletionRequest {
                        mode: CompletionMode::MultiSolution,
                        prompt: MULTI_SOLUTION_PROMPT.to_string(),
                        instruction: instruction.to_string(),
                        project_context,
                    })
                    .await
                    .map_err(|e| InterpreterError::Service(e.0))?;
                parse_solutions(&raw)
            }
        }
    }
}

fn parse_action(raw: &str) -> Result<Interpretation, InterpreterError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| InterpreterError::Malformed(e.to_string()))?;
    let narrative = value
        .get("narrative")
        .and_then(|v| v.as_str())
        .ok_or_else(|| InterpreterError::Malformed("missing narrative".to_string()))?
        .to_string();
    // The command is the same object minus the narrative; the tagged enum
    // ignores the extra key.
    let command: DesignCommand =
        serde_json::from_value(value).map_err(|e| InterpreterError::Malformed(e.to_string()))?;
    Ok(Interpretation::Action { command, narrative })
}

fn parse_solutions(raw: &str) -> Result<Interpretation, InterpreterError> {
    let mut parsed: SolutionsCompletion =
        serde_json::from_str(raw).map_err(|e| InterpreterError::Malformed(e.to_string()))?;
    if parsed.solutions.is_empty() {
        return Err(InterpreterError::Malformed(
            "completion returned no solutions".to_string(),
        ));
    }
    parsed.solutions.sort_by_key(|s| s.rank);
    parsed.solutions.truncate(MAX_SOLUTIONS);
    Ok(Interpretation::Solutions {
        narrative: parsed.narrative,
        candidates: parsed.solutions,
    })
}
