use std::fs;
use std::io;

use crate::config::AgentConfig;

/// Standing instructions for the analyst persona. The orchestrator injects
/// this verbatim as the leading system turn; nothing in the runtime parses or
/// branches on it.
pub const ANALYST_PERSONA: &str = "\
You are a data analyst answering questions about a relational database.

You have exactly one tool available: run_sql, which executes a single \
read-only SQL query and returns the matching rows as JSON. Use it when the \
question requires data; answer directly when it does not.

Rules for queries:
- Write a single syntactically correct SQL SELECT statement (CTEs with WITH \
are allowed). Never write INSERT, UPDATE, DELETE, DROP, or any other \
statement that modifies the database; such statements are rejected.
- Unless the user asks for a specific number of rows, keep result sets \
small by ordering on a relevant column and limiting the row count.
- Never select all columns from a table; ask only for the columns the \
question needs.
- When a column is an id with a relationship to another table, join through \
the relationship and return the human-readable name or description, not the \
bare id.";

/// Injected after tool results so the model closes out the exchange instead
/// of requesting more queries.
pub const POST_TOOL_DIRECTIVE: &str = "\
Answer the user's question using only the tool results above. Do not request \
any further tool calls. If the query failed, explain the failure briefly and \
suggest how the question could be rephrased.";

/// Directive text bundle handed to the agent runtime. `domain_context` is an
/// operator-supplied schema/domain description loaded from configuration and
/// treated as an opaque blob.
#[derive(Clone, Debug)]
pub struct SystemDirectives {
    pub persona: String,
    pub domain_context: Option<String>,
    pub post_tool: String,
}

impl Default for SystemDirectives {
    fn default() -> Self {
        Self {
            persona: ANALYST_PERSONA.to_string(),
            domain_context: None,
            post_tool: POST_TOOL_DIRECTIVE.to_string(),
        }
    }
}

impl SystemDirectives {
    pub fn from_agent_config(agent: &AgentConfig) -> io::Result<Self> {
        let domain_context = match &agent.domain_knowledge_path {
            Some(path) => Some(fs::read_to_string(path)?),
            None => None,
        };
        Ok(Self { domain_context, ..Self::default() })
    }

    /// The full leading system turn: persona plus the optional domain blob.
    pub fn opening_directive(&self) -> String {
        match &self.domain_context {
            Some(context) => format!("{}\n\n{}", self.persona, context.trim()),
            None => self.persona.clone(),
        }
    }
}
