//! Prompt-only code analysis tool.
//!
//! Executes nothing. It restructures a code snippet into facts the model can
//! reason over in its next step, which keeps the tool safe by construction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::tool::Tool;

/// Arguments for [`AnalyzeCodeTool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeCodeArgs {
    /// The code to analyze.
    pub code: String,
    /// Optional question to focus the analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// Structural facts about a snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAnalysis {
    /// Number of lines.
    pub lines: usize,
    /// Number of non-blank lines.
    pub non_blank_lines: usize,
    /// Number of characters.
    pub chars: usize,
    /// The question passed in, echoed for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// The code itself, for the model to reason over.
    pub code: String,
}

/// Summarizes a code snippet structurally without executing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeCodeTool;

#[async_trait]
impl Tool for AnalyzeCodeTool {
    const NAME: &'static str = "analyze_code";
    type Args = AnalyzeCodeArgs;
    type Output = CodeAnalysis;
    type Error = ToolError;

    fn description(&self) -> String {
        "Analyze a code snippet structurally; never executes anything.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "The code to analyze"},
                "question": {"type": "string", "description": "Optional question to focus on"}
            },
            "required": ["code"]
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let lines = args.code.lines().count();
        let non_blank_lines = args.code.lines().filter(|l| !l.trim().is_empty()).count();
        Ok(CodeAnalysis {
            lines,
            non_blank_lines,
            chars: args.code.chars().count(),
            question: args.question,
            code: args.code,
        })
    }
}
