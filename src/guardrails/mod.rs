//! Guardrail pipeline (§4.F): an ordered chain of back-pressure checks run
//! before every LLM invocation. A guardrail that throws is fail-open —
//! logged and converted to a `Warn`, never a crash.

mod standard;

pub use standard::{
    BackPressureGuardrail, BudgetGuardrail, ChurnGuardrail, CircularBehaviorGuardrail, OracleGateGuardrail,
    ToolDisciplineGuardrail,
};

use std::sync::Arc;

use tracing::warn;

use crate::audit::ToolCallLog;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardrailResult {
    Pass,
    Warn {
        message: String,
        corrective_instruction: Option<String>,
    },
    Block {
        message: String,
        requires_user_confirmation: bool,
    },
}

/// What a guardrail inspects to reach a verdict. Borrowed, read-only.
pub struct GuardrailContext<'a> {
    pub module: &'a str,
    pub step: &'a str,
    pub task_id: Option<&'a str>,
    pub iteration_id: u64,
    pub tool_call_log: &'a ToolCallLog,
    pub is_completion_claim: bool,
    pub completion_scope: Option<&'a str>,
}

pub trait Guardrail: Send + Sync {
    /// Ascending evaluation order; ties broken by registration order.
    fn order(&self) -> u32;
    fn short_circuit_on_block(&self) -> bool;
    fn category(&self) -> &'static str;
    fn evaluate(&self, ctx: &GuardrailContext<'_>) -> GuardrailResult;
}

pub struct PipelineOutcome {
    pub results: Vec<(String, GuardrailResult)>,
}

impl PipelineOutcome {
    pub fn is_blocked(&self) -> bool {
        self.results
            .iter()
            .any(|(_, r)| matches!(r, GuardrailResult::Block { .. }))
    }

    pub fn requires_user_confirmation(&self) -> bool {
        self.results.iter().any(|(_, r)| {
            matches!(
                r,
                GuardrailResult::Block {
                    requires_user_confirmation: true,
                    ..
                }
            )
        })
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|(_, r)| match r {
                GuardrailResult::Warn { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn blocks(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|(_, r)| match r {
                GuardrailResult::Block { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Corrective instructions from `Warn` results, joined into one block
    /// suitable for appending to the next system prompt.
    pub fn build_corrective_instructions(&self) -> Option<String> {
        let instructions: Vec<&str> = self
            .results
            .iter()
            .filter_map(|(_, r)| match r {
                GuardrailResult::Warn {
                    corrective_instruction: Some(instr),
                    ..
                } => Some(instr.as_str()),
                _ => None,
            })
            .collect();
        if instructions.is_empty() {
            None
        } else {
            Some(instructions.join("\n"))
        }
    }
}

pub struct GuardrailPipeline {
    guardrails: Vec<Box<dyn Guardrail>>,
}

impl GuardrailPipeline {
    pub fn new() -> Self {
        Self {
            guardrails: Vec::new(),
        }
    }

    pub fn register(&mut self, guardrail: Box<dyn Guardrail>) -> &mut Self {
        self.guardrails.push(guardrail);
        self.guardrails.sort_by_key(|g| g.order());
        self
    }

    pub fn evaluate(&self, ctx: &GuardrailContext<'_>) -> PipelineOutcome {
        let mut results = Vec::new();

        for guardrail in &self.guardrails {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                guardrail.evaluate(ctx)
            }))
            .unwrap_or_else(|_| {
                warn!(category = guardrail.category(), "guardrail panicked; failing open");
                GuardrailResult::Warn {
                    message: format!("guardrail '{}' failed and was treated as a warning", guardrail.category()),
                    corrective_instruction: None,
                }
            });

            let is_short_circuit_block = matches!(result, GuardrailResult::Block { .. })
                && guardrail.short_circuit_on_block();

            results.push((guardrail.category().to_string(), result));

            if is_short_circuit_block {
                break;
            }
        }

        PipelineOutcome { results }
    }
}

impl Default for GuardrailPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets the orchestrator keep a typed `Arc<BudgetGuardrail>` (for
/// `record_tokens` etc.) while also registering it in the pipeline by
/// shared ownership instead of by move.
pub struct ArcGuardrail<T: ?Sized>(pub Arc<T>);

impl<T: Guardrail + ?Sized> Guardrail for ArcGuardrail<T> {
    fn order(&self) -> u32 {
        self.0.order()
    }
    fn short_circuit_on_block(&self) -> bool {
        self.0.short_circuit_on_block()
    }
    fn category(&self) -> &'static str {
        self.0.category()
    }
    fn evaluate(&self, ctx: &GuardrailContext<'_>) -> GuardrailResult {
        self.0.evaluate(ctx)
    }
}
