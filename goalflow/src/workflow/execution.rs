//! Execution-plan workflow.
//!
//! Picks up where the trading workflow stops: the operator chooses one of the
//! numbered strategies in the accepted trading plan, the generator drafts an
//! execution plan for it, and the plan is formatted and published as its own
//! markdown report. Seed it with the trading run's final state.

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::action::Action;
use crate::core::condition::Condition;
use crate::core::critique::Critique;
use crate::core::error::RegistryError;
use crate::core::registry::ActionRegistry;
use crate::core::state::BindingType;
use crate::feedback::{Rewriter, Validator};
use crate::gate::HumanGate;
use crate::io::prompt::{ExecutionPrompt, MenuEntry};
use crate::workflow::trading::{Collaborators, PLAN_DRAFTED, TradingPlan, WorkflowSettings};

pub const CHOOSE_STRATEGY: &str = "choose trading strategy";
pub const EXTRACT_EXECUTION_REQUEST: &str = "extract execution request";
pub const DRAFT_EXECUTION_PLAN: &str = "draft execution plan";
pub const FORMAT_EXECUTION_PLAN: &str = "format execution plan";
pub const PUBLISH_EXECUTION_PLAN: &str = "publish execution plan";

pub const SELECTED_STRATEGY: &str = "selectedStrategy";
pub const EXECUTION_REQUESTED: &str = "executionRequested";
pub const EXECUTION_PLANNED: &str = "executionPlanned";
pub const EXECUTION_FORMATTED: &str = "executionFormatted";

/// Binding that holds the model-formatted markdown plan.
pub const EXECUTION_PLAN_MD_BINDING: &str = "executionPlanMarkdownReport";
/// Binding that holds the published execution report.
pub const EXECUTION_REPORT_BINDING: &str = "executionPlanReport";

static STRATEGY_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[\s#]*(\d+)[.)]\s+(.+?)\s*$").expect("strategy line pattern should compile")
});

/// One numbered strategy from a trading plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// Position in the menu, from 1.
    pub number: u32,
    pub name: String,
    pub summary: String,
}

impl Strategy {
    fn describe(&self) -> String {
        if self.summary.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.summary)
        }
    }
}

impl BindingType for Strategy {
    const TYPE_NAME: &'static str = "strategy";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub ticker: String,
    pub strategy: Strategy,
    pub risk_profile: String,
    pub investment_period: String,
}

impl BindingType for ExecutionRequest {
    const TYPE_NAME: &'static str = "executionRequest";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub ticker: String,
    pub strategy: Strategy,
    pub risk_profile: String,
    pub investment_period: String,
    pub plan: String,
}

impl BindingType for ExecutionPlan {
    const TYPE_NAME: &'static str = "executionPlan";
}

/// Numbered strategies in a trading plan's text, renumbered from 1 in the
/// order they appear.
pub fn strategy_options(plan_text: &str) -> Vec<Strategy> {
    STRATEGY_LINE_RE
        .captures_iter(plan_text)
        .filter_map(|caps| {
            let line = caps[2].replace("**", "").replace('#', "");
            let (name, summary) = match line.split_once(':') {
                Some((name, summary)) => (name.trim(), summary.trim()),
                None => (line.trim(), ""),
            };
            (!name.is_empty()).then(|| (name.to_string(), summary.to_string()))
        })
        .zip(1..)
        .map(|((name, summary), number)| Strategy {
            number,
            name,
            summary,
        })
        .collect()
}

/// Accepts a menu number between 1 and `options`.
#[derive(Debug, Clone, Copy)]
pub struct SelectionValidator {
    options: usize,
}

impl SelectionValidator {
    pub fn new(options: usize) -> Self {
        Self { options }
    }

    /// The chosen number, if `answer` names a menu entry.
    pub fn choice(&self, answer: &str) -> Option<usize> {
        answer
            .trim()
            .trim_end_matches('.')
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=self.options).contains(n))
    }
}

impl Validator<String> for SelectionValidator {
    fn critique(&self, _original_request: &str, answer: &String) -> Result<Critique> {
        Ok(match self.choice(answer) {
            Some(n) => Critique::accept(format!("strategy {n} selected")),
            None => Critique::reject(format!(
                "'{}' is not a number between 1 and {}",
                answer.trim(),
                self.options
            )),
        })
    }
}

/// Shows the rejection and the menu again.
struct Reprompt<'m> {
    menu: &'m str,
}

impl Rewriter for Reprompt<'_> {
    fn rewrite(&self, _previous_request: &str, critique: &Critique) -> Result<String> {
        Ok(format!("{}\n\n{}", critique.reasoning, self.menu))
    }
}

/// Render the published execution report.
pub fn render_execution_report(plan: &ExecutionPlan, markdown: &str) -> String {
    format!(
        "# Execution plan: {}\n\n\
         - Strategy: {}. {}\n\
         - Risk profile: {}\n\
         - Investment horizon: {}\n\n\
         {}\n",
        plan.ticker,
        plan.strategy.number,
        plan.strategy.name,
        plan.risk_profile,
        plan.investment_period,
        markdown.trim()
    )
}

/// Declare the execution workflow over `collab`.
pub fn registry<'c>(
    collab: &Collaborators<'c>,
    settings: &WorkflowSettings,
) -> Result<ActionRegistry<'c>, RegistryError> {
    let max_attempts = settings.max_attempts;
    let max_word_count = settings.max_word_count;

    let selector = collab.clone();
    let choose_strategy = Action::builder(CHOOSE_STRATEGY)
        .input::<TradingPlan>()
        .pre(PLAN_DRAFTED)
        .post(SELECTED_STRATEGY)
        .rerunnable()
        .run(move |inputs| {
            let plan = inputs.get::<TradingPlan>()?;
            let options = strategy_options(&plan.strategies);
            if options.is_empty() {
                bail!("trading plan for {} lists no numbered strategies", plan.ticker);
            }
            let entries: Vec<MenuEntry<'_>> = options
                .iter()
                .map(|s| MenuEntry {
                    number: s.number,
                    name: &s.name,
                })
                .collect();
            let menu = selector.prompts.render_strategy_menu(&entries)?;

            let validator = SelectionValidator::new(options.len());
            let reprompt = Reprompt { menu: &menu };
            let mut gate = HumanGate::new(selector.input, &validator, &reprompt)
                .with_max_attempts(max_attempts);
            if let Some(cancel) = &selector.cancel {
                gate = gate.with_cancel(cancel.clone());
            }
            let answer = gate.ask(&menu)?;
            let Some(strategy) = validator
                .choice(&answer)
                .and_then(|n| options.into_iter().nth(n - 1))
            else {
                bail!("accepted answer '{}' names no strategy", answer.trim());
            };
            info!(number = strategy.number, name = %strategy.name, "strategy selected");
            Ok(strategy)
        });

    let extract_execution_request = Action::builder(EXTRACT_EXECUTION_REQUEST)
        .input::<Strategy>()
        .input::<TradingPlan>()
        .pre(SELECTED_STRATEGY)
        .post(EXECUTION_REQUESTED)
        .run(|inputs| {
            let plan = inputs.get::<TradingPlan>()?;
            Ok(ExecutionRequest {
                ticker: plan.ticker,
                strategy: inputs.get::<Strategy>()?,
                risk_profile: plan.risk_profile,
                investment_period: plan.investment_period,
            })
        });

    let generator = collab.generator;
    let prompts = collab.prompts;
    let draft_execution_plan = Action::builder(DRAFT_EXECUTION_PLAN)
        .input::<ExecutionRequest>()
        .pre(EXECUTION_REQUESTED)
        .post(EXECUTION_PLANNED)
        .run(move |inputs| {
            let request = inputs.get::<ExecutionRequest>()?;
            let prompt = prompts.render_execution(&ExecutionPrompt {
                ticker: &request.ticker,
                strategy: &request.strategy.describe(),
                risk_profile: &request.risk_profile,
                investment_period: &request.investment_period,
                max_word_count,
            })?;
            let plan = generator
                .transform(&prompt)
                .with_context(|| format!("draft execution plan for {}", request.ticker))?;
            Ok(ExecutionPlan {
                ticker: request.ticker,
                strategy: request.strategy,
                risk_profile: request.risk_profile,
                investment_period: request.investment_period,
                plan,
            })
        });

    let format_execution_plan = Action::builder(FORMAT_EXECUTION_PLAN)
        .input::<ExecutionPlan>()
        .pre(EXECUTION_PLANNED)
        .post(EXECUTION_FORMATTED)
        .output_binding(EXECUTION_PLAN_MD_BINDING)
        .run(move |inputs| {
            let plan = inputs.get::<ExecutionPlan>()?;
            let prompt = prompts.render_execution_markdown(&plan.plan)?;
            generator
                .transform(&prompt)
                .context("format execution plan as markdown")
        });

    let publish_execution_plan = Action::builder(PUBLISH_EXECUTION_PLAN)
        .input::<ExecutionPlan>()
        .input_named::<String>(EXECUTION_PLAN_MD_BINDING)
        .pre(EXECUTION_FORMATTED)
        .output_binding(EXECUTION_REPORT_BINDING)
        .goal()
        .run(|inputs| {
            let plan = inputs.get::<ExecutionPlan>()?;
            let markdown = inputs.named::<String>(EXECUTION_PLAN_MD_BINDING)?;
            Ok(render_execution_report(&plan, &markdown))
        });

    ActionRegistry::builder()
        .condition(Condition::matches::<TradingPlan>(PLAN_DRAFTED, None, |plan| {
            !plan.strategies.trim().is_empty()
        }))
        .condition(Condition::present::<Strategy>(SELECTED_STRATEGY))
        .condition(Condition::present::<ExecutionRequest>(EXECUTION_REQUESTED))
        .condition(Condition::matches::<ExecutionPlan>(
            EXECUTION_PLANNED,
            None,
            |plan| !plan.plan.trim().is_empty(),
        ))
        .condition(Condition::matches::<String>(
            EXECUTION_FORMATTED,
            Some(EXECUTION_PLAN_MD_BINDING),
            |markdown| !markdown.trim().is_empty(),
        ))
        .action(choose_strategy)
        .action(extract_execution_request)
        .action(draft_execution_plan)
        .action(format_execution_plan)
        .action(publish_execution_plan)
        .build()
}

/// Report file name for an execution plan finished on `date`.
pub fn execution_report_file_name(date: chrono::NaiveDate) -> String {
    format!("execution-plan-{}.md", date.format("%Y-%m-%d"))
}
