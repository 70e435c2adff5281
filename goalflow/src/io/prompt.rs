//! Prompt templates for the model collaborators and the operator questions.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

const CRITIQUE_TEMPLATE: &str = include_str!("prompts/critique.md");
const REWRITE_TEMPLATE: &str = include_str!("prompts/rewrite.md");
const RESEARCH_TEMPLATE: &str = include_str!("prompts/research.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const STRATEGY_MENU_TEMPLATE: &str = include_str!("prompts/strategy_menu.md");
const EXECUTION_TEMPLATE: &str = include_str!("prompts/execution.md");
const EXECUTION_MARKDOWN_TEMPLATE: &str = include_str!("prompts/execution_markdown.md");
const TICKER_QUESTION: &str = include_str!("prompts/ticker.md");
const RISK_PROFILE_QUESTION: &str = include_str!("prompts/risk_profile.md");
const HORIZON_QUESTION: &str = include_str!("prompts/horizon.md");

/// Fixed questions put to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Question {
    Ticker,
    RiskProfile,
    Horizon,
}

impl Question {
    pub fn text(self) -> &'static str {
        match self {
            Question::Ticker => TICKER_QUESTION.trim(),
            Question::RiskProfile => RISK_PROFILE_QUESTION.trim(),
            Question::Horizon => HORIZON_QUESTION.trim(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchPrompt<'a> {
    pub ticker: &'a str,
    pub max_data_age_days: u32,
    pub target_result_count: u32,
    pub max_word_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanPrompt<'a> {
    pub ticker: &'a str,
    pub market_report: &'a str,
    pub risk_profile: &'a str,
    pub investment_period: &'a str,
    pub max_word_count: u32,
}

/// One numbered line of the strategy menu.
#[derive(Debug, Clone, Serialize)]
pub struct MenuEntry<'a> {
    pub number: u32,
    pub name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPrompt<'a> {
    pub ticker: &'a str,
    pub strategy: &'a str,
    pub risk_profile: &'a str,
    pub investment_period: &'a str,
    pub max_word_count: u32,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("critique", CRITIQUE_TEMPLATE)
            .expect("critique template should be valid");
        env.add_template("rewrite", REWRITE_TEMPLATE)
            .expect("rewrite template should be valid");
        env.add_template("research", RESEARCH_TEMPLATE)
            .expect("research template should be valid");
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        env.add_template("strategy_menu", STRATEGY_MENU_TEMPLATE)
            .expect("strategy menu template should be valid");
        env.add_template("execution", EXECUTION_TEMPLATE)
            .expect("execution template should be valid");
        env.add_template("execution_markdown", EXECUTION_MARKDOWN_TEMPLATE)
            .expect("execution markdown template should be valid");
        Self { env }
    }

    /// Ask whether `response` is in line with `query`.
    pub fn render_critique(&self, query: &str, response: &str) -> Result<String> {
        let template = self.env.get_template("critique")?;
        Ok(template.render(context! {
            query => query.trim(),
            response => response.trim(),
        })?)
    }

    pub fn render_rewrite(&self, prompt: &str, reasoning: &str) -> Result<String> {
        let template = self.env.get_template("rewrite")?;
        Ok(template.render(context! {
            prompt => prompt.trim(),
            reasoning => reasoning.trim(),
        })?)
    }

    pub fn render_research(&self, input: &ResearchPrompt<'_>) -> Result<String> {
        let template = self.env.get_template("research")?;
        Ok(template.render(input)?)
    }

    pub fn render_plan(&self, input: &PlanPrompt<'_>) -> Result<String> {
        let template = self.env.get_template("plan")?;
        Ok(template.render(input)?)
    }

    /// Numbered strategy list put to the operator.
    pub fn render_strategy_menu(&self, strategies: &[MenuEntry<'_>]) -> Result<String> {
        let template = self.env.get_template("strategy_menu")?;
        Ok(template.render(context! { strategies => strategies })?.trim().to_string())
    }

    pub fn render_execution(&self, input: &ExecutionPrompt<'_>) -> Result<String> {
        let template = self.env.get_template("execution")?;
        Ok(template.render(input)?)
    }

    pub fn render_execution_markdown(&self, plan: &str) -> Result<String> {
        let template = self.env.get_template("execution_markdown")?;
        Ok(template.render(context! { plan => plan.trim() })?)
    }
}
