//! Trading-advisor workflow.
//!
//! Collects a ticker, a risk attitude and an investment horizon from the
//! operator, researches the ticker, drafts a critiqued trading plan and
//! publishes it as a markdown report. Answers already present in the seed
//! state skip their collection step.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cancel::CancelFlag;
use crate::core::action::Action;
use crate::core::condition::Condition;
use crate::core::error::RegistryError;
use crate::core::registry::ActionRegistry;
use crate::core::state::{BindingType, StateStore};
use crate::feedback::{FeedbackLoop, Rewriter, Transformer, Validator};
use crate::gate::{HumanGate, InputSource};
use crate::io::config::FlowConfig;
use crate::io::prompt::{PlanPrompt, PromptEngine, Question, ResearchPrompt};

pub const COLLECT_RESEARCH_REQUEST: &str = "collect research request";
pub const ANALYSE_MARKET: &str = "analyse market";
pub const COLLECT_RISK_PROFILE: &str = "collect risk profile";
pub const COLLECT_INVESTMENT_HORIZON: &str = "collect investment horizon";
pub const DRAFT_TRADING_PLAN: &str = "draft trading plan";
pub const PUBLISH_TRADING_PLAN: &str = "publish trading plan";

pub const RESEARCH_REQUESTED: &str = "researchRequested";
pub const MARKET_ANALYSED: &str = "marketAnalysed";
pub const RISK_PROFILE_KNOWN: &str = "riskProfileKnown";
pub const INVESTMENT_PERIOD_KNOWN: &str = "investmentPeriodKnown";
pub const PLAN_DRAFTED: &str = "planDrafted";

/// Binding that holds the published markdown report.
pub const REPORT_BINDING: &str = "tradingPlanReport";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub ticker: String,
    pub max_data_age_days: u32,
    pub target_result_count: u32,
}

impl ResearchRequest {
    pub fn new(ticker: &str, settings: &WorkflowSettings) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            max_data_age_days: settings.max_data_age_days,
            target_result_count: settings.target_result_count,
        }
    }
}

impl BindingType for ResearchRequest {
    const TYPE_NAME: &'static str = "researchRequest";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketReport {
    pub ticker: String,
    pub analysis: String,
}

impl BindingType for MarketReport {
    const TYPE_NAME: &'static str = "marketReport";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskProfile(pub String);

impl BindingType for RiskProfile {
    const TYPE_NAME: &'static str = "riskProfile";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestmentPeriod(pub String);

impl BindingType for InvestmentPeriod {
    const TYPE_NAME: &'static str = "investmentPeriod";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingPlan {
    pub ticker: String,
    pub risk_profile: String,
    pub investment_period: String,
    pub strategies: String,
    /// Attempt on which the critic accepted the plan.
    pub attempts: u32,
    pub critique: String,
}

impl BindingType for TradingPlan {
    const TYPE_NAME: &'static str = "tradingPlan";
}

/// Tunables the workflow reads from [`FlowConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub max_attempts: u32,
    pub max_word_count: u32,
    pub max_data_age_days: u32,
    pub target_result_count: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_word_count: 300,
            max_data_age_days: 7,
            target_result_count: 10,
        }
    }
}

impl WorkflowSettings {
    pub fn from_config(cfg: &FlowConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            max_word_count: cfg.max_word_count,
            ..Self::default()
        }
    }
}

/// Everything the workflow talks to. The generator drafts; the validator and
/// rewriter judge both operator answers and drafts.
#[derive(Clone)]
pub struct Collaborators<'c> {
    pub generator: &'c dyn Transformer<Output = String>,
    pub validator: &'c dyn Validator<String>,
    pub rewriter: &'c dyn Rewriter,
    pub input: &'c dyn InputSource,
    pub prompts: &'c PromptEngine,
    pub cancel: Option<CancelFlag>,
}

impl Collaborators<'_> {
    fn ask(&self, question: Question, max_attempts: u32) -> Result<String> {
        let mut gate = HumanGate::new(self.input, self.validator, self.rewriter)
            .with_max_attempts(max_attempts);
        if let Some(cancel) = &self.cancel {
            gate = gate.with_cancel(cancel.clone());
        }
        let answer = gate.ask(question.text())?;
        Ok(answer.trim().to_string())
    }
}

/// Operator answers supplied up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answers {
    pub ticker: Option<String>,
    pub risk_profile: Option<String>,
    pub horizon: Option<String>,
}

/// Seed state holding whatever answers are already known.
pub fn seed_state(answers: &Answers, settings: &WorkflowSettings) -> Result<StateStore> {
    let mut state = StateStore::new();
    if let Some(ticker) = answers.ticker.as_deref() {
        state
            .insert_default(&ResearchRequest::new(ticker, settings))
            .context("seed research request")?;
    }
    if let Some(risk) = answers.risk_profile.as_deref() {
        state
            .insert_default(&RiskProfile(risk.trim().to_string()))
            .context("seed risk profile")?;
    }
    if let Some(horizon) = answers.horizon.as_deref() {
        state
            .insert_default(&InvestmentPeriod(horizon.trim().to_string()))
            .context("seed investment period")?;
    }
    Ok(state)
}

/// Render the published report.
pub fn render_report(plan: &TradingPlan) -> String {
    let attempts = match plan.attempts {
        1 => "1 attempt".to_string(),
        n => format!("{n} attempts"),
    };
    format!(
        "# Trading plan: {}\n\n\
         - Risk profile: {}\n\
         - Investment horizon: {}\n\
         - Accepted after {}: {}\n\n\
         {}\n",
        plan.ticker,
        plan.risk_profile,
        plan.investment_period,
        attempts,
        plan.critique.trim(),
        plan.strategies.trim()
    )
}

fn non_blank(text: &str) -> bool {
    !text.trim().is_empty()
}

/// Declare the trading workflow over `collab`.
pub fn registry<'c>(
    collab: &Collaborators<'c>,
    settings: &WorkflowSettings,
) -> Result<ActionRegistry<'c>, RegistryError> {
    let max_attempts = settings.max_attempts;

    let ticker_gate = collab.clone();
    let research_settings = settings.clone();
    let collect_research_request = Action::builder(COLLECT_RESEARCH_REQUEST)
        .post(RESEARCH_REQUESTED)
        .run(move |_| {
            let ticker = ticker_gate.ask(Question::Ticker, max_attempts)?;
            Ok(ResearchRequest::new(&ticker, &research_settings))
        });

    let generator = collab.generator;
    let prompts = collab.prompts;
    let max_word_count = settings.max_word_count;
    let analyse_market = Action::builder(ANALYSE_MARKET)
        .input::<ResearchRequest>()
        .pre(RESEARCH_REQUESTED)
        .post(MARKET_ANALYSED)
        .run(move |inputs| {
            let request = inputs.get::<ResearchRequest>()?;
            let prompt = prompts.render_research(&ResearchPrompt {
                ticker: &request.ticker,
                max_data_age_days: request.max_data_age_days,
                target_result_count: request.target_result_count,
                max_word_count,
            })?;
            let analysis = generator
                .transform(&prompt)
                .with_context(|| format!("research {}", request.ticker))?;
            info!(ticker = %request.ticker, "market analysed");
            Ok(MarketReport {
                ticker: request.ticker,
                analysis,
            })
        });

    let risk_gate = collab.clone();
    let collect_risk_profile = Action::builder(COLLECT_RISK_PROFILE)
        .post(RISK_PROFILE_KNOWN)
        .run(move |_| Ok(RiskProfile(risk_gate.ask(Question::RiskProfile, max_attempts)?)));

    let horizon_gate = collab.clone();
    let collect_investment_horizon = Action::builder(COLLECT_INVESTMENT_HORIZON)
        .pre(RISK_PROFILE_KNOWN)
        .post(INVESTMENT_PERIOD_KNOWN)
        .run(move |_| {
            Ok(InvestmentPeriod(
                horizon_gate.ask(Question::Horizon, max_attempts)?,
            ))
        });

    let drafter = collab.clone();
    let draft_trading_plan = Action::builder(DRAFT_TRADING_PLAN)
        .input::<MarketReport>()
        .input::<RiskProfile>()
        .input::<InvestmentPeriod>()
        .pre(MARKET_ANALYSED)
        .pre(RISK_PROFILE_KNOWN)
        .pre(INVESTMENT_PERIOD_KNOWN)
        .post(PLAN_DRAFTED)
        .run(move |inputs| {
            let market = inputs.get::<MarketReport>()?;
            let RiskProfile(risk_profile) = inputs.get::<RiskProfile>()?;
            let InvestmentPeriod(investment_period) = inputs.get::<InvestmentPeriod>()?;
            let prompt = drafter.prompts.render_plan(&PlanPrompt {
                ticker: &market.ticker,
                market_report: &market.analysis,
                risk_profile: &risk_profile,
                investment_period: &investment_period,
                max_word_count,
            })?;

            let mut feedback =
                FeedbackLoop::new(drafter.generator, drafter.validator, drafter.rewriter)
                    .with_max_attempts(max_attempts);
            if let Some(cancel) = &drafter.cancel {
                feedback = feedback.with_cancel(cancel.clone());
            }
            let resolved = feedback.resolve(&prompt)?;
            Ok(TradingPlan {
                ticker: market.ticker,
                risk_profile,
                investment_period,
                strategies: resolved.response,
                attempts: resolved.attempts,
                critique: resolved.critique.reasoning,
            })
        });

    let publish_trading_plan = Action::builder(PUBLISH_TRADING_PLAN)
        .input::<TradingPlan>()
        .pre(PLAN_DRAFTED)
        .output_binding(REPORT_BINDING)
        .goal()
        .run(|inputs| Ok(render_report(&inputs.get::<TradingPlan>()?)));

    ActionRegistry::builder()
        .condition(Condition::present::<ResearchRequest>(RESEARCH_REQUESTED))
        .condition(Condition::present::<MarketReport>(MARKET_ANALYSED))
        .condition(Condition::matches::<RiskProfile>(
            RISK_PROFILE_KNOWN,
            None,
            |risk| non_blank(&risk.0),
        ))
        .condition(Condition::matches::<InvestmentPeriod>(
            INVESTMENT_PERIOD_KNOWN,
            None,
            |period| non_blank(&period.0),
        ))
        .condition(Condition::matches::<TradingPlan>(
            PLAN_DRAFTED,
            None,
            |plan| non_blank(&plan.strategies),
        ))
        .action(collect_research_request)
        .action(analyse_market)
        .action(collect_risk_profile)
        .action(collect_investment_horizon)
        .action(draft_trading_plan)
        .action(publish_trading_plan)
        .build()
}

/// Report file name for a run finished on `date`.
pub fn report_file_name(date: chrono::NaiveDate) -> String {
    format!("trading-plan-{}.md", date.format("%Y-%m-%d"))
}
