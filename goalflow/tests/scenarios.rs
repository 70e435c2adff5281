//! End-to-end runs over small registries built from scripted collaborators.

use goalflow::core::action::Action;
use goalflow::core::condition::Condition;
use goalflow::core::error::{FlowError, RegistryError};
use goalflow::core::registry::ActionRegistry;
use goalflow::feedback::{FeedbackLoop, RetryError};
use goalflow::gate::HumanGate;
use goalflow::io::prompt::PromptEngine;
use goalflow::io::sink::FileSink;
use goalflow::run::{Run, RunOptions, persist_result};
use goalflow::test_support::{
    MemorySink, RecordingRewriter, ScriptedInput, ScriptedTransformer, ScriptedValidator,
};
use goalflow::workflow::execution::{self, EXECUTION_REPORT_BINDING, Strategy};
use goalflow::workflow::trading::{
    self, Answers, Collaborators, REPORT_BINDING, TradingPlan, WorkflowSettings, seed_state,
};

#[test]
fn human_answers_flow_into_the_goal_output() {
    let input = ScriptedInput::new(&["moderate", "medium-term"]);
    let validator = ScriptedValidator::always_accepting();
    let rewriter = RecordingRewriter::new();
    let gate = HumanGate::new(&input, &validator, &rewriter);

    let registry = ActionRegistry::builder()
        .condition(Condition::present_named::<String>("riskKnown", "risk"))
        .condition(Condition::present_named::<String>("horizonKnown", "horizon"))
        .action(
            Action::builder("ask risk")
                .post("riskKnown")
                .output_binding("risk")
                .run(|_| Ok(gate.ask("Risk attitude?")?)),
        )
        .action(
            Action::builder("ask horizon")
                .pre("riskKnown")
                .post("horizonKnown")
                .output_binding("horizon")
                .run(|_| Ok(gate.ask("Investment horizon?")?)),
        )
        .action(
            Action::builder("write plan")
                .input_named::<String>("risk")
                .input_named::<String>("horizon")
                .pre("riskKnown")
                .pre("horizonKnown")
                .output_binding("plan")
                .goal()
                .run(|inputs| {
                    let risk: String = inputs.named("risk")?;
                    let horizon: String = inputs.named("horizon")?;
                    Ok(format!("a {risk} plan for the {horizon}"))
                }),
        )
        .build()
        .expect("registry");

    let mut run = Run::new(&registry, RunOptions::default());
    let mut seen = Vec::new();
    let result = run
        .run_to_goal(|step| seen.push(step.action.clone()))
        .expect("run");

    assert_eq!(seen, ["ask risk", "ask horizon", "write plan"]);
    assert_eq!(result.history.actions(), seen);
    let plan: String = result.output_as().expect("plan");
    assert_eq!(plan, "a moderate plan for the medium-term");
    assert_eq!(
        input.prompts(),
        ["Risk attitude?".to_string(), "Investment horizon?".to_string()]
    );
}

#[test]
fn third_attempt_is_accepted_after_two_rewrites() {
    let transformer = ScriptedTransformer::responding(&["thin", "vague", "detailed"]);
    let validator = ScriptedValidator::accepting_on(3);
    let rewriter = RecordingRewriter::new();

    let resolved = FeedbackLoop::new(&transformer, &validator, &rewriter)
        .with_max_attempts(5)
        .resolve("write a plan")
        .expect("resolve");

    assert_eq!(resolved.response, "detailed");
    assert_eq!(resolved.attempts, 3);
    assert!(resolved.critique.accepted);
    assert_eq!(transformer.calls(), 3);
    assert_eq!(validator.calls(), 3);
    assert_eq!(rewriter.calls(), 2);
    assert!(
        validator
            .originals()
            .iter()
            .all(|original| original == "write a plan")
    );
    // each retry goes out with the rewritten request
    let requests = transformer.requests();
    assert_eq!(requests[0], "write a plan");
    assert!(requests[2].starts_with(&requests[1]));
}

#[test]
fn exhausted_retries_abort_the_run() {
    let transformer = ScriptedTransformer::responding(&["draft one", "draft two"]);
    let validator = ScriptedValidator::never_accepting();
    let rewriter = RecordingRewriter::new();

    let registry = ActionRegistry::builder()
        .action(
            Action::builder("draft")
                .output_binding("draft")
                .goal()
                .run(|_| {
                    Ok(FeedbackLoop::new(&transformer, &validator, &rewriter)
                        .with_max_attempts(2)
                        .resolve("write a plan")?
                        .response)
                }),
        )
        .build()
        .expect("registry");

    let mut run = Run::new(&registry, RunOptions::default());
    let err = run.run_to_goal(|_| {}).unwrap_err();
    match &err {
        FlowError::RetryExhausted {
            action, attempts, ..
        } => {
            assert_eq!(action, "draft");
            assert_eq!(*attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transformer.calls(), 2);
    assert_eq!(validator.calls(), 2);
    assert_eq!(rewriter.calls(), 1);
    assert!(!run.state().contains("draft"));
    assert!(run.finished_result().is_none());
}

#[test]
fn exhaustion_reports_the_last_reasoning() {
    let transformer = ScriptedTransformer::responding(&[]);
    let validator = ScriptedValidator::never_accepting();
    let rewriter = RecordingRewriter::new();

    let err = FeedbackLoop::new(&transformer, &validator, &rewriter)
        .with_max_attempts(2)
        .resolve("write a plan")
        .unwrap_err();
    assert!(matches!(
        err,
        RetryError::Exhausted { attempts: 2, ref reasoning } if reasoning == "rejected verdict 2"
    ));
}

#[test]
fn two_goal_actions_are_rejected_at_build_time() {
    let err = ActionRegistry::builder()
        .action(
            Action::builder("publish")
                .output_binding("report")
                .goal()
                .run(|_| Ok("report".to_string())),
        )
        .action(
            Action::builder("archive")
                .output_binding("archive")
                .goal()
                .run(|_| Ok(true)),
        )
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        RegistryError::MultipleGoals(vec!["publish".into(), "archive".into()])
    );
}

#[test]
fn trading_workflow_publishes_through_a_sink() {
    let generator = ScriptedTransformer::responding(&[
        "NVDA rallied on data-centre demand.",
        "Buy on pullbacks, trim above the prior high.",
    ]);
    let validator = ScriptedValidator::always_accepting();
    let rewriter = RecordingRewriter::new();
    let input = ScriptedInput::new(&[]);
    let prompts = PromptEngine::new();
    let collab = Collaborators {
        generator: &generator,
        validator: &validator,
        rewriter: &rewriter,
        input: &input,
        prompts: &prompts,
        cancel: None,
    };
    let settings = WorkflowSettings::default();
    let registry = trading::registry(&collab, &settings).expect("registry");
    let seed = seed_state(
        &Answers {
            ticker: Some(" nvda ".into()),
            risk_profile: Some("aggressive".into()),
            horizon: Some("two years".into()),
        },
        &settings,
    )
    .expect("seed");

    let mut run = Run::new(&registry, RunOptions::default()).with_state(seed);
    let result = run.run_to_goal(|_| {}).expect("run");

    assert!(input.prompts().is_empty());
    assert_eq!(result.output_binding, REPORT_BINDING);
    let plan: TradingPlan = result.state.get(None).expect("plan binding");
    assert_eq!(plan.ticker, "NVDA");
    assert_eq!(plan.attempts, 1);

    let sink = MemorySink::new();
    persist_result(&sink, "plan.md", &result).expect("persist");
    let report = sink.get("plan.md").expect("written");
    assert!(report.starts_with("# Trading plan: NVDA\n"));
    assert!(report.contains("- Risk profile: aggressive\n"));
    assert!(report.contains("Buy on pullbacks"));

    let temp = tempfile::tempdir().expect("tempdir");
    let path = persist_result(&FileSink::new(temp.path()), "plan.md", &result).expect("file");
    assert_eq!(std::fs::read_to_string(path).expect("read"), report);
}

#[test]
fn execution_plan_continues_from_the_trading_state() {
    let generator = ScriptedTransformer::responding(&[
        "AMD gained share in servers.",
        "1. Trend following: ride the 50-day average\n2. Mean reversion: fade spikes",
        "scale in over three weeks",
        "## Entry\n- scale in over three weeks",
    ]);
    let validator = ScriptedValidator::always_accepting();
    let rewriter = RecordingRewriter::new();
    let input = ScriptedInput::new(&["3", "2"]);
    let prompts = PromptEngine::new();
    let collab = Collaborators {
        generator: &generator,
        validator: &validator,
        rewriter: &rewriter,
        input: &input,
        prompts: &prompts,
        cancel: None,
    };
    let settings = WorkflowSettings::default();
    let seed = seed_state(
        &Answers {
            ticker: Some("amd".into()),
            risk_profile: Some("moderate".into()),
            horizon: Some("one year".into()),
        },
        &settings,
    )
    .expect("seed");

    let trading_registry = trading::registry(&collab, &settings).expect("trading registry");
    let trading = Run::new(&trading_registry, RunOptions::default())
        .with_state(seed)
        .run_to_goal(|_| {})
        .expect("trading run");

    let execution_registry =
        execution::registry(&collab, &settings).expect("execution registry");
    let result = Run::new(&execution_registry, RunOptions::default())
        .with_state(trading.state)
        .run_to_goal(|_| {})
        .expect("execution run");

    assert_eq!(result.output_binding, EXECUTION_REPORT_BINDING);
    let strategy: Strategy = result.state.get(None).expect("strategy");
    assert_eq!(strategy.name, "Mean reversion");
    // "3" was refused, so the operator saw the menu twice
    assert_eq!(input.prompts().len(), 2);
    assert_eq!(validator.calls(), 1);

    let report = result.render_output();
    assert!(report.starts_with("# Execution plan: AMD\n"), "{report}");
    assert!(report.contains("- Strategy: 2. Mean reversion\n"));
    assert!(report.contains("- Investment horizon: one year\n"));
    assert!(report.ends_with("## Entry\n- scale in over three weeks\n"));
    assert!(result.state.contains(REPORT_BINDING));
}
