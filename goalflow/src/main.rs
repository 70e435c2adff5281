//! goalflow CLI.
//!
//! Runs the trading-advisor workflow: operator answers are collected on the
//! terminal, model calls go through the configured generator and critic
//! commands, and the accepted plan is written to the report directory. With
//! `--execute` the operator then picks one of the plan's strategies and an
//! execution plan for it is written next to the trading plan.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::warn;

use goalflow::cancel::CancelFlag;
use goalflow::core::action::Action;
use goalflow::core::registry::ActionRegistry;
use goalflow::core::state::StateStore;
use goalflow::exit_codes;
use goalflow::io::command::CommandTransformer;
use goalflow::io::config::{DEFAULT_CONFIG_PATH, FlowConfig, load_config, write_config};
use goalflow::io::critic::{ModelCritic, ModelRewriter};
use goalflow::io::prompt::PromptEngine;
use goalflow::io::run_log::{RunEnd, RunLog};
use goalflow::io::sink::FileSink;
use goalflow::io::terminal::terminal;
use goalflow::logging;
use goalflow::run::{Run, RunOptions, persist_result};
use goalflow::workflow::execution::{self, execution_report_file_name};
use goalflow::workflow::trading::{
    self, Answers, Collaborators, WorkflowSettings, report_file_name, seed_state,
};

#[derive(Parser)]
#[command(
    name = "goalflow",
    version,
    about = "Goal-directed workflow runner with critique-driven retries"
)]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Load the config and build the workflow, reporting any problem.
    Validate,
    /// List each workflow's actions in declaration order.
    Describe,
    /// Run the workflow until the trading plan is published.
    Run {
        /// Continue with the execution plan for a chosen strategy.
        #[arg(long)]
        execute: bool,
        /// Ticker to analyse; skips the ticker question.
        #[arg(long)]
        ticker: Option<String>,
        /// Risk attitude; skips the risk question.
        #[arg(long)]
        risk_profile: Option<String>,
        /// Investment horizon; skips the horizon question.
        #[arg(long)]
        horizon: Option<String>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate => cmd_validate(&cli.config),
        Command::Describe => cmd_describe(&cli.config),
        Command::Run {
            execute,
            ticker,
            risk_profile,
            horizon,
        } => cmd_run(
            &cli.config,
            Answers {
                ticker,
                risk_profile,
                horizon,
            },
            execute,
        ),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        println!("kept existing {}", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &FlowConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

/// Wire the configured commands, the prompts and the terminal into
/// [`Collaborators`] and hand them to `f`.
fn with_collaborators<R>(
    cfg: &FlowConfig,
    f: impl FnOnce(&Collaborators<'_>, &WorkflowSettings) -> Result<R>,
) -> Result<R> {
    let generator = CommandTransformer::from_config(&cfg.generator).context("generator command")?;
    let critic = CommandTransformer::from_config(&cfg.critic).context("critic command")?;
    let prompts = PromptEngine::new();
    let validator = ModelCritic::new(&critic, &prompts);
    let rewriter = ModelRewriter::new(&critic, &prompts);
    let cancel = CancelFlag::new();
    let input = terminal().with_cancel(cancel.clone());
    let collab = Collaborators {
        generator: &generator,
        validator: &validator,
        rewriter: &rewriter,
        input: &input,
        prompts: &prompts,
        cancel: Some(cancel),
    };
    f(&collab, &WorkflowSettings::from_config(cfg))
}

fn cmd_validate(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    with_collaborators(&cfg, |collab, settings| {
        let workflows = [
            ("trading", trading::registry(collab, settings)?),
            ("execution", execution::registry(collab, settings)?),
        ];
        for (label, registry) in &workflows {
            println!(
                "ok: {label}: {} actions, goal '{}'",
                registry.actions().len(),
                registry.goal().name()
            );
        }
        Ok(exit_codes::OK)
    })
}

fn cmd_describe(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    with_collaborators(&cfg, |collab, settings| {
        let trading_registry = trading::registry(collab, settings)?;
        let execution_registry = execution::registry(collab, settings)?;
        print!(
            "trading workflow:\n{}\nexecution workflow:\n{}",
            describe(&trading_registry),
            describe(&execution_registry)
        );
        Ok(exit_codes::OK)
    })
}

fn cmd_run(config_path: &Path, answers: Answers, execute: bool) -> Result<i32> {
    let cfg = load_config(config_path)?;
    with_collaborators(&cfg, |collab, settings| {
        let today = Local::now().date_naive();
        let registry = trading::registry(collab, settings)?;
        let seed = seed_state(&answers, settings)?;
        let state = match run_workflow(&cfg, &registry, collab, seed, &report_file_name(today))? {
            Ended::Published(state) => state,
            Ended::Exit(code) => return Ok(code),
        };
        if !execute {
            return Ok(exit_codes::OK);
        }

        let registry = execution::registry(collab, settings)?;
        let name = execution_report_file_name(today);
        match run_workflow(&cfg, &registry, collab, state, &name)? {
            Ended::Published(_) => Ok(exit_codes::OK),
            Ended::Exit(code) => Ok(code),
        }
    })
}

/// How a workflow run ended.
enum Ended {
    /// The goal ran and its report was written; carries the final state.
    Published(StateStore),
    Exit(i32),
}

fn run_workflow(
    cfg: &FlowConfig,
    registry: &ActionRegistry<'_>,
    collab: &Collaborators<'_>,
    seed: StateStore,
    report_name: &str,
) -> Result<Ended> {
    let mut log = RunLog::create(&cfg.run_log_dir)?;
    let mut run = Run::new(
        registry,
        RunOptions {
            max_steps: cfg.max_steps,
        },
    )
    .with_state(seed);
    if let Some(cancel) = &collab.cancel {
        run = run.with_cancel(cancel.clone());
    }
    let outcome = run.run_to_goal(|step| {
        if let Err(err) = log.record_step(step) {
            warn!(err = %format!("{err:#}"), "failed to journal step");
        }
    });

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            log.finish(
                run.state(),
                RunEnd::Failed {
                    error: err.to_string(),
                },
                None,
            )?;
            eprintln!("{err}");
            eprintln!("run journal: {}", log.dir().display());
            return Ok(Ended::Exit(exit_codes::for_flow_error(&err)));
        }
    };

    let sink = FileSink::new(&cfg.report_dir);
    match persist_result(&sink, report_name, &result) {
        Ok(path) => {
            log.finish(
                run.state(),
                RunEnd::GoalReached {
                    goal_action: result.goal_action.clone(),
                },
                Some(&path),
            )?;
            println!("{}", path.display());
            Ok(Ended::Published(result.state))
        }
        Err(err) => {
            log.finish(
                run.state(),
                RunEnd::Failed {
                    error: err.to_string(),
                },
                None,
            )?;
            eprintln!("{err}");
            // the report is not lost: hand it to stdout instead
            print!("{}", result.render_output());
            Ok(Ended::Exit(exit_codes::for_flow_error(&err)))
        }
    }
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn describe_action(idx: usize, action: &Action<'_>) -> String {
    let mut flags = Vec::new();
    if action.is_goal() {
        flags.push("goal");
    }
    if action.is_rerunnable() {
        flags.push("rerunnable");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    let inputs: Vec<String> = action.inputs().iter().map(ToString::to_string).collect();
    format!(
        "{}. {}{}\n   inputs: {}\n   pre:    {}\n   post:   {}\n   output: {} ({})\n",
        idx + 1,
        action.name(),
        flags,
        list_or_dash(&inputs),
        list_or_dash(action.pre()),
        list_or_dash(action.post()),
        action.output().binding,
        action.output().type_name
    )
}

/// Human-readable listing of every action, in declaration order.
fn describe(registry: &ActionRegistry<'_>) -> String {
    registry
        .actions()
        .iter()
        .enumerate()
        .map(|(idx, action)| describe_action(idx, action))
        .collect()
}
