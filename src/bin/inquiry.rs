//! inquiry CLI - runs scenario files through the in-process run pipeline.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use inquiry::completions::{CompletionProcessor, LogNotifier, Notifier};
use inquiry::config::{ConsumerOptions, ExecutorOptions, ScenarioFile, DEFAULT_PARALLELISM};
use inquiry::domain::{ProjectRun, Run, RunState};
use inquiry::events::{self, Consumer, LocalConsumer};
use inquiry::logging::{init_tracing, LogFormat, DEFAULT_LOG_LEVEL};
use inquiry::repository::{MemoryRepository, ProjectRepository, RunRepository};
use inquiry::runner::Runner;
use inquiry::runs::RunProcessor;
use inquiry::{EventError, Executor, ReqwestClient, ScenarioFileLoader};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// inquiry - declarative HTTP scenario runner.
#[derive(Parser, Debug)]
#[command(name = "inquiry", version, about)]
struct Cli {
    /// Scenario file or directory path.
    #[arg(short = 'p', long = "path")]
    path: Option<String>,

    /// Filter scenarios by name (partial match).
    #[arg(short = 'f', long = "filter")]
    filter: Option<String>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Log level used when RUST_LOG is not set.
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Log output format.
    #[arg(long = "log-format", env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Number of runs processed concurrently.
    #[arg(
        long = "parallelism",
        env = "INQUIRY_PARALLELISM",
        default_value_t = DEFAULT_PARALLELISM
    )]
    parallelism: usize,

    /// Seconds to wait for queued work when shutting down.
    #[arg(long = "close-timeout", default_value_t = 10)]
    close_timeout: u64,

    /// Seconds before a single HTTP request times out.
    #[arg(short = 't', long = "request-timeout", default_value_t = 30)]
    request_timeout: u64,

    /// Seconds to wait for the run to finish.
    #[arg(long = "run-timeout", default_value_t = 600)]
    run_timeout: u64,

    /// Directory to save the run report to.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<String>,

    /// Report output format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Yaml,
    Text,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    summary: &'a ProjectRun,
    run: &'a Run,
}

fn load_scenarios(path: Option<String>, filter: Option<&str>) -> Result<Vec<ScenarioFile>> {
    let mut loader = ScenarioFileLoader::new();

    match path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(anyhow!("Path does not exist: {}", path.display()));
            }
            loader.add_path(path);
        }
        None => {
            for default in ["tests/scenarios", "scenarios"] {
                if Path::new(default).is_dir() {
                    loader.add_path(default);
                }
            }
            if loader.paths.is_empty() {
                loader.add_path(".");
            }
        }
    }

    let mut files = loader.load_all()?;
    if let Some(filter) = filter {
        let filter = filter.to_lowercase();
        files.retain(|f| f.name.to_lowercase().contains(&filter));
    }

    if files.is_empty() {
        return Err(anyhow!("No scenarios found"));
    }
    Ok(files)
}

fn project_name(files: &[ScenarioFile]) -> String {
    files
        .first()
        .and_then(|f| f.path.parent())
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("inquiry")
        .to_string()
}

fn print_run(run: &Run, verbose: bool) {
    for scenario in &run.scenario_run_details {
        let status = if scenario.success {
            "\x1b[32mPASS\x1b[0m"
        } else {
            "\x1b[31mFAIL\x1b[0m"
        };
        info!(
            "{} scenario: {} ({} ms, {} assertions)",
            status,
            scenario.name,
            scenario.duration.as_millis(),
            scenario.assertions
        );

        for (i, step) in scenario.steps.iter().enumerate() {
            let step_status = if step.success {
                "\x1b[32m✓\x1b[0m"
            } else {
                "\x1b[31m✗\x1b[0m"
            };
            info!(
                "  {}. {} {} ({} ms)",
                i + 1,
                step_status,
                step.name,
                step.duration.as_millis()
            );
            if verbose {
                debug!(
                    "     {} (request {} ms, {} retries left)",
                    step.url,
                    step.request_duration.as_millis(),
                    step.retries
                );
            }
        }
    }
}

fn render_text(summary: &ProjectRun, run: &Run) -> String {
    let mut content = String::new();
    content.push_str(&format!("Project: {}\n", summary.name));
    content.push_str(&format!("Run: {}\n", run.id));
    content.push_str(&format!(
        "Status: {}\n",
        if summary.success { "PASS" } else { "FAIL" }
    ));
    content.push_str(&format!("Duration: {} ms\n\n", summary.duration.as_millis()));
    content.push_str("Scenarios:\n");
    for scenario in &run.scenario_run_details {
        content.push_str(&format!(
            "  {} ({})\n",
            scenario.name,
            if scenario.success { "PASS" } else { "FAIL" }
        ));
        for (i, step) in scenario.steps.iter().enumerate() {
            content.push_str(&format!(
                "    {}. {} ({}) {} ms\n",
                i + 1,
                step.name,
                if step.success { "PASS" } else { "FAIL" },
                step.duration.as_millis()
            ));
        }
    }
    content
}

fn save_report(
    summary: &ProjectRun,
    run: &Run,
    report_dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    if !report_dir.exists() {
        fs::create_dir_all(report_dir)?;
    }

    let timestamp = Utc::now().timestamp();
    let sanitized_name = summary.name.replace([' ', '/'], "_");
    let report = RunReport { summary, run };

    let (filename, content) = match format {
        ReportFormat::Json => (
            format!("{sanitized_name}-{timestamp}.json"),
            serde_json::to_string_pretty(&report)?,
        ),
        ReportFormat::Yaml => (
            format!("{sanitized_name}-{timestamp}.yaml"),
            serde_yaml::to_string(&report)?,
        ),
        ReportFormat::Text => (
            format!("{sanitized_name}-{timestamp}.txt"),
            render_text(summary, run),
        ),
    };

    let file_path = report_dir.join(filename);
    let mut file = File::create(&file_path)?;
    file.write_all(content.as_bytes())?;

    Ok(file_path)
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Queue one run of `project_id` and wait until the run pipeline has
/// processed it.
async fn execute_run(cli: &Cli, repo: Arc<MemoryRepository>, project_id: Uuid) -> Result<Run> {
    let options = ConsumerOptions::default()
        .with_parallelism(cli.parallelism)
        .with_close_timeout(Duration::from_secs(cli.close_timeout));
    let client = ReqwestClient::new(&ExecutorOptions {
        request_timeout: Duration::from_secs(cli.request_timeout),
    })?;

    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    let (completion_producer, completion_rx) = events::channel::<Uuid>(options.channel_capacity);
    let completions = Arc::new(LocalConsumer::new(
        completion_rx,
        Arc::new(CompletionProcessor::new(notifiers, repo.clone(), repo.clone())),
        options.clone(),
    )?);

    let (run_producer, run_rx) = events::channel::<Uuid>(options.channel_capacity);
    let runs = Arc::new(LocalConsumer::new(
        run_rx,
        Arc::new(RunProcessor::new(
            repo.clone(),
            repo.clone(),
            Arc::new(completion_producer),
            Arc::new(Executor::new(Arc::new(client))),
        )),
        options.clone(),
    )?);

    let completions_task = tokio::spawn({
        let consumer = completions.clone();
        async move { consumer.consume().await }
    });
    let runs_task = tokio::spawn({
        let consumer = runs.clone();
        async move { consumer.consume().await }
    });

    let runner = Runner::new(repo.clone(), repo.clone(), Arc::new(run_producer));
    let run = runner.run_project(project_id).await?;
    info!("Queued run {}", run.id);

    // Closing the runs consumer drains the queued run.
    match runs
        .shutdown_until(ctrl_c(), Duration::from_secs(cli.run_timeout))
        .await
    {
        Ok(()) => {}
        Err(EventError::Cancelled) => return Err(anyhow!("Run {} interrupted", run.id)),
        Err(e) => return Err(e).context(format!("Run {} did not finish", run.id)),
    }
    runs_task.await?.context("Run consumer failed")?;

    if let Err(e) = completions.shutdown(options.close_timeout).await {
        warn!("Completion notifications were not flushed: {}", e);
    } else {
        completions_task.await?.context("Completion consumer failed")?;
    }

    Ok(repo.get(run.id).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    init_tracing(level, cli.log_format);

    let files = load_scenarios(cli.path.clone(), cli.filter.as_deref())?;
    info!("Running {} scenario(s)...", files.len());

    let repo = Arc::new(MemoryRepository::new());
    let project = ProjectRepository::create(repo.as_ref(), &project_name(&files)).await?;
    for file in &files {
        repo.add_scenario(project.id, &file.name, &file.content).await;
    }

    let run = execute_run(&cli, repo.clone(), project.id).await?;

    if run.state == RunState::Failure {
        error!(
            "\x1b[31mRun failed: {}\x1b[0m",
            run.error_message.as_deref().unwrap_or("unknown error")
        );
        exit(1);
    }

    print_run(&run, cli.verbose);
    let summary = ProjectRun::new(&project, &run);
    let passed = summary.scenario_runs.iter().filter(|s| s.success).count();
    info!(
        "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m\n  Duration: {} ms",
        summary.scenario_runs.len(),
        passed,
        summary.scenario_runs.len() - passed,
        summary.duration.as_millis()
    );

    if let Some(dir) = &cli.report_dir {
        match save_report(&summary, &run, Path::new(dir), cli.report_format) {
            Ok(path) => info!("Report saved: {}", path.display()),
            Err(e) => error!("Failed to save report: {}", e),
        }
    }

    if !run.success {
        exit(1);
    }

    Ok(())
}
