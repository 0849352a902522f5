//! docket - ローカルの data directory に対して docket-core を動かす CLI
//!
//! job store とドキュメントは `--data-dir` 以下に 1 key = 1 ファイルで保存される。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;

use docket_core::app::{ReconcileReport, SaveStatus};
use docket_core::domain::{DocumentTaskInstance, JobStatus};
use docket_core::impls::{FileKvStore, InMemoryKvStore, KvDocumentSink};
use docket_core::observability::{LogFormat, init_logging};
use docket_core::ports::{IdGenerator, KvStore, SystemClock, UlidGenerator};
use docket_core::{DocketConfig, JobEvent, Orchestrator, OrchestratorBuilder};

#[derive(Debug, Parser)]
#[command(name = "docket")]
#[command(author, version, about = "Document task workflows driven by async jobs", long_about = None)]
struct Cli {
    /// Directory holding the job store and saved documents.
    #[arg(long, env = "DOCKET_DATA_DIR", default_value = ".docket")]
    data_dir: PathBuf,

    /// JSON configuration file.
    #[arg(long, env = "DOCKET_CONFIG")]
    config: Option<PathBuf>,

    /// Session user recorded on job writes.
    #[arg(long, env = "DOCKET_USER", default_value = "local")]
    user: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Debug logging.
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the registered task types.
    TaskTypes,
    /// Create and save a new document.
    New(NewArgs),
    /// Show a saved document after reconciling it against the job store.
    Show { document_id: String },
    /// List saved document ids.
    Documents,
    /// Apply a job status callback (JSON file) to a saved document.
    JobEvent(JobEventArgs),
    /// Inspect or tidy the job session store.
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// Walk through a question import on an in-memory store.
    Scenario,
}

#[derive(Debug, Args)]
struct NewArgs {
    task_type: String,
    /// Composite `accountId#projectId`.
    project_id: String,
    project_name: String,
    #[arg(long, default_value = "")]
    owner: String,
    /// Title to use instead of the generated one.
    #[arg(long)]
    title: Option<String>,
}

#[derive(Debug, Args)]
struct JobEventArgs {
    /// Callback payload as JSON.
    file: PathBuf,
    #[arg(long)]
    document: String,
}

#[derive(Debug, Subcommand)]
enum JobsCommand {
    List,
    Counts,
    Cleanup,
    Clear,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let directive = if cli.verbose { "debug" } else { "warn" };
    init_logging(LogFormat::Pretty, directive);

    let config = match &cli.config {
        Some(path) => DocketConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DocketConfig::default(),
    };

    match cli.command {
        Commands::Scenario => run_scenario(config, cli.format).await,
        command => run_on_data_dir(&cli.data_dir, &cli.user, config, command, cli.format).await,
    }
}

async fn run_on_data_dir(
    data_dir: &Path,
    user: &str,
    config: DocketConfig,
    command: Commands,
    format: OutputFormat,
) -> Result<()> {
    // (A) data directory 上の KvStore と DocumentSink を用意
    let kv: Arc<dyn KvStore> = Arc::new(
        FileKvStore::open(data_dir)
            .with_context(|| format!("opening data dir {}", data_dir.display()))?,
    );
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
    let sink = Arc::new(KvDocumentSink::new(Arc::clone(&kv), Arc::clone(&ids)));

    // (B) Orchestrator を組み立てる（form の登録漏れはここで失敗する）
    let orchestrator = OrchestratorBuilder::new()
        .with_config(config)
        .with_kv_store(kv)
        .with_id_generator(ids)
        .with_document_sink(sink.clone())
        .with_builtin_forms()?
        .build()?;
    tracing::debug!(data_dir = %data_dir.display(), "orchestrator ready");
    orchestrator.login(user);

    // (C) サブコマンドを実行
    match command {
        Commands::TaskTypes => {
            let types = orchestrator.list_task_types();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&types)?),
                OutputFormat::Text => {
                    for t in &types {
                        println!("{:<36} {} ({} stages)", t.task_type, t.display_label, t.stage_count);
                    }
                }
            }
        }
        Commands::New(args) => {
            let mut inst = orchestrator.create_new(
                &args.task_type,
                &args.project_id,
                &args.project_name,
                &args.owner,
            )?;
            if let Some(title) = args.title {
                inst.set_title(title);
            }
            let document_id = save_now(&orchestrator, inst).await?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "documentId": document_id })),
                OutputFormat::Text => println!("created {document_id}"),
            }
        }
        Commands::Show { document_id } => {
            let mut inst = orchestrator.restore_document(&document_id).await?;
            let report = orchestrator.reconcile(&mut inst);
            print_document(&orchestrator, &inst, &report, format)?;
        }
        Commands::Documents => {
            let ids = sink.list_document_ids()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ids)?),
                OutputFormat::Text => ids.iter().for_each(|id| println!("{id}")),
            }
        }
        Commands::JobEvent(args) => {
            let text = std::fs::read_to_string(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            let event: JobEvent = serde_json::from_str(&text)
                .with_context(|| format!("decoding job event {}", args.file.display()))?;

            let mut inst = orchestrator.restore_document(&args.document).await?;
            let report = orchestrator.record_job_event(&mut inst, event)?;
            save_now(&orchestrator, inst.clone()).await?;
            print_document(&orchestrator, &inst, &report, format)?;
        }
        Commands::Jobs(cmd) => run_jobs(&orchestrator, cmd, format)?,
        Commands::Scenario => return run_scenario(orchestrator.config().clone(), format).await,
    }

    // Session の終了時は cleanup（clear_on_logout なら全消去）
    orchestrator.logout();
    Ok(())
}

/// Write `inst` through a scheduler, skipping the debounce. Returns the document id.
async fn save_now(orchestrator: &Orchestrator, inst: DocumentTaskInstance) -> Result<String> {
    let scheduler = orchestrator.open(inst);
    if !scheduler.force_save().await || scheduler.status() != SaveStatus::Saved {
        bail!("document could not be saved");
    }
    let shared = scheduler.instance();
    let inst = shared.lock().await;
    inst.document_id
        .clone()
        .context("saved document has no id")
}

fn run_jobs(orchestrator: &Orchestrator, cmd: JobsCommand, format: OutputFormat) -> Result<()> {
    let jobs = orchestrator.jobs();
    match (cmd, format) {
        (JobsCommand::List, OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&jobs.list_all())?);
        }
        (JobsCommand::List, OutputFormat::Text) => {
            for r in jobs.list_all() {
                println!(
                    "{:<28} {:<22} {:<10} {:>3}%  stage={}",
                    r.job_id,
                    r.job_type,
                    r.status.as_str(),
                    r.progress,
                    r.stage_id().unwrap_or("-")
                );
            }
        }
        (JobsCommand::Counts, OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&jobs.counts())?);
        }
        (JobsCommand::Counts, OutputFormat::Text) => {
            let counts = jobs.counts();
            for status in JobStatus::ALL {
                println!("{:<10} {}", status.as_str(), counts.get(status));
            }
            println!("{:<10} {}", "TOTAL", counts.total);
        }
        (JobsCommand::Cleanup, format) => {
            let report = jobs.cleanup();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!(
                    "removed {} (expired {}, idle completed {}, over capacity {}), {} remain",
                    report.removed(),
                    report.expired,
                    report.completed_idle,
                    report.over_capacity,
                    report.remaining
                ),
            }
        }
        (JobsCommand::Clear, _) => {
            if !jobs.clear() {
                bail!("job store could not be cleared");
            }
        }
    }
    Ok(())
}

fn print_document(
    orchestrator: &Orchestrator,
    inst: &DocumentTaskInstance,
    report: &ReconcileReport,
    format: OutputFormat,
) -> Result<()> {
    let aggregate = orchestrator.aggregate_status(inst);
    match format {
        OutputFormat::Json => {
            let out = json!({
                "document": inst,
                "aggregateStatus": aggregate,
                "changes": report.changes,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!(
                "{} [{}] {} ({})",
                inst.document_id.as_deref().unwrap_or("(unsaved)"),
                inst.task_type,
                inst.title,
                aggregate
            );
            for stage in &inst.stages {
                println!("  {:<24} {}", stage.stage_id, stage.status.as_str());
            }
            for change in &report.changes {
                println!(
                    "  ~ {}: {} -> {} ({:?})",
                    change.stage_id, change.from, change.to, change.reason
                );
            }
        }
    }
    Ok(())
}

/// question import の一連の流れを in-memory で実演する
async fn run_scenario(config: DocketConfig, format: OutputFormat) -> Result<()> {
    // (A) in-memory の Orchestrator
    let orchestrator = OrchestratorBuilder::new()
        .with_config(config)
        .with_kv_store(Arc::new(InMemoryKvStore::new()))
        .with_builtin_forms()?
        .build()?;
    orchestrator.login("demo");

    // (B) ドキュメント作成
    let mut inst = orchestrator.create_new(
        "rfp_question_list_new_framework",
        "acct1#proj1",
        "Demo project",
        "demo",
    )?;
    print_document(&orchestrator, &inst, &ReconcileReport::default(), format)?;

    // (C) import job: RUNNING -> COMPLETED
    let events = [
        JobEvent::new("job-import-1", "question_import", JobStatus::Running)
            .from_data_source("question_import")
            .with_progress(30.0),
        JobEvent::new("job-import-1", "question_import", JobStatus::Completed)
            .from_data_source("question_import")
            .with_result(json!({ "importSummary": { "totalQuestionsImported": 5 } })),
        // 完了後に同じ stage の job が走っても COMPLETED のまま
        JobEvent::new("job-import-2", "question_import", JobStatus::Running)
            .for_stage("upload_questions"),
    ];
    for event in events {
        let report = orchestrator.record_job_event(&mut inst, event)?;
        print_document(&orchestrator, &inst, &report, format)?;
    }

    // (D) 保存して読み戻す
    let document_id = save_now(&orchestrator, inst).await?;
    let mut restored = orchestrator.restore_document(&document_id).await?;
    let report = orchestrator.reconcile(&mut restored);
    print_document(&orchestrator, &restored, &report, format)?;

    orchestrator.logout();
    Ok(())
}
