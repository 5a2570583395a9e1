use adflow_client::api::types::{
    ExperimentStatus, Language, ListAssetsParams, ListExperimentsParams, ListTasksParams, ListTracesParams,
};
use adflow_client::cancel::CancelToken;
use adflow_client::catalog::Catalog;
use adflow_client::logging::{log, obj, v_num, v_str, Domain, Level};
use adflow_client::metrics::{annotate, warmup_success_rate};
use adflow_client::workflow::{Applied, WorkflowStateMachine};
use adflow_client::{ApiClient, Config};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::json;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn usage() {
    println!("adflow - operator client for the ad-creative backend\n");
    println!("Commands:");
    println!("  ping                          - Check the backend is reachable");
    println!("  tasks [page]                  - List generation tasks");
    println!("  task <id>                     - Show one task");
    println!("  delete-task <id>              - Delete a task");
    println!("  assets [page]                 - List generated assets");
    println!("  catalog [product]             - Creative choices, optionally for one product");
    println!("  experiments [status]          - List experiments");
    println!("  metrics <experiment_id>       - Per-variant CTR report");
    println!("  activate|pause|archive <id>   - Change experiment status");
    println!("  assign <experiment_id> [user] - Preview variant assignment");
    println!("  traces [page]                 - List model call traces");
    println!("  trace <id>                    - Show one trace");
    println!("  warmup                        - Warmup status");
    println!("  warmup-run                    - Trigger a warmup run");
    println!("  generate <product> [auto|zh|en] - Run the copywriting + creative workflow");
    println!("\nEnvironment: ADFLOW_API_BASE, ADFLOW_API_BASE_FALLBACK, ADFLOW_CACHE_TTL_SECS, ADFLOW_TIMEOUT_MS, ADFLOW_PAGE_SIZE");
}

fn arg<'a>(args: &'a [String], idx: usize, what: &str) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument: {}", what))
}

fn page_arg(args: &[String], idx: usize) -> Result<Option<u32>> {
    args.get(idx)
        .map(|p| p.parse::<u32>().with_context(|| format!("invalid page: {}", p)))
        .transpose()
}

fn parse_status(s: &str) -> Result<ExperimentStatus> {
    Ok(match s {
        "draft" => ExperimentStatus::Draft,
        "active" => ExperimentStatus::Active,
        "paused" => ExperimentStatus::Paused,
        "archived" => ExperimentStatus::Archived,
        other => bail!("unknown experiment status: {}", other),
    })
}

fn parse_language(s: Option<&String>) -> Result<Language> {
    Ok(match s.map(String::as_str) {
        None | Some("auto") => Language::Auto,
        Some("zh") => Language::Zh,
        Some("en") => Language::En,
        Some(other) => bail!("unknown language: {}", other),
    })
}

async fn run_generate(client: &ApiClient, product: &str, language: Language) -> Result<()> {
    let cancel = CancelToken::new();
    let mut wf = WorkflowStateMachine::new();
    wf.set_product_name(product);
    wf.set_language(language);

    match wf.generate(client, &cancel).await? {
        Applied::Applied(()) => {}
        Applied::Failed(e) => bail!("copywriting generation failed: {}", e),
        Applied::Discarded => bail!("generation was cancelled"),
    }
    print_json(&wf.summary())?;

    match wf.confirm(client, &cancel).await? {
        Applied::Applied(task) => log(
            Level::Info,
            Domain::System,
            "copywriting_confirmed",
            obj(&[("task_id", v_str(&task.task_id))]),
        ),
        Applied::Failed(e) => bail!("confirm failed: {}", e),
        Applied::Discarded => bail!("confirm was cancelled"),
    }

    match wf.submit(client, &cancel).await? {
        Applied::Applied(task) => print_json(&task),
        Applied::Failed(e) => bail!("start creative failed: {}", e),
        Applied::Discarded => bail!("submit was cancelled"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
        return Ok(());
    }

    let cfg = Config::from_env();
    cfg.validate()?;
    let client = ApiClient::new(&cfg)?;
    log(
        Level::Debug,
        Domain::System,
        "startup",
        obj(&[
            ("api_base", v_str(&cfg.api_base)),
            ("cache_ttl_secs", v_num(cfg.cache_ttl_secs as f64)),
        ]),
    );

    let page_size = Some(cfg.default_page_size);
    let cmd = args[1].as_str();
    match cmd {
        "ping" => {
            client.ping().await?;
            println!("ok");
        }
        "tasks" => {
            let params = ListTasksParams { page: page_arg(&args, 2)?, page_size, status: None };
            print_json(&client.list_tasks(&params).await?)?;
        }
        "task" => print_json(&client.get_task(arg(&args, 2, "task id")?).await?)?,
        "delete-task" => print_json(&client.delete_task(arg(&args, 2, "task id")?).await?)?,
        "assets" => {
            let params = ListAssetsParams { page: page_arg(&args, 2)?, page_size, ..Default::default() };
            print_json(&client.list_assets(&params).await?)?;
        }
        "catalog" => {
            let catalog = Catalog::load(&client, 100).await?;
            match args.get(2) {
                Some(product) => print_json(&catalog.for_product(product))?,
                None => print_json(&catalog)?,
            }
        }
        "experiments" => {
            let status = args.get(2).map(|s| parse_status(s)).transpose()?;
            let params = ListExperimentsParams { page: None, page_size, status };
            print_json(&client.list_experiments(&params).await?)?;
        }
        "metrics" => {
            let snapshot = client.experiment_metrics(arg(&args, 2, "experiment id")?).await?;
            print_json(&annotate(&snapshot))?;
        }
        "activate" | "pause" | "archive" => {
            let id = arg(&args, 2, "experiment id")?;
            let status = match cmd {
                "activate" => ExperimentStatus::Active,
                "pause" => ExperimentStatus::Paused,
                _ => ExperimentStatus::Archived,
            };
            client.update_experiment_status(id, status).await?;
            println!("{} -> {}", id, status.as_str());
        }
        "assign" => {
            let id = arg(&args, 2, "experiment id")?;
            let user = args.get(3).map(String::as_str);
            print_json(&client.assign_variant(id, user).await?)?;
        }
        "traces" => {
            let params = ListTracesParams { page: page_arg(&args, 2)?, page_size, ..Default::default() };
            print_json(&client.list_traces(&params).await?)?;
        }
        "trace" => print_json(&client.trace_detail(arg(&args, 2, "trace id")?).await?)?,
        "warmup" | "warmup-run" => {
            let stats = if cmd == "warmup" {
                client.warmup_status().await?
            } else {
                client.run_warmup().await?
            };
            let rate = warmup_success_rate(&stats);
            print_json(&json!({ "stats": stats, "success_rate": rate }))?;
        }
        "generate" => {
            let product = arg(&args, 2, "product name")?;
            run_generate(&client, product, parse_language(args.get(3))?).await?;
        }
        _ => {
            eprintln!("Unknown command: {}", cmd);
            usage();
        }
    }
    Ok(())
}
