use anyhow::Result;
use clap::{Parser, Subcommand};
use dossier_local::completion::OpenAiCompatStream;
use dossier_local::orchestrate::{Conversation, QueryOptions};
use dossier_local::search::TavilySearchProvider;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dossier")]
#[command(about = "Grounded answer reports from web search + streamed synthesis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research a question and stream a cited Markdown report to stdout.
    Ask(AskCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor,
    /// Print version info (json).
    Version,
}

#[derive(clap::Args, Debug)]
struct AskCmd {
    /// The question to research.
    query: String,
    /// How many search results to ground the report on.
    #[arg(long, default_value_t = 5)]
    max_results: usize,
    /// Ask the search provider for source images too.
    #[arg(long)]
    include_images: bool,
    /// Model override (default: DOSSIER_OPENAI_COMPAT_MODEL).
    #[arg(long)]
    model: Option<String>,
    /// Mirror the model's reasoning channel to stderr while streaming.
    #[arg(long)]
    show_reasoning: bool,
    /// Print the final section as JSON instead of streaming text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Optional env-file loader (opt-in).
    //
    // Safety:
    // - opt-in only (DOSSIER_ENV_FILE)
    // - sets vars only if not already set in the process environment
    // - does not log values
    if let Ok(p) = std::env::var("DOSSIER_ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() {
            if let Ok(txt) = std::fs::read_to_string(p) {
                for raw in txt.lines() {
                    let s = raw.trim();
                    if s.is_empty() || s.starts_with('#') {
                        continue;
                    }
                    let Some((k, v)) = s.split_once('=') else {
                        continue;
                    };
                    let k = k.trim();
                    if k.is_empty() {
                        continue;
                    }
                    if std::env::var_os(k).is_none() {
                        std::env::set_var(k, v.trim());
                    }
                }
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ask(args) => run_ask(args).await,
        Commands::Doctor => {
            println!("{}", serde_json::to_string_pretty(&doctor())?);
            Ok(())
        }
        Commands::Version => {
            println!(
                "{}",
                serde_json::json!({
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                })
            );
            Ok(())
        }
    }
}

async fn run_ask(args: AskCmd) -> Result<()> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let search = Arc::new(TavilySearchProvider::from_env(client.clone())?);
    let completion = Arc::new(OpenAiCompatStream::from_env(client, args.model.clone())?);
    let opts = QueryOptions {
        max_results: Some(args.max_results),
        include_images: args.include_images,
        include_image_descriptions: args.include_images,
        timeout_ms: None,
    };

    let mut conversation = Conversation::new(search, completion, opts);
    let handle = conversation.submit(&args.query)?;

    if args.json {
        let result = handle.wait().await;
        let section = conversation
            .snapshots()
            .pop()
            .expect("submit appended a section");
        println!("{}", serde_json::to_string_pretty(&section)?);
        if let Err(err) = result {
            anyhow::bail!("{err}");
        }
        return Ok(());
    }

    let mut updates = handle.subscribe();
    let show_reasoning = args.show_reasoning;
    let printer = tokio::spawn(async move {
        let mut printed = String::new();
        let mut reasoning_seen = 0usize;
        loop {
            if updates.changed().await.is_err() {
                break;
            }
            let section = updates.borrow_and_update().clone();
            if show_reasoning && section.reasoning.len() > reasoning_seen {
                eprint!("{}", &section.reasoning[reasoning_seen..]);
                reasoning_seen = section.reasoning.len();
            }
            render_response(&mut printed, &section.response);
            if section.is_terminal() {
                break;
            }
        }
        printed
    });

    let result = handle.wait().await;
    let printed = printer.await.unwrap_or_default();
    if !printed.is_empty() && !printed.ends_with('\n') {
        println!();
    }
    match result {
        Ok(_) => Ok(()),
        Err(err) => Err(anyhow::anyhow!("{err}")),
    }
}

/// Print only the appended suffix while the repaired prefix is stable; when
/// a repair pass rewrites bytes that already went out, re-render the whole
/// report under a marker instead of leaving stale text on screen.
fn render_response(printed: &mut String, current: &str) {
    use std::io::Write;
    if current == printed {
        return;
    }
    let mut out = std::io::stdout().lock();
    if let Some(suffix) = current.strip_prefix(printed.as_str()) {
        let _ = out.write_all(suffix.as_bytes());
    } else {
        let _ = out.write_all(b"\n--- re-rendered ---\n");
        let _ = out.write_all(current.as_bytes());
    }
    let _ = out.flush();
    printed.clear();
    printed.push_str(current);
}

fn doctor() -> serde_json::Value {
    let client = reqwest::Client::new();
    let search = match TavilySearchProvider::from_env(client.clone()) {
        Ok(_) => serde_json::json!({"provider": "tavily", "configured": true}),
        Err(e) => serde_json::json!({
            "provider": "tavily",
            "configured": false,
            "hint": e.message(),
        }),
    };
    let completion = match OpenAiCompatStream::from_env(client, None) {
        Ok(c) => serde_json::json!({
            "provider": "openai_compat",
            "configured": true,
            "base_url": c.base_url(),
        }),
        Err(e) => serde_json::json!({
            "provider": "openai_compat",
            "configured": false,
            "hint": e.message(),
        }),
    };
    let ok = search["configured"].as_bool() == Some(true)
        && completion["configured"].as_bool() == Some(true);
    serde_json::json!({
        "ok": ok,
        "search": search,
        "completion": completion,
        "version": env!("CARGO_PKG_VERSION"),
    })
}
