use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use triage_core::{
    compose, evaluate_cases, EmbeddingProvider, EvalCase, HashEmbeddingProvider, MatchEngine,
    MiniLmEmbeddingProvider, DEFAULT_CACHE_DIR, DEFAULT_REPLY_THRESHOLD,
};

const NOT_SURE: &str =
    "I'm not sure which disease matches your symptoms, please describe them more clearly.";

#[derive(Debug, Parser)]
#[command(name = "triage")]
#[command(about = "Symptom-to-disease matcher CLI")]
struct Cli {
    /// Path to the all-MiniLM-L6-v2 .safetensors file. When provided with
    /// --tokenizer-path, uses neural embeddings.
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Path to the tokenizer.json file. Required when --model-path is set.
    #[arg(long, global = true)]
    tokenizer_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive symptom-checker loop.
    Chat {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REPLY_THRESHOLD)]
        threshold: f32,
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },
    /// One-shot query against the corpus.
    Query {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        question: String,
        #[arg(long, default_value_t = DEFAULT_REPLY_THRESHOLD)]
        threshold: f32,
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },
    /// Run scripted eval cases against the corpus.
    Eval {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        cases: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REPLY_THRESHOLD)]
        threshold: f32,
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },
}

fn make_embedder(cli: &Cli) -> Result<Box<dyn EmbeddingProvider>> {
    match (&cli.model_path, &cli.tokenizer_path) {
        (Some(model), Some(tokenizer)) => {
            eprintln!("Loading model from {} ...", model.display());
            let provider = MiniLmEmbeddingProvider::load(model, tokenizer)
                .with_context(|| format!("load model from {}", model.display()))?;
            eprintln!("Model loaded.");
            Ok(Box::new(provider))
        }
        (None, None) => Ok(Box::new(HashEmbeddingProvider::default())),
        _ => anyhow::bail!("--model-path and --tokenizer-path must both be provided"),
    }
}

fn read_eval_cases(path: &PathBuf) -> Result<Vec<EvalCase>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let cases: Vec<EvalCase> = serde_json::from_reader(file).context("parse eval cases json")?;
    Ok(cases)
}

fn run_chat_loop(engine: &MatchEngine, threshold: f32) -> Result<()> {
    println!("\nSymptom checker (type 'exit' to quit)");
    println!("Describe your symptoms in plain language and I'll suggest the closest match.\n");

    let stdin = io::stdin();
    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!("\nGoodbye, take care!");
            break;
        }

        let query = line.trim();
        if query.is_empty() {
            println!("Please describe your symptoms, or type 'exit' to quit.");
            continue;
        }
        if matches!(
            query.to_ascii_lowercase().as_str(),
            "exit" | "quit" | "bye"
        ) {
            println!("Goodbye, take care!");
            break;
        }

        let matched = engine.match_query(query)?;
        if matched.score < threshold {
            println!("{NOT_SURE}");
            continue;
        }

        let reply = compose(&matched.label, matched.score);
        println!("Bot: {reply}\n(Confidence: {:.2})\n", matched.score);
    }

    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let model_name = cli
        .model_path
        .as_ref()
        .map(|p| {
            p.file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .unwrap_or_else(|| "hash".to_string());

    match &cli.command {
        Commands::Chat {
            csv,
            threshold,
            cache_dir,
        } => {
            let embedder = make_embedder(&cli)?;
            let engine = MatchEngine::bootstrap(embedder, csv, cache_dir)
                .with_context(|| format!("load corpus from {}", csv.display()))?;
            run_chat_loop(&engine, *threshold)?;
        }
        Commands::Query {
            csv,
            question,
            threshold,
            cache_dir,
        } => {
            let embedder = make_embedder(&cli)?;
            let engine = MatchEngine::bootstrap(embedder, csv, cache_dir)
                .with_context(|| format!("load corpus from {}", csv.display()))?;

            let matched = engine.match_query(question)?;
            println!(
                "model={} score={:.4} label={}",
                model_name, matched.score, matched.label
            );
            if matched.score < *threshold {
                println!("{NOT_SURE}");
            } else {
                println!("{}", compose(&matched.label, matched.score));
            }
        }
        Commands::Eval {
            csv,
            cases,
            threshold,
            cache_dir,
        } => {
            let run_id = format!("eval-{}", chrono::Utc::now().timestamp_millis());
            let embedder = make_embedder(&cli)?;
            let engine = MatchEngine::bootstrap(embedder, csv, cache_dir)
                .with_context(|| format!("load corpus from {}", csv.display()))?;

            let cases = read_eval_cases(cases)?;
            let summary = evaluate_cases(&engine, &cases, *threshold)?;

            println!(
                "run_id={} model={} total={} passed={} failed={} pass_rate={:.4}",
                run_id, model_name, summary.total, summary.passed, summary.failed,
                summary.pass_rate
            );
            for o in &summary.outcomes {
                println!(
                    "case={} passed={} label={} score={:.4} latency={:.1}ms",
                    o.case_id,
                    o.passed,
                    o.matched_label.as_deref().unwrap_or("null"),
                    o.score,
                    o.latency_ms
                );
            }

            if summary.failed > 0 {
                anyhow::bail!("{} eval case(s) failed", summary.failed);
            }
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
