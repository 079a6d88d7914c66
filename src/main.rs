use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::runtime;
use tortoise::{
    CompareMode, EngineConfig, JsonQuestionStore, Judge, JudgeRequest, RunRequest, SubmitRequest,
};

fn setup_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    tracing_subscriber::fmt()
        .event_format(fmt::format::Format::default().pretty())
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(fmt::time::ChronoLocal::rfc3339())
        .with_writer(io::stderr)
        .finish()
        .with(ErrorLayer::default())
        .init();
}

#[derive(Debug, Parser)]
#[clap(name = "tortoise", version, about = "Judge untrusted code in disposable containers")]
struct Opt {
    /// Pretty-print the JSON output
    #[clap(short, long, global = true)]
    pretty: bool,

    #[clap(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Judge a JSON request, `-` reads it from stdin
    Judge {
        #[clap(value_name = "request")]
        request: PathBuf,
    },

    /// Run a program once and print its raw output
    Run {
        #[clap(short, long)]
        lang: String,

        #[clap(value_name = "source")]
        source: PathBuf,

        #[clap(long, value_name = "path")]
        stdin: Option<PathBuf>,

        #[clap(long, value_name = "MiB", default_value = "200")]
        memory: u64,
    },

    /// Judge a program against the examples of a stored question
    Submit {
        #[clap(long, value_name = "path")]
        store: PathBuf,

        #[clap(short, long, value_name = "id")]
        question: String,

        #[clap(short, long)]
        lang: String,

        #[clap(value_name = "source")]
        source: PathBuf,

        #[clap(short, long, value_name = "milliseconds", default_value = "2000")]
        time_limit: u64,

        #[clap(short, long, value_name = "MiB", default_value = "200")]
        memory: u64,

        #[clap(short, long, value_name = "mode", default_value = "trim")]
        compare: CompareMode,
    },

    /// List the supported languages
    Languages,

    /// Pull the image of every language
    Pull,
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json(value: &impl Serialize, pretty: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();
    let out = &mut stdout_lock;
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

async fn dispatch(judge: &Judge, command: Cmd, pretty: bool) -> Result<()> {
    match command {
        Cmd::Judge { request } => {
            let request: JudgeRequest = serde_json::from_str(&read_input(&request)?)
                .context("failed to parse judge request")?;
            let result = judge.judge(&request).await?;
            print_json(&result, pretty)
        }
        Cmd::Run {
            lang,
            source,
            stdin,
            memory,
        } => {
            let mut request = RunRequest::new(lang, read_input(&source)?);
            request.memory_limit_mb = memory;
            if let Some(ref path) = stdin {
                request.stdin = Some(read_input(path)?);
            }
            let result = judge.run_code(&request).await?;
            print_json(&result, pretty)
        }
        Cmd::Submit {
            store,
            question,
            lang,
            source,
            time_limit,
            memory,
            compare,
        } => {
            let store = JsonQuestionStore::load(&store)?;
            let request = SubmitRequest {
                language: lang,
                source_code: read_input(&source)?,
                question_id: question,
                time_limit_ms: time_limit,
                memory_limit_mb: memory,
                compare_mode: compare,
            };
            let result = judge.judge_question(&store, request).await?;
            print_json(&result, pretty)
        }
        Cmd::Languages => {
            let profiles: Vec<_> = judge.profiles().iter().collect();
            print_json(&profiles, pretty)
        }
        Cmd::Pull => judge.prepare_images().await,
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();

    let opt = Opt::parse();

    let config = EngineConfig::from_env()?;
    let judge = Judge::docker(config)?;

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    runtime.block_on(dispatch(&judge, opt.command, opt.pretty))
}
