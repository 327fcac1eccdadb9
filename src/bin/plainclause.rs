//! Terminal front end for the analysis backend.
//!
//! Run with:
//! ```bash
//! export PLAINCLAUSE_API_KEY="your-api-key"
//! plainclause analyze contract.txt --task full --locate 0
//! plainclause stream contract.txt
//! ```

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use plainclause::api::AnalysisClient;
use plainclause::client::{ClientError, Notice, NoticeKind, NoticeLevel};
use plainclause::model::{AnalysisRequest, Task};
use plainclause::options::{ClientOptions, Endpoints, SecretString};
use plainclause::render::{DocumentView, ResultRenderer, Segment};
use plainclause::session::{SessionOutcome, StreamConfig, StreamSession, TokenSink};

#[derive(Parser)]
#[command(
    name = "plainclause",
    version,
    about = "Plain-language rewrites and risk flags for legal documents"
)]
struct Cli {
    /// Credential sent as x-api-key and bearer token
    #[arg(long, env = "PLAINCLAUSE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Serve every endpoint from this host instead of the configured bases
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a document and print the extracted text
    Ingest { file: PathBuf },

    /// Run a single-shot analysis
    Analyze {
        /// Text file to analyze, `-` for stdin
        input: String,

        #[arg(long, default_value = "simplify", value_parser = parse_task)]
        task: Task,

        #[arg(long)]
        language: Option<String>,

        /// Extract the text through the ingest service first
        #[arg(long)]
        ingest: bool,

        /// Highlight the excerpt of the risk with this index in the source
        #[arg(long)]
        locate: Option<usize>,
    },

    /// Stream a plain-language rewrite, Ctrl-C cancels
    Stream {
        /// Text file to simplify, `-` for stdin
        input: String,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        ingest: bool,
    },
}

fn parse_task(raw: &str) -> Result<Task, String> {
    raw.parse::<Task>().map_err(|e| e.to_string())
}

/// Prints tokens as they arrive while keeping the renderer up to date.
struct TerminalSink {
    renderer: ResultRenderer,
}

impl TokenSink for TerminalSink {
    fn reset(&mut self) {
        TokenSink::reset(&mut self.renderer);
    }

    fn append_token(&mut self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
        self.renderer.append_token(text);
    }

    fn stream_error(&mut self, message: &str) {
        self.renderer.stream_error(message);
    }

    fn finished(&mut self, outcome: &SessionOutcome) {
        self.renderer.finished(outcome);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plainclause=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_notice(&e.notice());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, ClientError> {
    let mut options = ClientOptions::from_env()?;
    if let Some(key) = cli.api_key {
        options.api_key = Some(SecretString::new(key));
    }
    if let Some(host) = &cli.host {
        options.endpoints = Endpoints::from_host(host);
    }
    let client = Arc::new(AnalysisClient::new(options)?);

    match cli.command {
        Command::Ingest { file } => {
            let document = client.ingest_path(&file).await?;
            println!("{}", document.text);
            if document.is_large() {
                print_notice(&Notice::new(
                    NoticeKind::Info,
                    format!(
                        "Detected {} chunks. Consider \"--task full\".",
                        document.chunk_count
                    ),
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze {
            input,
            task,
            language,
            ingest,
            locate,
        } => {
            let text = load_text(&client, &input, ingest).await?;
            let result = client.analyze(&text, task, language.as_deref()).await?;

            let mut renderer = ResultRenderer::new();
            renderer.set_source(&text);
            renderer.render_full_result(&result, &text);
            if let Some(index) = locate {
                renderer.activate_risk(index);
            }

            print_view(renderer.view(), locate.is_some());
            renderer.take_notices().iter().for_each(print_notice);
            Ok(ExitCode::SUCCESS)
        }
        Command::Stream {
            input,
            language,
            ingest,
        } => {
            let text = load_text(&client, &input, ingest).await?;
            if text.trim().is_empty() {
                print_notice(&Notice::new(NoticeKind::Info, "No text to stream"));
                return Ok(ExitCode::FAILURE);
            }
            let mut request = AnalysisRequest::new(text.trim()).with_task(Task::Simplify);
            request.language = language;

            let sink = Arc::new(Mutex::new(TerminalSink {
                renderer: ResultRenderer::new(),
            }));
            let mut session =
                StreamSession::start(client, request, StreamConfig::default(), sink.clone());

            let abort = session.abort_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    abort.cancel();
                }
            });

            let outcome = session.wait().await;
            println!();
            debug!("stream ended: {:?}", outcome.state());

            let notices = match sink.lock() {
                Ok(mut sink) => sink.renderer.take_notices(),
                Err(poisoned) => poisoned.into_inner().renderer.take_notices(),
            };
            notices.iter().for_each(print_notice);

            Ok(match outcome {
                SessionOutcome::Failed(_) => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            })
        }
    }
}

async fn load_text(client: &AnalysisClient, input: &str, ingest: bool) -> Result<String, ClientError> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    if ingest {
        return Ok(client.ingest_path(input).await?.text);
    }
    Ok(tokio::fs::read_to_string(input).await?)
}

fn print_view(view: &DocumentView, with_source: bool) {
    if let Some(summary) = &view.summary {
        println!("== Summary ==\n{}\n", summary);
    }
    if !view.plain_language.is_empty() {
        println!("== Plain language ==\n{}\n", view.plain_language);
    }

    println!("== Risks ==");
    if view.risks.is_empty() {
        println!("No risks detected.");
    }
    for (index, risk) in view.risks.iter().enumerate() {
        println!("{:>3}. [{}] {}", index, risk.badge, risk.title);
        if !risk.explanation.is_empty() {
            println!("     {}", risk.explanation);
        }
        if let Some(action) = &risk.suggested_action {
            println!("     Suggestion: {}", action);
        }
        if let Some(excerpt) = &risk.excerpt {
            println!("     Excerpt: \u{201c}{}\u{201d}", excerpt);
        }
    }

    if with_source {
        println!("\n== Source ==");
        for segment in &view.source.segments {
            match segment {
                Segment::Text(text) => print!("{}", text),
                Segment::Highlight(text) => print!("[[{}]]", text),
            }
        }
        println!();
    }
}

fn print_notice(notice: &Notice) {
    let label = match notice.level() {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Warn => "warn",
        NoticeLevel::Error => "error",
    };
    eprintln!("[{}] {}", label, notice.message);
}
