use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialoguer::Input;
use tracing_subscriber::EnvFilter;

use chalkboard::api::{ApiServer, ApiState};
use chalkboard::speech::SpeechSynthesizer;
use chalkboard::tools::listening::{self, ListeningOptions, ListeningPlan, VoiceChoice};
use chalkboard::{
    Config, ConversationRelay, KnowledgeBase, OpenAiProvider, OpenAiSpeech, Preset, Session,
    Voice, extract_pdf_text,
};

/// Chalkboard - conversation relay and classroom tools over an LLM API
#[derive(Parser)]
#[command(name = "chalkboard", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server (the default)
    Serve {
        /// Port to listen on
        #[arg(long, env = "CHALKBOARD_PORT")]
        port: Option<u16>,
    },
    /// Chat with the assistant in the terminal
    Chat {
        /// Conversation preset: design-helper, general or document
        #[arg(long, default_value = "general")]
        preset: Preset,
        /// PDF to ground the conversation (implies the document preset)
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// Wait for whole replies instead of streaming
        #[arg(long)]
        no_stream: bool,
    },
    /// Print the text of a PDF as the knowledge base would see it
    ExtractPdf {
        file: PathBuf,
    },
    /// Build listening-test audio from a script file
    Listening {
        /// Script with numbered questions and M:/W: speaker markers
        script: PathBuf,
        /// Output WAV file
        #[arg(short, long, default_value = "listening.wav")]
        out: PathBuf,
        /// Speaking rate (0.55 to 1.85)
        #[arg(long, default_value_t = 1.0)]
        speed: f32,
        /// Female voice: a voice name, sequential or random
        #[arg(long, default_value = "alloy")]
        female_voice: VoiceChoice,
        /// Male voice: a voice name, sequential or random
        #[arg(long, default_value = "echo")]
        male_voice: VoiceChoice,
        /// Voice for Korean narration
        #[arg(long, default_value = "fable")]
        korean_voice: Voice,
        /// Pause between lines in milliseconds
        #[arg(long, default_value_t = 200)]
        line_gap_ms: u32,
        /// Pause between questions in seconds
        #[arg(long, default_value_t = 5)]
        question_gap_secs: u32,
        /// Print the voice plan without calling the speech service
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chalkboard=info",
        1 => "info,chalkboard=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::ExtractPdf { file } => extract_pdf(&file),
        Command::Serve { port } => serve(load_config()?, port).await,
        Command::Chat {
            preset,
            pdf,
            no_stream,
        } => chat(&load_config()?, preset, pdf.as_deref(), !no_stream).await,
        Command::Listening {
            script,
            out,
            speed,
            female_voice,
            male_voice,
            korean_voice,
            line_gap_ms,
            question_gap_secs,
            dry_run,
        } => {
            let options = ListeningOptions {
                speed,
                korean_voice,
                female_voice,
                male_voice,
                line_gap_ms,
                question_gap_secs,
            };
            listening_test(&script, &out, &options, dry_run).await
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load()?;
    tracing::debug!(
        model = %config.completion.model,
        data_dir = %config.data_dir.display(),
        "loaded configuration"
    );
    Ok(config)
}

fn relay(config: &Config) -> anyhow::Result<Arc<ConversationRelay>> {
    let provider = OpenAiProvider::new(
        config.openai_api_key()?.to_string(),
        config.completion.base_url.clone(),
        config.completion.timeout,
    )?;
    Ok(Arc::new(ConversationRelay::new(Arc::new(provider))))
}

fn speech(config: &Config) -> anyhow::Result<OpenAiSpeech> {
    Ok(OpenAiSpeech::new(
        config.openai_api_key()?,
        config.speech.model.clone(),
        config.completion.base_url.clone(),
        config.completion.timeout,
    )?)
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.api_server.port);
    let relay = relay(&config)?;
    let synth: Option<Arc<dyn SpeechSynthesizer>> = match speech(&config) {
        Ok(s) => Some(Arc::new(s)),
        Err(e) => {
            tracing::warn!(error = %e, "speech disabled");
            None
        }
    };

    tracing::info!(
        port,
        model = %config.completion.model,
        provider = relay.provider_name(),
        "starting chalkboard"
    );

    let state = Arc::new(ApiState::new(&config, relay, synth));
    ApiServer::new(state, port).run().await?;
    Ok(())
}

async fn chat(
    config: &Config,
    preset: Preset,
    pdf: Option<&Path>,
    stream: bool,
) -> anyhow::Result<()> {
    let relay = relay(config)?;
    let options = config.completion_options();

    let preset = if pdf.is_some() { Preset::Document } else { preset };
    let mut session = Session::new(preset);
    if let Some(path) = pdf {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map_or_else(|| "document.pdf".to_string(), |n| n.to_string_lossy().into_owned());
        let knowledge = KnowledgeBase::from_pdf(name, &bytes, config.max_upload_bytes)?;
        println!("Loaded {} ({} pages)", knowledge.source(), knowledge.pages());
        session.set_knowledge(knowledge);
    }

    println!("Preset: {preset}. Type /reset to start over, /quit to leave.\n");

    loop {
        let line: String = Input::new().with_prompt("you").interact_text()?;
        match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("(conversation reset)\n");
                continue;
            }
            _ => {}
        }

        let result = if stream {
            let mut stdout = std::io::stdout();
            let reply = session
                .submit_streaming(&relay, &line, &options, |fragment| {
                    let _ = write!(stdout, "{fragment}");
                    let _ = stdout.flush();
                })
                .await;
            println!();
            reply.map(|_| ())
        } else {
            session
                .submit(&relay, &line, &options)
                .await
                .map(|reply| println!("{reply}"))
        };

        if let Err(e) = result {
            eprintln!("error: {e}");
        }
        println!();
    }

    Ok(())
}

fn extract_pdf(path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let extracted = extract_pdf_text(&bytes)?;
    tracing::info!(
        pages = extracted.pages,
        pages_with_text = extracted.pages_with_text,
        "extracted PDF text"
    );
    print!("{}", extracted.text);
    Ok(())
}

async fn listening_test(
    script: &Path,
    out: &Path,
    options: &ListeningOptions,
    dry_run: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(script)
        .with_context(|| format!("reading {}", script.display()))?;
    let plan = ListeningPlan::new(&text, options)?;

    if dry_run {
        for question in &plan.questions {
            match question.number {
                Some(n) => println!("{n}."),
                None => println!("(intro)"),
            }
            for line in &question.lines {
                println!("  [{}] {}", line.voice, line.text);
            }
        }
        return Ok(());
    }

    let synth = speech(&load_config()?)?;
    let audio = listening::render(&plan, &synth).await?;
    std::fs::write(out, &audio.wav).with_context(|| format!("writing {}", out.display()))?;

    println!(
        "Wrote {} ({} lines, {:.1}s)",
        out.display(),
        audio.lines,
        Duration::from_millis(audio.duration_ms).as_secs_f64()
    );
    Ok(())
}
