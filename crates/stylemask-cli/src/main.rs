mod config;

use std::io::{self, IsTerminal, Read, Write};

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

use stylemask_llm::OpenAiClient;
use stylemask_pipeline::{
    parse_transformations, PipelineEvent, PipelineExecutor, Transformation,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "stylemask")]
#[command(about = "Mask writing style by chaining LLM-backed text transformations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform input text with a chain of transformations
    Transform {
        /// Compact transformation sequence, e.g. "tsp" for thesaurus -> simplify -> persona
        #[arg(long, short, default_value = "ts")]
        transformations: String,

        /// Input text; read from piped stdin when omitted
        #[arg(long, short)]
        input: Option<String>,

        /// Persona whose writing style to imitate (for 'p' steps)
        #[arg(long, short)]
        persona: Option<String>,

        /// Model name as known to the model server
        #[arg(long, short)]
        model: Option<String>,

        /// URL of an OpenAI-compatible chat-completions API
        #[arg(long, short)]
        url: Option<String>,

        /// Sampling temperature override for every step
        #[arg(long)]
        temperature: Option<f32>,

        /// Sampling seed override for every step
        #[arg(long)]
        seed: Option<i64>,

        /// Verbosity level; at the default only the final output is printed
        #[arg(long, short, action = ArgAction::Count)]
        verbose: u8,
    },
    /// Download the model artifact into the local cache
    Download,
    /// Delete cached model artifacts
    Clear,
    /// Launch the cached model server locally
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Transform {
            transformations,
            input,
            persona,
            model,
            url,
            temperature,
            seed,
            verbose,
        } => {
            run_transform(
                &config,
                &transformations,
                input,
                persona,
                model,
                url,
                temperature,
                seed,
                verbose,
            )
            .await
        }
        Commands::Download => run_download().await,
        Commands::Clear => run_clear().await,
        Commands::Serve => run_serve().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_transform(
    config: &Config,
    transformations: &str,
    input: Option<String>,
    persona: Option<String>,
    model: Option<String>,
    url: Option<String>,
    temperature: Option<f32>,
    seed: Option<i64>,
    verbose: u8,
) -> anyhow::Result<()> {
    let steps = match parse_transformations(transformations) {
        Ok(steps) => steps,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            eprintln!("valid codes: {}", valid_codes().dimmed());
            std::process::exit(1);
        }
    };

    let input = read_input(input)?;

    if verbose > 0 {
        println!("{}", "> User-provided input:".cyan());
        println!("\n{input}\n");
    }

    let url = url.unwrap_or_else(|| config.url.clone());
    let model = model.unwrap_or_else(|| config.model.clone());
    let persona = persona.unwrap_or_else(|| config.persona.clone());

    let client = OpenAiClient::new(url).with_api_key(config.api_key.clone());

    let mut executor = PipelineExecutor::new(&client, model).with_persona(persona);
    if let Some(temperature) = temperature {
        executor = executor.with_temperature(temperature);
    }
    if let Some(seed) = seed {
        executor = executor.with_seed(seed);
    }

    let result = executor
        .run(&input, &steps, |event| match event {
            PipelineEvent::StepStarted(step) => {
                if verbose > 0 {
                    println!(
                        "{}",
                        format!("> Applying step '{}':", step.label()).cyan()
                    );
                }
            }
            PipelineEvent::Fragment(fragment) => {
                if verbose > 0 {
                    print!("{fragment}");
                    io::stdout().flush().ok();
                }
            }
        })
        .await;

    match result {
        Ok(run) => {
            if verbose == 0 {
                println!("{}", run.output());
            } else {
                println!();
            }
            Ok(())
        }
        Err(abort) => {
            if verbose > 0 {
                println!();
            }
            eprintln!("{}", abort.to_string().red());
            if !abort.completed.steps.is_empty() {
                eprintln!("{}", "completed steps before the failure:".dimmed());
                for step in &abort.completed.steps {
                    eprintln!("{}", format!("[{}]", step.transformation.label()).dimmed());
                    eprintln!("{}", step.output);
                }
            }
            std::process::exit(1);
        }
    }
}

fn valid_codes() -> String {
    Transformation::ALL
        .iter()
        .map(|t| format!("'{}' ({})", t.code(), t.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Take input from the flag or from piped stdin. A terminal stdin with no
/// `--input` flag is a usage error.
fn read_input(arg: Option<String>) -> anyhow::Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }

    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        eprintln!(
            "{}",
            "no input: pass --input or pipe text on stdin".red()
        );
        std::process::exit(2);
    }

    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    let text = buffer.trim();
    if text.is_empty() {
        eprintln!("{}", "no input: piped stdin was empty".red());
        std::process::exit(2);
    }

    Ok(text.to_string())
}

async fn run_download() -> anyhow::Result<()> {
    let cache = stylemask_serve::cache_dir();
    let client = reqwest::Client::new();

    let mut fetched_any = false;
    for artifact in [stylemask_serve::MODEL, stylemask_serve::SERVER] {
        let (dest, downloaded) =
            stylemask_serve::ensure_artifact(&client, &artifact, &cache).await?;
        if downloaded {
            println!("{}", format!("Downloaded {}.", artifact.name).cyan());
            fetched_any = true;
        } else {
            println!(
                "{} already downloaded at {}. Run 'clear' to make re-download possible.",
                artifact.name,
                dest.display()
            );
        }
    }

    if fetched_any {
        println!("Download finished. Continue with the 'transform' command.");
    }

    Ok(())
}

async fn run_clear() -> anyhow::Result<()> {
    println!("Clearing cached model files...");
    stylemask_serve::clear_cache(&stylemask_serve::cache_dir()).await?;
    println!("Done.");
    Ok(())
}

async fn run_serve() -> anyhow::Result<()> {
    let path = stylemask_serve::cache_dir().join(stylemask_serve::MODEL.filename());

    println!(
        "{}",
        format!("Serving {}...", path.display()).cyan()
    );

    let mut handle = stylemask_serve::serve_artifact(&path).await?;

    while let Some(line) = handle.output_rx.recv().await {
        println!("{}", line.dimmed());
    }

    let result = handle.done.await??;
    if !result.success {
        eprintln!(
            "{}",
            format!("model server exited with {:?}", result.exit_code).red()
        );
        std::process::exit(result.exit_code.unwrap_or(1));
    }

    Ok(())
}
