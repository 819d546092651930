use std::env;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use zodia_contracts::{output_filename, Category, GenerationMode, GenerationRequest, ZodiacSign};
use zodia_engine::{EngineConfig, HoroscopeEngine};

#[derive(Debug, Parser)]
#[command(name = "zodia", version, about = "Zodiac horoscope image pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report which generation mode is configured and what it will cost.
    Verify(CommonArgs),
    /// Generate one Leo test image and confirm the backend from its filename.
    Probe(ProbeArgs),
    /// Generate one horoscope image.
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Generation mode: free, stability or openai.
    #[arg(long, default_value = "free")]
    mode: String,
    /// Paid-provider credential. Falls back to STABILITY_API_KEY or
    /// OPENAI_API_KEY depending on the mode.
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long, default_value = "out")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Date stamped into the filename (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    no_emoji: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    sign: String,
    #[arg(long)]
    category: String,
    /// Horoscope text overlaid on the background.
    #[arg(long)]
    text: String,
    /// Date stamped into the filename (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    no_emoji: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("zodia error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Verify(args) => run_verify(args),
        Command::Probe(args) => run_probe(args),
        Command::Generate(args) => run_generate(args),
    }
}

fn run_verify(args: CommonArgs) -> Result<()> {
    let mode = args.mode.parse::<GenerationMode>()?;
    let credential = resolve_credential(mode, &args);
    let sample_date = NaiveDate::from_ymd_opt(2024, 11, 15).expect("valid sample date");
    let sample = output_filename(ZodiacSign::Aries, Category::Love, mode, sample_date);

    println!("configured mode: {mode}");
    match mode {
        GenerationMode::Free => {
            println!("backend: local gradient renderer (no network, no credential)");
            println!("cost per image: $0.00");
            println!("filenames carry no backend tag, e.g. {sample}");
        }
        GenerationMode::Stability | GenerationMode::OpenAi => {
            let tag = mode.backend_tag().expect("paid mode has a tag");
            println!("backend: {tag} text-to-image (paid)");
            println!("cost per image: ~${:.2}", mode.cost_estimate_usd());
            println!(
                "cost for a 60-image batch: ~${:.2}",
                mode.cost_estimate_usd() * 60.0
            );
            println!("filenames carry the '{tag}' tag, e.g. {sample}");
            match credential.as_deref() {
                Some(value) => println!("credential: {}", mask_credential(value)),
                None => println!("credential: missing (generation will fail fast)"),
            }
        }
    }
    Ok(())
}

fn run_probe(args: ProbeArgs) -> Result<()> {
    let engine = build_engine(&args.common, args.date)?;
    let mode = engine.mode();
    println!("generating one test image for leo/love in mode '{mode}'");
    if mode.requires_credential() {
        println!("this test will charge ~${:.2}", mode.cost_estimate_usd());
    }

    let request = GenerationRequest::new(
        ZodiacSign::Leo,
        Category::Love,
        "Tu corazón brilla con luz propia. El amor verdadero te encuentra hoy.",
    )
    .with_emoji(!args.no_emoji);
    let result = engine.generate(&request)?;

    let name = result
        .final_image_path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_default();
    println!("image written to {}", result.final_image_path.display());
    if name.contains("_stability_") {
        println!("confirmed: stability backend produced this image (~$0.05 charged)");
    } else if name.contains("_openai_") {
        println!("confirmed: openai backend produced this image (~$0.08 charged)");
    } else {
        println!("confirmed: free gradient backend produced this image (no charge)");
    }
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let sign = args.sign.parse::<ZodiacSign>()?;
    let category = args.category.parse::<Category>()?;
    let engine = build_engine(&args.common, None)?;

    let mut request = GenerationRequest::new(sign, category, args.text).with_emoji(!args.no_emoji);
    if let Some(date) = args.date {
        request = request.with_date(date);
    }
    let result = engine.generate(&request)?;

    println!("backend used: {}", result.backend_used);
    println!(
        "cost estimate: ${:.2}",
        result.backend_used.cost_estimate_usd()
    );
    println!("image written to {}", result.final_image_path.display());
    Ok(())
}

fn build_engine(args: &CommonArgs, default_date: Option<NaiveDate>) -> Result<HoroscopeEngine> {
    let mode = args.mode.parse::<GenerationMode>()?;
    let mut config = EngineConfig::new(mode, &args.out);
    if let Some(credential) = resolve_credential(mode, args) {
        config = config.with_credential(credential);
    }
    if let Some(date) = default_date {
        config = config.with_default_date(date);
    }
    Ok(HoroscopeEngine::new(config)?)
}

fn resolve_credential(mode: GenerationMode, args: &CommonArgs) -> Option<String> {
    args.api_key
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| match mode {
            GenerationMode::Free => None,
            GenerationMode::Stability => non_empty_env("STABILITY_API_KEY"),
            GenerationMode::OpenAi => non_empty_env("OPENAI_API_KEY"),
        })
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn mask_credential(value: &str) -> String {
    let prefix: String = value.chars().take(8).collect();
    if value.chars().count() > 8 {
        format!("{prefix}…")
    } else {
        prefix
    }
}
