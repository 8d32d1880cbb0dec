use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use seamless_script::{
    DialogueLanguage, GeminiClient, GeminiConfig, GenerationOptions, KeyValidator, PromptType,
    Script, ScriptGenerator,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "seamless-script")]
#[command(about = "Generate continuity-locked scene prompts for AI video", long_about = None)]
struct Cli {
    /// Google AI Studio API key (falls back to GEMINI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Gemini model used for generation
    #[arg(long, global = true, default_value = seamless_script::api::DEFAULT_MODEL)]
    model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new script from an idea
    Generate {
        #[command(flatten)]
        idea: IdeaArgs,

        /// Number of scenes to generate
        #[arg(short, long, default_value_t = 5)]
        count: u32,

        #[command(flatten)]
        style: StyleArgs,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Continue an existing script with more scenes
    Extend {
        /// Script JSON previously printed by `generate`
        #[arg(short, long)]
        script: String,

        /// What should happen next
        #[arg(short, long)]
        extension_idea: String,

        /// Number of scenes to add
        #[arg(short, long)]
        count: u32,

        /// Original idea of the script (defaults to the one saved with it)
        #[arg(long)]
        idea: Option<String>,

        #[command(flatten)]
        style: StyleArgs,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Check that an API key is usable
    ValidateKey,
}

#[derive(Args, Debug)]
struct IdeaArgs {
    /// Video idea
    #[arg(short, long)]
    text: Option<String>,

    /// Read the video idea from a file
    #[arg(short, long)]
    file: Option<String>,
}

/// Style flags. Unset flags keep the base options: the defaults for
/// `generate`, the options saved with the script for `extend`.
#[derive(Args, Debug, Default)]
struct StyleArgs {
    /// Visual style [default: Cinematic]
    #[arg(long)]
    style: Option<String>,

    /// Aspect ratio [default: 16:9]
    #[arg(long)]
    aspect_ratio: Option<String>,

    /// Dialogue language [default: none]
    #[arg(long, value_enum)]
    language: Option<DialogueLanguage>,

    /// Camera handling [default: default]
    #[arg(long, value_enum)]
    prompt_type: Option<PromptType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Whole script as JSON
    Json,
    /// Structured prompts, one per paragraph
    Prompts,
    /// Freeform prompts, one per paragraph
    Freeform,
}

impl StyleArgs {
    fn apply(self, mut base: GenerationOptions) -> GenerationOptions {
        if let Some(style) = self.style {
            base.video_style = style;
        }
        if let Some(aspect_ratio) = self.aspect_ratio {
            base.aspect_ratio = aspect_ratio;
        }
        if let Some(language) = self.language {
            base.dialogue_language = language;
        }
        if let Some(prompt_type) = self.prompt_type {
            base.prompt_type = prompt_type;
        }
        base
    }
}

/// JSON printed by `generate` and read back by `extend`: the script plus the
/// options it was generated with.
#[derive(Debug, Serialize, Deserialize)]
struct SavedScript {
    #[serde(flatten)]
    script: Script,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let api_key = match cli.api_key.clone() {
        Some(key) => key,
        None => std::env::var("GEMINI_API_KEY").context(
            "GEMINI_API_KEY not found. Set it via --api-key or the GEMINI_API_KEY environment variable",
        )?,
    };

    if let Err(e) = run(cli, api_key).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli, api_key: String) -> anyhow::Result<()> {
    let on_progress = |message: &str| eprintln!("{}", message);

    match cli.command {
        Command::ValidateKey => {
            if KeyValidator::default().validate(&api_key).await {
                info!("API key is usable");
                Ok(())
            } else {
                bail!("API key is invalid or not usable");
            }
        }
        Command::Generate {
            idea,
            count,
            style,
            format,
        } => {
            let idea = read_idea(idea).await?;
            info!("Input idea length: {} characters", idea.len());
            let options = style.apply(GenerationOptions::new(idea, count));

            let generator = ScriptGenerator::new(client(&api_key, &cli.model)?);
            let script = generator
                .generate_script(&options, &on_progress)
                .await
                .context("Script generation failed")?;

            info!("Generated {} scenes", script.scenes.len());
            let saved = SavedScript {
                script,
                options: Some(options),
            };
            print_script(&saved, format)
        }
        Command::Extend {
            script,
            extension_idea,
            count,
            idea,
            style,
            format,
        } => {
            let text = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("Failed to read script: {}", script))?;
            let mut saved: SavedScript = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse script: {}", script))?;
            let last_scene = saved
                .script
                .last_scene()
                .cloned()
                .context("The script has no scenes to extend")?;

            let options = extension_options(saved.options.clone(), idea, style, count)?;

            let generator = ScriptGenerator::new(client(&api_key, &cli.model)?);
            let new_scenes = generator
                .extend_script(&last_scene, &extension_idea, count, &options, &on_progress)
                .await
                .context("Script extension failed")?;

            info!("Added {} scenes", new_scenes.len());
            saved.script.extend(new_scenes)?;
            print_script(&saved, format)
        }
    }
}

/// Options for an extension run: the saved options, overridden by whatever
/// was passed on the command line.
fn extension_options(
    saved: Option<GenerationOptions>,
    idea: Option<String>,
    style: StyleArgs,
    count: u32,
) -> anyhow::Result<GenerationOptions> {
    let mut options = style.apply(saved.unwrap_or_default());
    if let Some(idea) = idea {
        options.idea = idea.trim().to_string();
    }
    if options.idea.is_empty() {
        bail!("The script has no saved idea; pass it with --idea");
    }
    options.prompt_count = Some(count);
    Ok(options)
}

fn client(api_key: &str, model: &str) -> anyhow::Result<GeminiClient> {
    Ok(GeminiClient::new(GeminiConfig::new(api_key).with_model(model))?)
}

async fn read_idea(args: IdeaArgs) -> anyhow::Result<String> {
    let idea = if let Some(text) = args.text {
        text
    } else if let Some(file_path) = args.file {
        tokio::fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read file: {}", file_path))?
    } else {
        bail!("Either --text or --file must be provided");
    };
    Ok(idea.trim().to_string())
}

fn print_script(saved: &SavedScript, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(saved)?),
        OutputFormat::Prompts => println!("{}", saved.script.structured_prompts()),
        OutputFormat::Freeform => println!("{}", saved.script.freeform_prompts()),
    }
    Ok(())
}
