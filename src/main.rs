use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod accounts;
mod config;
mod extract;
mod invoke;
mod io;
mod llm;
mod prompt;
mod render;
mod report;
mod tasks;

use llm::{HttpAdapter, MockAdapter, ModelProviderAdapter};
use tasks::TaskRunner;

#[derive(Parser, Debug, Clone)]
#[command(name = "fixi", version, about = "AI code helper: explain, fix, scan, convert and generate code", long_about = None)]
struct Cli {
    /// Active profile name
    #[arg(short = 'p', long = "profile", global = true)]
    profile: Option<String>,

    /// Primary model override (fallback chain is kept)
    #[arg(short = 'm', long = "model", global = true)]
    model: Option<String>,

    /// Output JSON instead of human-readable text
    #[arg(long = "json", global = true)]
    json: bool,

    /// Timeout (seconds) for network requests
    #[arg(long = "timeout", global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// First-time setup: write provider/model defaults to the config file
    Init(InitArgs),

    /// Explain code or an error message
    Explain(ExplainArgs),

    /// Fix and secure code
    Fix(CodeInputArgs),

    /// Scan code for security vulnerabilities
    Scan(CodeInputArgs),

    /// Generate a Mermaid flow diagram for code
    Flow(CodeInputArgs),

    /// Convert code between languages
    Convert(ConvertArgs),

    /// Generate code from a natural-language description
    Generate(GenerateArgs),

    /// Ask a question about a snippet
    Assist(AssistArgs),

    /// Create a local user account
    Register(RegisterArgs),

    /// Log in against the local account store
    Login(LoginArgs),
}

#[derive(Args, Debug, Clone)]
struct InitArgs {
    /// Provider name (e.g., groq, openai, mock)
    #[arg(long)]
    provider: Option<String>,
    /// API key value to store in the profile
    #[arg(long = "api-key")]
    api_key: Option<String>,
    /// Default model for the profile
    #[arg(long)]
    default_model: Option<String>,
    /// Profile name to create or update (default: "default")
    #[arg(long, default_value = "default")]
    profile: String,
}

#[derive(Args, Debug, Clone)]
struct ExplainArgs {
    /// Path to file with the code or error text
    #[arg(long)]
    file: Option<PathBuf>,
    /// Inline snippet instead of --file
    #[arg(value_name = "CODE")]
    snippet: Option<String>,
    /// Treat the input as an error message instead of code
    #[arg(long)]
    error: bool,
    /// Programming language hint (auto-detected when omitted)
    #[arg(long)]
    lang: Option<String>,
    /// Detail level: beginner, intermediate or advanced
    #[arg(long, default_value = "beginner")]
    detail: String,
    /// Skip the highlighting instructions
    #[arg(long = "no-highlight")]
    no_highlight: bool,
    /// Skip the worked-examples instruction
    #[arg(long = "no-examples")]
    no_examples: bool,
    /// Ask for an ASCII/markdown diagram
    #[arg(long)]
    diagrams: bool,
    /// Stream the response
    #[arg(long)]
    stream: bool,
    /// Provider to use (e.g., groq, openai, mock)
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct CodeInputArgs {
    /// Path to file with the code
    #[arg(long)]
    file: Option<PathBuf>,
    /// Inline snippet instead of --file
    #[arg(value_name = "CODE")]
    snippet: Option<String>,
    /// Provider to use (e.g., groq, openai, mock)
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ConvertArgs {
    /// Path to file with the code
    #[arg(long)]
    file: Option<PathBuf>,
    /// Inline snippet instead of --file
    #[arg(value_name = "CODE")]
    snippet: Option<String>,
    /// Source language
    #[arg(long = "from")]
    source: String,
    /// Target language
    #[arg(long = "to")]
    target: String,
    /// Provider to use (e.g., groq, openai, mock)
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct GenerateArgs {
    /// What to generate
    #[arg(required = true, num_args = 1.., value_name = "DESCRIPTION...")]
    description: Vec<String>,
    /// Target language (auto-selected when omitted)
    #[arg(long)]
    lang: Option<String>,
    /// Optimization goal: readability, efficiency or brevity
    #[arg(long, default_value = "readability")]
    optimize: String,
    /// Include detailed comments in the generated code
    #[arg(long)]
    comments: bool,
    /// Skip the edge-case/validation context instruction
    #[arg(long = "no-context")]
    no_context: bool,
    /// Sampling temperature (clamped to 0..=1)
    #[arg(long, default_value_t = 0.1)]
    temperature: f32,
    /// Max output tokens (clamped to a provider-safe range)
    #[arg(long = "max-tokens", default_value_t = 1024)]
    max_tokens: u32,
    /// Stream the response
    #[arg(long)]
    stream: bool,
    /// Provider to use (e.g., groq, openai, mock)
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct AssistArgs {
    /// Path to file with the code
    #[arg(long)]
    file: Option<PathBuf>,
    /// Inline snippet instead of --file
    #[arg(value_name = "CODE")]
    snippet: Option<String>,
    /// The question to ask about the code
    #[arg(long)]
    question: String,
    /// Expertise level: beginner, intermediate or expert
    #[arg(long, default_value = "beginner")]
    level: String,
    /// Skip the examples instruction
    #[arg(long = "no-examples")]
    no_examples: bool,
    /// Programming language hint
    #[arg(long)]
    lang: Option<String>,
    /// Provider to use (e.g., groq, openai, mock)
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct RegisterArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Args, Debug, Clone)]
struct LoginArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

#[derive(Debug, Clone)]
struct GlobalOpts {
    profile: Option<String>,
    model: Option<String>,
    json: bool,
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Cli { profile, model, json, timeout_secs, command } = cli;
    let globals = GlobalOpts { profile, model, json, timeout_secs };

    let result = match command {
        Commands::Init(args) => cmd_init(&globals, args).await,
        Commands::Explain(args) => cmd_explain(&globals, args).await,
        Commands::Fix(args) => cmd_code_task(&globals, args, "fix").await,
        Commands::Scan(args) => cmd_code_task(&globals, args, "scan").await,
        Commands::Flow(args) => cmd_code_task(&globals, args, "flow").await,
        Commands::Convert(args) => cmd_convert(&globals, args).await,
        Commands::Generate(args) => cmd_generate(&globals, args).await,
        Commands::Assist(args) => cmd_assist(&globals, args).await,
        Commands::Register(args) => cmd_register(&globals, args),
        Commands::Login(args) => cmd_login(&globals, args),
    };

    if let Err(e) = result {
        if globals.json {
            let (code, hint) = classify_error(&e);
            render::print_json_error(&code, &e.to_string(), hint.as_deref());
        } else {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn classify_error(e: &anyhow::Error) -> (String, Option<String>) {
    let msg = e.to_string().to_lowercase();
    if msg.contains("file not found") {
        return ("file_not_found".to_string(), Some("check the file path".to_string()));
    }
    if msg.contains("empty input") || msg.contains("no input") || msg.contains("empty description") {
        return ("missing_input".to_string(), None);
    }
    if msg.contains("api_key") || msg.contains("api key") {
        return ("missing_api_key".to_string(), Some("set GROQ_API_KEY or OPENAI_API_KEY in env or .env".to_string()));
    }
    if msg.contains("timed out") || msg.contains("timeout") {
        return ("timeout".to_string(), Some("try increasing --timeout or check network".to_string()));
    }
    ("unknown".to_string(), None)
}

/// Resolve provider/model and construct the capability handle the task
/// runner is driven with.
struct Setup {
    adapter: Box<dyn ModelProviderAdapter>,
    chain: config::ModelChain,
}

fn resolve_setup(globals: &GlobalOpts, cli_provider: Option<&str>, task: &str) -> anyhow::Result<Setup> {
    dotenvy::dotenv().ok();
    let eff = config::resolve_effective_settings(
        globals.profile.as_deref(),
        cli_provider,
        globals.model.as_deref(),
    )?;
    let cfg = config::load_config_if_exists(&config::default_config_path()?)?;
    let chain = config::resolve_chain(cfg.as_ref(), task, eff.model_override.as_deref());
    let adapter: Box<dyn ModelProviderAdapter> = if eff.provider.to_lowercase() == "mock" {
        Box::new(MockAdapter)
    } else {
        let base = llm::api_base_for_provider(&eff.provider);
        let timeout = Duration::from_secs(globals.timeout_secs.unwrap_or(60));
        Box::new(
            HttpAdapter::new(base, timeout)
                .map_err(|e| anyhow::anyhow!(e.message))?
                .with_api_key(eff.api_key),
        )
    };
    Ok(Setup { adapter, chain })
}

fn emit(globals: &GlobalOpts, task: &str, model: &str, output: &str) {
    if globals.json {
        render::print_json(&render::TaskOut { task, model, output });
    } else {
        println!("{}", output);
    }
}

async fn cmd_init(_globals: &GlobalOpts, args: InitArgs) -> anyhow::Result<()> {
    use config::{default_config_path, load_config_if_exists, write_config, Profile};

    let path = default_config_path()?;
    let mut cfg = load_config_if_exists(&path)?.unwrap_or_default();
    let prof = cfg.profiles.entry(args.profile.clone()).or_insert_with(Profile::default);
    if let Some(p) = args.provider {
        prof.provider = Some(p);
    }
    if let Some(key) = args.api_key {
        prof.api_key = Some(key);
    }
    if let Some(model) = args.default_model {
        prof.model = Some(model);
    }
    if cfg.default_profile.is_none() {
        cfg.default_profile = Some(args.profile);
    }
    write_config(&path, &cfg)?;
    println!("config written: {}", path.display());
    Ok(())
}

async fn cmd_explain(globals: &GlobalOpts, args: ExplainArgs) -> anyhow::Result<()> {
    let code = io::read_subject(args.file.as_ref(), args.snippet.as_deref()).await?;
    let setup = resolve_setup(globals, args.provider.as_deref(), "explain")?;
    let options = prompt::ExplainOptions {
        programming_language: args.lang,
        detail_level: args.detail,
        highlight_important_parts: !args.no_highlight,
        include_examples: !args.no_examples,
        include_diagrams: args.diagrams,
    };
    let stream = if globals.json { false } else { args.stream };
    let runner = TaskRunner::new(setup.adapter.as_ref());
    let output = runner.explain(&code, args.error, options, &setup.chain, stream).await;
    emit(globals, "explain", &setup.chain.primary, &output);
    Ok(())
}

async fn cmd_code_task(globals: &GlobalOpts, args: CodeInputArgs, task: &str) -> anyhow::Result<()> {
    let code = io::read_subject(args.file.as_ref(), args.snippet.as_deref()).await?;
    let setup = resolve_setup(globals, args.provider.as_deref(), task)?;
    let runner = TaskRunner::new(setup.adapter.as_ref());
    let output = match task {
        "fix" => runner.fix(&code, &setup.chain).await,
        "scan" => runner.security_scan(&code, &setup.chain).await,
        _ => runner.flow_diagram(&code, &setup.chain).await,
    };
    emit(globals, task, &setup.chain.primary, &output);
    Ok(())
}

async fn cmd_convert(globals: &GlobalOpts, args: ConvertArgs) -> anyhow::Result<()> {
    let code = io::read_subject(args.file.as_ref(), args.snippet.as_deref()).await?;
    let setup = resolve_setup(globals, args.provider.as_deref(), "convert")?;
    let runner = TaskRunner::new(setup.adapter.as_ref());
    let output = runner.convert(&code, &args.source, &args.target, &setup.chain).await;
    emit(globals, "convert", &setup.chain.primary, &output);
    Ok(())
}

async fn cmd_generate(globals: &GlobalOpts, args: GenerateArgs) -> anyhow::Result<()> {
    let description = args.description.join(" ");
    let setup = resolve_setup(globals, args.provider.as_deref(), "generate")?;
    let options = prompt::GenerateOptions {
        language: args.lang,
        include_comments: args.comments,
        optimize_for: args.optimize,
        context_aware: !args.no_context,
    };
    let stream = if globals.json { false } else { args.stream };
    let runner = TaskRunner::new(setup.adapter.as_ref());
    let output = runner
        .generate(&description, options, &setup.chain, args.temperature, args.max_tokens, stream)
        .await;
    emit(globals, "generate", &setup.chain.primary, &output);
    Ok(())
}

async fn cmd_assist(globals: &GlobalOpts, args: AssistArgs) -> anyhow::Result<()> {
    let code = io::read_subject(args.file.as_ref(), args.snippet.as_deref()).await?;
    if args.question.trim().is_empty() {
        anyhow::bail!("empty input; provide a question with --question");
    }
    let setup = resolve_setup(globals, args.provider.as_deref(), "assist")?;
    let options = prompt::AssistOptions {
        expertise_level: args.level,
        include_examples: !args.no_examples,
        language: args.lang,
    };
    let runner = TaskRunner::new(setup.adapter.as_ref());
    let output = runner.assist(&code, &args.question, options, &setup.chain).await;
    emit(globals, "assist", &setup.chain.primary, &output);
    Ok(())
}

fn cmd_register(globals: &GlobalOpts, args: RegisterArgs) -> anyhow::Result<()> {
    let store = accounts::UserStore::open_default()?;
    let (ok, message) = store.register(&args.username, &args.email, &args.password)?;
    emit_account_result(globals, ok, &message);
    Ok(())
}

fn cmd_login(globals: &GlobalOpts, args: LoginArgs) -> anyhow::Result<()> {
    let store = accounts::UserStore::open_default()?;
    let (ok, message) = store.login(&args.username, &args.password)?;
    emit_account_result(globals, ok, &message);
    Ok(())
}

fn emit_account_result(globals: &GlobalOpts, ok: bool, message: &str) {
    if globals.json {
        #[derive(serde::Serialize)]
        struct Out<'a> {
            ok: bool,
            message: &'a str,
        }
        render::print_json(&Out { ok, message });
    } else {
        println!("{}", message);
    }
    if !ok {
        std::process::exit(1);
    }
}
