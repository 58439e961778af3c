use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use microarray_assistant::assistant::{Assistant, MicroarrayAssistant};
use microarray_assistant::config::ConfigLoader;
use microarray_assistant::domain::{DatasetRequest, GeoPlatformAccession, GeoSeriesAccession};
use microarray_assistant::error::AssistantError;
use microarray_assistant::gateway::HttpChatTransport;
use microarray_assistant::geo::{GeoDatasetSource, GeoHttpClient};
use microarray_assistant::normalize::NormalizeOptions;
use microarray_assistant::output::{
    AnalysisReport, AnswerReport, CacheClearReport, CacheListReport, JsonOutput, OutputMode,
    TextOutput,
};
use microarray_assistant::report::{DEFAULT_ALPHA, DEFAULT_LFC_THRESHOLD, volcano_points};
use microarray_assistant::store::Store;

#[derive(Parser)]
#[command(name = "microarray-assistant")]
#[command(about = "GEO microarray differential expression with a question-answering helper")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch a GEO series and run the differential expression pipeline")]
    Analyze(AnalyzeArgs),
    #[command(about = "Ask the configured language model a question")]
    Ask(AskArgs),
    #[command(about = "Inspect or clear the download cache")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    series: String,

    #[arg(long)]
    platform: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    group_pattern: Option<String>,

    #[arg(long)]
    exclude: Option<String>,

    #[arg(long)]
    formula: Option<String>,

    #[arg(long)]
    coef: Option<String>,

    #[arg(long)]
    top: Option<usize>,

    #[arg(long)]
    no_filter: bool,

    #[arg(long)]
    no_log: bool,

    #[arg(long)]
    no_cache: bool,

    #[arg(long)]
    volcano: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AskArgs {
    question: String,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "List cached SOFT files")]
    List,
    #[command(about = "Remove every cached file")]
    Clear,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<AssistantError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AssistantError) -> u8 {
    match error {
        AssistantError::EmptySelection { .. }
        | AssistantError::Formula(_)
        | AssistantError::ContrastNotFound { .. }
        | AssistantError::InvalidPattern { .. }
        | AssistantError::InvalidSeriesAccession(_)
        | AssistantError::InvalidPlatformAccession(_)
        | AssistantError::PlatformNotFound { .. }
        | AssistantError::NotLoaded { .. }
        | AssistantError::IllegalState { .. }
        | AssistantError::ConfigRead(_)
        | AssistantError::ConfigParse(_)
        | AssistantError::NoFeatures => 2,
        AssistantError::GeoHttp(_)
        | AssistantError::GeoStatus { .. }
        | AssistantError::GatewayHttp(_)
        | AssistantError::GatewayStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Ask(args) => run_ask(args),
        Commands::Cache(args) => run_cache(args),
    }
}

fn run_analyze(args: AnalyzeArgs) -> miette::Result<()> {
    let mut resolved = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(pattern) = args.group_pattern {
        resolved.assembly.group_pattern = pattern;
    }
    if let Some(exclude) = args.exclude {
        resolved.assembly.exclude_value = exclude;
    }
    if let Some(formula) = args.formula {
        resolved.fit.formula = formula;
    }
    if let Some(coef) = args.coef {
        resolved.fit.coefficient = coef;
    }
    if let Some(top) = args.top {
        resolved.fit.top_n = top;
    }

    let series: GeoSeriesAccession = args.series.parse()?;
    let mut request = DatasetRequest::new(series);
    if let Some(platform) = args.platform {
        let platform: GeoPlatformAccession = platform.parse()?;
        request = request.with_platform(platform);
    }

    let client = GeoHttpClient::new()?;
    let source = if args.no_cache {
        GeoDatasetSource::new(client)
    } else {
        GeoDatasetSource::with_store(client, Store::new()?)
    };
    let transport = HttpChatTransport::new()?;
    let mut assistant: MicroarrayAssistant<_, _> =
        MicroarrayAssistant::new(source, transport, resolved.gateway);

    let dataset = assistant.load_data(&request)?;
    let (series, platform) = (dataset.series.to_string(), dataset.platform.to_string());
    let samples = assistant.assemble(&resolved.assembly)?.n_obs();
    if !args.json {
        eprintln!("{}", assistant.data_overview()?);
    }
    let summary = assistant.normalize(NormalizeOptions {
        filter_low_count: !args.no_filter,
        log_transform: !args.no_log,
        ..NormalizeOptions::default()
    })?;
    let result = assistant.fit(&resolved.fit)?;

    let report = AnalysisReport {
        series,
        platform,
        samples,
        features_before: summary.features_before,
        features_after: summary.features_after,
        log_transformed: summary.log_transformed,
        formula: result.formula.to_string(),
        coefficient: result.top_table.coefficient.clone(),
        coefficient_names: result.design.coefficient_names().to_vec(),
        df_prior: result.fit.prior.df_prior,
        s2_prior: result.fit.prior.s2_prior,
        significant: result.top_table.n_significant(DEFAULT_ALPHA),
        top_table: result.top_table.clone(),
        volcano: args.volcano.then(|| {
            volcano_points(&result.top_table, DEFAULT_LFC_THRESHOLD, DEFAULT_ALPHA)
        }),
    };

    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    match mode {
        OutputMode::Json => JsonOutput::print_analysis(&report).into_diagnostic(),
        OutputMode::Text => TextOutput::print_analysis(&report).into_diagnostic(),
    }
}

fn run_ask(args: AskArgs) -> miette::Result<()> {
    let mut resolved = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(model) = args.model {
        resolved.gateway.model = model;
    }
    let model = resolved.gateway.model.clone();

    let source = GeoDatasetSource::new(GeoHttpClient::new()?);
    let transport = HttpChatTransport::new()?;
    let assistant: MicroarrayAssistant<_, _> =
        MicroarrayAssistant::new(source, transport, resolved.gateway);
    let content = assistant.answer_question(&args.question);

    if args.json {
        JsonOutput::print_answer(&AnswerReport {
            model,
            question: args.question,
            content,
        })
        .into_diagnostic()
    } else {
        println!("{content}");
        Ok(())
    }
}

fn run_cache(args: CacheArgs) -> miette::Result<()> {
    let store = Store::new()?;
    let cache_root = store.cache_root().to_string();
    match args.command {
        CacheCommand::List => {
            let report = CacheListReport {
                cache_root,
                entries: store.list_metadata()?,
            };
            if args.json {
                JsonOutput::print_cache_list(&report).into_diagnostic()
            } else {
                TextOutput::print_cache_list(&report).into_diagnostic()
            }
        }
        CacheCommand::Clear => {
            store.clear()?;
            let report = CacheClearReport {
                cache_root,
                cleared: true,
            };
            if args.json {
                JsonOutput::print_cache_clear(&report).into_diagnostic()
            } else {
                println!("cleared {}", report.cache_root);
                Ok(())
            }
        }
    }
}
