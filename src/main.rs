/// Version injected at compile time via CLOUDLIST_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("CLOUDLIST_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use cloudlist::api::{ApiClient, ApiScope, HttpTransport, Transport};
use cloudlist::config::Config;
use cloudlist::filter::{
    ComposeOptions, ConditionCompiler, FilterComposer, FilterSet, Rule, SearchChip, SearchOptions,
};
use cloudlist::list::{roll_fetch_all, ListController, ListOptions, LoadMode, SortOrder};
use cloudlist::{format_api_error, ListError};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// List cloud resources through the paginated list API
#[derive(Parser, Debug)]
#[command(name = "cloudlist", version = VERSION, about, long_about = None)]
struct Args {
    /// Resource type, e.g. cvms, vpcs, load_balancers
    #[arg(short, long)]
    resource: String,

    /// List within one business instead of the resource view
    #[arg(short, long)]
    biz: Option<u64>,

    /// API endpoint (overrides config and CLOUDLIST_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "CLOUDLIST_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Condition `field=value`; the value may be JSON, e.g. status=["running"].
    /// Repeating a field matches any of its values
    #[arg(short = 'w', long = "where", value_name = "FIELD=VALUE")]
    conditions: Vec<String>,

    /// Search chip `field=value`
    #[arg(short, long, value_name = "FIELD=VALUE")]
    search: Vec<String>,

    /// Search every text field case-insensitively
    #[arg(long)]
    fuzzy: bool,

    /// Sort column
    #[arg(long)]
    sort: Option<String>,

    #[arg(long, value_enum)]
    order: Option<OrderArg>,

    /// Page size
    #[arg(short, long)]
    limit: Option<u64>,

    /// Number of pages to fetch
    #[arg(long, default_value_t = 1, conflicts_with = "all")]
    pages: u64,

    /// Fetch the entire result set
    #[arg(long)]
    all: bool,

    /// Property definitions (YAML or JSON)
    #[arg(long)]
    properties: Option<PathBuf>,

    /// Fail on conditions for fields without a property definition
    #[arg(long)]
    strict: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudlist started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudlist").join("cloudlist.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudlist").join("cloudlist.log");
    }
    PathBuf::from("cloudlist.log")
}

/// `field=value`; the value is parsed as JSON when possible, else taken as text
fn parse_condition(input: &str) -> Result<(String, Value)> {
    let Some((field, value)) = input.split_once('=') else {
        bail!("Invalid condition '{}', expected FIELD=VALUE", input);
    };
    let field = field.trim();
    if field.is_empty() {
        bail!("Invalid condition '{}', empty field", input);
    }
    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

/// Repeated `--where` on one field collects every value into an array
fn merge_condition(condition: &mut Map<String, Value>, field: String, value: Value) {
    let Some(existing) = condition.get_mut(&field) else {
        condition.insert(field, value);
        return;
    };
    let mut values = match existing.take() {
        Value::Array(values) => values,
        other => vec![other],
    };
    match value {
        Value::Array(more) => values.extend(more),
        other => values.push(other),
    }
    *existing = Value::Array(values);
}

fn build_rules(args: &Args, config: &Config) -> Result<Vec<Rule>> {
    let properties = config.load_properties(args.properties.as_deref())?;

    let mut condition = Map::new();
    for input in &args.conditions {
        let (field, value) = parse_condition(input)?;
        merge_condition(&mut condition, field, value);
    }
    let compiled = ConditionCompiler::new(&properties)
        .with_mode(config.effective_compile_mode(args.strict))
        .compile(&condition)?;

    let chips = args
        .search
        .iter()
        .map(|input| {
            SearchChip::parse(input)
                .with_context(|| format!("Invalid search '{}', expected FIELD=VALUE", input))
        })
        .collect::<Result<Vec<_>>>()?;
    let search = SearchOptions {
        fuzzy: args.fuzzy,
        ..SearchOptions::default()
    };
    let search_rules = search.to_rules(&chips, &properties);

    // search chips override --where conditions on the same field
    let composer = FilterComposer::new().with_aliases(properties.aliases().clone());
    let options = ComposeOptions::default();
    let base = composer.compose(&compiled.rules, &[], &options);
    Ok(composer.compose(&search_rules, &base, &options))
}

fn print_items(items: &[Value]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for item in items {
        writeln!(out, "{}", serde_json::to_string(item)?)?;
    }
    out.flush()?;
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load();

    let mut transport = HttpTransport::new()?;
    if let Some(token) = &args.token {
        transport = transport.with_bearer_token(token);
    }
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let scope = args.biz.map_or(ApiScope::Resource, ApiScope::Business);
    let client = ApiClient::new(transport, &config.effective_base_url(args.base_url.as_deref()), scope)?;
    let url = client.list_url(&args.resource)?;
    let limit = config.effective_page_limit(args.limit);
    let rules = build_rules(&args, &config)?;
    tracing::info!("Listing {} with {} rules", url, rules.len());

    if args.all {
        let items: Vec<Value> = roll_fetch_all(
            client.transport().as_ref(),
            &url,
            &FilterSet::and(rules),
            &config.roll_options(limit),
        )
        .await?;
        print_items(&items)?;
        eprintln!("{} items", items.len());
        return Ok(());
    }

    let options = ListOptions {
        limit,
        default_sort: config.effective_sort(args.sort.as_deref(), args.order.map(SortOrder::from)),
        base_rules: rules,
        ..ListOptions::default()
    };
    let list: ListController<Value> = ListController::new(client.transport(), url, options);

    list.load(&[], LoadMode::Replace).await?;
    let mut items = list.list();
    print_items(&items)?;
    let mut printed = items.len();

    for _ in 1..args.pages {
        if !list.scroll_to_end().await? {
            break;
        }
        items = list.list();
        print_items(&items[printed..])?;
        printed = items.len();
    }

    eprintln!("{} of {} items", printed, list.count());
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        match err.downcast_ref::<ListError>() {
            Some(list_err) => {
                tracing::error!("{}", list_err);
                eprintln!("Error: {}", format_api_error(list_err));
            }
            None => eprintln!("Error: {err:?}"),
        }
        std::process::exit(1);
    }
}
