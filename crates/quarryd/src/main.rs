use anyhow::{Context, Result};
use quarryd::cli::{Cli, Commands, LogFormat, parse_cli};
use quarryd::commands::Session;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format);
    run(cli)
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Human => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(cli: Cli) -> Result<()> {
    let home = match cli.home.clone() {
        Some(home) => home,
        None => {
            let cwd = std::env::current_dir().context("failed to resolve current directory")?;
            quarry_config::quarry_home(cwd)
        }
    };
    let session = Session::open(&home, &cli.overrides())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    match &cli.command {
        Commands::Analyze(args) => {
            let report =
                runtime.block_on(session.analyze(&args.root, args.name.as_deref(), args.force))?;
            print_json(&report)
        }
        Commands::Ask(args) => {
            let outcome = runtime.block_on(session.ask(&args.root, &args.question, &args.asker))?;
            print_json(&outcome)
        }
        Commands::History(args) => print_json(&session.history(&args.root, &args.asker)?),
        Commands::Status(args) => print_json(&session.status(&args.root)?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
