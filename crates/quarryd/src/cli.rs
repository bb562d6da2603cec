use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use quarry_config::ProviderKind;
use quarry_infer::InferenceOverrides;

use crate::commands::DEFAULT_ASKER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct AnalyzeArgs {
    #[arg(help = "Working tree to analyze")]
    pub root: PathBuf,

    #[arg(long, help = "Display name for a newly registered subject")]
    pub name: Option<String>,

    #[arg(long, help = "Take over a subject left busy by an interrupted run")]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct AskArgs {
    #[arg(help = "Analyzed working tree")]
    pub root: PathBuf,

    #[arg(help = "Natural-language question about the code")]
    pub question: String,

    #[arg(long, default_value = DEFAULT_ASKER, help = "Name recorded with the question")]
    pub asker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct HistoryArgs {
    #[arg(help = "Analyzed working tree")]
    pub root: PathBuf,

    #[arg(long, default_value = DEFAULT_ASKER, help = "Whose questions to list")]
    pub asker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct StatusArgs {
    #[arg(help = "Working tree to report on")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the full analysis pipeline over a working tree
    Analyze(AnalyzeArgs),
    /// Ask a question about an analyzed working tree
    Ask(AskArgs),
    /// List previous questions with their answers, newest first
    History(HistoryArgs),
    /// Show lifecycle state, progress and statistics
    Status(StatusArgs),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Quarry code-intelligence daemon")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Directory holding config.toml and the store (default: ./.quarry)"
    )]
    pub home: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(
        long,
        global = true,
        value_parser = parse_provider,
        help = "Provider for embeddings and completion: auto, offline, openai, or local"
    )]
    pub provider: Option<ProviderKind>,

    #[arg(long, global = true, help = "Completion model override")]
    pub model: Option<String>,

    #[arg(long, global = true, help = "Completion endpoint override")]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> InferenceOverrides {
        InferenceOverrides {
            provider: self.provider,
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    value.parse()
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}
