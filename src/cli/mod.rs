//! CLI module for Scout.

pub mod commands;
mod output;

pub use output::Output;

use crate::config::Settings;
use crate::orchestrator::{SearchMode, DEFAULT_SEPARATOR};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

/// Scout - web search, external tools and LLM synthesis
///
/// Answers prompts by searching a SearxNG instance or running a tool script,
/// then asking a local OpenAI-compatible model for a grounded, cited answer.
#[derive(Parser, Debug)]
#[command(name = "scout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the web and synthesize a cited answer
    Search(SearchArgs),

    /// List, inspect and run external tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    /// Stream a plain chat reply from the model
    Chat {
        /// Prompt (read from stdin when omitted)
        prompt: Vec<String>,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Start the HTTP relay server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Check configuration, interpreters and backend reachability
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Search strategy selectable on the command line and over HTTP.
#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModeArg {
    /// Optimize the prompt into one query
    #[default]
    Single,
    /// Search each separated query as given
    Queue,
    /// Let the model extract queries, searching iteratively
    Extract,
}

impl ModeArg {
    pub fn into_mode(self, separator: &str) -> SearchMode {
        match self {
            ModeArg::Single => SearchMode::Single,
            ModeArg::Queue => SearchMode::Queue {
                separator: separator.to_string(),
            },
            ModeArg::Extract => SearchMode::Extract,
        }
    }
}

/// Backend overrides, also read from the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct BackendArgs {
    /// LLM chat-completions endpoint
    #[arg(long, env = "API_BASE_URL")]
    pub api_url: Option<String>,

    /// LLM model identifier
    #[arg(long, env = "MODEL_NAME")]
    pub model: Option<String>,

    /// Timeout in seconds for LLM calls
    #[arg(long, env = "API_TIMEOUT")]
    pub api_timeout: Option<u64>,

    /// SearxNG search endpoint
    #[arg(long, env = "SEARXNG_URL")]
    pub searxng_url: Option<String>,

    /// Maximum number of search results per query
    #[arg(long, env = "MAX_SEARCH_RESULTS")]
    pub max_results: Option<usize>,
}

impl BackendArgs {
    /// Apply the overrides that were given.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.api_url {
            settings.llm.endpoint = url.clone();
        }
        if let Some(model) = &self.model {
            settings.llm.model = model.clone();
        }
        if let Some(timeout) = self.api_timeout {
            settings.llm.request_timeout_secs = timeout;
        }
        if let Some(url) = &self.searxng_url {
            settings.search.endpoint = url.clone();
        }
        if let Some(max) = self.max_results {
            settings.search.max_results = max;
        }
    }
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Mode of operation
    #[arg(long, value_enum, default_value_t = ModeArg::Single)]
    pub mode: ModeArg,

    /// Separator for queued queries
    #[arg(long, default_value = DEFAULT_SEPARATOR)]
    pub separator: String,

    /// Print a JSON report instead of the answer text
    #[arg(long)]
    pub json: bool,

    /// Also let the model run one tool and cite its output
    #[arg(long)]
    pub with_tool: bool,

    /// Print the selectable modes as JSON and exit
    #[arg(long)]
    pub get_options: bool,

    /// Print this command's tool definition as JSON and exit
    #[arg(long)]
    pub get_definition: bool,

    /// Prompt or queries, as a single argument
    #[arg(long)]
    pub prompt: Option<String>,

    #[command(flatten)]
    pub backend: BackendArgs,

    /// Prompt or queries (read from stdin when omitted)
    pub input: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ToolsAction {
    /// List tools in the tools directory
    List,

    /// Print a tool's definition
    Describe {
        /// Tool file name (e.g. stock-stats-tool.py)
        tool: String,
    },

    /// Print a tool's manual-selection presets
    Options {
        /// Tool file name
        tool: String,
    },

    /// Run a tool with raw arguments
    Run {
        /// Tool file name
        tool: String,

        /// Timeout in seconds (defaults to tools.execution_timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,

        /// Arguments passed to the tool unchanged
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Let the model choose a tool for a prompt, run it and answer
    Auto {
        /// Prompt (read from stdin when omitted)
        prompt: Vec<String>,

        /// Print a JSON report instead of the answer text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        backend: BackendArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file and create the tools directory
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_args_parse() {
        let cli = Cli::try_parse_from([
            "scout",
            "search",
            "--mode",
            "queue",
            "--separator=|",
            "--max-results",
            "3",
            "nvda price|amd price",
        ])
        .unwrap();

        let Commands::Search(args) = cli.command else {
            panic!("Expected search command");
        };
        assert_eq!(args.mode, ModeArg::Queue);
        assert_eq!(
            args.mode.into_mode(&args.separator),
            SearchMode::Queue {
                separator: "|".to_string()
            }
        );
        assert_eq!(args.input, vec!["nvda price|amd price"]);

        let mut settings = Settings::default();
        args.backend.apply(&mut settings);
        assert_eq!(settings.search.max_results, 3);
    }

    #[test]
    fn test_tools_run_passes_raw_args() {
        let cli = Cli::try_parse_from([
            "scout", "tools", "run", "stock.py", "--timeout", "5", "--", "--ticker", "NVDA",
        ])
        .unwrap();

        match cli.command {
            Commands::Tools {
                action: ToolsAction::Run { tool, timeout, args },
            } => {
                assert_eq!(tool, "stock.py");
                assert_eq!(timeout, Some(5));
                assert_eq!(args, vec!["--ticker", "NVDA"]);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }
}
