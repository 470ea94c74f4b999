use std::io::Read;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use grok_engine::source::read_limited;
use grok_engine::{render, DefaultFetcher, Document, FetchConfig, Fetcher, Machine, MatchStep};

#[derive(Parser)]
#[command(name = "grok")]
#[command(about = "Extract text from HTML with tree expressions")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search a document and print the rendered template
    Search {
        /// Tree expression, e.g. 'tr -> td -> text:"foo = (.*)"'
        expr: String,

        /// File path or URI of the document; `-` or absent reads stdin
        source: Option<String>,

        /// Output template; `\0`..`\9` expand to captures
        #[arg(short, long, default_value = r"\0")]
        template: String,

        /// Parse the input as an already-decoded UTF-8 string, ignoring
        /// any charset the document declares
        #[arg(long)]
        string: bool,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Compile an expression and print its steps, or the error location
    Check {
        /// Tree expression
        expr: String,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Network timeout in seconds
    #[arg(long, env = "GROK_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// User-Agent header for HTTP fetches
    #[arg(long, env = "GROK_USER_AGENT")]
    user_agent: Option<String>,

    /// Largest document body accepted, in bytes
    #[arg(long, env = "GROK_MAX_BYTES")]
    max_bytes: Option<u64>,
}

impl FetchArgs {
    fn config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        FetchConfig {
            timeout: Duration::from_secs(self.timeout),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            max_body_bytes: self.max_bytes.unwrap_or(defaults.max_body_bytes),
        }
    }
}

/// Result of a search that did not fail.
#[derive(Debug, PartialEq)]
enum Outcome {
    Matched(String),
    NoMatch,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("grok: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Search {
            expr,
            source,
            template,
            string,
            fetch,
        } => {
            let config = fetch.config();
            let stdin_limit = config.max_body_bytes;
            let fetcher = DefaultFetcher::new(config);
            cmd_search(
                &expr,
                source.as_deref(),
                &template,
                string,
                &fetcher,
                std::io::stdin().lock(),
                stdin_limit,
            )
        }
        Command::Check { expr } => cmd_check(&expr).map(|listing| {
            print!("{listing}");
            Outcome::Matched(String::new())
        }),
    };

    match result {
        Ok(Outcome::Matched(_)) => ExitCode::SUCCESS,
        Ok(Outcome::NoMatch) => {
            eprintln!("grok: No match found");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("grok: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("GROK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn compile(expr: &str) -> anyhow::Result<Machine> {
    Machine::compile(expr).map_err(|e| anyhow::anyhow!("{e}\n{}", e.caret(expr)))
}

fn cmd_search(
    expr: &str,
    source: Option<&str>,
    template: &str,
    as_string: bool,
    fetcher: &dyn Fetcher,
    stdin: impl Read,
    stdin_limit: u64,
) -> anyhow::Result<Outcome> {
    let machine = compile(expr)?;

    let (bytes, origin) = match source {
        None | Some("-") => (read_limited(stdin, stdin_limit, "stdin")?, "stdin"),
        Some(uri) => (fetcher.fetch(uri)?, uri),
    };

    let doc = if as_string {
        let text = String::from_utf8(bytes).with_context(|| format!("{origin} is not valid UTF-8"))?;
        Document::from_string(&text)?
    } else {
        Document::from_bytes(&bytes)?
    };

    let Some(captures) = doc.search(&machine)? else {
        return Ok(Outcome::NoMatch);
    };
    let rendered = render(&captures, template)?;
    println!("{rendered}");
    Ok(Outcome::Matched(rendered))
}

fn cmd_check(expr: &str) -> anyhow::Result<String> {
    let machine = compile(expr)?;
    let mut listing = format!("{machine}\n");
    for (i, step) in machine.steps().iter().enumerate() {
        let detail = match step {
            MatchStep::Element { attributes, .. } if attributes.is_empty() => "element".to_string(),
            MatchStep::Element { attributes, .. } => format!("element, {} attribute(s)", attributes.len()),
            MatchStep::Text { pattern } => format!("text, {} group(s)", pattern.captures_len() - 1),
        };
        listing.push_str(&format!("  {}: {step}  ({detail})\n", i + 1));
    }
    Ok(listing)
}
