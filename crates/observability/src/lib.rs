//! Logging for pinmeter binaries.

use clap::Args;
use tracing_subscriber::{
    EnvFilter, Layer, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Silence all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Extra filter directives, e.g. `pinmeter_billing=trace`
    #[arg(long = "log.filter", value_name = "DIRECTIVE", global = true)]
    pub filter: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long = "log.json", global = true)]
    pub json: bool,
}

impl LogArgs {
    /// Build the filter for these arguments.
    ///
    /// Precedence:
    /// 1. `--quiet` shows errors only
    /// 2. Otherwise `RUST_LOG` if set, else a level chosen by `-v`
    /// 3. Directives from `--log.filter` are added on top; unparsable ones are skipped
    pub fn env_filter(&self) -> EnvFilter {
        if self.quiet {
            return EnvFilter::new("error");
        }

        let base_level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

        if let Some(custom) = &self.filter {
            for directive in custom.split(',') {
                if let Ok(d) = directive.trim().parse() {
                    filter = filter.add_directive(d);
                }
            }
        }
        filter
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(args: &LogArgs) -> eyre::Result<()> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NONE)
        .with_target(true);
    let layer = if args.json { layer.json().boxed() } else { layer.boxed() };

    tracing_subscriber::registry().with(layer).with(args.env_filter()).try_init()?;
    Ok(())
}
