use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use feedforge::core::FeedPatch;
use feedforge::core::feed::{Chain, Network, Strategy};
use feedforge::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List the sources a feed can bind to
    Sources,
    /// Show market quotes for one or more pairs
    Quote {
        /// Pairs such as BTC/USD
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Fetch every enabled source once and show the aggregated value
    Preview {
        /// Feed id; defaults to the first stored feed
        #[arg(long)]
        feed: Option<String>,
    },
    /// Keep refreshing the preview until interrupted
    Watch {
        #[arg(long)]
        feed: Option<String>,
        /// Stop after this many refreshes
        #[arg(long)]
        cycles: Option<usize>,
    },
    /// Manage stored feed configurations
    #[command(subcommand)]
    Feed(FeedCommands),
}

#[derive(Subcommand)]
enum FeedCommands {
    /// List stored feeds
    List,
    /// Show one feed
    Show {
        #[arg(long)]
        feed: Option<String>,
    },
    /// Create a feed bound to the default sources
    Create {
        symbol: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Change feed fields
    Set {
        #[arg(long)]
        feed: Option<String>,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Bind a source to the feed
    AddSource {
        source: String,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        feed: Option<String>,
    },
    /// Unbind a source
    RemoveSource {
        source: String,
        #[arg(long)]
        feed: Option<String>,
    },
    /// Enable or disable a bound source
    Toggle {
        source: String,
        #[arg(long)]
        feed: Option<String>,
    },
    /// Set the weight of a bound source
    Weight {
        source: String,
        weight: f64,
        #[arg(long)]
        feed: Option<String>,
    },
}

#[derive(Args)]
struct FieldArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// median, mean or weighted
    #[arg(long)]
    strategy: Option<Strategy>,
    #[arg(long)]
    min_sources: Option<usize>,
    /// Fraction, e.g. 0.05 for 5%
    #[arg(long)]
    deviation: Option<f64>,
    /// Seconds between on-chain updates
    #[arg(long)]
    interval: Option<u64>,
    #[arg(long)]
    decimals: Option<u8>,
    #[arg(long)]
    chain: Option<Chain>,
    #[arg(long)]
    network: Option<Network>,
    #[arg(long)]
    enabled: Option<bool>,
}

impl From<FieldArgs> for FeedPatch {
    fn from(args: FieldArgs) -> FeedPatch {
        FeedPatch {
            name: args.name,
            symbol: args.symbol,
            description: args.description,
            sources: None,
            strategy: args.strategy,
            min_sources: args.min_sources,
            deviation_threshold: args.deviation,
            update_interval: args.interval,
            decimals: args.decimals,
            chain: args.chain,
            network: args.network,
            enabled: args.enabled,
        }
    }
}

impl From<FeedCommands> for feedforge::FeedCommand {
    fn from(cmd: FeedCommands) -> feedforge::FeedCommand {
        use feedforge::FeedCommand;
        match cmd {
            FeedCommands::List => FeedCommand::List,
            FeedCommands::Show { feed } => FeedCommand::Show { feed },
            FeedCommands::Create { symbol, fields } => FeedCommand::Create {
                symbol,
                patch: fields.into(),
            },
            FeedCommands::Set { feed, fields } => FeedCommand::Set {
                feed,
                patch: fields.into(),
            },
            FeedCommands::AddSource {
                source,
                weight,
                feed,
            } => FeedCommand::AddSource {
                feed,
                source,
                weight,
            },
            FeedCommands::RemoveSource { source, feed } => {
                FeedCommand::RemoveSource { feed, source }
            }
            FeedCommands::Toggle { source, feed } => FeedCommand::Toggle { feed, source },
            FeedCommands::Weight {
                source,
                weight,
                feed,
            } => FeedCommand::Weight {
                feed,
                source,
                weight,
            },
        }
    }
}

impl From<Commands> for feedforge::AppCommand {
    fn from(cmd: Commands) -> feedforge::AppCommand {
        match cmd {
            Commands::Sources => feedforge::AppCommand::Sources,
            Commands::Quote { symbols } => feedforge::AppCommand::Quote { symbols },
            Commands::Preview { feed } => feedforge::AppCommand::Preview { feed },
            Commands::Watch { feed, cycles } => feedforge::AppCommand::Watch { feed, cycles },
            Commands::Feed(cmd) => feedforge::AppCommand::Feed(cmd.into()),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => feedforge::cli::setup::setup_at_path(path),
            None => feedforge::cli::setup::setup(),
        },
        Some(cmd) => feedforge::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
