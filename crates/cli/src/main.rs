use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "Slack to completion bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the Slack webhook server. Accepted messages are answered in-process or published to the relay topic, per relay.mode.
    Serve {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run the relay consumer (Pub/Sub push endpoint).
    Consume {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from relay.consumerPort or 3001)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one prompt to the completion provider and print the reply.
    Complete {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Model override (default: OPENAI_MODEL, completion.defaultModel, or gpt-4)
        #[arg(long, short)]
        model: Option<String>,

        /// Prompt text
        #[arg(required = true)]
        prompt: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("bridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Consume { config, port }) => {
            if let Err(e) = run_consume(config, port).await {
                log::error!("relay consumer failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Complete {
            config,
            model,
            prompt,
        }) => {
            if let Err(e) = run_complete(config, model, prompt.join(" ")).await {
                log::error!("completion failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(bridge::config::default_config_path);
    let dir = bridge::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = bridge::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("using config {}", path.display());
    bridge::gateway::run_gateway(config).await
}

async fn run_consume(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (config, path) = bridge::config::load_config(config_path)?;
    log::info!("using config {}", path.display());
    bridge::gateway::run_consumer(config, port).await
}

async fn run_complete(
    config_path: Option<std::path::PathBuf>,
    model: Option<String>,
    prompt: String,
) -> anyhow::Result<()> {
    let (config, _) = bridge::config::load_config(config_path)?;
    let agent = bridge::gateway::build_agent(&config, false)?;
    let text = agent.complete_only(&prompt, model).await?;
    println!("{}", text.trim());
    Ok(())
}
