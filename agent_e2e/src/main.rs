use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};

use agent_e2e::{
    chain::ChainClient,
    clock::SystemClock,
    config::{ConfigValidator, SecretKey, DEPLOYER_KEY_ENV},
    logger::{self, LoggerConfig},
    report, HarnessConfig, Orchestrator, ProtocolActions, RpcChainClient, ScenarioContext,
    Session,
};

/// Command line surface; every flag is optional and overrides the
/// configuration
#[derive(Parser, Clone, Debug)]
#[command(name = "agent-e2e")]
#[command(about = "End-to-end verification of the agent economy precompiles")]
pub struct CliConfig {
    /// JSON File to load the configuration from
    #[clap(long)]
    config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    generate_config_template: bool,

    /// Set log level
    #[clap(long)]
    log_level: Option<LevelFilter>,

    /// Disable the usage of colors in log
    #[clap(long)]
    disable_log_color: bool,

    /// Also write the log to this file
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Private key of the funding identity
    #[clap(long, env = DEPLOYER_KEY_ENV, hide_env_values = true)]
    deployer_key: Option<String>,
}

impl CliConfig {
    fn apply_to(self, config: &mut HarnessConfig) {
        if let Some(level) = self.log_level {
            config.logging.level = level.to_string().to_lowercase();
        }
        if self.disable_log_color {
            config.logging.disable_log_color = true;
        }
        if let Some(path) = self.log_file {
            config.logging.log_file = Some(path.display().to_string());
        }
        if let Some(key) = self.deployer_key {
            config.deployer_private_key = Some(SecretKey::new(key));
        }
    }
}

#[tokio::main]
async fn main() {
    let code = match run(CliConfig::parse()).await {
        Ok(code) => code,
        Err(e) => {
            if log::log_enabled!(log::Level::Error) {
                error!("Fatal error: {:#}", e);
            } else {
                eprintln!("Fatal error: {:#}", e);
            }
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli_config: CliConfig) -> Result<i32> {
    // Handle config template generation
    if cli_config.generate_config_template {
        let Some(path) = cli_config.config_file.as_ref() else {
            bail!("--generate-config-template requires --config-file");
        };
        if Path::new(path).exists() {
            eprintln!("Config file already exists at {path}");
            eprintln!("Use a different path or remove the existing file");
            return Ok(0);
        }

        HarnessConfig::generate_template(path)?;
        println!("Configuration template generated at {path}");
        println!("Edit the file and run the harness with --config-file {path}");
        return Ok(0);
    }

    let mut config = match &cli_config.config_file {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };
    cli_config.apply_to(&mut config);

    logger::init(LoggerConfig {
        level: config.log_level(),
        disable_colors: config.logging.disable_log_color,
        log_file: config.logging.log_file.as_deref().map(Path::new),
    })?;

    let warnings = ConfigValidator::new(config.strict_validation)
        .validate(&config)
        .context("Invalid configuration")?;
    if !warnings.is_empty() {
        info!("Configuration validated with {} warning(s)", warnings.len());
    }

    report::section("Agent Economy E2E Integration Test");
    if log::log_enabled!(log::Level::Info) {
        info!("RPC URL: {}", config.network.rpc_url);
        info!("Chain ID: {}", config.network.chain_id);
    }

    let client = Arc::new(
        RpcChainClient::new(
            &config.network.rpc_url,
            config.network.chain_id,
            config.to_rpc_client_config(),
        )
        .context("Failed to create RPC client")?,
    );

    // Refuse to spend funds on the wrong network
    let chain_id = client
        .chain_id()
        .await
        .context("Failed to query the chain id")?;
    if chain_id != config.network.chain_id {
        bail!(
            "Endpoint serves chain {} but {} is configured",
            chain_id,
            config.network.chain_id
        );
    }
    let head = client
        .block_number()
        .await
        .context("Failed to query the block number")?;
    info!("Connected at block {}", head);

    let session = Session::new(&config).context("Failed to set up signing identities")?;
    let actions = ProtocolActions::new(
        client,
        config.precompiles.clone(),
        config.gas.clone(),
    );
    session
        .prepare(&actions, &config)
        .await
        .context("Failed to prepare the session")?;

    let context = ScenarioContext {
        config: Arc::new(config),
        actions,
        session: Arc::new(session),
        clock: Arc::new(SystemClock),
    };

    let plan = Orchestrator::default_plan()?;
    let summary = plan.run(&context).await;
    report::summary(&summary);

    Ok(summary.exit_code())
}
