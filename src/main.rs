use analysis_router::{config::RouterConfig, init_service, init_tracing};
use anyhow::Context;
use std::env;
use std::process;

fn load_config(path: &str) -> anyhow::Result<RouterConfig> {
    let mut config = RouterConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/router.yaml".to_string());

    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{:#}", e);
            eprintln!("Usage: analysis-router [config_file]");
            process::exit(1);
        }
    };

    init_tracing(config.log_format);

    if let Err(e) = init_service(config).await {
        eprintln!("Analysis router error: {}", e);
        process::exit(1);
    }
}
