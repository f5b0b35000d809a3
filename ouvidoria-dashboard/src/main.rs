//! Ouvidoria dashboard console entry point.

use std::sync::Arc;

use ouvidoria_dashboard::api_client::HttpAggregateSource;
use ouvidoria_dashboard::commands::{execute, parse_command};
use ouvidoria_dashboard::config::DashboardConfig;
use ouvidoria_dashboard::error::DashboardError;
use ouvidoria_dashboard::render::TextRenderer;
use ouvidoria_dashboard::telemetry::init_tracing;
use ouvidoria_dashboard::AppContext;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DashboardError> {
    let config = DashboardConfig::load()?;
    init_tracing(config.log_format)?;

    let source = Arc::new(HttpAggregateSource::new(&config)?);
    let renderer = Arc::new(TextRenderer::stdout(config.visible_container_ids()));
    info!(api = %source.base_url(), pages = config.pages.len(), "starting dashboard");

    let ctx = AppContext::new(config, source, renderer);
    let report = ctx.start();
    for (page_id, reason) in &report.skipped {
        info!(page_id = %page_id, reason = %reason, "page not connected");
    }
    ctx.reload_all(false).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                warn!(input = %line, "{}", err);
                println!("{}", err);
                continue;
            }
        };
        let reply = execute(&ctx, command).await;
        if !reply.text.is_empty() {
            println!("{}", reply.text);
        }
        if reply.quit {
            break;
        }
    }

    ctx.shutdown();
    Ok(())
}
