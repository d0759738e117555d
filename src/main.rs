use std::fs::File;
use std::sync::Arc;

use env_logger::Target;
use log::error;

use outlook_mcp::context::GraphContext;
use outlook_mcp::server::OutlookMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Stdout carries the MCP protocol, so logs go to a file.
    if let Ok(log_file) = File::create("outlook-mcp.log") {
        env_logger::Builder::from_default_env()
            .target(Target::Pipe(Box::new(log_file)))
            .init();
    }

    let context = Arc::new(GraphContext::new());
    if let Err(err) = OutlookMcpServer::new(context).run().await {
        error!("Server error: {}", err);
        return Err(err);
    }
    Ok(())
}
