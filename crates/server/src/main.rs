use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use tidekv_common::{DEFAULT_HOST, DEFAULT_PORT, MAX_CONNECTIONS};

#[derive(Parser, Debug)]
#[command(name = "tidekv-server", about = "TideKV: in-memory key-value server")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidekv_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let listener = TcpListener::bind(&addr).await?;
    info!("TideKV escutando em {addr}");

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal recebido"),
            Err(e) => error!("falha ao ouvir ctrl-c: {e}"),
        }
        let _ = shutdown_tx.send(());
    });

    tidekv_server::run(listener, args.max_connections, shutdown_rx).await;
    info!("servidor encerrado");

    Ok(())
}
