use std::net::SocketAddr;

use clap::Parser;
use surge_testserver::{TestServerStats, router};
use tokio::net::TcpListener;

/// Standalone target for trying `surge` by hand.
///
/// Routes: GET /hello, /bytes/{n}, /status/{code}, /slow?ms=N.
#[derive(Debug, Parser)]
#[command(name = "surge-testserver", version)]
struct Args {
    /// Address to listen on; port 0 picks a free one.
    #[arg(long, default_value = "127.0.0.1:0")]
    bind: SocketAddr,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let listener = TcpListener::bind(args.bind).await?;
    // Scripts read the chosen port from this line.
    println!("HTTP_URL=http://{}", listener.local_addr()?);

    let stats = TestServerStats::default();
    axum::serve(listener, router(stats.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    eprintln!("served {} requests", stats.requests_total());
    Ok(())
}
