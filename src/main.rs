use std::sync::Arc;

use palisade::config::Config;
use palisade::{Handler, HttpServer, Method, StatusCode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let cfg = Config::load();

    let server = Arc::new(HttpServer::with_handle(
        tokio::runtime::Handle::current(),
        cfg.port,
    ));

    server.set_http_handler(
        &[Method::GET],
        "/",
        Handler::sync(|_req, resp| {
            resp.set_status_and_content(StatusCode::Ok, b"palisade is running".to_vec());
        }),
    );

    if let Some(dir) = &cfg.static_dir {
        server.set_static_res_dir(&cfg.static_prefix, dir)?;
        server.set_max_size_of_cache_files(palisade::files::DEFAULT_CACHE_FILE_SIZE);
    }

    let started = server.async_start();

    tokio::select! {
        res = started => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            let server = Arc::clone(&server);
            tokio::task::spawn_blocking(move || server.stop()).await?;
        }
    }

    Ok(())
}
