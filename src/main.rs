use clap::Parser;
use tracing::{error, info};
use turnstile::cli::{
    Args, build_config, init_logging, load_jwt_secret, open_cache, open_database,
};
use turnstile::run_server;
use turnstile::shutdown::wait_for_signal;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database, args.store_timeout()).await else {
        std::process::exit(1);
    };

    let Some(cache) = open_cache(&args.cache_url, args.store_timeout()).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(
            address = %local_addr,
            prefix = %args.api_prefix,
            local_mode = args.local_mode(),
            "Listening"
        ),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let config = build_config(&args, db, cache, jwt_secret);
    let shutdown = async {
        wait_for_signal().await;
    };

    if let Err(e) = run_server(config, listener, shutdown).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
