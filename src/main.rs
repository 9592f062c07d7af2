use std::net::SocketAddr;

use clap::Parser;
use tally_auth::cli::{
    Args, build_config, init_logging, load_secrets, open_database, validate_origin,
};
use tally_auth::{create_app, init_cleanup};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some((access_secret, refresh_secret)) = load_secrets(&args) else {
        std::process::exit(1);
    };

    let Some(origin) = validate_origin(&args.origin, args.production) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    init_cleanup(&db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to read local address");
            std::process::exit(1);
        }
    };

    let config = build_config(&args, db, access_secret, refresh_secret);
    let app = create_app(&config);

    info!(
        address = %local_addr,
        origin = %origin,
        production = args.production,
        "Listening"
    );

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
