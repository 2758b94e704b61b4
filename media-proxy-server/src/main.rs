mod errors;
mod params;
mod services;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::params::Args;
use crate::services::media_cache::{ReqwestOrigin, ServerSideMediaCache};
use crate::services::media_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let config = args.cache_config();
    tracing::info!(
        "media proxy on {} (trusted host {}, capacity {}, max age {:?})",
        args.http_addr,
        config.trusted_host,
        config.capacity,
        config.max_age
    );
    let cache = web::Data::new(ServerSideMediaCache::new(config, Arc::new(ReqwestOrigin::default())));

    HttpServer::new(move || App::new().app_data(cache.clone()).configure(media_routes::configure))
        .bind(args.http_addr.clone())?
        .run()
        .await
}
