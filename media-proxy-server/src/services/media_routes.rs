use actix_web::http::header;
use actix_web::{delete, get, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::MediaProxyErr;
use crate::services::media_cache::ServerSideMediaCache;

pub const CACHE_STATUS_HEADER: &str = "X-Cache-Status";
const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Deserialize, Validate)]
pub struct MediaQuery {
    #[validate(url)]
    url: String,
}

#[derive(Serialize)]
struct ClearResponse {
    success: bool,
    size: usize,
}

#[get("/api/media")]
async fn get_media(
    query: web::Query<MediaQuery>,
    cache: web::Data<ServerSideMediaCache>,
) -> Result<HttpResponse, MediaProxyErr> {
    query
        .validate()
        .map_err(|e| MediaProxyErr::InvalidRequest(e.to_string()))?;

    let media = cache.get(&query.url).await?;
    Ok(HttpResponse::Ok()
        .content_type(media.content_type)
        .append_header((CACHE_STATUS_HEADER, media.status.as_str()))
        .append_header((header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL))
        .body(media.payload))
}

#[delete("/api/media")]
async fn clear_media(cache: web::Data<ServerSideMediaCache>) -> impl Responder {
    let size = cache.clear().await;
    HttpResponse::Ok().json(ClearResponse { success: true, size })
}

#[get("/api/media/stats")]
async fn media_stats(cache: web::Data<ServerSideMediaCache>) -> impl Responder {
    HttpResponse::Ok().json(cache.stats().await)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(media_stats).service(get_media).service(clear_media);
}
