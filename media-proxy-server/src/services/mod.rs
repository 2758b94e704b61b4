pub mod media_cache;
pub mod media_routes;
