use std::time::Duration;

use clap::Parser;

use crate::services::media_cache::ProxyCacheConfig;

#[derive(Parser, Debug)]
pub struct Args {
    #[clap(long, env = "MEDIA_PROXY_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    pub(crate) http_addr: String,
    /// Only URLs on this host, or a subdomain of it, are proxied.
    #[clap(long, env = "MEDIA_PROXY_TRUSTED_HOST", default_value = "supabase.co")]
    pub(crate) trusted_host: String,
    #[clap(long, env = "MEDIA_PROXY_CAPACITY", default_value_t = 100, value_parser = parse_capacity)]
    pub(crate) capacity: usize,
    #[clap(long, env = "MEDIA_PROXY_MAX_AGE_SECS", default_value_t = 7 * 24 * 60 * 60)]
    pub(crate) max_age_secs: u64,
}

fn parse_capacity(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl Args {
    pub(crate) fn cache_config(&self) -> ProxyCacheConfig {
        ProxyCacheConfig {
            trusted_host: self.trusted_host.clone(),
            capacity: self.capacity,
            max_age: Duration::from_secs(self.max_age_secs),
        }
    }
}
