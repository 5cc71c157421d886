use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: Option<String>,
    pub cache_strategy: String,
    pub cache_max_entries: usize,
    pub cache_default_ttl_seconds: u64,
    pub cache_key_prefix: String,
    pub parallel_max_concurrent: usize,
    pub parallel_task_timeout_seconds: Option<u64>,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            cache_strategy: "memory".to_string(),
            cache_max_entries: 1000,
            cache_default_ttl_seconds: 3600,
            cache_key_prefix: "agent_builder".to_string(),
            parallel_max_concurrent: 5,
            parallel_task_timeout_seconds: Some(30),
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());
        if redis_url.is_none() {
            warn!("REDIS_URL not set, distributed cache tier disabled");
        }

        let cache_strategy = env::var("CACHE_STRATEGY").unwrap_or_else(|_| {
            if redis_url.is_some() { "hybrid" } else { "memory" }.to_string()
        });

        let timeout_seconds: u64 = parse_var(
            "PARALLEL_TASK_TIMEOUT_SECONDS",
            defaults.parallel_task_timeout_seconds.unwrap_or(0),
        );

        let config = Self {
            redis_url,
            cache_strategy,
            cache_max_entries: parse_var("CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            cache_default_ttl_seconds: parse_var(
                "CACHE_DEFAULT_TTL_SECONDS",
                defaults.cache_default_ttl_seconds,
            ),
            cache_key_prefix: env::var("CACHE_KEY_PREFIX")
                .unwrap_or(defaults.cache_key_prefix),
            parallel_max_concurrent: parse_var(
                "PARALLEL_MAX_CONCURRENT",
                defaults.parallel_max_concurrent,
            ),
            // 0 disables the per-task deadline
            parallel_task_timeout_seconds: (timeout_seconds > 0).then_some(timeout_seconds),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
        };

        if config.cache_max_entries == 0 {
            warn!("CACHE_MAX_ENTRIES is 0, the local cache tier will hold a single entry");
        }

        config
    }

    pub fn is_distributed_cache_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
