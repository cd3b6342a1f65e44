// Environment-sourced configuration, read once at startup.

/// Server configuration with defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub dict_path: String,
    /// Empty means dev mode: admin endpoints are open.
    pub admin_token: String,
    pub antiscraping_secret: String,
    pub cors_origins: Vec<String>,
    pub rate_limit_max: u32,
    pub sample_cap: usize,
    /// Seeds the `admin` staff account on first start when set.
    pub admin_password: Option<String>,
    pub data_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3000);

        let admin_token = std::env::var("ADMIN_TOKEN").unwrap_or_default();
        if admin_token.is_empty() {
            tracing::warn!("ADMIN_TOKEN is empty, admin endpoints are open (dev mode)");
        }

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if cors_origins.iter().any(|o| o == "*") {
            tracing::warn!("CORS_ORIGIN is '*', all origins allowed");
        }

        Self {
            port,
            dict_path: std::env::var("DICT_PATH").unwrap_or_else(|_| "./dictionary.txt".into()),
            admin_token,
            antiscraping_secret: std::env::var("ANTISCRAPING_SECRET").unwrap_or_default(),
            cors_origins,
            rate_limit_max: std::env::var("RATE_LIMIT_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
            sample_cap: std::env::var("SAMPLE_CAP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            admin_password: std::env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            dict_path: "./dictionary.txt".into(),
            admin_token: String::new(),
            antiscraping_secret: String::new(),
            cors_origins: vec!["http://localhost:3000".into()],
            rate_limit_max: 120,
            sample_cap: 30,
            admin_password: None,
            data_dir: "./data".into(),
        }
    }
}
