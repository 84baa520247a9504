use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Data providers
    pub market_api_key: String,
    pub macro_api_key: String,
    pub news_api_key: String,

    // Confidence calibration
    pub freshness_factor: f64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            market_api_key: required_env("ALPHAVANTAGE_API_KEY"),
            macro_api_key: required_env("FRED_API_KEY"),
            news_api_key: required_env("TAVILY_API_KEY"),
            freshness_factor: env::var("VIGIL_FRESHNESS_FACTOR")
                .unwrap_or_else(|_| "0.95".to_string())
                .parse()
                .expect("VIGIL_FRESHNESS_FACTOR must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
