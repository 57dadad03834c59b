use crate::error::AppError;

/// Service configuration loaded explicitly from environment variables.
///
/// The backend client carries its own config (`BackendConfig::from_env`);
/// this covers the rest. Redis is optional — without it the service keeps
/// all state in memory for the session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL (e.g. "redis://127.0.0.1:6379"). `None` disables
    /// persistence.
    pub redis_url: Option<String>,
    /// Sampling temperature sent with every analysis request.
    pub default_temperature: f32,
    /// Token budget sent with every analysis request.
    pub default_max_tokens: u32,
    /// Name used when the caller does not provide one.
    pub default_analysis_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `REDIS_URL`: Redis connection string (omit to disable persistence)
    /// - `AVALIA_TEMPERATURE`: default 0.3, must be within [0, 2]
    /// - `AVALIA_MAX_TOKENS`: default 4096, must be > 0
    /// - `AVALIA_ANALYSIS_NAME`: default "Análise Geral"
    pub fn from_env() -> Result<Self, AppError> {
        let redis_url = std::env::var("REDIS_URL").ok();

        let default_temperature = match std::env::var("AVALIA_TEMPERATURE") {
            Ok(raw) => raw
                .parse::<f32>()
                .ok()
                .filter(|t| (0.0..=2.0).contains(t))
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "AVALIA_TEMPERATURE must be a number in [0, 2], got '{raw}'"
                    ))
                })?,
            Err(_) => 0.3,
        };

        let default_max_tokens = match std::env::var("AVALIA_MAX_TOKENS") {
            Ok(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "AVALIA_MAX_TOKENS must be a positive integer, got '{raw}'"
                    ))
                })?,
            Err(_) => 4096,
        };

        let default_analysis_name = std::env::var("AVALIA_ANALYSIS_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Análise Geral".to_string());

        Ok(Self {
            redis_url,
            default_temperature,
            default_max_tokens,
            default_analysis_name,
        })
    }
}
