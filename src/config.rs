use crate::error::{AppError, Result};

/// How often the mining batch runs (seconds). First run fires immediately.
pub const MINER_INTERVAL_SECS: u64 = 3600;

/// Result-count cap on the observation batch — bounds memory per run.
pub const OBSERVATION_BATCH_CAP: i64 = 1000;

/// Fewer observations than this and the run is a no-op (not an error).
pub const MIN_BATCH_SIZE: usize = 10;

/// SQLite connection pool size; the per-niche analysis fan-out is bounded
/// to this so concurrent tasks never wait on each other for a connection.
pub const DB_MAX_CONNECTIONS: u32 = 8;

/// Candidate validation thresholds shared by the pattern miners.
pub mod validation {
    /// Minimum contributing observations before a candidate can validate.
    pub const MIN_SAMPLE_SIZE: usize = 10;

    /// Minimum distinct ISO weeks the sample must span. A burst inside a
    /// single week never validates regardless of volume.
    pub const MIN_DISTINCT_PERIODS: usize = 2;

    /// Minimum estimator confidence for a candidate to materialize.
    pub const MIN_CONFIDENCE: f64 = 0.80;
}

/// Saturation tier thresholds over the niche listing count.
pub mod saturation_thresholds {
    pub const LOW_MAX: i64 = 50;
    pub const MEDIUM_MAX: i64 = 200;
    pub const HIGH_MAX: i64 = 500;
}

/// Rank-spike classification thresholds (percent rank improvement).
pub mod spike_thresholds {
    pub const MINOR_MIN_PCT: f64 = 10.0;
    pub const MAJOR_MIN_PCT: f64 = 25.0;
    pub const VIRAL_MIN_PCT: f64 = 50.0;
}

/// Suppress a second rank-history entry for the same listing within this
/// window — rapid re-scrapes would otherwise drown the history in noise.
pub const RANK_DEDUP_WINDOW_SECS: i64 = 3600;

/// Spiking listings feed the entry score while flagged within this window.
pub const SPIKE_LOOKBACK_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between mining runs (MINER_INTERVAL_SECS).
    pub miner_interval_secs: u64,
    /// Max observations per batch (OBSERVATION_BATCH_CAP).
    pub observation_batch_cap: i64,
    /// Observations older than this many days are excluded (OBSERVATION_MAX_AGE_DAYS).
    pub observation_max_age_days: i64,
    /// Minimum engagement for an observation to carry signal (OBSERVATION_MIN_ENGAGEMENT).
    pub observation_min_engagement: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "insights.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            miner_interval_secs: std::env::var("MINER_INTERVAL_SECS")
                .unwrap_or_else(|_| MINER_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(MINER_INTERVAL_SECS),
            observation_batch_cap: std::env::var("OBSERVATION_BATCH_CAP")
                .unwrap_or_else(|_| OBSERVATION_BATCH_CAP.to_string())
                .parse::<i64>()
                .unwrap_or(OBSERVATION_BATCH_CAP),
            observation_max_age_days: std::env::var("OBSERVATION_MAX_AGE_DAYS")
                .unwrap_or_else(|_| "90".to_string())
                .parse::<i64>()
                .unwrap_or(90),
            observation_min_engagement: std::env::var("OBSERVATION_MIN_ENGAGEMENT")
                .unwrap_or_else(|_| "0".to_string())
                .parse::<i64>()
                .unwrap_or(0),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations that would make mining results meaningless.
    /// A failure here is fatal and must abort before any write.
    pub fn validate(&self) -> Result<()> {
        if self.miner_interval_secs == 0 {
            return Err(AppError::Config("MINER_INTERVAL_SECS must be > 0".to_string()));
        }
        if self.observation_batch_cap <= 0 {
            return Err(AppError::Config("OBSERVATION_BATCH_CAP must be > 0".to_string()));
        }
        if self.observation_max_age_days <= 0 {
            return Err(AppError::Config("OBSERVATION_MAX_AGE_DAYS must be > 0".to_string()));
        }
        if self.observation_min_engagement < 0 {
            return Err(AppError::Config(
                "OBSERVATION_MIN_ENGAGEMENT must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            log_level: "info".to_string(),
            db_path: "test.db".to_string(),
            api_port: 3000,
            miner_interval_secs: 60,
            observation_batch_cap: 1000,
            observation_max_age_days: 90,
            observation_min_engagement: 0,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_batch_cap_is_fatal() {
        let mut cfg = base_config();
        cfg.observation_batch_cap = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_min_engagement_is_fatal() {
        let mut cfg = base_config();
        cfg.observation_min_engagement = -1;
        assert!(cfg.validate().is_err());
    }
}
