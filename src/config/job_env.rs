use std::collections::BTreeMap;

pub const ENV_DB_NAME: &str = "MONGO_DB_NAME";
pub const ENV_COLLECTION: &str = "MONGO_COLLECTION";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "LOG_FILE";
/// Default env var that receives the connection URI from Secret Manager.
pub const ENV_CONNECTION_URI: &str = "MONGO_CONNECTION";

pub const DEFAULT_DB_NAME: &str = "biohack_agent";
pub const DEFAULT_COLLECTION: &str = "episodes";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Plain (non-secret) environment handed to the scraping job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEnvironment {
    pub db_name: String,
    pub collection: String,
    pub log_level: String,
    pub log_file: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl JobEnvironment {
    /// Extra entries never override the named ones.
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env = self.extra.clone();
        env.insert(ENV_DB_NAME.to_string(), self.db_name.clone());
        env.insert(ENV_COLLECTION.to_string(), self.collection.clone());
        env.insert(ENV_LOG_LEVEL.to_string(), self.log_level.clone());
        if let Some(log_file) = &self.log_file {
            env.insert(ENV_LOG_FILE.to_string(), log_file.clone());
        }
        env
    }
}

/// `<mount>/<log_path>` without doubled separators.
pub fn log_file_path(mount_path: &str, log_path: &str) -> String {
    format!(
        "{}/{}",
        mount_path.trim_end_matches('/'),
        log_path.trim_start_matches("./")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_map_contains_named_entries() {
        let mut extra = BTreeMap::new();
        extra.insert("HEADLESS".to_string(), "true".to_string());
        extra.insert(ENV_LOG_LEVEL.to_string(), "TRACE".to_string());

        let env = JobEnvironment {
            db_name: "biohack_agent".to_string(),
            collection: "episodes".to_string(),
            log_level: "DEBUG".to_string(),
            log_file: Some("/mnt/logs/scraper.log".to_string()),
            extra,
        }
        .to_env_map();

        assert_eq!(env.get(ENV_DB_NAME).unwrap(), "biohack_agent");
        assert_eq!(env.get(ENV_LOG_LEVEL).unwrap(), "DEBUG");
        assert_eq!(env.get(ENV_LOG_FILE).unwrap(), "/mnt/logs/scraper.log");
        assert_eq!(env.get("HEADLESS").unwrap(), "true");
        assert!(!env.contains_key(ENV_CONNECTION_URI));
    }

    #[test]
    fn test_log_file_path() {
        assert_eq!(log_file_path("/mnt/logs/", "scraper.log"), "/mnt/logs/scraper.log");
        assert_eq!(log_file_path("/mnt/logs", "./run/scraper.log"), "/mnt/logs/run/scraper.log");
    }
}
