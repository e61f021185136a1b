use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub app_env: String,
    pub log_format: String,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub clans: ClanPolicyConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Memory,
}

impl StorageBackend {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => StorageBackend::Memory,
            _ => StorageBackend::File,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_secs: i64,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    pub write_max: u32,
}

#[derive(Clone, Debug)]
pub struct ClanPolicyConfig {
    pub name_max_len: usize,
    pub tag_max_len: usize,
    /// When set, a user may only have one pending join request across all clans.
    pub exclusive_join_requests: bool,
}

impl Default for ClanPolicyConfig {
    fn default() -> Self {
        Self {
            name_max_len: 32,
            tag_max_len: 10,
            exclusive_join_requests: false,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let policy = ClanPolicyConfig::default();
        Self {
            port: env_or_parse("PORT", 3000),
            app_env: env_or("APP_ENV", "development"),
            log_format: env_or("LOG_FORMAT", "json"),
            storage: StorageConfig {
                backend: StorageBackend::parse(&env_or("STORAGE_BACKEND", "file")),
                data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
            },
            jwt: JwtConfig {
                secret: env_or("JWT_SECRET", "change-me-to-a-secure-random-string"),
                expiry_secs: parse_duration_to_secs(&env_or("JWT_EXPIRY", "7d")),
            },
            rate_limit: RateLimitConfig {
                window_secs: env_or_parse("RATE_LIMIT_WINDOW_SECS", 60),
                max_requests: env_or_parse("RATE_LIMIT_MAX", 100),
                write_max: env_or_parse("RATE_LIMIT_WRITE_MAX", 20),
            },
            clans: ClanPolicyConfig {
                name_max_len: env_or_parse("CLAN_NAME_MAX_LEN", policy.name_max_len),
                tag_max_len: env_or_parse("CLAN_TAG_MAX_LEN", policy.tag_max_len),
                exclusive_join_requests: env_flag(
                    "CLAN_EXCLUSIVE_JOIN_REQUESTS",
                    policy.exclusive_join_requests,
                ),
            },
        }
    }

    pub fn clans_file(&self) -> PathBuf {
        self.storage.data_dir.join("clans.json")
    }

    pub fn invitations_file(&self) -> PathBuf {
        self.storage.data_dir.join("clan-invitations.json")
    }

    pub fn join_requests_file(&self) -> PathBuf {
        self.storage.data_dir.join("clan-join-requests.json")
    }
}

fn parse_duration_to_secs(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return 3600;
    }
    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: i64 = num_str.parse().unwrap_or(1);
    match unit {
        "s" => num,
        "m" => num * 60,
        "h" => num * 3600,
        "d" => num * 86400,
        _ => s.parse().unwrap_or(3600),
    }
}
