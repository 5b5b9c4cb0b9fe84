use std::env;

/// Runtime configuration. All values read from environment variables with
/// defaults that work for local development against a temp database.
///
/// Environment variables:
/// - `DATABASE_PATH` — SQLite file path (default: `data/hostdesk.db`)
/// - `MAILBOX_ADDRESS` — operator mailbox / From header for replies
/// - `MAILBOX_TOKEN` — bearer token for the mailbox REST API
/// - `MAILBOX_OAUTH_CLIENT_ID` / `MAILBOX_OAUTH_CLIENT_SECRET`
/// - `OTA_SENDER_QUERY` — mailbox search query for the OTA sender family
///   (default: `from:airbnb.com`)
/// - `LLM_API_KEY` / `LLM_MODEL` / `LLM_BASE_URL`
/// - `EMBED_API_KEY` / `EMBED_MODEL` / `EMBED_DIM`
/// - `POLL_INTERVAL_SECS` — mailbox poll interval (default: 60)
/// - `POLL_BATCH_SIZE` — per-tick message cap (default: 50)
/// - `POLL_SINCE_DAYS` — mailbox lookback window in days (default: 3)
/// - `WORKER_POOL_SIZE` — reply worker lanes (default: 4)
/// - `AUTO_SEND_MIN_TOTAL` / `AUTO_SEND_MIN_RATE` — gate thresholds
/// - `EMBED_MIN_SIMILARITY` — few-shot retrieval cutoff (default: 0.6)
/// - `POLLER_ENABLED` — set to `0`/`false` to disable the poll loop
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub mailbox_address: String,
    pub mailbox_token: String,
    pub mailbox_oauth_client_id: String,
    pub mailbox_oauth_client_secret: String,
    pub ota_sender_query: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,
    pub embed_api_key: String,
    pub embed_model: String,
    pub embed_dim: usize,
    pub poll_interval_secs: u64,
    pub poll_batch_size: usize,
    pub poll_since_days: u32,
    pub worker_pool_size: usize,
    pub auto_send_min_total: i64,
    pub auto_send_min_rate: f64,
    pub embed_min_similarity: f64,
    pub poller_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "data/hostdesk.db".to_string(),
            mailbox_address: String::new(),
            mailbox_token: String::new(),
            mailbox_oauth_client_id: String::new(),
            mailbox_oauth_client_secret: String::new(),
            ota_sender_query: "from:airbnb.com".to_string(),
            llm_api_key: String::new(),
            llm_model: "gpt-4.1-mini".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            embed_api_key: String::new(),
            embed_model: "text-embedding-3-small".to_string(),
            embed_dim: 1536,
            poll_interval_secs: 60,
            poll_batch_size: 50,
            poll_since_days: 3,
            worker_pool_size: 4,
            auto_send_min_total: 5,
            auto_send_min_rate: 0.8,
            embed_min_similarity: 0.6,
            poller_enabled: true,
        }
    }
}

impl AppConfig {
    /// Create an AppConfig from environment variables, with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("DATABASE_PATH") {
            config.db_path = val;
        }
        if let Ok(val) = env::var("MAILBOX_ADDRESS") {
            config.mailbox_address = val;
        }
        if let Ok(val) = env::var("MAILBOX_TOKEN") {
            config.mailbox_token = val;
        }
        if let Ok(val) = env::var("MAILBOX_OAUTH_CLIENT_ID") {
            config.mailbox_oauth_client_id = val;
        }
        if let Ok(val) = env::var("MAILBOX_OAUTH_CLIENT_SECRET") {
            config.mailbox_oauth_client_secret = val;
        }
        if let Ok(val) = env::var("OTA_SENDER_QUERY") {
            config.ota_sender_query = val;
        }
        if let Ok(val) = env::var("LLM_API_KEY") {
            config.llm_api_key = val;
        }
        if let Ok(val) = env::var("LLM_MODEL") {
            config.llm_model = val;
        }
        if let Ok(val) = env::var("LLM_BASE_URL") {
            config.llm_base_url = val;
        }
        if let Ok(val) = env::var("EMBED_API_KEY") {
            config.embed_api_key = val;
        }
        if let Ok(val) = env::var("EMBED_MODEL") {
            config.embed_model = val;
        }
        if let Ok(val) = env::var("EMBED_DIM")
            && let Ok(n) = val.parse::<usize>()
        {
            config.embed_dim = n;
        }
        if let Ok(val) = env::var("POLL_INTERVAL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.poll_interval_secs = n;
        }
        if let Ok(val) = env::var("POLL_BATCH_SIZE")
            && let Ok(n) = val.parse::<usize>()
        {
            config.poll_batch_size = n;
        }
        if let Ok(val) = env::var("POLL_SINCE_DAYS")
            && let Ok(n) = val.parse::<u32>()
        {
            config.poll_since_days = n;
        }
        if let Ok(val) = env::var("WORKER_POOL_SIZE")
            && let Ok(n) = val.parse::<usize>()
        {
            config.worker_pool_size = n.max(1);
        }
        if let Ok(val) = env::var("AUTO_SEND_MIN_TOTAL")
            && let Ok(n) = val.parse::<i64>()
        {
            config.auto_send_min_total = n;
        }
        if let Ok(val) = env::var("AUTO_SEND_MIN_RATE")
            && let Ok(n) = val.parse::<f64>()
        {
            config.auto_send_min_rate = n;
        }
        if let Ok(val) = env::var("EMBED_MIN_SIMILARITY")
            && let Ok(n) = val.parse::<f64>()
        {
            config.embed_min_similarity = n;
        }
        if let Ok(val) = env::var("POLLER_ENABLED") {
            config.poller_enabled = val != "0" && val.to_lowercase() != "false";
        }

        config
    }
}
