use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Vector store (Qdrant REST endpoint)
    pub qdrant_url: String,

    // Local embedding model (Ollama-compatible endpoint)
    pub ollama_url: String,
    pub embedding_model: String,

    // Local zero-shot NER service
    pub ner_url: String,

    // Collector credentials (all optional — adapters without them skip their run)
    pub acled_api_key: String,
    pub acled_email: String,
    pub opensanctions_api_key: String,
    pub sec_contact_email: String,
    pub otx_api_key: String,
    pub hibp_api_key: String,
    pub fbi_api_key: String,
    pub shodan_api_key: String,
    pub misp_url: String,
    pub misp_api_key: String,

    // Offline event-data exports (registration-gated downloads)
    pub gtd_data_file: String,
    pub icews_data_file: String,

    // Knowledge-base linker
    pub kb_user_agent: String,
}

impl Config {
    /// Load configuration for the collection daemon.
    /// Panics with a clear message if required vars are missing.
    pub fn daemon_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            qdrant_url: env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
            ollama_url: env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".to_string()),
            ner_url: env::var("NER_URL").unwrap_or_else(|_| "http://localhost:8500".to_string()),
            acled_api_key: env::var("ACLED_API_KEY").unwrap_or_default(),
            acled_email: env::var("ACLED_EMAIL").unwrap_or_default(),
            opensanctions_api_key: env::var("OPENSANCTIONS_API_KEY").unwrap_or_default(),
            sec_contact_email: env::var("SEC_CONTACT_EMAIL").unwrap_or_default(),
            otx_api_key: env::var("OTX_API_KEY").unwrap_or_default(),
            hibp_api_key: env::var("HIBP_API_KEY").unwrap_or_default(),
            fbi_api_key: env::var("FBI_API_KEY").unwrap_or_default(),
            shodan_api_key: env::var("SHODAN_API_KEY").unwrap_or_default(),
            misp_url: env::var("MISP_URL").unwrap_or_default(),
            misp_api_key: env::var("MISP_API_KEY").unwrap_or_default(),
            gtd_data_file: env::var("GTD_DATA_FILE").unwrap_or_default(),
            icews_data_file: env::var("ICEWS_DATA_FILE").unwrap_or_default(),
            kb_user_agent: env::var("KB_USER_AGENT")
                .unwrap_or_else(|_| "Vantage/0.1 (contact@vantage.local)".to_string()),
        }
    }

    /// Load config for pipeline-only contexts (no collector credentials needed).
    pub fn pipeline_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            qdrant_url: env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
            ollama_url: env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".to_string()),
            ner_url: env::var("NER_URL").unwrap_or_else(|_| "http://localhost:8500".to_string()),
            acled_api_key: String::new(),
            acled_email: String::new(),
            opensanctions_api_key: String::new(),
            sec_contact_email: String::new(),
            otx_api_key: String::new(),
            hibp_api_key: String::new(),
            fbi_api_key: String::new(),
            shodan_api_key: String::new(),
            misp_url: String::new(),
            misp_api_key: String::new(),
            gtd_data_file: String::new(),
            icews_data_file: String::new(),
            kb_user_agent: env::var("KB_USER_AGENT")
                .unwrap_or_else(|_| "Vantage/0.1 (contact@vantage.local)".to_string()),
        }
    }

    /// Log the presence of each sensitive env var without exposing values.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("QDRANT_URL", &self.qdrant_url),
            ("OLLAMA_URL", &self.ollama_url),
            ("NER_URL", &self.ner_url),
            ("ACLED_API_KEY", &self.acled_api_key),
            ("OPENSANCTIONS_API_KEY", &self.opensanctions_api_key),
            ("SEC_CONTACT_EMAIL", &self.sec_contact_email),
            ("OTX_API_KEY", &self.otx_api_key),
            ("HIBP_API_KEY", &self.hibp_api_key),
            ("FBI_API_KEY", &self.fbi_api_key),
            ("SHODAN_API_KEY", &self.shodan_api_key),
            ("MISP_URL", &self.misp_url),
            ("MISP_API_KEY", &self.misp_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
