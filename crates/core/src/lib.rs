pub mod cache;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod services;
pub mod storage;
pub mod time;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_anon_key: Option<String>,
        pub supabase_service_role_key: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub inflation_api_base_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                supabase_url: std::env::var("SUPABASE_URL").ok(),
                supabase_anon_key: std::env::var("SUPABASE_ANON_KEY").ok(),
                supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                inflation_api_base_url: std::env::var("INFLATION_API_BASE_URL").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_supabase_url(&self) -> anyhow::Result<&str> {
            self.supabase_url
                .as_deref()
                .context("SUPABASE_URL is required")
        }

        /// Key sent as `apikey` to the auth endpoint. The anon key is enough to resolve a
        /// user JWT; the service role key is accepted as a fallback.
        pub fn require_supabase_api_key(&self) -> anyhow::Result<&str> {
            self.supabase_anon_key
                .as_deref()
                .or(self.supabase_service_role_key.as_deref())
                .context("SUPABASE_ANON_KEY or SUPABASE_SERVICE_ROLE_KEY is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn inflation_api_base_url(&self) -> &str {
            self.inflation_api_base_url
                .as_deref()
                .unwrap_or("https://apis.datos.gob.ar/series/api")
        }
    }
}
