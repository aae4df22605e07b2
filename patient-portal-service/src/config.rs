/// Service configuration gathered from the environment at startup and passed
/// down explicitly, so tests can construct state without touching env vars.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// PostgreSQL connection string; in-memory storage is used when unset.
    pub database_url: Option<String>,
    pub gemini_api_key: String,
    /// Google Drive access token; in-memory blob storage is used when unset.
    /// Token acquisition (the OAuth flow) happens outside this service.
    pub drive_access_token: Option<String>,
    pub drive_folder_id: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .unwrap_or(3000);

        Ok(Self {
            port,
            database_url: std::env::var("DATABASE_URL").ok(),
            gemini_api_key,
            drive_access_token: std::env::var("DRIVE_ACCESS_TOKEN").ok(),
            drive_folder_id: std::env::var("DRIVE_FOLDER_ID").ok(),
        })
    }
}
