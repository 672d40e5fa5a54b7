use std::path::PathBuf;

use url::Url;

use crate::error::{AppError, AppResult};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_DATA_DIR: &str = ".parlor";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: Url,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let raw_url = std::env::var("PARLOR_SERVER_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = Url::parse(&raw_url)
            .map_err(|e| AppError::validation(format!("invalid PARLOR_SERVER_URL {raw_url:?}: {e}")))?;

        let data_dir = std::env::var("PARLOR_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(Self {
            server_url,
            data_dir,
        })
    }

    pub fn session_db_path(&self) -> PathBuf {
        self.data_dir.join("session.db")
    }

    /// The notification feed lives at `/ws` on the same host, over the
    /// websocket counterpart of the server's scheme.
    pub fn ws_url(&self) -> AppResult<Url> {
        let mut url = self
            .server_url
            .join("ws")
            .map_err(|e| AppError::validation(format!("bad server url: {e}")))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| AppError::validation("server url scheme cannot carry a websocket"))?;
        Ok(url)
    }
}
