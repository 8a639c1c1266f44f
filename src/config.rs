//! Process configuration, read once at startup from environment variables.
//! Everything has a usable default so the simulator boots with no setup.

use crate::util::generate_id;

/// Default space available, 100 MiB (matches the simulated account quota).
pub const DEFAULT_SPACE_BYTES: u64 = 1024 * 1024 * 100;

pub const DEFAULT_HTTP_PORT: u16 = 7878;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds; also baked into redirect URIs and the
    /// upload progress Location header.
    pub http_port: u16,
    /// The "default" OAuth client pair, i.e. the one a production client
    /// ships with. Freshly generated when not pinned via env.
    pub default_client_id: String,
    pub default_client_secret: String,
    /// Simulated drive space available to uploads.
    pub space_bytes: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let http_port = std::env::var("DRIVESIM_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);
        let default_client_id =
            std::env::var("DRIVESIM_CLIENT_ID").unwrap_or_else(|_| generate_id(5));
        let default_client_secret =
            std::env::var("DRIVESIM_CLIENT_SECRET").unwrap_or_else(|_| generate_id(5));
        let space_bytes = std::env::var("DRIVESIM_SPACE_BYTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SPACE_BYTES);
        Config { http_port, default_client_id, default_client_secret, space_bytes }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http_port: DEFAULT_HTTP_PORT,
            default_client_id: generate_id(5),
            default_client_secret: generate_id(5),
            space_bytes: DEFAULT_SPACE_BYTES,
        }
    }
}
