//! Server settings sourced from the environment, following the teacher's
//! `HTTP_BIND_ADDRESS` / `RUST_LOG` convention in
//! `crates/services/http-server/src/main.rs`.

/// Settings `clusterd` reads from the environment before starting.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket surface binds to.
    pub bind_address: String,
    /// Host the worker runtime's manager listens on.
    pub worker_host: String,
    /// Port the worker runtime's manager listens on.
    pub worker_port: u16,
}

impl ServerConfig {
    /// Read settings from `CLUSTERD_BIND_ADDRESS`, `CLUSTERD_WORKER_HOST`,
    /// and `CLUSTERD_WORKER_PORT`, falling back to sensible defaults for a
    /// local worker runtime.
    pub fn from_env() -> Self {
        let bind_address = std::env::var("CLUSTERD_BIND_ADDRESS")
            .unwrap_or_else(|_| "127.0.0.1:7800".to_string());
        let worker_host =
            std::env::var("CLUSTERD_WORKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let worker_port = std::env::var("CLUSTERD_WORKER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7801);

        Self {
            bind_address,
            worker_host,
            worker_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_vars_are_unset() {
        std::env::remove_var("CLUSTERD_BIND_ADDRESS");
        std::env::remove_var("CLUSTERD_WORKER_HOST");
        std::env::remove_var("CLUSTERD_WORKER_PORT");
        let config = ServerConfig::from_env();
        assert_eq!(config.bind_address, "127.0.0.1:7800");
        assert_eq!(config.worker_host, "127.0.0.1");
        assert_eq!(config.worker_port, 7801);
    }
}
