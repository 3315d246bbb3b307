use std::{
    process::{Child, Command},
    sync::OnceLock,
    time::Duration,
};

use redis::RedisError;

static SHARED_SERVER: OnceLock<Option<RedisTestServer>> = OnceLock::new();

/// Shared `redis-server` instance for the whole test binary, or `None` when
/// no redis-server binary is available on this machine (tests skip then).
pub fn shared_server() -> Option<&'static RedisTestServer> {
    SHARED_SERVER
        .get_or_init(|| {
            let server = RedisTestServer::start().ok()?;
            server.wait_ready().ok()?;
            Some(server)
        })
        .as_ref()
}

pub struct RedisTestServer {
    process: Option<Child>,
    port: u16,
    url: String,
}

impl RedisTestServer {
    pub fn start() -> Result<Self, String> {
        let port = portpicker::pick_unused_port()
            .ok_or_else(|| "failed to find available port".to_string())?;
        let url = format!("redis://127.0.0.1:{}", port);

        let process = Command::new("redis-server")
            .args([
                "--port",
                &port.to_string(),
                "--save",
                "",
                "--appendonly",
                "no",
                "--daemonize",
                "no",
            ])
            .spawn()
            .map_err(|e| format!("failed to start redis-server: {e}"))?;

        Ok(Self {
            process: Some(process),
            port,
            url,
        })
    }

    pub fn wait_ready(&self) -> Result<(), String> {
        for _ in 0..100 {
            if self.is_ready().is_ok() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        Err(format!(
            "timeout waiting for redis server on port {}",
            self.port
        ))
    }

    fn is_ready(&self) -> Result<(), RedisError> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut conn = client.get_connection()?;
        redis::cmd("PING").query::<String>(&mut conn)?;
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Direct synchronous connection for raw assertions (TTL, key layout).
    pub fn connection(&self) -> redis::Connection {
        redis::Client::open(self.url.as_str())
            .expect("valid redis url")
            .get_connection()
            .expect("redis connection")
    }
}

impl Drop for RedisTestServer {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}
