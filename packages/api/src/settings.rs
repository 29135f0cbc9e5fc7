use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Database {
    /// Full connection string; takes precedence over the individual parts.
    pub url: Option<String>,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: String,
    pub name: String,
    /// Maximum pool size.
    pub pool: u32,
}

impl Database {
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.name
            ),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            user: "flock".into(),
            password: "password".into(),
            host: "localhost".into(),
            port: "5432".into(),
            name: "flock".into(),
            pool: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin; any origin when unset.
    pub origin: Option<String>,
}

impl Server {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            origin: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub struct Session {
    /// Bearer token lifetime.
    pub hours: i64,
}

/// Longest accepted token lifetime: one year.
pub const MAX_SESSION_HOURS: i64 = 24 * 366;

impl Session {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SESSION_HOURS).contains(&self.hours) {
            return Err(ConfigError::Message(format!(
                "session.hours must be between 1 and {}, got {}",
                MAX_SESSION_HOURS, self.hours
            )));
        }
        Ok(())
    }

    /// Token lifetime, clamped to the accepted range.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.hours.clamp(1, MAX_SESSION_HOURS))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self { hours: 12 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[allow(unused)]
pub struct Settings {
    pub database: Database,
    pub server: Server,
    pub session: Session,
}

impl Settings {
    /// Defaults, then `config.toml`, then environment variables
    /// (`DATABASE_URL`, `SERVER_PORT`, `SESSION_HOURS`, ...).
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("database.user", "flock")?
            .set_default("database.password", "password")?
            .set_default("database.host", "localhost")?
            .set_default("database.port", "5432")?
            .set_default("database.name", "flock")?
            .set_default("database.pool", 5)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("session.hours", 12)?
            .add_source(
                File::with_name("config.toml")
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::default().separator("_"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.session.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::{remove_var, set_var};

    #[test]
    fn test_settings() {
        remove_var("DATABASE_URL");
        set_var("DATABASE_USER", "test_user_2");
        set_var("SERVER_PORT", "9191");
        set_var("SESSION_HOURS", "48");
        let settings = Settings::new().unwrap_or_default();
        println!("Settings = {:?}", settings);
        assert!(settings
            .database
            .url()
            .starts_with("postgres://test_user_2:"));
        assert_eq!(settings.server.port, 9191);
        assert_eq!(settings.session.ttl(), chrono::Duration::hours(48));

        set_var("DATABASE_URL", "postgres://elsewhere/flock");
        let settings = Settings::new().unwrap_or_default();
        assert_eq!(settings.database.url(), "postgres://elsewhere/flock");
        remove_var("DATABASE_URL");
    }

    #[test]
    fn test_session_hours_must_be_in_range() {
        for hours in [0, -3, MAX_SESSION_HOURS + 1, i64::MAX] {
            let session = Session { hours };
            assert!(session.validate().is_err(), "{} hours accepted", hours);
            let ttl = session.ttl();
            assert!(ttl >= chrono::Duration::hours(1));
            assert!(ttl <= chrono::Duration::hours(MAX_SESSION_HOURS));
        }
        let session = Session { hours: 48 };
        assert!(session.validate().is_ok());
        assert_eq!(session.ttl(), chrono::Duration::hours(48));
    }
}
