use axum_extra::extract::cookie::SameSite;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
    pub same_site: String,
}

impl CookieConfig {
    pub fn parse_same_site(&self) -> SameSite {
        match self.same_site.to_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Lax,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub admin_secret_key: String,
    pub cookie: CookieConfig,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "codingclub".to_string());

        let access_token_secret = settings
            .get_string("auth.access_token_secret")
            .or_else(|_| env::var("ACCESS_TOKEN_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: ACCESS_TOKEN_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default ACCESS_TOKEN_SECRET (dev mode only!)");
                "dev-access-secret-only-for-local-testing".to_string()
            });

        let refresh_token_secret = settings
            .get_string("auth.refresh_token_secret")
            .or_else(|_| env::var("REFRESH_TOKEN_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: REFRESH_TOKEN_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default REFRESH_TOKEN_SECRET (dev mode only!)");
                "dev-refresh-secret-only-for-local-testing".to_string()
            });

        let admin_secret_key = settings
            .get_string("auth.admin_secret_key")
            .or_else(|_| env::var("ADMIN_SECRET_KEY"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: ADMIN_SECRET_KEY must be set in production!");
                }
                eprintln!("WARNING: Using default ADMIN_SECRET_KEY (dev mode only!)");
                "dev-admin-secret".to_string()
            });

        let access_token_ttl_seconds = settings
            .get_int("auth.access_token_ttl_seconds")
            .ok()
            .or_else(|| {
                env::var("ACCESS_TOKEN_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(3600); // 1 hour

        let refresh_token_ttl_seconds = settings
            .get_int("auth.refresh_token_ttl_seconds")
            .ok()
            .or_else(|| {
                env::var("REFRESH_TOKEN_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(604800); // 7 days

        let cookie_secure = settings
            .get_bool("cookie.secure")
            .ok()
            .or_else(|| env::var("COOKIE_SECURE").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(env == "prod");

        let cookie_same_site = settings
            .get_string("cookie.same_site")
            .or_else(|_| env::var("COOKIE_SAME_SITE"))
            .unwrap_or_else(|_| "lax".to_string());

        Ok(Config {
            mongo_uri,
            mongo_database,
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            admin_secret_key,
            cookie: CookieConfig {
                secure: cookie_secure,
                same_site: cookie_same_site,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn load_falls_back_to_dev_defaults() {
        std::env::remove_var("ACCESS_TOKEN_SECRET");
        std::env::remove_var("REFRESH_TOKEN_SECRET");
        std::env::remove_var("MONGO_DATABASE");
        std::env::set_var("APP_ENV", "dev");

        let config = Config::load().unwrap();
        assert_eq!(config.mongo_database, "codingclub");
        assert_eq!(config.access_token_ttl_seconds, 3600);
        assert_eq!(config.refresh_token_ttl_seconds, 604800);
        assert!(!config.access_token_secret.is_empty());
    }

    #[test]
    #[serial]
    fn env_overrides_ttls() {
        std::env::set_var("APP_ENV", "dev");
        std::env::set_var("ACCESS_TOKEN_TTL_SECONDS", "120");
        std::env::set_var("REFRESH_TOKEN_TTL_SECONDS", "3600");

        let config = Config::load().unwrap();
        assert_eq!(config.access_token_ttl_seconds, 120);
        assert_eq!(config.refresh_token_ttl_seconds, 3600);

        std::env::remove_var("ACCESS_TOKEN_TTL_SECONDS");
        std::env::remove_var("REFRESH_TOKEN_TTL_SECONDS");
    }

    #[test]
    fn same_site_parsing() {
        let cookie = CookieConfig {
            secure: true,
            same_site: "Strict".to_string(),
        };
        assert_eq!(cookie.parse_same_site(), SameSite::Strict);

        let cookie = CookieConfig {
            secure: false,
            same_site: "bogus".to_string(),
        };
        assert_eq!(cookie.parse_same_site(), SameSite::Lax);
    }
}
