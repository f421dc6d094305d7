use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::models::AuthFlow;
use crate::models::stage::well_known;

#[derive(Debug, Clone, Deserialize)]
pub struct UiaConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    /// Domain qualifying registered user ids (`@local:server_name`).
    pub server_name: String,
    pub otlp_endpoint: Option<String>,
    pub session: SessionConfig,
    pub registration: RegistrationConfig,
    pub recaptcha: RecaptchaConfig,
    pub terms: TermsConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Inactivity window before a session expires.
    pub ttl_seconds: u64,
    /// How often the background purge task runs.
    pub purge_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    pub require_captcha: bool,
    pub require_terms: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecaptchaConfig {
    /// Site key, advertised to clients and embedded in the fallback page.
    pub public_key: String,
    /// Secret key, only ever sent to the siteverify endpoint.
    pub private_key: String,
    pub siteverify_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TermsConfig {
    pub policy_name: String,
    pub policy_version: String,
    pub policy_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Authenticated,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl UiaConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = UiaConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("uia-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            server_name: get_env("UIA_SERVER_NAME", None, is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            session: SessionConfig {
                ttl_seconds: get_env("UIA_SESSION_TTL_SECONDS", Some("1800"), is_prod)?
                    .parse()
                    .unwrap_or(1800),
                purge_interval_seconds: get_env(
                    "UIA_SESSION_PURGE_INTERVAL_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
            registration: RegistrationConfig {
                require_captcha: get_env("UIA_ENABLE_REGISTRATION_CAPTCHA", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(false),
                require_terms: get_env("UIA_REQUIRE_TERMS", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(false),
            },
            recaptcha: RecaptchaConfig {
                public_key: get_env("UIA_RECAPTCHA_PUBLIC_KEY", Some(""), is_prod)?,
                private_key: get_env("UIA_RECAPTCHA_PRIVATE_KEY", Some(""), is_prod)?,
                siteverify_url: get_env(
                    "UIA_RECAPTCHA_SITEVERIFY_URL",
                    Some("https://www.recaptcha.net/recaptcha/api/siteverify"),
                    is_prod,
                )?,
            },
            terms: TermsConfig {
                policy_name: get_env("UIA_TERMS_POLICY_NAME", Some("Privacy Policy"), is_prod)?,
                policy_version: get_env("UIA_TERMS_POLICY_VERSION", Some("1.0"), is_prod)?,
                policy_url: get_env(
                    "UIA_TERMS_POLICY_URL",
                    Some("https://localhost/privacy"),
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                register_attempts: get_env("RATE_LIMIT_REGISTER_ATTEMPTS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                register_window_seconds: get_env(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(3600),
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Flow table advertised for registration, derived from the config
    /// toggles. Every flow ends in the dummy stage, so completing a shared
    /// stage such as captcha through the fallback page never finishes the
    /// operation on its own; terms, when required, is appended after it.
    pub fn registration_flows(&self) -> Vec<AuthFlow> {
        let mut stages: Vec<&str> = Vec::new();
        if self.registration.require_captcha {
            stages.push(well_known::RECAPTCHA);
        }
        stages.push(well_known::DUMMY);
        if self.registration.require_terms {
            stages.push(well_known::TERMS);
        }
        vec![AuthFlow::new(stages)]
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.session.ttl_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "UIA_SESSION_TTL_SECONDS must be greater than 0"
            )));
        }

        if self.registration.require_captcha
            && (self.recaptcha.public_key.is_empty() || self.recaptcha.private_key.is_empty())
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "UIA_RECAPTCHA_PUBLIC_KEY and UIA_RECAPTCHA_PRIVATE_KEY are required when captcha is enabled"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!("Swagger is publicly accessible in production - consider using 'authenticated' or 'disabled'");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "authenticated" => Ok(SwaggerMode::Authenticated),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
