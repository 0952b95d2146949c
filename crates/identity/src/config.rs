use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct JwtConfig {
    pub secret_key: String,
    pub issuer: String,
    /// Falls back to `issuer` when unset, both when signing and when validating.
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_expiration_hours")]
    pub expiration_hours: u32,
    #[serde(default = "default_refresh_expiration_hours")]
    pub refresh_expiration_hours: u32,
}

impl JwtConfig {
    pub fn audience(&self) -> &str {
        self.audience.as_deref().unwrap_or(&self.issuer)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LockoutConfig {
    /// Whether failed password attempts count towards a lockout.
    #[serde(default = "default_true")]
    pub allowed_for_new_users: bool,
    #[serde(default = "default_max_failed_access_attempts")]
    pub max_failed_access_attempts: i32,
    #[serde(default = "default_lockout_minutes")]
    pub default_lockout_minutes: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            allowed_for_new_users: true,
            max_failed_access_attempts: default_max_failed_access_attempts(),
            default_lockout_minutes: default_lockout_minutes(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PasswordConfig {
    #[serde(default = "default_password_length")]
    pub required_length: usize,
    #[serde(default = "default_true")]
    pub require_digit: bool,
    #[serde(default = "default_true")]
    pub require_lowercase: bool,
    #[serde(default = "default_true")]
    pub require_uppercase: bool,
    #[serde(default = "default_true")]
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            required_length: default_password_length(),
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserConfig {
    /// Credentials of the transient administrator used when no store is configured.
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    /// Roles granted to every new account, in addition to requested roles.
    #[serde(default)]
    pub default_roles: Vec<String>,
    #[serde(default = "default_true")]
    pub require_unique_email: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SignInConfig {
    #[serde(default)]
    pub require_confirmed_email: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "default_purpose_token_lifetime_hours")]
    pub purpose_token_lifetime_hours: u32,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            purpose_token_lifetime_hours: default_purpose_token_lifetime_hours(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    #[serde(default = "default_google_certs_url")]
    pub certs_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FacebookConfig {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default = "default_facebook_graph_url")]
    pub graph_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MicrosoftConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_microsoft_login_url")]
    pub login_url: String,
}

/// External login providers. A provider without configuration is not supported.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExternalLoginsConfig {
    #[serde(default)]
    pub google: Option<GoogleConfig>,
    #[serde(default)]
    pub facebook: Option<FacebookConfig>,
    #[serde(default)]
    pub microsoft: Option<MicrosoftConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Backing store. When absent only the transient administrator can sign in.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub password: PasswordConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub sign_in: SignInConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
    #[serde(default)]
    pub external_logins: ExternalLoginsConfig,
}

impl AppConfig {
    /// Checks the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret_key.len() < 32 {
            return Err(ConfigError::Validation(
                "jwt.secret_key must be at least 32 bytes".into(),
            ));
        }
        if self.jwt.issuer.is_empty() {
            return Err(ConfigError::Validation("jwt.issuer must be set".into()));
        }
        if self.jwt.expiration_hours == 0 || self.jwt.refresh_expiration_hours == 0 {
            return Err(ConfigError::Validation(
                "jwt expiration hours must be > 0".into(),
            ));
        }
        for (name, hours) in [
            ("jwt.expiration_hours", self.jwt.expiration_hours),
            ("jwt.refresh_expiration_hours", self.jwt.refresh_expiration_hours),
            (
                "tokens.purpose_token_lifetime_hours",
                self.tokens.purpose_token_lifetime_hours,
            ),
        ] {
            if hours > MAX_LIFETIME_HOURS {
                return Err(ConfigError::Validation(format!(
                    "{name} must be at most {MAX_LIFETIME_HOURS}"
                )));
            }
        }
        if self.tokens.purpose_token_lifetime_hours == 0 {
            return Err(ConfigError::Validation(
                "tokens.purpose_token_lifetime_hours must be > 0".into(),
            ));
        }
        if self.lockout.max_failed_access_attempts <= 0 {
            return Err(ConfigError::Validation(
                "lockout.max_failed_access_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Upper bound for every configured lifetime: ten years.
pub const MAX_LIFETIME_HOURS: u32 = 24 * 365 * 10;

fn default_true() -> bool {
    true
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_expiration_hours() -> u32 {
    1
}

fn default_refresh_expiration_hours() -> u32 {
    24 * 14
}

fn default_max_failed_access_attempts() -> i32 {
    5
}

fn default_lockout_minutes() -> i64 {
    5
}

fn default_password_length() -> usize {
    6
}

fn default_purpose_token_lifetime_hours() -> u32 {
    24
}

fn default_google_certs_url() -> String {
    "https://www.googleapis.com/oauth2/v3/certs".to_string()
}

fn default_facebook_graph_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_microsoft_login_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `JWT__SECRET_KEY`) overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

/// Same as [`load_config`] with an explicit file path.
pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse(yaml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .expect("build config")
            .try_deserialize()
            .expect("deserialize config")
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = parse(
            r#"
jwt:
  secret_key: "0123456789abcdef0123456789abcdef"
  issuer: "https://id.example.org"
"#,
        );
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.jwt.expiration_hours, 1);
        assert_eq!(cfg.jwt.audience(), "https://id.example.org");
        assert!(cfg.lockout.allowed_for_new_users);
        assert_eq!(cfg.password.required_length, 6);
        assert!(cfg.user.require_unique_email);
        assert!(cfg.external_logins.google.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn provider_endpoints_default_to_real_hosts() {
        let cfg = parse(
            r#"
jwt:
  secret_key: "0123456789abcdef0123456789abcdef"
  issuer: "issuer"
external_logins:
  facebook:
    app_id: "app"
    app_secret: "secret"
  microsoft:
    tenant_id: "tenant"
    client_id: "client"
    client_secret: "secret"
    scopes: ["openid", "email"]
"#,
        );
        let facebook = cfg.external_logins.facebook.expect("facebook");
        assert_eq!(facebook.graph_url, "https://graph.facebook.com");
        let microsoft = cfg.external_logins.microsoft.expect("microsoft");
        assert_eq!(microsoft.login_url, "https://login.microsoftonline.com");
        assert_eq!(microsoft.scopes, vec!["openid", "email"]);
    }

    #[test]
    fn short_secret_is_rejected() {
        let cfg = parse(
            r#"
jwt:
  secret_key: "short"
  issuer: "issuer"
"#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unbounded_lifetimes_are_rejected() {
        let cfg = parse(
            r#"
jwt:
  secret_key: "0123456789abcdef0123456789abcdef"
  issuer: "issuer"
  refresh_expiration_hours: 4294967295
"#,
        );
        let Err(ConfigError::Validation(message)) = cfg.validate() else {
            panic!("expected a validation error");
        };
        assert!(message.contains("jwt.refresh_expiration_hours"));

        let cfg = parse(
            r#"
jwt:
  secret_key: "0123456789abcdef0123456789abcdef"
  issuer: "issuer"
tokens:
  purpose_token_lifetime_hours: 87601
"#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }
}
