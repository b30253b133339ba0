use std::path::PathBuf;

use clap::Parser;

use democrm_api::DEFAULT_TOKEN_TTL_SECS;
use democrm_api::service::AccountCredentials;

use crate::AppConfig;

/// Secret used when `JWT_SECRET` is unset. Fine for local demos only.
pub const DEV_JWT_SECRET: &str = "dev-secret";

/// Server configuration: command-line flags with environment fallbacks.
#[derive(Debug, Clone, Parser)]
#[command(name = "democrm-server", version, about = "democrm REST server")]
pub struct ServerArgs {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "DEMOCRM_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// JSON file holding the client collection.
    #[arg(long, env = "DEMOCRM_DATA_FILE", default_value = "data/db.json")]
    pub data_file: PathBuf,

    /// HMAC secret for signing bearer tokens.
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "DEMOCRM_ADMIN_EMAIL", default_value = "admin@demo.com")]
    pub admin_email: String,

    #[arg(
        long,
        env = "DEMOCRM_ADMIN_PASSWORD",
        default_value = "@Passw0rd",
        hide_env_values = true
    )]
    pub admin_password: String,

    /// Bearer-token lifetime in seconds.
    #[arg(long, env = "DEMOCRM_TOKEN_TTL_SECS", default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub token_ttl_secs: u64,
}

impl ServerArgs {
    pub fn app_config(&self) -> AppConfig {
        if self.jwt_secret == DEV_JWT_SECRET {
            tracing::warn!("JWT_SECRET not set, signing tokens with the development secret");
        }
        AppConfig {
            jwt_secret: self.jwt_secret.clone(),
            account: AccountCredentials {
                email: self.admin_email.clone(),
                password: self.admin_password.clone(),
            },
            token_ttl_secs: self.token_ttl_secs,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
