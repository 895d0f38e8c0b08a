//! SQL Server client construction
//!
//! Environments and the audit log are SQL Server databases. A client is
//! opened per operation and dropped when it finishes.

use crate::error::AppError;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

pub type MssqlClient = Client<Compat<TcpStream>>;

/// Address and login for one SQL Server database
#[derive(Debug, Clone)]
pub struct MssqlParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub trust_cert: bool,
}

impl MssqlParams {
    /// `host:port/database` used in logs and status messages
    pub fn display_name(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Open an authenticated client
pub async fn connect(params: &MssqlParams) -> Result<MssqlClient, AppError> {
    debug!("Connecting to SQL Server at {}", params.display_name());

    let mut config = Config::new();
    config.host(&params.host);
    config.port(params.port);
    config.database(&params.database);
    config.application_name("sqlvc-server");

    if params.trust_cert {
        config.trust_cert();
    }

    match (&params.user, &params.password) {
        (Some(user), password) => {
            config.authentication(AuthMethod::sql_server(
                user,
                password.as_deref().unwrap_or(""),
            ));
        }
        (None, _) => {
            #[cfg(windows)]
            {
                config.authentication(AuthMethod::Integrated);
            }
            #[cfg(not(windows))]
            {
                return Err(AppError::Connectivity(
                    "A SQL login is required; integrated authentication is only available on Windows"
                        .to_string(),
                ));
            }
        }
    }

    let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
        AppError::Connectivity(format!("Cannot reach {}: {}", params.display_name(), e))
    })?;
    tcp.set_nodelay(true)?;

    let client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| {
            AppError::Connectivity(format!("Cannot open {}: {}", params.display_name(), e))
        })?;

    Ok(client)
}

/// Read a nullable string column as an owned value ("" for NULL)
pub fn text(row: &tiberius::Row, idx: usize) -> Result<String, AppError> {
    Ok(row
        .try_get::<&str, usize>(idx)?
        .map(str::to_string)
        .unwrap_or_default())
}

pub fn optional_text(row: &tiberius::Row, idx: usize) -> Result<Option<String>, AppError> {
    Ok(row
        .try_get::<&str, usize>(idx)?
        .map(str::to_string)
        .filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let params = MssqlParams {
            host: "sql-prod-01".into(),
            port: 1433,
            database: "Sales".into(),
            user: Some("deployer".into()),
            password: None,
            trust_cert: true,
        };
        assert_eq!(params.display_name(), "sql-prod-01:1433/Sales");
    }
}
