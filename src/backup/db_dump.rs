// coverme/src/backup/db_dump.rs
use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use std::fmt;
use std::path::Path;
use std::process::Command;
use url::Url;

/// Database engines with a supported dump tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Postgres,
    MySql,
}

impl Engine {
    pub fn tool(self) -> &'static str {
        match self {
            Engine::Postgres => "pg_dump",
            Engine::MySql => "mysqldump",
        }
    }
}

/// Connection details parsed from a `postgres://` or `mysql://` URL.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseUrl {
    pub engine: Engine,
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
}

impl DatabaseUrl {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| format!("Invalid database URL `{}`: {}", raw, e))?;
        let engine = match url.scheme() {
            "postgres" | "postgresql" => Engine::Postgres,
            "mysql" => Engine::MySql,
            other => return Err(format!("Unknown database source scheme `{}`", other)),
        };

        let database = url.path().trim_matches('/').to_string();
        if database.is_empty() {
            return Err(format!("Database is not defined in {}", redact(&url)));
        }

        Ok(Self {
            engine,
            scheme: url.scheme().to_string(),
            host: url.host_str().filter(|h| !h.is_empty()).map(str::to_string),
            port: url.port(),
            username: Some(url.username()).filter(|u| !u.is_empty()).map(decode),
            password: url.password().map(decode),
            database: decode(&database),
        })
    }
}

/// Credentials never show up in logs or error messages.
impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}",
            self.scheme,
            self.host.as_deref().unwrap_or(""),
            self.database
        )
    }
}

impl fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseUrl")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn redact(url: &Url) -> String {
    format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), url.path())
}

/// `pg_dump` invocation writing to `dump_file`. The password travels in
/// `PGPASSWORD`, never on the command line.
pub fn pg_dump_command(
    program: &Path,
    url: &DatabaseUrl,
    options: &[String],
    dump_file: &Path,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg(format!("--file={}", dump_file.display()));
    if let Some(port) = url.port {
        cmd.arg(format!("--port={}", port));
    }
    if let Some(host) = &url.host {
        cmd.arg(format!("--host={}", host));
    }
    if let Some(username) = &url.username {
        cmd.arg(format!("--username={}", username));
    }
    if let Some(password) = &url.password {
        cmd.env("PGPASSWORD", password);
    }
    cmd.args(options);
    cmd.arg(&url.database);
    cmd
}

/// `mysqldump` invocation writing to `dump_file`. mysqldump only takes the
/// password as a flag, so it is visible in the process list while it runs.
pub fn mysqldump_command(
    program: &Path,
    url: &DatabaseUrl,
    options: &[String],
    dump_file: &Path,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg(format!("--result-file={}", dump_file.display()));
    if let Some(port) = url.port {
        cmd.arg(format!("--port={}", port));
    }
    if let Some(host) = &url.host {
        cmd.arg(format!("--host={}", host));
    }
    if let Some(username) = &url.username {
        cmd.arg(format!("--user={}", username));
    }
    if let Some(password) = &url.password {
        cmd.arg(format!("--password={}", password));
    }
    cmd.args(options);
    cmd.arg(&url.database);
    cmd
}

/// Runs a dump command. `Ok(false)` means the tool ran and exited non-zero;
/// `Err` means it could not be started at all.
pub fn run_dump(mut cmd: Command, url: &DatabaseUrl) -> Result<bool> {
    let tool = url.engine.tool();
    tracing::info!("Dumping {} with {}...", url, tool);

    let output = cmd
        .output()
        .with_context(|| format!("Failed to execute {} for database: {}", tool, url))?;

    if !output.status.success() {
        tracing::error!(
            "❌ {} for {} failed with status: {}\nStderr: {}",
            tool,
            url,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
        return Ok(false);
    }

    tracing::info!("✓ {} dumped successfully via {}", url, tool);
    Ok(true)
}
