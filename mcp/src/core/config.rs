//! Upstream server configuration types and validation.

use std::{collections::HashMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{UpstreamError, UpstreamResult};

/// Configuration for the whole upstream fleet.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Upstream MCP servers (loaded at startup, immutable thereafter)
    #[serde(default)]
    pub servers: Vec<UpstreamServerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamServerConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    pub transport: UpstreamTransport,

    /// Disabled servers are kept in the fleet for error reporting but never started.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Declared tool names, used as a descriptor fallback until discovery succeeds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum UpstreamTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Applied to the child process environment only, never to this process.
        #[serde(default)]
        env: HashMap<String, String>,
        /// Child working directory; defaults to the user's home.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<PathBuf>,
    },
    Sse {
        url: String,
        /// Bearer token for Authorization header
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    /// Streamable HTTP with auto-detect fallback to SSE. `http` is accepted
    /// as an alias.
    #[serde(alias = "http")]
    Streamable {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl fmt::Debug for UpstreamTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamTransport::Stdio { command, args, env, workdir } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .field("env", &format!("{} vars", env.len()))
                .field("workdir", workdir)
                .finish(),
            UpstreamTransport::Sse { url, token, headers } => f
                .debug_struct("Sse")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "****"))
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
            UpstreamTransport::Streamable { url, token, headers } => f
                .debug_struct("Streamable")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "****"))
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl UpstreamServerConfig {
    /// Validate a single server entry.
    pub fn validate(&self) -> UpstreamResult<()> {
        if self.name.trim().is_empty() {
            return Err(UpstreamError::Config(
                "server name must not be empty".to_string(),
            ));
        }
        match &self.transport {
            UpstreamTransport::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    return Err(UpstreamError::Config(format!(
                        "server '{}' uses stdio transport but has no command",
                        self.name
                    )));
                }
            }
            UpstreamTransport::Sse { url, .. } | UpstreamTransport::Streamable { url, .. } => {
                let parsed = url::Url::parse(url).map_err(|e| {
                    UpstreamError::Config(format!("server '{}' has invalid url: {}", self.name, e))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(UpstreamError::Config(format!(
                        "server '{}' url must be http(s), got '{}'",
                        self.name,
                        parsed.scheme()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl UpstreamConfig {
    /// Validate all entries and reject duplicate names.
    pub fn validate(&self) -> UpstreamResult<()> {
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !seen.insert(server.name.as_str()) {
                return Err(UpstreamError::Config(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
        }
        Ok(())
    }

    pub fn enabled_count(&self) -> usize {
        self.servers.iter().filter(|s| s.enabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_stdio_server() {
        let yaml = r#"
name: "serena"
description: "project memory"
protocol: stdio
command: "serena-mcp"
args: ["--project", "demo"]
env:
  SERENA_HOME: "/tmp/serena"
"#;
        let config: UpstreamServerConfig = serde_yaml::from_str(yaml).expect("parse stdio");
        assert_eq!(config.name, "serena");
        assert!(config.enabled);
        match config.transport {
            UpstreamTransport::Stdio { command, args, env, workdir } => {
                assert_eq!(command, "serena-mcp");
                assert_eq!(args, vec!["--project", "demo"]);
                assert_eq!(env.get("SERENA_HOME").unwrap(), "/tmp/serena");
                assert!(workdir.is_none());
            }
            _ => panic!("expected stdio transport"),
        }
    }

    #[test]
    fn test_yaml_sse_server() {
        let yaml = r#"
name: "remote"
protocol: sse
url: "http://localhost:3000/sse"
token: "secret"
"#;
        let config: UpstreamServerConfig = serde_yaml::from_str(yaml).expect("parse sse");
        match config.transport {
            UpstreamTransport::Sse { url, token, .. } => {
                assert_eq!(url, "http://localhost:3000/sse");
                assert_eq!(token.as_deref(), Some("secret"));
            }
            _ => panic!("expected sse transport"),
        }
    }

    #[test]
    fn test_http_is_streamable_alias() {
        let yaml = r#"
name: "remote"
protocol: http
url: "http://localhost:3000/mcp"
"#;
        let config: UpstreamServerConfig = serde_yaml::from_str(yaml).expect("parse http alias");
        assert!(matches!(
            config.transport,
            UpstreamTransport::Streamable { .. }
        ));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let yaml = r#"
name: "bad"
protocol: carrier-pigeon
url: "http://localhost:3000"
"#;
        assert!(serde_yaml::from_str::<UpstreamServerConfig>(yaml).is_err());
    }

    #[test]
    fn test_stdio_requires_command() {
        let config = UpstreamServerConfig {
            name: "bad".to_string(),
            description: String::new(),
            transport: UpstreamTransport::Stdio {
                command: "  ".to_string(),
                args: vec![],
                env: HashMap::new(),
                workdir: None,
            },
            enabled: true,
            tools: vec![],
        };
        assert!(matches!(config.validate(), Err(UpstreamError::Config(_))));
    }

    #[test]
    fn test_remote_requires_http_url() {
        let config = UpstreamServerConfig {
            name: "bad".to_string(),
            description: String::new(),
            transport: UpstreamTransport::Sse {
                url: "ftp://example.com/sse".to_string(),
                token: None,
                headers: HashMap::new(),
            },
            enabled: true,
            tools: vec![],
        };
        assert!(matches!(config.validate(), Err(UpstreamError::Config(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
servers:
  - name: "a"
    protocol: sse
    url: "http://localhost:3000/sse"
  - name: "a"
    protocol: sse
    url: "http://localhost:3001/sse"
"#;
        let config: UpstreamConfig = serde_yaml::from_str(yaml).expect("parse fleet");
        assert!(matches!(config.validate(), Err(UpstreamError::Config(_))));
    }

    #[test]
    fn test_token_masked_in_debug() {
        let transport = UpstreamTransport::Sse {
            url: "http://localhost:3000/sse".to_string(),
            token: Some("super-secret".to_string()),
            headers: HashMap::new(),
        };
        let rendered = format!("{:?}", transport);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("****"));
    }

    #[test]
    fn test_enabled_count() {
        let yaml = r#"
servers:
  - name: "a"
    protocol: sse
    url: "http://localhost:3000/sse"
  - name: "b"
    protocol: sse
    url: "http://localhost:3001/sse"
    enabled: false
"#;
        let config: UpstreamConfig = serde_yaml::from_str(yaml).expect("parse fleet");
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.enabled_count(), 1);
    }
}
