use prestart_core::{PrestartError, Result};
use url::Url;

/// Decomposition of the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlDescriptor {
    /// Scheme with its trailing colon, e.g. `https:`.
    pub protocol: String,
    /// Hostname plus `:port` when the port is explicit.
    pub host: String,
    pub hostname: String,
    /// Only set when the URL text names a port, including a scheme default
    /// such as `:80`.
    pub port: Option<u16>,
    pub pathname: String,
}

impl UrlDescriptor {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: String| PrestartError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        let hostname = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".into()))?
            .to_string();

        // `Url::port` hides ports equal to the scheme default.
        let port = parsed.port().or_else(|| explicit_port(raw));
        let host = match port {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.clone(),
        };

        Ok(Self {
            protocol: format!("{}:", parsed.scheme()),
            host,
            hostname,
            port,
            pathname: parsed.path().to_string(),
        })
    }

    /// Pathname without trailing slashes; a bare `/` becomes empty.
    pub fn relative_path(&self) -> String {
        if self.pathname == "/" {
            String::new()
        } else {
            self.pathname.trim_end_matches('/').to_string()
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}//{}", self.protocol, self.host)
    }

    pub fn is_secure(&self) -> bool {
        self.protocol == "https:"
    }
}

fn explicit_port(raw: &str) -> Option<u16> {
    let (_, rest) = raw.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if authority.ends_with(']') {
        return None;
    }
    let (_, port) = authority.rsplit_once(':')?;
    port.parse().ok()
}
