use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Checked in order; the first non-empty value wins.
pub const URL_VARS: &[&str] = &["NEXT_PUBLIC_SUPABASE_URL", "SUPABASE_URL"];
pub const KEY_VARS: &[&str] = &["SUPABASE_SERVICE_KEY", "SUPABASE_SERVICE_ROLE_KEY"];
/// Loaded from the working directory, earlier files taking precedence.
pub const ENV_FILES: &[&str] = &[".env.local", ".env"];

#[derive(Clone)]
pub struct Credentials {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Process environment first, then `.env.local`, then `.env` in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut files = vec![];
        for name in ENV_FILES {
            let path = dir.join(name);
            if path.is_file() {
                files.push(read_env_file(&path)?);
            }
        }
        Self::resolve(|name| {
            std::env::var(name)
                .ok()
                .or_else(|| files.iter().find_map(|f| f.get(name).cloned()))
        })
    }

    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| lookup(*n))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let Some(url) = first(URL_VARS) else {
            bail!(
                "Supabase URL not set: define {} (or {}) in the environment or .env.local",
                URL_VARS[0],
                URL_VARS[1]
            );
        };
        let Some(service_key) = first(KEY_VARS) else {
            bail!(
                "Supabase service key not set: define {} (or {}); use the service role key, not the anon key",
                KEY_VARS[0],
                KEY_VARS[1]
            );
        };
        Ok(Self { url, service_key })
    }
}

/// `KEY=VALUE` lines; `#` comments, blank lines, an optional `export `
/// prefix and matching surrounding quotes are handled.
pub fn parse_env(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = ['"', '\'']
            .iter()
            .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
            .unwrap_or(value);
        out.insert(key.trim().to_string(), value.to_string());
    }
    out
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read env file {:?}", path))?;
    Ok(parse_env(&text))
}
