//! Immutable environment-variable snapshot.
//!
//! Captured once and shared by reference; resolution never reads the live
//! process environment, so a run sees a stable `env.*` view.

use std::collections::HashMap;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ENV_VAR_REGEX: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Merge `KEY=VALUE` dotenv files into the snapshot.
    ///
    /// Files are applied in order and never override a key that is already
    /// present, so process variables win over `.env.local`, which wins over
    /// `.env`. Missing files are ignored.
    pub fn with_env_files<P: AsRef<Path>>(mut self, paths: &[P]) -> Self {
        for path in paths {
            let path = path.as_ref();
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(_) => continue,
            };
            let mut loaded = 0;
            for (key, value) in parse_dotenv(&content) {
                if !self.vars.contains_key(&key) {
                    self.vars.insert(key, value);
                    loaded += 1;
                }
            }
            tracing::info!(
                "[Env] Loaded {} variable(s) from '{}'",
                loaded,
                path.display()
            );
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Expand `${VAR}` and `${VAR:-default}` against the snapshot.
    /// Unknown variables without a default are left as written.
    pub fn expand(&self, input: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_expr = &caps[1];
                if let Some(idx) = var_expr.find(":-") {
                    let var_name = &var_expr[..idx];
                    let default_val = &var_expr[idx + 2..];
                    self.get(var_name).unwrap_or(default_val).to_string()
                } else {
                    self.get(var_expr)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("${{{}}}", var_expr))
                }
            })
            .to_string()
    }
}

/// Parse dotenv content into key/value pairs.
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some(eq_idx) = line.find('=') {
            let key = line[..eq_idx].trim();
            if key.is_empty() {
                continue;
            }
            let mut value = line[eq_idx + 1..].trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand() {
        let env = EnvSnapshot::from_map([("TOKEN", "abc")]);
        assert_eq!(env.expand("${TOKEN}"), "abc");
        assert_eq!(env.expand("Bearer ${TOKEN}!"), "Bearer abc!");
        assert_eq!(env.expand("${MISSING:-fallback}"), "fallback");
        assert_eq!(env.expand("${MISSING}"), "${MISSING}");
    }

    #[test]
    fn test_parse_dotenv() {
        let pairs = parse_dotenv(
            "# comment\n\nA=1\nexport B = \"two words\"\nC='x'\n=bad\nnoequals\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_files_do_not_override() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join(".env.local");
        let base = dir.path().join(".env");
        writeln!(std::fs::File::create(&local).unwrap(), "KEY=local").unwrap();
        writeln!(std::fs::File::create(&base).unwrap(), "KEY=base\nOTHER=base").unwrap();

        let env = EnvSnapshot::from_map([("PRESET", "p")]).with_env_files(&[
            local,
            base,
            dir.path().join("missing.env"),
        ]);
        assert_eq!(env.get("KEY"), Some("local"));
        assert_eq!(env.get("OTHER"), Some("base"));
        assert_eq!(env.get("PRESET"), Some("p"));
        assert_eq!(env.len(), 3);
    }
}
