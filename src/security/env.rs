//! Environment sanitizing for spawned shells and agents.
//!
//! Keys are kept only when they carry an allowlisted prefix or exactly match
//! a builtin variable. Control bytes `0x00..=0x1F` are stripped from keys and
//! values; DEL (`0x7F`) is kept. Values are not shell-escaped: the spawn layer
//! passes an argument vector, never a shell string.

use std::collections::HashMap;
use std::ffi::OsStr;

use tokio::process::Command;

pub const ALLOWED_PREFIXES: &[&str] = &["CUSTOM_", "PROJECT_", "USER_", "npm_config_", "NODE_"];

pub const ALLOWED_BUILTINS: &[&str] = &[
    "PATH", "HOME", "USER", "SHELL", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "TMPDIR", "TZ",
    "COLORTERM", "LOGNAME", "PWD",
];

fn strip_control(input: &str) -> String {
    input.chars().filter(|c| !('\u{0}'..='\u{1f}').contains(c)).collect()
}

fn is_allowed_key(key: &str) -> bool {
    ALLOWED_PREFIXES.iter().any(|p| key.starts_with(p)) || ALLOWED_BUILTINS.contains(&key)
}

/// Filter `env` down to allowlisted, control-byte-free pairs.
pub fn sanitize_env_vars(env: &HashMap<String, String>) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(env.len());
    for (key, value) in env {
        let key = strip_control(key);
        if !is_allowed_key(&key) {
            tracing::trace!(key = %key, "Dropped environment variable");
            continue;
        }
        out.insert(key, strip_control(value));
    }
    out
}

/// Build a command that runs `program` with `args` as an argument vector and
/// only the sanitized environment.
pub fn sanitized_command<I, S>(program: impl AsRef<OsStr>, args: I, env: &HashMap<String, String>) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).env_clear().envs(sanitize_env_vars(env));
    command
}
