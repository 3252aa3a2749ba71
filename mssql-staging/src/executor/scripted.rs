//! Scripted executor used by unit tests.
//!
//! Records every command, answers from substring rules (first match wins)
//! and otherwise emulates the handful of file commands the engine issues
//! (`cat`, `tee`, `mkdir -p`, `rm -rf`, `test -d`, `id`) over an in-memory
//! tree. Anything else succeeds with empty output.

use super::{CommandExecutor, CommandOutput};
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

struct Rule {
    needle: String,
    output: CommandOutput,
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    commands: Vec<String>,
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<State>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, needle: &str, output: CommandOutput, remaining: Option<usize>) -> Self {
        self.state.lock().unwrap().rules.push(Rule {
            needle: needle.to_string(),
            output,
            remaining,
        });
        self
    }

    pub fn respond(self, needle: &str, stdout: &str) -> Self {
        self.push(needle, ok(stdout), None)
    }

    pub fn respond_once(self, needle: &str, stdout: &str) -> Self {
        self.push(needle, ok(stdout), Some(1))
    }

    pub fn fail(self, needle: &str, stderr: &str) -> Self {
        self.push(needle, failed(stderr), None)
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn commands_matching(&self, needle: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    /// Index of the first recorded command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(needle))
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn run(&self, command: &str, _env: &[(&str, &str)]) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());

        let rule = state
            .rules
            .iter_mut()
            .find(|r| r.remaining != Some(0) && command.contains(&r.needle));
        if let Some(rule) = rule {
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return Ok(rule.output.clone());
        }

        Ok(emulate(&mut state, command))
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: 1,
    }
}

fn emulate(state: &mut State, command: &str) -> CommandOutput {
    let cmd = strip_sudo(command);

    if cmd == "id" {
        return ok("uid=999(mssql) gid=999(mssql) groups=999(mssql)");
    }
    if let Some(rest) = cmd.strip_prefix("cat ") {
        return match take_quoted(rest).and_then(|(path, _)| state.files.get(&path).cloned()) {
            Some(content) => ok(&content),
            None => failed("cat: No such file or directory"),
        };
    }
    if let Some(rest) = cmd.strip_prefix("printf '%s\\n' ") {
        if let Some((content, rest)) = take_quoted(rest) {
            if let Some((path, _)) = rest.find("tee ").and_then(|i| take_quoted(&rest[i + 4..])) {
                state.files.insert(path, format!("{}\n", content));
                return ok("");
            }
        }
        return failed("unparseable write");
    }
    if let Some((path, _)) = cmd.strip_prefix("mkdir -p ").and_then(take_quoted) {
        state.dirs.insert(path);
        return ok("");
    }
    if let Some((path, _)) = cmd.strip_prefix("test -d ").and_then(take_quoted) {
        return if state.dirs.contains(&path) { ok("") } else { failed("") };
    }
    if let Some((path, _)) = cmd.strip_prefix("rm -rf ").and_then(take_quoted) {
        state.dirs.retain(|d| !d.starts_with(&path));
        state.files.retain(|f, _| !f.starts_with(&path));
        return ok("");
    }

    ok("")
}

fn strip_sudo(command: &str) -> &str {
    command
        .strip_prefix("sudo -u \\#")
        .and_then(|rest| rest.split_once(' '))
        .map(|(_, rest)| rest)
        .unwrap_or(command)
}

/// Parse one single-quoted shell word (with `'\''` escapes).
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut rest = s.trim_start();
    loop {
        let body = rest.strip_prefix('\'')?;
        let end = body.find('\'')?;
        out.push_str(&body[..end]);
        rest = &body[end + 1..];
        match rest.strip_prefix("\\'") {
            Some(after) => {
                out.push('\'');
                rest = after;
                if !rest.starts_with('\'') {
                    return Some((out, rest));
                }
            }
            None => return Some((out, rest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::shell_quote;

    #[test]
    fn test_take_quoted_round_trips_shell_quote() {
        for value in ["plain", "it's", "a'", "'lead", "x'y'z"] {
            let quoted = format!("{} tail", shell_quote(value));
            let (parsed, rest) = take_quoted(&quoted).unwrap();
            assert_eq!(parsed, value);
            assert_eq!(rest, " tail");
        }
    }

    #[test]
    fn test_rules_before_emulation() {
        let executor = ScriptedExecutor::new().respond_once("cat", "scripted");
        assert_eq!(executor.run("cat '/x'", &[]).unwrap().stdout, "scripted");
        assert_eq!(executor.run("cat '/x'", &[]).unwrap().exit_code, 1);
        assert_eq!(executor.commands().len(), 2);
    }
}
