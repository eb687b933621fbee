//! Shell command classification.
//!
//! Shell invocations cannot carry a single fixed sensitivity: `ls` and
//! `rm` arrive through the same tool. The [`CommandClassifier`] first
//! rejects blocked patterns outright (command chaining, privilege
//! escalation, destructive filesystem operations, power and user
//! management, registry edits), then classifies whitelisted commands:
//! read-only/diagnostic commands are safe, build and VCS commands without
//! write subcommands are moderate, and every other whitelisted command is
//! sensitive. Commands outside the whitelist are rejected.

use regex::Regex;

use crate::error::ToolError;
use crate::tool::Sensitivity;

/// Patterns that reject a command before classification.
const BLOCKED_PATTERNS: &[(&str, &str)] = &[
    (r"[;&|]|\$\(|`|>|<", "command chaining or redirection"),
    (r"^\s*(sudo|su|doas|runas)\b", "privilege escalation"),
    (r"^\s*rm\s+(-[a-zA-Z]*[rf][a-zA-Z]*\s+)+", "recursive or forced delete"),
    (r"^\s*(mkfs|fdisk|parted)\b", "disk formatting"),
    (r"^\s*dd\b", "raw disk write"),
    (r"^\s*(shutdown|reboot|poweroff|halt)\b", "power management"),
    (
        r"^\s*(useradd|userdel|usermod|groupadd|groupdel|passwd|chown)\b",
        "user management",
    ),
    (r"^\s*(reg|regedit)\b", "registry edit"),
    (r"^\s*net\s+user\b", "user management"),
];

/// Base commands that only inspect state.
const READ_ONLY_COMMANDS: &[&str] = &[
    "ls", "dir", "pwd", "cat", "head", "tail", "grep", "find", "which", "file", "stat", "wc",
    "whoami", "hostname", "uname", "date", "uptime", "df", "du", "free", "ps", "env", "echo",
];

/// Build and VCS commands; write subcommands push them to sensitive.
const BUILD_VCS_COMMANDS: &[&str] = &[
    "git", "cargo", "npm", "pnpm", "yarn", "pip", "make", "mvn", "gradle",
];

/// Subcommands of build/VCS commands that mutate shared state.
const WRITE_SUBCOMMANDS: &[&str] = &[
    "push", "commit", "merge", "rebase", "reset", "checkout", "clone", "install", "uninstall",
    "publish", "add", "remove", "update", "upgrade", "deploy",
];

/// Remaining whitelisted commands; always sensitive.
const OTHER_WHITELISTED_COMMANDS: &[&str] = &[
    "touch", "mkdir", "cp", "mv", "rm", "curl", "wget", "tar", "zip", "unzip", "python",
    "python3", "node", "kill",
];

/// Classifies shell commands into a sensitivity level, rejecting blocked
/// patterns before classification.
#[derive(Debug)]
pub struct CommandClassifier {
    blocked: Vec<(Regex, &'static str)>,
}

impl CommandClassifier {
    /// Create a classifier with the default policy.
    #[must_use]
    pub fn new() -> Self {
        let blocked = BLOCKED_PATTERNS
            .iter()
            .filter_map(|(pattern, reason)| Regex::new(pattern).ok().map(|re| (re, *reason)))
            .collect();
        Self { blocked }
    }

    /// Classify one command line.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Blocked`] for blocked patterns and for commands
    /// outside the whitelist.
    pub fn classify(&self, command: &str) -> Result<Sensitivity, ToolError> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(ToolError::InvalidArguments("empty command".to_owned()));
        }

        for (re, reason) in &self.blocked {
            if re.is_match(trimmed) {
                return Err(ToolError::Blocked((*reason).to_owned()));
            }
        }

        let mut tokens = trimmed.split_whitespace();
        let base = tokens.next().unwrap_or_default();
        let subcommand = tokens.next().unwrap_or_default();

        if READ_ONLY_COMMANDS.contains(&base) {
            return Ok(Sensitivity::Safe);
        }

        if BUILD_VCS_COMMANDS.contains(&base) {
            if WRITE_SUBCOMMANDS.contains(&subcommand) {
                return Ok(Sensitivity::Sensitive);
            }
            return Ok(Sensitivity::Moderate);
        }

        if OTHER_WHITELISTED_COMMANDS.contains(&base) {
            return Ok(Sensitivity::Sensitive);
        }

        Err(ToolError::Blocked(format!("command '{base}' is not whitelisted")))
    }
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn classify(cmd: &str) -> Result<Sensitivity, ToolError> {
        CommandClassifier::new().classify(cmd)
    }

    mod blocked {
        use super::*;

        #[test]
        fn command_chaining_is_rejected() {
            for cmd in ["ls; rm x", "ls && rm x", "cat a | sh", "echo `id`", "echo $(id)"] {
                assert!(matches!(classify(cmd), Err(ToolError::Blocked(_))), "{cmd}");
            }
        }

        #[test]
        fn redirection_is_rejected() {
            assert!(matches!(classify("echo hi > /etc/hosts"), Err(ToolError::Blocked(_))));
        }

        #[test]
        fn privilege_escalation_is_rejected() {
            assert!(matches!(classify("sudo apt install x"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("su root"), Err(ToolError::Blocked(_))));
        }

        #[test]
        fn destructive_filesystem_ops_are_rejected() {
            assert!(matches!(classify("rm -rf /home/u"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("rm -fr tmp"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("dd if=/dev/zero of=/dev/sda"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("mkfs.ext4 /dev/sda1"), Err(ToolError::Blocked(_))));
        }

        #[test]
        fn power_and_user_management_are_rejected() {
            assert!(matches!(classify("shutdown -h now"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("reboot"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("useradd mallory"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("passwd root"), Err(ToolError::Blocked(_))));
            assert!(matches!(classify("net user admin secret /add"), Err(ToolError::Blocked(_))));
        }

        #[test]
        fn registry_edits_are_rejected() {
            assert!(matches!(classify("reg add HKLM\\Software"), Err(ToolError::Blocked(_))));
        }

        #[test]
        fn non_whitelisted_command_is_rejected() {
            assert!(matches!(classify("nc -l 4444"), Err(ToolError::Blocked(_))));
        }

        #[test]
        fn empty_command_is_invalid() {
            assert!(matches!(classify("   "), Err(ToolError::InvalidArguments(_))));
        }
    }

    mod safe {
        use super::*;

        #[test]
        fn read_only_commands_are_safe() {
            for cmd in ["ls -la /tmp", "pwd", "cat notes.txt", "grep fn main.rs", "df -h"] {
                assert_eq!(classify(cmd).unwrap(), Sensitivity::Safe, "{cmd}");
            }
        }
    }

    mod moderate {
        use super::*;

        #[test]
        fn vcs_queries_are_moderate() {
            assert_eq!(classify("git status").unwrap(), Sensitivity::Moderate);
            assert_eq!(classify("git log --oneline").unwrap(), Sensitivity::Moderate);
            assert_eq!(classify("git diff").unwrap(), Sensitivity::Moderate);
        }

        #[test]
        fn builds_are_moderate() {
            assert_eq!(classify("cargo build --release").unwrap(), Sensitivity::Moderate);
            assert_eq!(classify("npm test").unwrap(), Sensitivity::Moderate);
            assert_eq!(classify("make check").unwrap(), Sensitivity::Moderate);
        }
    }

    mod sensitive {
        use super::*;

        #[test]
        fn vcs_write_subcommands_are_sensitive() {
            assert_eq!(classify("git push origin main").unwrap(), Sensitivity::Sensitive);
            assert_eq!(classify("git commit -m wip").unwrap(), Sensitivity::Sensitive);
            assert_eq!(classify("npm install left-pad").unwrap(), Sensitivity::Sensitive);
        }

        #[test]
        fn other_whitelisted_commands_are_sensitive() {
            assert_eq!(classify("touch new.txt").unwrap(), Sensitivity::Sensitive);
            assert_eq!(classify("mv a b").unwrap(), Sensitivity::Sensitive);
            assert_eq!(classify("curl https://example.com").unwrap(), Sensitivity::Sensitive);
            assert_eq!(classify("rm stale.txt").unwrap(), Sensitivity::Sensitive);
        }
    }
}
