//! Doctor command - verify system requirements and configuration.

use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    message: String,
    hint: Option<String>,
}

#[derive(Debug, PartialEq)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Notat Doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("External Tools").bold());
    checks.push(check_tool(
        "yt-dlp",
        "Install with: pip install yt-dlp (or your package manager)",
    ));
    for check in &checks {
        check.print();
    }
    println!();

    println!("{}", style("API Keys").bold());
    let api_checks = vec![
        check_env_key("OPENAI_API_KEY", "required for enrichment"),
        if settings.youtube.api_key.as_deref().unwrap_or("").is_empty() {
            CheckResult::warning(
                "YOUTUBE_API_KEY",
                "not configured",
                "Set YOUTUBE_API_KEY or youtube.api_key in the config file",
            )
        } else {
            CheckResult::ok("YOUTUBE_API_KEY", "configured")
        },
        if settings.auth.jwt_secret.as_deref().unwrap_or("").is_empty() {
            CheckResult::warning(
                "NOTAT_JWT_SECRET",
                "not configured; the API will reject every request",
                "Set NOTAT_JWT_SECRET to the identity provider's signing secret",
            )
        } else {
            CheckResult::ok("NOTAT_JWT_SECRET", "configured")
        },
    ];
    for check in &api_checks {
        check.print();
    }
    checks.extend(api_checks);
    println!();

    println!("{}", style("Storage").bold());
    let storage_checks = vec![
        check_writable_dir("data directory", &settings.data_dir()),
        check_writable_dir("object store", &settings.objects_dir()),
    ];
    for check in &storage_checks {
        check.print();
    }
    checks.extend(storage_checks);
    println!();

    println!("{}", style("Auth").bold());
    let allowlist_check = if settings.auth.verified_email_hashes.is_empty() {
        CheckResult::warning(
            "email allowlist",
            "empty; no account can authenticate",
            "Add SHA-256 digests of verified emails to auth.verified_email_hashes",
        )
    } else {
        CheckResult::ok(
            "email allowlist",
            &format!("{} entries", settings.auth.verified_email_hashes.len()),
        )
    };
    allowlist_check.print();
    checks.push(allowlist_check);
    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks
        .iter()
        .filter(|c| c.status == CheckStatus::Warning)
        .count();

    if errors > 0 {
        Output::error(&format!("{} error(s), {} warning(s)", errors, warnings));
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s)", warnings));
    } else {
        Output::success("All checks passed!");
    }

    Ok(())
}

fn check_tool(name: &str, hint: &str) -> CheckResult {
    let result = Command::new(name).arg("--version").output();
    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("unknown")
                .to_string();
            CheckResult::ok(name, &version)
        }
        _ => CheckResult::error(name, "not found in PATH", hint),
    }
}

fn check_env_key(name: &str, purpose: &str) -> CheckResult {
    if std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false) {
        CheckResult::ok(name, "configured")
    } else {
        CheckResult::error(
            name,
            &format!("not set ({})", purpose),
            &format!("export {}=...", name),
        )
    }
}

fn check_writable_dir(name: &str, path: &std::path::Path) -> CheckResult {
    match std::fs::create_dir_all(path) {
        Ok(()) => CheckResult::ok(name, &format!("{}", path.display())),
        Err(e) => CheckResult::error(
            name,
            &format!("cannot create {}: {}", path.display(), e),
            "Check directory permissions or adjust the storage paths in the config file",
        ),
    }
}
