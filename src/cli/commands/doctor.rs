//! Doctor command - verify backends, tools and configuration.

use super::CommandFailed;
use crate::cli::Output;
use crate::config::Settings;
use crate::http::create_client;
use crate::tools::ToolRegistry;
use console::style;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Timeout for reachability probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
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

fn print_section(title: &str, checks: &[CheckResult]) {
    println!("{}", style(title).bold());
    for check in checks {
        check.print();
    }
    println!();
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings, config_path: Option<&Path>) -> anyhow::Result<()> {
    Output::header("Scout Doctor");
    println!();
    println!("Checking backends, tools and configuration...\n");

    let mut checks = Vec::new();

    let backends = vec![
        check_endpoint("LLM backend", &settings.llm.endpoint).await,
        check_endpoint("Search backend", &settings.search.endpoint).await,
    ];
    print_section("Backends", &backends);
    checks.extend(backends);

    let mut tools = vec![check_tools_dir(settings)];
    for (interpreter, hint) in [
        ("python3", "Needed for .py tools"),
        ("bash", "Needed for .sh tools"),
        ("node", "Needed for .js tools"),
    ] {
        tools.push(check_interpreter(interpreter, hint).await);
    }
    print_section("Tools", &tools);
    checks.extend(tools);

    let config = vec![check_config_file(config_path)];
    print_section("Configuration", &config);
    checks.extend(config);

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Scout.",
            errors
        ));
        return Err(CommandFailed::new(1).into());
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Scout is ready to use.");
    }

    Ok(())
}

/// Check an HTTP endpoint. Any HTTP response counts as reachable.
async fn check_endpoint(name: &str, endpoint: &str) -> CheckResult {
    let client = match create_client(PROBE_TIMEOUT) {
        Ok(client) => client,
        Err(e) => return CheckResult::error(name, &e.to_string(), "Check your TLS setup"),
    };

    match client.get(endpoint).send().await {
        Ok(response) => CheckResult::ok(
            name,
            &format!("{} (HTTP {})", endpoint, response.status().as_u16()),
        ),
        Err(e) if e.is_builder() => CheckResult::error(
            name,
            &format!("invalid URL {}", endpoint),
            "Fix the endpoint in your config file",
        ),
        Err(_) => CheckResult::error(
            name,
            &format!("{} is not reachable", endpoint),
            "Start the service or point the config at a running one",
        ),
    }
}

/// Check the tools directory and how many scripts it holds.
fn check_tools_dir(settings: &Settings) -> CheckResult {
    let dir = settings.tools_dir();
    if !dir.exists() {
        return CheckResult::warning(
            "Tools directory",
            &format!("{} (missing)", dir.display()),
            "Create it with: scout config init",
        );
    }

    match ToolRegistry::scan(&dir, settings.describe_timeout()) {
        Ok(registry) if registry.is_empty() => CheckResult::warning(
            "Tools directory",
            &format!("{} (no tools)", dir.display()),
            "Add .py, .sh or .js scripts to enable tool dispatch",
        ),
        Ok(registry) => CheckResult::ok(
            "Tools directory",
            &format!("{} ({} tools)", dir.display(), registry.len()),
        ),
        Err(e) => CheckResult::error(
            "Tools directory",
            &format!("cannot read {}: {}", dir.display(), e),
            "Check the directory permissions",
        ),
    }
}

/// Check that a script interpreter runs.
async fn check_interpreter(name: &str, hint: &str) -> CheckResult {
    match Command::new(name).arg("--version").output().await {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version: String = stdout
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .chars()
                .take(50)
                .collect();
            CheckResult::ok(name, &version)
        }
        Ok(_) => CheckResult::warning(name, "installed but not working", hint),
        Err(_) => CheckResult::warning(name, "not found", hint),
    }
}

fn check_config_file(config_path: Option<&Path>) -> CheckResult {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::default_config_path);
    if path.exists() {
        CheckResult::ok("Config file", &format!("{}", path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: scout config init",
        )
    }
}
