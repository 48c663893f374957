//! Preflight Check System
//!
//! Verifies the gateway's runtime requirements before it starts serving:
//! directory tree, chat history database, and which optional hosted
//! services are configured.

use crate::config::Config;
use crate::fs_manager::PortablePathManager;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Result of a single check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete preflight check report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub all_passed: bool,
    pub checks: Vec<CheckResult>,
    pub ready_to_start: bool,
    pub summary: String,
}

/// Performs all preflight checks and returns a comprehensive report.
pub async fn run_preflight_checks(config: &Config) -> PreflightReport {
    info!("Running preflight checks");

    let mut checks = Vec::new();

    checks.push(check_directories());
    checks.push(check_database().await);
    checks.push(check_cloudinary(config));
    checks.push(check_fpt_tts(config));

    let all_passed = checks.iter().all(|c| c.passed);
    let critical_passed = checks
        .iter()
        .filter(|c| is_critical_check(&c.name))
        .all(|c| c.passed);

    let summary = if all_passed {
        "All checks passed. System ready.".to_string()
    } else if critical_passed {
        "Some non-critical checks failed. System can start with warnings.".to_string()
    } else {
        "Critical checks failed. System cannot start.".to_string()
    };

    for check in &checks {
        if check.passed {
            info!("  ✅ {}: {}", check.name, check.message);
        } else {
            warn!("  ❌ {}: {}", check.name, check.message);
            if let Some(details) = &check.details {
                warn!("      Details: {}", details);
            }
        }
    }

    info!("Summary: {}", summary);

    PreflightReport {
        all_passed,
        checks,
        ready_to_start: critical_passed,
        summary,
    }
}

fn is_critical_check(name: &str) -> bool {
    matches!(name, "directories" | "database")
}

// --- Individual Checks ---

fn check_directories() -> CheckResult {
    match PortablePathManager::init() {
        Ok(()) => CheckResult::pass("directories", "Data directory tree ready"),
        Err(e) => CheckResult::fail(
            "directories",
            "Failed to create data directories",
            Some(e.to_string()),
        ),
    }
}

async fn check_database() -> CheckResult {
    match crate::database::init_db(None).await {
        Ok(pool) => {
            let tables = sqlx::query_scalar::<_, String>(
                "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
            )
            .fetch_all(&pool)
            .await;

            match tables {
                Ok(tables) => {
                    let required = ["sessions", "messages"];
                    let missing: Vec<&str> = required
                        .iter()
                        .filter(|t| !tables.contains(&t.to_string()))
                        .copied()
                        .collect();

                    if missing.is_empty() {
                        CheckResult::pass(
                            "database",
                            &format!("Chat history database OK ({} tables)", tables.len()),
                        )
                    } else {
                        CheckResult::fail(
                            "database",
                            "Missing tables after migration",
                            Some(format!("Missing: {}", missing.join(", "))),
                        )
                    }
                }
                Err(e) => CheckResult::fail(
                    "database",
                    "Cannot query chat history database",
                    Some(e.to_string()),
                ),
            }
        }
        Err(e) => CheckResult::fail(
            "database",
            "Cannot open chat history database",
            Some(e.to_string()),
        ),
    }
}

fn check_cloudinary(config: &Config) -> CheckResult {
    if config.cloudinary.is_some() {
        CheckResult::pass("cloudinary", "Media uploads configured")
    } else {
        CheckResult::fail(
            "cloudinary",
            "Cloudinary not configured; markdown ingestion will be unavailable",
            None,
        )
    }
}

fn check_fpt_tts(config: &Config) -> CheckResult {
    match (&config.fpt_tts_api_key, &config.callback_base_url) {
        (Some(_), Some(_)) => CheckResult::pass("fpt_tts", "Fallback voice configured"),
        (Some(_), None) => CheckResult::fail(
            "fpt_tts",
            "FPT_TTS_API_KEY is set but CALLBACK_BASE_URL is not; callbacks cannot be delivered",
            None,
        ),
        (None, _) => CheckResult::fail(
            "fpt_tts",
            "FPT TTS not configured; only the primary voice is available",
            None,
        ),
    }
}
