use std::time::Instant;

use serde::Serialize;

use askdb_core::config::AppConfig;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    status: CheckStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<DoctorCheck>,
}

pub async fn run(config: &AppConfig, json: bool) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let validation_started = Instant::now();
    match config.validate() {
        Ok(()) => checks.push(DoctorCheck {
            name: "config_validation",
            status: CheckStatus::Pass,
            elapsed_ms: validation_started.elapsed().as_millis() as u64,
            message: "configuration loaded and validated".to_string(),
        }),
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                elapsed_ms: validation_started.elapsed().as_millis() as u64,
                message: error.to_string(),
            });
            checks.push(skipped("llm_credentials"));
            checks.push(skipped("domain_knowledge"));
            checks.push(skipped("db_connectivity"));
            return finalize(checks, started.elapsed().as_millis() as u64, json);
        }
    }

    let credentials_started = Instant::now();
    checks.push(DoctorCheck {
        name: "llm_credentials",
        status: CheckStatus::Pass,
        elapsed_ms: credentials_started.elapsed().as_millis() as u64,
        message: if config.llm.api_key.is_some() {
            format!("api key configured for {}", config.llm.base_url)
        } else {
            format!("no api key configured (fine for local endpoints like {})", config.llm.base_url)
        },
    });

    let knowledge_started = Instant::now();
    checks.push(match &config.agent.domain_knowledge_path {
        None => DoctorCheck {
            name: "domain_knowledge",
            status: CheckStatus::Pass,
            elapsed_ms: knowledge_started.elapsed().as_millis() as u64,
            message: "no domain knowledge file configured".to_string(),
        },
        Some(path) => match std::fs::read_to_string(path) {
            Ok(blob) => DoctorCheck {
                name: "domain_knowledge",
                status: CheckStatus::Pass,
                elapsed_ms: knowledge_started.elapsed().as_millis() as u64,
                message: format!("loaded {} bytes from `{}`", blob.len(), path.display()),
            },
            Err(error) => DoctorCheck {
                name: "domain_knowledge",
                status: CheckStatus::Fail,
                elapsed_ms: knowledge_started.elapsed().as_millis() as u64,
                message: format!("could not read `{}`: {error}", path.display()),
            },
        },
    });

    let db_started = Instant::now();
    let db_check = match askdb_db::connect(&config.database).await {
        Ok(pool) => match sqlx::query("SELECT 1").fetch_one(&pool).await {
            Ok(_) => DoctorCheck {
                name: "db_connectivity",
                status: CheckStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!(
                    "connected to {}:{}/{}",
                    config.database.host, config.database.port, config.database.database
                ),
            },
            Err(error) => DoctorCheck {
                name: "db_connectivity",
                status: CheckStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: error.to_string(),
            },
        },
        Err(error) => DoctorCheck {
            name: "db_connectivity",
            status: CheckStatus::Fail,
            elapsed_ms: db_started.elapsed().as_millis() as u64,
            message: error.to_string(),
        },
    };
    checks.push(db_check);

    finalize(checks, started.elapsed().as_millis() as u64, json)
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to earlier failure".to_string(),
    }
}

fn finalize(checks: Vec<DoctorCheck>, total_elapsed_ms: u64, json: bool) -> CommandResult {
    let failed = checks.iter().filter(|check| check.status == CheckStatus::Fail).count();
    let status = if failed == 0 { CheckStatus::Pass } else { CheckStatus::Fail };
    let report = DoctorReport {
        command: "doctor",
        status,
        summary: if failed == 0 {
            "all checks passed".to_string()
        } else {
            format!("{failed} check(s) failed")
        },
        total_elapsed_ms,
        checks,
    };

    let exit_code = if failed == 0 { 0 } else { 1 };
    let output = if json {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"))
    } else {
        let mut lines = Vec::with_capacity(report.checks.len() + 1);
        for check in &report.checks {
            lines.push(format!("{:<18} {:?}  {}", check.name, check.status, check.message));
        }
        lines.push(report.summary.clone());
        lines.join("\n")
    };

    CommandResult { exit_code, output }
}
