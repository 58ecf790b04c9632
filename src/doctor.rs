use textflow_core::config::AppConfig;
use textflow_core::traits::RunHistoryStore;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub async fn run_doctor(config: &AppConfig) {
    let mut checks = Vec::new();

    // 1. Processor settings usable
    let processor = match textflow_llm::create_processor(&config.processor) {
        Ok(p) => {
            checks.push(CheckResult {
                label: "Processor".into(),
                ok: true,
                detail: describe_processor(config),
            });
            Some(p)
        }
        Err(e) => {
            checks.push(CheckResult {
                label: "Processor".into(),
                ok: false,
                detail: e.to_string(),
            });
            None
        }
    };

    // 2. Step backend and model reachable
    if let Some(processor) = processor {
        let health = processor.health().await;
        checks.push(CheckResult {
            label: "Backend".into(),
            ok: health.reachable,
            detail: if health.reachable {
                "connected".to_string()
            } else {
                format!("disconnected: {}", health.detail.clone().unwrap_or_default())
            },
        });
        checks.push(CheckResult {
            label: "LLM".into(),
            ok: health.llm_connected,
            detail: match (health.llm_connected, health.detail) {
                (true, _) => "connected".to_string(),
                (false, Some(detail)) => detail,
                (false, None) => "disconnected".to_string(),
            },
        });
    }

    // 3. Workspace dir exists and writable
    checks.push(check_workspace(config));

    // 4. SQLite DB accessible
    checks.push(check_database(config).await);

    // 5. Run log directory
    if let Some(check) = check_log_dir(config) {
        checks.push(check);
    }

    // Print results
    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    let overall = if fail_count == 0 { "healthy" } else { "degraded" };
    println!("  {}: {} passed, {} issues found", overall, ok_count, fail_count);
}

fn describe_processor(config: &AppConfig) -> String {
    let p = &config.processor;
    match p.provider.as_str() {
        "backend" | "http" => format!(
            "step backend at {}",
            p.base_url.as_deref().unwrap_or_default()
        ),
        provider => format!("{} ({})", p.model_id, provider),
    }
}

fn check_workspace(config: &AppConfig) -> CheckResult {
    let ws = config.workspace_dir();
    if let Err(e) = std::fs::create_dir_all(&ws) {
        return CheckResult {
            label: "Workspace".into(),
            ok: false,
            detail: format!("{} (cannot create: {})", ws.display(), e),
        };
    }

    // Check writable by attempting to create a temp file
    let test_file = ws.join(".status_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Workspace".into(),
                ok: true,
                detail: format!("{}", ws.display()),
            }
        }
        Err(e) => CheckResult {
            label: "Workspace".into(),
            ok: false,
            detail: format!("{} (not writable: {})", ws.display(), e),
        },
    }
}

async fn check_database(config: &AppConfig) -> CheckResult {
    let db_path = config.database_path();
    let result = match textflow_store::SqliteStore::open(&db_path) {
        Ok(store) => {
            let pinged = store.ping().await;
            let closed = store.close();
            pinged.and(closed)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => CheckResult {
            label: "Database".into(),
            ok: true,
            detail: format!("{}", db_path.display()),
        },
        Err(e) => CheckResult {
            label: "Database".into(),
            ok: false,
            detail: format!("{}: {}", db_path.display(), e),
        },
    }
}

fn check_log_dir(config: &AppConfig) -> Option<CheckResult> {
    let dir = config.log_dir()?;
    Some(match std::fs::create_dir_all(&dir) {
        Ok(_) => CheckResult {
            label: "Run logs".into(),
            ok: true,
            detail: format!("{}", dir.display()),
        },
        Err(e) => CheckResult {
            label: "Run logs".into(),
            ok: false,
            detail: format!("{}: {}", dir.display(), e),
        },
    })
}
