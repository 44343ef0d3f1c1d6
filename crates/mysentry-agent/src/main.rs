use anyhow::Result;
use mysentry_agent::client::AdminClient;
use mysentry_agent::config::{AgentConfig, NotifierSpec};
use mysentry_agent::{api, runtime};
use mysentry_alert::evaluator::Evaluator;
use mysentry_alert::manager::{AlertManager, ManagerSettings};
use mysentry_collector::mysql::MySqlMetricSource;
use mysentry_collector::poller::Collector;
use mysentry_collector::ring::SampleRing;
use mysentry_collector::MetricSource;
use mysentry_common::id;
use mysentry_notify::log::LogNotifier;
use mysentry_notify::webhook::WebhookNotifier;
use mysentry_notify::{Notifier, NotifierSet};
use mysentry_remedy::engine::RemediationEngine;
use mysentry_remedy::mysql::MySqlRemediationExecutor;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: u8 = 1;
const EXIT_DB_UNAVAILABLE: u8 = 2;

fn print_usage() {
    eprintln!("mysentry - MySQL health monitoring and incident response agent");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  mysentry run [config.toml]                 start the agent");
    eprintln!("  mysentry status [config.toml]              show alerts and recent actions");
    eprintln!("  mysentry ack <alert_id> [config.toml]      acknowledge an open alert");
    eprintln!("  mysentry simulate <rule_id> [config.toml]  inject a synthetic finding");
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mysentry=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        print_usage();
        return ExitCode::from(EXIT_CONFIG);
    };

    match command {
        "run" => {
            let config_path = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| "config/agent.toml".to_string());
            run_agent(&config_path).await
        }
        "status" => {
            let config_path = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| "config/agent.toml".to_string());
            client_command(&config_path, |client| async move {
                let report = client.status().await?;
                print_status(&report);
                Ok(())
            })
            .await
        }
        "ack" => {
            let Some(alert_id) = args.get(2).cloned() else {
                print_usage();
                return ExitCode::from(EXIT_CONFIG);
            };
            let config_path = args
                .get(3)
                .cloned()
                .unwrap_or_else(|| "config/agent.toml".to_string());
            client_command(&config_path, |client| async move {
                let alert = client.ack(&alert_id).await?;
                println!("acknowledged alert {} (rule {})", alert.id, alert.rule_id);
                Ok(())
            })
            .await
        }
        "simulate" => {
            let Some(rule_id) = args.get(2).cloned() else {
                print_usage();
                return ExitCode::from(EXIT_CONFIG);
            };
            let config_path = args
                .get(3)
                .cloned()
                .unwrap_or_else(|| "config/agent.toml".to_string());
            client_command(&config_path, |client| async move {
                let alert = client.simulate(&rule_id).await?;
                println!(
                    "simulated finding opened alert {} (rule {}, severity {})",
                    alert.id, alert.rule_id, alert.severity
                );
                Ok(())
            })
            .await
        }
        _ => {
            print_usage();
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn client_command<F, Fut>(config_path: &str, f: F) -> ExitCode
where
    F: FnOnce(AdminClient) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let config = match AgentConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let client = match AdminClient::new(&config.agent.admin_listen) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    match f(client).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn print_status(report: &runtime::StatusReport) {
    if report.degraded {
        println!("!! agent degraded: findings have been dropped under load");
    }
    if !report.disabled_remediation_kinds.is_empty() {
        let kinds: Vec<String> = report
            .disabled_remediation_kinds
            .iter()
            .map(|k| k.to_string())
            .collect();
        println!("!! circuit breaker open for: {}", kinds.join(", "));
    }

    if report.alerts.is_empty() {
        println!("no alerts");
    } else {
        println!("alerts:");
        for alert in &report.alerts {
            println!(
                "  {} [{}] {} rule={} occurrences={} opened={}",
                alert.id,
                alert.severity,
                alert.state,
                alert.rule_id,
                alert.occurrence_count,
                alert.opened_at.to_rfc3339(),
            );
        }
    }

    if !report.recent_actions.is_empty() {
        println!("recent remediation actions:");
        for action in &report.recent_actions {
            println!(
                "  {} {} rule={} outcome={}{} at={}: {}",
                action.id,
                action.kind,
                action.rule_id,
                action.outcome,
                if action.dry_run { " (dry-run)" } else { "" },
                action.executed_at.to_rfc3339(),
                action.detail,
            );
        }
    }
}

async fn run_agent(config_path: &str) -> ExitCode {
    let config = match AgentConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    id::init(1, 1);

    // Connect eagerly: a monitoring agent that cannot reach its target
    // at startup should fail loudly, not sit in a silent retry loop.
    let pool = match connect_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("database unavailable: {e}");
            return ExitCode::from(EXIT_DB_UNAVAILABLE);
        }
    };

    match serve(config, pool).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn connect_pool(config: &AgentConfig) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

async fn serve(config: AgentConfig, pool: MySqlPool) -> Result<()> {
    tracing::info!(
        sources = config.sources.len(),
        rules = config.rules.len(),
        bindings = config.remediation.bindings.len(),
        dry_run = config.remediation.dry_run,
        "mysentry starting"
    );

    let rules = config.rules()?;

    let mut rings = HashMap::new();
    let mut sources: Vec<(Arc<dyn MetricSource>, _)> = Vec::new();
    for spec in &config.sources {
        rings.insert(
            spec.metric_id.clone(),
            SampleRing::new(config.ring_capacity(&spec.metric_id)),
        );
        let source = MySqlMetricSource::new(
            spec.metric_id.clone(),
            spec.query.clone(),
            spec.parser,
            spec.tags.clone(),
            pool.clone(),
        );
        sources.push((Arc::new(source), spec.poll_settings()));
    }

    let manager = AlertManager::new(ManagerSettings {
        cool_down_cycles: config.alerting.cool_down_cycles,
        renotify: Duration::from_secs(config.alerting.renotify_secs),
        pending_capacity: config.alerting.pending_buffer,
    });

    let executor = Arc::new(MySqlRemediationExecutor::new(pool.clone()));
    let engine = RemediationEngine::new(
        config.remediation.engine_settings(),
        config.remediation.bindings.clone(),
        executor,
    );

    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    for spec in &config.notifiers {
        match spec {
            NotifierSpec::Log => channels.push(Box::new(LogNotifier)),
            NotifierSpec::Webhook { url, timeout_secs } => channels.push(Box::new(
                WebhookNotifier::new(url.as_str(), Duration::from_secs(*timeout_secs)),
            )),
        }
    }
    if channels.is_empty() {
        channels.push(Box::new(LogNotifier));
    }
    let notifiers = NotifierSet::new(channels);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let (command_tx, command_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collector = Collector::new(sources);
    let poller_handles = collector.spawn(event_tx, shutdown_rx.clone());

    let listener = tokio::net::TcpListener::bind(&config.agent.admin_listen).await?;
    tracing::info!(listen = %config.agent.admin_listen, "Admin API listening");
    let router = api::router(command_tx);
    let api_shutdown = shutdown_rx.clone();
    let api_handle = tokio::spawn(async move {
        let mut shutdown = api_shutdown;
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // Wait for the shutdown flag; a closed channel also stops.
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Admin API server error");
        }
    });

    let pipeline = runtime::Pipeline::new(
        rings,
        Evaluator::new(rules),
        manager,
        engine,
        notifiers,
    );
    let pipeline_handle = tokio::spawn(pipeline.run(event_rx, command_rx, shutdown_rx));

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    for handle in poller_handles {
        let _ = handle.await;
    }
    let _ = pipeline_handle.await;
    let _ = api_handle.await;
    tracing::info!("mysentry stopped");
    Ok(())
}
