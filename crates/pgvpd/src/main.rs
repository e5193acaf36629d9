//! pgvpd — the proxy daemon.
//!
//! Single binary that assembles every subsystem for one process:
//! - Config resolution (defaults → file → env → CLI flags)
//! - Tenant registry, resolver engine, optional session pool
//! - The proxy listener(s) (plain + optional TLS)
//! - The admin HTTP surface (`/health`, `/metrics`, `/status`)
//!
//! # Usage
//!
//! ```text
//! pgvpd serve --config /etc/pgvpd/pgvpd.toml
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use pgvpd_admin::SnapshotSource;
use pgvpd_config::{Cli, Command, Config, PoolMode};
use pgvpd_metrics::Metrics;
use pgvpd_pool::{spawn_idle_reaper, PoolConfig, PoolManager};
use pgvpd_proxy::factory::PgConnectionFactory;
use pgvpd_proxy::handler::Shared;
use pgvpd_proxy::tls::UpstreamTls;
use pgvpd_resolver::{ResolverDef, ResolverEngine};
use pgvpd_tenant::{TenantConfig, TenantRegistry};

mod snapshot_source;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pgvpd=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let env: std::collections::HashMap<String, String> = std::env::vars().collect();
    let config = pgvpd_config::load(&cli.command, &env)?;

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    info!(
        listen_host = %config.listen_host,
        listen_port = config.listen_port,
        pool_mode = ?config.pool_mode,
        "pgvpd starting"
    );

    let tenant = Arc::new(TenantRegistry::new(TenantConfig {
        allow: config.tenant_allow.clone(),
        deny: config.tenant_deny.clone(),
        max_connections: config.tenant_max_connections,
        rate_limit: config.tenant_rate_limit,
    }));

    let resolver_defs: Vec<ResolverDef> = config
        .resolvers
        .iter()
        .map(|r| ResolverDef {
            name: r.name.clone(),
            sql: r.sql.clone(),
            params: r.params.clone(),
            injects: r.injects.clone(),
            required: r.required,
            unique: r.unique,
            cache_ttl_secs: r.cache_ttl,
            depends_on: r.depends_on.clone(),
        })
        .collect();
    let resolver = Arc::new(ResolverEngine::new(resolver_defs, 10_000)?);

    let metrics = Arc::new(Metrics::default());

    let upstream_tls = if config.upstream_tls {
        Some(UpstreamTls::new(&config.upstream_host, config.upstream_tls_verify)?)
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pool = match config.pool_mode {
        PoolMode::None => None,
        PoolMode::Session => {
            let factory = Arc::new(PgConnectionFactory {
                upstream_host: config.upstream_host.clone(),
                upstream_port: config.upstream_port,
                upstream_tls: upstream_tls.clone(),
                upstream_password: config.upstream_password.clone(),
                handshake_timeout: config.handshake_timeout,
            });
            let manager = Arc::new(PoolManager::new(
                PoolConfig {
                    max_size: config.pool_size,
                    checkout_timeout: config.pool_checkout_timeout,
                    idle_timeout: config.pool_idle_timeout,
                },
                factory,
            ));
            spawn_idle_reaper(manager.clone(), shutdown_rx.clone());
            Some(manager)
        }
    };

    let shared = Arc::new(Shared {
        config: config.clone(),
        tenant: tenant.clone(),
        resolver: resolver.clone(),
        pool: pool.clone(),
        metrics: metrics.clone(),
        upstream_tls,
    });

    let source: Arc<dyn SnapshotSource> = Arc::new(snapshot_source::AppSnapshotSource {
        metrics,
        tenant,
        resolver,
        pool,
    });
    let admin_router = pgvpd_admin::build_router(source);
    let admin_addr = (config.listen_host.as_str(), config.admin_port);
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;
    info!(host = %config.listen_host, port = config.admin_port, "admin server starting");

    let admin_shutdown = shutdown_rx.clone();
    let admin_handle = tokio::spawn(async move {
        let _ = axum::serve(admin_listener, admin_router)
            .with_graceful_shutdown(async move {
                let mut rx = admin_shutdown;
                let _ = rx.changed().await;
            })
            .await;
    });

    let proxy_shutdown = shutdown_rx.clone();
    let proxy_handle = tokio::spawn(async move { pgvpd_proxy::listener::run(shared, proxy_shutdown).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(Duration::from_secs(10), admin_handle).await;
    if let Ok(result) = tokio::time::timeout(Duration::from_secs(10), proxy_handle).await {
        result??;
    }

    info!("pgvpd stopped");
    Ok(())
}
