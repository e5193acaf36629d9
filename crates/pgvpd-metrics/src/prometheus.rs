//! Prometheus text exposition for a [`Snapshot`] (§4.7, §6 "Admin HTTP").

use std::fmt::Write as _;

use crate::snapshot::Snapshot;

fn write_gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

fn write_counter(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    write_counter(&mut out, "pgvpd_connections_total", "Total client connections accepted", snapshot.connections_total);
    write_gauge(&mut out, "pgvpd_connections_active", "Currently active client connections", snapshot.connections_active);

    write_counter(&mut out, "pgvpd_pool_checkouts_total", "Total pool checkout attempts", snapshot.pool_checkouts_total);
    write_counter(&mut out, "pgvpd_pool_reuses_total", "Total checkouts satisfied from the idle queue", snapshot.pool_reuses_total);
    write_counter(&mut out, "pgvpd_pool_creates_total", "Total new upstream connections created", snapshot.pool_creates_total);
    write_counter(&mut out, "pgvpd_pool_checkins_total", "Total checkins", snapshot.pool_checkins_total);
    write_counter(&mut out, "pgvpd_pool_discards_total", "Total checked-in connections discarded as unhealthy", snapshot.pool_discards_total);
    write_counter(&mut out, "pgvpd_pool_timeouts_total", "Total checkouts that timed out", snapshot.pool_timeouts_total);

    let _ = writeln!(out, "# HELP pgvpd_pool_size_total Live connections per bucket");
    let _ = writeln!(out, "# TYPE pgvpd_pool_size_total gauge");
    for bucket in &snapshot.pool_buckets {
        let _ = writeln!(
            out,
            "pgvpd_pool_size_total{{database=\"{}\",role=\"{}\"}} {}",
            bucket.database, bucket.effective_role, bucket.total
        );
    }
    let _ = writeln!(out, "# HELP pgvpd_pool_idle Idle connections per bucket");
    let _ = writeln!(out, "# TYPE pgvpd_pool_idle gauge");
    for bucket in &snapshot.pool_buckets {
        let _ = writeln!(
            out,
            "pgvpd_pool_idle{{database=\"{}\",role=\"{}\"}} {}",
            bucket.database, bucket.effective_role, bucket.idle
        );
    }

    write_counter(&mut out, "pgvpd_resolver_cache_hits_total", "Resolver cache hits", snapshot.resolver_cache_hits_total);
    write_counter(&mut out, "pgvpd_resolver_cache_misses_total", "Resolver cache misses", snapshot.resolver_cache_misses_total);

    let _ = writeln!(out, "# HELP pgvpd_resolver_executions_total Executions per resolver");
    let _ = writeln!(out, "# TYPE pgvpd_resolver_executions_total counter");
    for r in &snapshot.resolvers {
        let _ = writeln!(out, "pgvpd_resolver_executions_total{{resolver=\"{}\"}} {}", r.name, r.executions_total);
    }
    let _ = writeln!(out, "# HELP pgvpd_resolver_errors_total Errors per resolver");
    let _ = writeln!(out, "# TYPE pgvpd_resolver_errors_total counter");
    for r in &snapshot.resolvers {
        let _ = writeln!(out, "pgvpd_resolver_errors_total{{resolver=\"{}\"}} {}", r.name, r.errors_total);
    }

    let _ = writeln!(out, "# HELP pgvpd_tenant_rejected_total Tenant admission rejections by reason");
    let _ = writeln!(out, "# TYPE pgvpd_tenant_rejected_total counter");
    let _ = writeln!(out, "pgvpd_tenant_rejected_total{{reason=\"denied\"}} {}", snapshot.tenant_rejected.denied);
    let _ = writeln!(out, "pgvpd_tenant_rejected_total{{reason=\"rate\"}} {}", snapshot.tenant_rejected.rate_limited);
    let _ = writeln!(out, "pgvpd_tenant_rejected_total{{reason=\"limit\"}} {}", snapshot.tenant_rejected.connection_limited);

    write_counter(&mut out, "pgvpd_tenant_timeouts_total", "Tenant admission timeouts", snapshot.tenant_timeouts_total);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{PoolBucketSnapshot, ResolverSnapshot};

    #[test]
    fn renders_help_and_type_lines() {
        let snapshot = Snapshot {
            connections_total: 5,
            connections_active: 2,
            pool_buckets: vec![PoolBucketSnapshot {
                database: "db".into(),
                effective_role: "app_user".into(),
                total: 3,
                idle: 1,
            }],
            resolvers: vec![ResolverSnapshot {
                name: "user_account".into(),
                executions_total: 10,
                errors_total: 1,
            }],
            ..Default::default()
        };
        let text = render(&snapshot);
        assert!(text.contains("# HELP pgvpd_connections_total"));
        assert!(text.contains("# TYPE pgvpd_connections_total counter"));
        assert!(text.contains("pgvpd_connections_total 5"));
        assert!(text.contains("pgvpd_connections_active 2"));
        assert!(text.contains("pgvpd_pool_size_total{database=\"db\",role=\"app_user\"} 3"));
        assert!(text.contains("pgvpd_resolver_executions_total{resolver=\"user_account\"} 10"));
    }
}
