//! Operator CLI for casevault.
//!
//! Provisioning and administrative actions that live outside the HTTP
//! surface: creating tenants (with their first admin key), issuing keys,
//! flipping billing status, and running migrations.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use casevault::auth::KeyAuthenticator;
use casevault::domain::{ApiKeyId, ApiKeyRecord, BillingStatus, Role, TenantId, TenantRecord};
use casevault::infra::{CaseStore, PgCaseStore};
use casevault::scope::ScopeContext;

fn print_help() {
    eprintln!(
        "\
casevault-admin

USAGE:
  casevault-admin <command> [options]

COMMANDS:
  migrate            Run database migrations
  create-tenant      Create a tenant and its first admin API key
  issue-key          Issue an API key for an existing tenant
  set-billing        Set a tenant's billing status
  list-keys          List API keys for a tenant (metadata only)

COMMON OPTIONS:
  --database-url <postgres_url>   (defaults to env DATABASE_URL)

create-tenant OPTIONS:
  --name <name>                   (required) Tenant name

issue-key OPTIONS:
  --tenant-id <uuid>              (required)
  --role <user|admin>             (default: user)
  --label <text>                  (optional)

set-billing OPTIONS:
  --tenant-id <uuid>              (required)
  --status <free|paid>            (required)

list-keys OPTIONS:
  --tenant-id <uuid>              (required)
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

struct Flags {
    database_url: Option<String>,
    name: Option<String>,
    tenant_id: Option<Uuid>,
    role: Option<Role>,
    label: Option<String>,
    status: Option<BillingStatus>,
}

fn parse_flags(mut args: VecDeque<String>) -> anyhow::Result<Flags> {
    let mut flags = Flags {
        database_url: None,
        name: None,
        tenant_id: None,
        role: None,
        label: None,
        status: None,
    };

    while let Some(flag) = args.pop_front() {
        let mut value = || {
            args.pop_front()
                .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
        };
        match flag.as_str() {
            "--database-url" => flags.database_url = Some(value()?),
            "--name" => flags.name = Some(value()?),
            "--tenant-id" => flags.tenant_id = Some(value()?.parse()?),
            "--role" => {
                let v = value()?;
                flags.role =
                    Some(Role::parse(&v).ok_or_else(|| anyhow::anyhow!("invalid role: {v}"))?);
            }
            "--label" => flags.label = Some(value()?),
            "--status" => {
                let v = value()?;
                flags.status = Some(
                    BillingStatus::parse(&v)
                        .ok_or_else(|| anyhow::anyhow!("invalid billing status: {v}"))?,
                );
            }
            other => anyhow::bail!("unknown option: {other}"),
        }
    }

    Ok(flags)
}

async fn open_store(database_url: Option<String>) -> anyhow::Result<PgCaseStore> {
    let url = require_database_url(database_url)?;
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    Ok(PgCaseStore::new(pool))
}

async fn issue_key_row(
    store: &dyn CaseStore,
    tenant_id: TenantId,
    role: Role,
    label: Option<String>,
) -> anyhow::Result<(ApiKeyRecord, String)> {
    let (raw_key, key_hash) = KeyAuthenticator::generate_key();
    let record = ApiKeyRecord {
        id: ApiKeyId::new(),
        tenant_id,
        key_hash,
        role,
        label,
        created_at: Utc::now(),
        revoked_at: None,
    };
    store.insert_api_key(&record).await?;
    Ok((record, raw_key))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();

    let Some(command) = args.pop_front() else {
        print_help();
        std::process::exit(2);
    };

    match command.as_str() {
        "migrate" => {
            let flags = parse_flags(args)?;
            let store = open_store(flags.database_url).await?;
            store
                .migrate()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("migrations applied");
        }
        "create-tenant" => {
            let flags = parse_flags(args)?;
            let name = flags
                .name
                .ok_or_else(|| anyhow::anyhow!("--name is required"))?;
            let store = open_store(flags.database_url).await?;

            let tenant = TenantRecord::new(name);
            store.insert_tenant(&tenant).await?;

            let (record, raw_key) =
                issue_key_row(&store, tenant.id, Role::Admin, Some("bootstrap".to_string()))
                    .await?;

            println!("tenant_id: {}", tenant.id);
            println!("admin_key_id: {}", record.id);
            // The raw key is printed exactly once and never stored.
            println!("api_key: {raw_key}");
        }
        "issue-key" => {
            let flags = parse_flags(args)?;
            let tenant_id = flags
                .tenant_id
                .map(TenantId::from_uuid)
                .ok_or_else(|| anyhow::anyhow!("--tenant-id is required"))?;
            let store = open_store(flags.database_url).await?;

            if store.fetch_tenant(tenant_id).await?.is_none() {
                anyhow::bail!("tenant not found: {tenant_id}");
            }

            let role = flags.role.unwrap_or(Role::User);
            let (record, raw_key) = issue_key_row(&store, tenant_id, role, flags.label).await?;

            println!("key_id: {}", record.id);
            println!("role: {}", record.role);
            println!("api_key: {raw_key}");
        }
        "set-billing" => {
            let flags = parse_flags(args)?;
            let tenant_id = flags
                .tenant_id
                .map(TenantId::from_uuid)
                .ok_or_else(|| anyhow::anyhow!("--tenant-id is required"))?;
            let status = flags
                .status
                .ok_or_else(|| anyhow::anyhow!("--status is required"))?;
            let store = open_store(flags.database_url).await?;

            let updated = store.set_billing_status(tenant_id, status).await?;
            if updated == 0 {
                anyhow::bail!("tenant not found: {tenant_id}");
            }
            println!("tenant {tenant_id} billing_status set to {status}");
        }
        "list-keys" => {
            let flags = parse_flags(args)?;
            let tenant_id = flags
                .tenant_id
                .map(TenantId::from_uuid)
                .ok_or_else(|| anyhow::anyhow!("--tenant-id is required"))?;
            let store: Arc<dyn CaseStore> = Arc::new(open_store(flags.database_url).await?);

            let ctx = ScopeContext::new();
            let scope = ctx
                .open(tenant_id)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;

            for key in store.list_api_keys(&scope).await? {
                println!(
                    "{}  role={}  label={}  revoked={}",
                    key.id,
                    key.role,
                    key.label.as_deref().unwrap_or("-"),
                    key.revoked_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "no".to_string()),
                );
            }
        }
        "--help" | "-h" | "help" => {
            print_help();
        }
        other => {
            eprintln!("unknown command: {other}\n");
            print_help();
            std::process::exit(2);
        }
    }

    Ok(())
}
