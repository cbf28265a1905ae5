//! Release line 6.0: initial schema.

use op_core::DbType;
use op_db::{DefaultValue, FieldDef, FieldType, FkAction, ForeignKeyDef, TableDef};
use op_upgrade::{PatchContext, PatchDescriptor, PatchResult, ReleaseLine};

/// Host that represents the server itself
pub(crate) const SERVER_HOSTID: i64 = 10001;

pub(crate) fn release_line() -> ReleaseLine {
    ReleaseLine::new(60)
        .patch(PatchDescriptor::new(6000000, create_hosts).mandatory())
        .patch(PatchDescriptor::new(6000001, create_items).mandatory())
        .patch(PatchDescriptor::new(6000002, seed_server_host).mandatory())
        .patch(PatchDescriptor::new(6000003, create_config).mandatory())
        .patch(
            PatchDescriptor::new(6000004, add_items_host_fk)
                // DuckDB cannot add constraints to existing tables
                .except_on(&[DbType::DuckDb]),
        )
        .patch(
            PatchDescriptor::new(6000004, add_hosts_vendor_tag)
                .vendor(1)
                .mandatory(),
        )
}

fn create_hosts(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl().create_table(
        &TableDef::new("hosts")
            .field(FieldDef::new("hostid", FieldType::Id).not_null())
            .field(
                FieldDef::new("host", FieldType::Char(128))
                    .default(DefaultValue::Str(String::new()))
                    .not_null(),
            )
            .field(
                FieldDef::new("status", FieldType::Int)
                    .default(DefaultValue::Int(0))
                    .not_null(),
            )
            .field(FieldDef::new("proxy_hostid", FieldType::Id))
            .primary_key(&["hostid"]),
    )?;
    Ok(())
}

fn create_items(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl().create_table(
        &TableDef::new("items")
            .field(FieldDef::new("itemid", FieldType::Id).not_null())
            .field(FieldDef::new("hostid", FieldType::Id).not_null())
            .field(
                FieldDef::new("key_", FieldType::Char(255))
                    .default(DefaultValue::Str(String::new()))
                    .not_null(),
            )
            .field(
                FieldDef::new("delay", FieldType::Char(255))
                    .default(DefaultValue::Str("1m".into()))
                    .not_null(),
            )
            .primary_key(&["itemid"]),
    )?;
    Ok(())
}

fn seed_server_host(ctx: &PatchContext<'_>) -> PatchResult<()> {
    let exists = ctx
        .db()
        .query_i64(&format!(
            "SELECT COUNT(*) FROM hosts WHERE hostid = {SERVER_HOSTID}"
        ))?
        .unwrap_or(0);
    if exists == 0 {
        ctx.execute(&format!(
            "INSERT INTO hosts (hostid, host, status) VALUES ({SERVER_HOSTID}, 'Outpost server', 0)"
        ))?;
    }
    ctx.resync_after_manual_insert("hosts")?;
    Ok(())
}

/// Server-wide settings; proxies read them from their server
fn create_config(ctx: &PatchContext<'_>) -> PatchResult<()> {
    if !ctx.role().is_server() {
        return Ok(());
    }
    let ddl = ctx.ddl();
    ddl.create_table(
        &TableDef::new("config")
            .field(FieldDef::new("configid", FieldType::Id).not_null())
            .field(
                FieldDef::new("refresh_unsupported", FieldType::Int)
                    .default(DefaultValue::Int(600))
                    .not_null(),
            )
            .field(
                FieldDef::new("default_timezone", FieldType::Char(50))
                    .default(DefaultValue::Str("system".into()))
                    .not_null(),
            )
            .primary_key(&["configid"]),
    )?;
    if ctx.db().query_i64("SELECT COUNT(*) FROM config")?.unwrap_or(0) == 0 {
        let configid = ctx.next_id("config")?;
        ctx.execute(&format!("INSERT INTO config (configid) VALUES ({configid})"))?;
    }
    Ok(())
}

fn add_items_host_fk(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl().add_foreign_key(
        "items",
        &ForeignKeyDef::new("c_items_1", &["hostid"], "hosts", &["hostid"])
            .on_delete(FkAction::Cascade),
    )?;
    Ok(())
}

fn add_hosts_vendor_tag(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl().add_field(
        "hosts",
        &FieldDef::new("vendor_tag", FieldType::Char(64))
            .default(DefaultValue::Str(String::new()))
            .not_null(),
    )?;
    Ok(())
}
