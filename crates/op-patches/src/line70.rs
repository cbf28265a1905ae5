//! Release line 7.0: history storage, media types and host groups.

use op_db::{DefaultValue, FieldDef, FieldType, IndexDef, TableDef};
use op_upgrade::{PatchContext, PatchDescriptor, PatchResult, ReleaseLine};

pub(crate) fn release_line() -> ReleaseLine {
    ReleaseLine::new(70)
        .patch(PatchDescriptor::new(7000000, add_items_history).mandatory())
        .patch(PatchDescriptor::new(7000001, create_media_types))
        .patch(PatchDescriptor::new(7000002, create_items_host_index))
        .patch(PatchDescriptor::new(7000002, create_hosts_vendor_index).vendor(1))
        .patch(PatchDescriptor::new(7000003, create_host_groups).mandatory())
}

fn add_items_history(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl().add_field(
        "items",
        &FieldDef::new("history", FieldType::Char(255))
            .default(DefaultValue::Str("31d".into()))
            .not_null(),
    )?;
    Ok(())
}

const MEDIA_TYPES: [(&str, i64); 2] = [("Email", 0), ("Webhook", 4)];

fn create_media_types(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl().create_table(
        &TableDef::new("media_type")
            .field(FieldDef::new("mediatypeid", FieldType::Id).not_null())
            .field(
                FieldDef::new("name", FieldType::Char(100))
                    .default(DefaultValue::Str(String::new()))
                    .not_null(),
            )
            .field(
                FieldDef::new("type", FieldType::Int)
                    .default(DefaultValue::Int(0))
                    .not_null(),
            )
            .primary_key(&["mediatypeid"]),
    )?;
    if ctx
        .db()
        .query_i64("SELECT COUNT(*) FROM media_type")?
        .unwrap_or(0)
        > 0
    {
        return Ok(());
    }

    let first = ctx.reserve_range("media_type", MEDIA_TYPES.len() as i64)?;
    let dialect = ctx.db().dialect();
    for (id, (name, kind)) in (first..).zip(MEDIA_TYPES) {
        ctx.execute(&format!(
            "INSERT INTO media_type (mediatypeid, name, {}) VALUES ({id}, {}, {kind})",
            dialect.quote_ident("type"),
            dialect.quote_literal(name)
        ))?;
    }
    Ok(())
}

fn create_items_host_index(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl()
        .create_index("items", &IndexDef::new("items_1", &["hostid", "key_"]))?;
    Ok(())
}

fn create_hosts_vendor_index(ctx: &PatchContext<'_>) -> PatchResult<()> {
    ctx.ddl()
        .create_index("hosts", &IndexDef::new("hosts_2", &["vendor_tag"]))?;
    Ok(())
}

/// Host groups, with the server host placed in the default group
fn create_host_groups(ctx: &PatchContext<'_>) -> PatchResult<()> {
    let ddl = ctx.ddl();
    ddl.create_table(
        &TableDef::new("hstgrp")
            .field(FieldDef::new("groupid", FieldType::Id).not_null())
            .field(
                FieldDef::new("name", FieldType::Char(255))
                    .default(DefaultValue::Str(String::new()))
                    .not_null(),
            )
            .primary_key(&["groupid"]),
    )?;
    ddl.create_index("hstgrp", &IndexDef::new("hstgrp_1", &["name"]).unique())?;
    ddl.create_table(
        &TableDef::new("hosts_groups")
            .field(FieldDef::new("hostgroupid", FieldType::Id).not_null())
            .field(FieldDef::new("hostid", FieldType::Id).not_null())
            .field(FieldDef::new("groupid", FieldType::Id).not_null())
            .primary_key(&["hostgroupid"]),
    )?;

    if ctx.db().query_i64("SELECT COUNT(*) FROM hstgrp")?.unwrap_or(0) > 0 {
        return Ok(());
    }
    let groupid = ctx.next_id("hstgrp")?;
    ctx.execute(&format!(
        "INSERT INTO hstgrp (groupid, name) VALUES ({groupid}, 'Outpost servers')"
    ))?;
    let hostgroupid = ctx.next_id("hosts_groups")?;
    ctx.execute(&format!(
        "INSERT INTO hosts_groups (hostgroupid, hostid, groupid) \
         SELECT {hostgroupid}, hostid, {groupid} FROM hosts WHERE hostid = {}",
        crate::line60::SERVER_HOSTID
    ))?;
    log::debug!("Created default host group {groupid}");
    Ok(())
}
