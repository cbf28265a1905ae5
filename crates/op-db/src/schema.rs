//! Backend-agnostic schema definitions consumed by the DDL layer.

/// Logical column type, mapped to a concrete SQL type by each dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit identifier
    Id,
    /// 32-bit signed integer
    Int,
    /// Unsigned 64-bit integer
    UInt,
    /// Double precision float
    Float,
    /// Variable length string with a maximum length
    Char(u32),
    /// Unbounded text
    Text,
    /// Binary data
    Blob,
}

/// Column default value
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub default: Option<DefaultValue>,
    pub not_null: bool,
}

impl FieldDef {
    /// Nullable column without a default
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            default: None,
            not_null: false,
        }
    }

    /// Mark the column `NOT NULL`
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Attach a default value
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// Referential action for `ON DELETE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkAction {
    Cascade,
    SetNull,
    Restrict,
}

impl FkAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            FkAction::Cascade => "CASCADE",
            FkAction::SetNull => "SET NULL",
            FkAction::Restrict => "RESTRICT",
        }
    }
}

/// Foreign key definition
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub fields: Vec<String>,
    pub ref_table: String,
    pub ref_fields: Vec<String>,
    pub on_delete: Option<FkAction>,
}

impl ForeignKeyDef {
    pub fn new(name: &str, fields: &[&str], ref_table: &str, ref_fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ref_table: ref_table.to_string(),
            ref_fields: ref_fields.iter().map(|f| f.to_string()).collect(),
            on_delete: None,
        }
    }

    pub fn on_delete(mut self, action: FkAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Table definition
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn primary_key(mut self, fields: &[&str]) -> Self {
        self.primary_key = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }
}

/// A change to an existing table that some backends can only apply by
/// rebuilding the table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableChange {
    ModifyType(FieldDef),
    SetDefault(FieldDef),
    DropDefault(String),
    SetNotNull(String),
    DropNotNull(String),
    AddForeignKey(ForeignKeyDef),
    DropForeignKey(ForeignKeyDef),
}

impl TableChange {
    /// Short operation name for logs and `Unsupported` errors
    pub fn operation(&self) -> &'static str {
        match self {
            TableChange::ModifyType(_) => "modify_field_type",
            TableChange::SetDefault(_) => "set_default",
            TableChange::DropDefault(_) => "drop_default",
            TableChange::SetNotNull(_) => "set_not_null",
            TableChange::DropNotNull(_) => "drop_not_null",
            TableChange::AddForeignKey(_) => "add_foreign_key",
            TableChange::DropForeignKey(_) => "drop_foreign_key",
        }
    }
}

/// Column as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as the backend reports it
    pub data_type: String,
    pub not_null: bool,
    /// Default expression as raw SQL
    pub default: Option<String>,
}

/// Explicit index as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    /// Statement that recreates the index
    pub sql: String,
}

/// Foreign key as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub fields: Vec<String>,
    pub ref_table: String,
    pub ref_fields: Vec<String>,
    /// Raw `ON DELETE` action, `None` for the backend default
    pub on_delete: Option<String>,
}

impl ForeignKeyInfo {
    /// Whether this catalog entry implements `def`.
    ///
    /// Not every backend keeps constraint names, so keys are matched on the
    /// referencing columns and the referenced table.
    pub fn matches(&self, def: &ForeignKeyDef) -> bool {
        self.ref_table.eq_ignore_ascii_case(&def.ref_table)
            && self.fields.len() == def.fields.len()
            && self
                .fields
                .iter()
                .zip(&def.fields)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl From<&ForeignKeyDef> for ForeignKeyInfo {
    fn from(def: &ForeignKeyDef) -> Self {
        Self {
            fields: def.fields.clone(),
            ref_table: def.ref_table.clone(),
            ref_fields: def.ref_fields.clone(),
            on_delete: def.on_delete.map(|a| a.as_sql().to_string()),
        }
    }
}
