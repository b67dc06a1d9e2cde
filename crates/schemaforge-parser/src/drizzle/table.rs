//! Table, column and enum definitions extracted from Drizzle declarations.

use indexmap::IndexMap;
use schemaforge_core::{Constraint, DefaultValue};
use tracing::debug;

use super::ast::{Expr, MethodCall, Statement};

/// Target database of a Drizzle schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    pub fn table_factory(self) -> &'static str {
        match self {
            Dialect::MySql => "mysqlTable",
            Dialect::Postgres => "pgTable",
        }
    }

    pub fn schema_factory(self) -> &'static str {
        match self {
            Dialect::MySql => "mysqlSchema",
            Dialect::Postgres => "pgSchema",
        }
    }

    pub fn enum_factory(self) -> &'static str {
        match self {
            Dialect::MySql => "mysqlEnum",
            Dialect::Postgres => "pgEnum",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDef {
    /// Variable holding the referenced table
    pub table: String,
    /// Property name of the referenced column
    pub column: String,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Drizzle column builder name, or the enum it refers to
    pub type_name: String,
    pub options: Option<Expr>,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
    pub comment: Option<String>,
    pub references: Option<ReferenceDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    /// Property names
    pub columns: Vec<String>,
    pub unique: bool,
    pub index_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub schema_name: Option<String>,
    /// Keyed by property name
    pub columns: IndexMap<String, ColumnDef>,
    pub indexes: Vec<IndexDef>,
    /// Constraints with column names already resolved
    pub constraints: Vec<Constraint>,
    /// Property names of a composite primary key
    pub composite_primary_key: Option<Vec<String>>,
    pub comment: Option<String>,
}

impl TableDef {
    /// Database column name for a property, falling back to the property itself
    pub fn column_name<'a>(&'a self, property: &'a str) -> &'a str {
        self.columns.get(property).map(|c| c.name.as_str()).unwrap_or(property)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<String>,
}

/// Everything recognized in a module, keyed by declaring variable
#[derive(Debug, Default)]
pub struct DrizzleModule {
    pub tables: IndexMap<String, TableDef>,
    pub enums: IndexMap<String, EnumDef>,
}

impl DrizzleModule {
    /// Table name a variable refers to
    pub fn table_name<'a>(&'a self, variable: &'a str) -> &'a str {
        self.tables.get(variable).map(|t| t.name.as_str()).unwrap_or(variable)
    }
}

/// Collect table and enum declarations for `dialect`
pub fn extract(statements: &[Statement], dialect: Dialect) -> DrizzleModule {
    let mut module = DrizzleModule::default();
    let mut schemas: IndexMap<&str, String> = IndexMap::new();

    for statement in statements {
        let (variable, init) = match statement {
            Statement::Const { name, init, .. } => (Some(name.as_str()), init),
            Statement::ExportDefault(init) => (None, init),
        };

        if let Some((name, args)) = factory_call(init, &schemas, dialect.schema_factory(), "") {
            if let (Some(variable), None) = (variable, name) {
                if let Some(schema_name) = args.first().and_then(Expr::as_str) {
                    schemas.insert(variable, schema_name.to_string());
                }
            }
            continue;
        }

        if let Some((_, args)) = factory_call(init, &schemas, dialect.enum_factory(), "enum") {
            if let Some(definition) = enum_definition(args) {
                let key = variable.unwrap_or(definition.name.as_str()).to_string();
                module.enums.insert(key, definition);
            }
            continue;
        }

        let (root, methods) = init.method_chain();
        let Some((schema_name, args)) = factory_call(root, &schemas, dialect.table_factory(), "table") else {
            continue;
        };
        let Some(mut table) = table_definition(args, dialect, &mut module.enums) else {
            continue;
        };
        table.schema_name = schema_name.map(str::to_string);
        if let Some(comment) = methods
            .iter()
            .find(|m| m.name == "comment")
            .and_then(|m| m.args.first())
            .and_then(Expr::as_str)
        {
            table.comment = Some(comment.to_string());
        }

        debug!(table = %table.name, columns = table.columns.len(), "extracted drizzle table");
        let key = variable.unwrap_or(table.name.as_str()).to_string();
        module.tables.insert(key, table);
    }

    module
}

/// Match `factory(args)` or `<schemaVar>.<method>(args)`, returning the
/// schema name for the qualified form
fn factory_call<'a, 's>(
    expr: &'a Expr,
    schemas: &'s IndexMap<&str, String>,
    factory: &str,
    schema_method: &str,
) -> Option<(Option<&'s str>, &'a [Expr])> {
    let (callee, args) = expr.as_call()?;
    match callee {
        Expr::Ident(name) if name == factory => Some((None, args)),
        Expr::Member { object, property } if !schema_method.is_empty() && property == schema_method => {
            let schema = object.as_ident().and_then(|o| schemas.get(o))?;
            Some((Some(schema.as_str()), args))
        }
        _ => None,
    }
}

fn enum_definition(args: &[Expr]) -> Option<EnumDef> {
    let name = args.first()?.as_str()?.to_string();
    let Expr::Array(items) = args.get(1)? else {
        return None;
    };
    let values = items.iter().filter_map(Expr::as_str).map(str::to_string).collect();
    Some(EnumDef { name, values })
}

fn table_definition(args: &[Expr], dialect: Dialect, enums: &mut IndexMap<String, EnumDef>) -> Option<TableDef> {
    let name = args.first()?.as_str()?.to_string();
    // Columns may be given directly or through a `(t) => ({ ... })` builder
    let columns_expr = args.get(1)?.arrow_body();
    let Expr::Object(props) = columns_expr else {
        return None;
    };

    let mut columns = IndexMap::new();
    for prop in props {
        if let Some(column) = column_definition(&prop.key, &prop.value, dialect, enums) {
            columns.insert(prop.key.clone(), column);
        }
    }

    let mut table = TableDef {
        name,
        schema_name: None,
        columns,
        indexes: Vec::new(),
        constraints: Vec::new(),
        composite_primary_key: None,
        comment: None,
    };

    if let Some(extensions) = args.get(2) {
        apply_extensions(&mut table, extensions.arrow_body());
    }
    Some(table)
}

fn column_definition(
    property: &str,
    value: &Expr,
    dialect: Dialect,
    enums: &mut IndexMap<String, EnumDef>,
) -> Option<ColumnDef> {
    let (root, methods) = value.method_chain();
    let (callee, args) = root.as_call()?;
    let type_name = match callee {
        Expr::Ident(name) => name.clone(),
        // `t.varchar()` inside a column builder callback
        Expr::Member { property: builder, .. } => builder.clone(),
        _ => return None,
    };

    let name = args
        .first()
        .and_then(Expr::as_str)
        .unwrap_or(property)
        .to_string();
    let options = args.iter().find(|a| matches!(a, Expr::Object(_))).cloned();

    let mut column = ColumnDef {
        name,
        type_name,
        options,
        not_null: false,
        primary_key: false,
        unique: false,
        default: None,
        comment: None,
        references: None,
    };

    if dialect == Dialect::MySql && column.type_name == dialect.enum_factory() {
        if let Some(definition) = enum_definition(args) {
            column.type_name = definition.name.clone();
            enums.insert(definition.name.clone(), definition);
        }
    }

    let mut autoincrement = false;
    for method in &methods {
        match method.name {
            "primaryKey" => {
                column.primary_key = true;
                column.not_null = true;
            }
            "notNull" => column.not_null = true,
            "unique" => column.unique = true,
            "default" => column.default = method.args.first().and_then(default_value),
            "defaultNow" => column.default = Some(DefaultValue::String("now()".into())),
            "defaultRandom" => column.default = Some(DefaultValue::String("gen_random_uuid()".into())),
            "$defaultFn" | "$default" => column.default = Some(DefaultValue::String(runtime_function(method))),
            "autoincrement" => autoincrement = true,
            "references" => column.references = reference(method),
            "$comment" => {
                column.comment = method.args.first().and_then(Expr::as_str).map(str::to_string);
            }
            _ => {}
        }
    }

    let serial = matches!(column.type_name.as_str(), "serial" | "bigserial" | "smallserial");
    let auto_default = match dialect {
        Dialect::MySql => column.primary_key && ((column.type_name == "int" && autoincrement) || serial),
        Dialect::Postgres => serial,
    };
    if auto_default && column.default.is_none() {
        column.default = Some(DefaultValue::String("autoincrement()".into()));
    }

    Some(column)
}

/// Literal default, or the SQL text of a `sql` template
pub fn default_value(expr: &Expr) -> Option<DefaultValue> {
    match expr {
        Expr::Str(s) => Some(DefaultValue::String(s.clone())),
        Expr::Template(t) => Some(DefaultValue::String(t.raw.clone())),
        Expr::Bool(b) => Some(DefaultValue::Boolean(*b)),
        Expr::Num(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Some(DefaultValue::Integer(*n as i64)),
        Expr::Num(n) => Some(DefaultValue::Float(*n)),
        Expr::Call { .. } | Expr::TaggedTemplate { .. } => sql_text(expr).map(DefaultValue::String).or_else(|| {
            match expr.as_call() {
                Some((Expr::Ident(name), _)) => Some(DefaultValue::String(format!("{}()", name))),
                _ => None,
            }
        }),
        _ => None,
    }
}

/// Text of `` sql`...` `` or `sql('...')`
fn sql_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::TaggedTemplate { tag, template } if tag.as_ident() == Some("sql") => Some(template.raw.clone()),
        Expr::Call { callee, args } if callee.as_ident() == Some("sql") => {
            args.first().and_then(Expr::as_str).map(str::to_string)
        }
        _ => None,
    }
}

/// Name of the function an app-side default calls, e.g. `() => createId()`
fn runtime_function(method: &MethodCall<'_>) -> String {
    let body = method.args.first().map(Expr::arrow_body);
    match body {
        Some(Expr::Call { callee, .. }) => match callee.as_ref() {
            Expr::Ident(name) => format!("{}()", name),
            _ => "custom_function()".to_string(),
        },
        Some(Expr::New { callee, .. }) => match callee.as_ident() {
            Some(name) => format!("new {}()", name),
            None => "custom_function()".to_string(),
        },
        _ => "custom_function()".to_string(),
    }
}

/// `.references(() => table.column, { onDelete, onUpdate })`
fn reference(method: &MethodCall<'_>) -> Option<ReferenceDef> {
    let target = method.args.first()?;
    let Expr::Arrow { body, .. } = target else {
        return None;
    };
    let (table, column) = body.as_member_of_ident()?;
    let options = method.args.get(1);
    let action = |key: &str| options.and_then(|o| o.get(key)).and_then(Expr::as_str).map(str::to_string);
    Some(ReferenceDef {
        table: table.to_string(),
        column: column.to_string(),
        on_delete: action("onDelete"),
        on_update: action("onUpdate"),
    })
}

/// Property names referenced as `t.column` in `exprs`
fn column_refs(exprs: &[Expr]) -> Vec<String> {
    exprs
        .iter()
        .filter_map(Expr::as_member_of_ident)
        .map(|(_, column)| column.to_string())
        .collect()
}

/// Apply the third `mysqlTable`/`pgTable` argument: an object or array of
/// index, key and constraint builders
fn apply_extensions(table: &mut TableDef, body: &Expr) {
    let entries: Vec<(Option<&str>, &Expr)> = match body {
        Expr::Object(props) => props.iter().map(|p| (Some(p.key.as_str()), &p.value)).collect(),
        Expr::Array(items) => items.iter().map(|e| (None, e)).collect(),
        _ => return,
    };

    for (key, expr) in entries {
        let (root, methods) = expr.method_chain();
        let Some((Expr::Ident(builder), args)) = root.as_call() else {
            continue;
        };

        match builder.as_str() {
            "primaryKey" => {
                let columns = match args.first() {
                    Some(config @ Expr::Object(_)) => match config.get("columns") {
                        Some(Expr::Array(items)) => column_refs(items),
                        _ => Vec::new(),
                    },
                    _ => column_refs(args),
                };
                if !columns.is_empty() {
                    table.composite_primary_key = Some(columns);
                }
            }
            "index" | "uniqueIndex" => {
                let mut columns = Vec::new();
                let mut index_type = String::new();
                for method in &methods {
                    match method.name {
                        "on" => columns.extend(column_refs(method.args)),
                        "using" => {
                            if let Some(kind) = method.args.first().and_then(Expr::as_str) {
                                index_type = kind.to_string();
                            }
                            columns.extend(column_refs(method.args.get(1..).unwrap_or_default()));
                        }
                        _ => {}
                    }
                }
                if columns.is_empty() {
                    continue;
                }
                let name = args
                    .first()
                    .and_then(Expr::as_str)
                    .or(key)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_{}_index", table.name, columns.join("_")));
                table.indexes.push(IndexDef {
                    name,
                    columns,
                    unique: builder == "uniqueIndex",
                    index_type,
                });
            }
            "unique" => {
                let Some(on) = methods.iter().find(|m| m.name == "on") else {
                    continue;
                };
                let columns: Vec<String> = column_refs(on.args)
                    .iter()
                    .map(|p| table.column_name(p).to_string())
                    .collect();
                if columns.is_empty() {
                    continue;
                }
                let name = args
                    .first()
                    .and_then(Expr::as_str)
                    .or(key)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_{}_unique", table.name, columns.join("_")));
                table.constraints.push(Constraint::unique(name, columns));
            }
            "check" => {
                let Some(name) = args.first().and_then(Expr::as_str).or(key) else {
                    continue;
                };
                let condition = args.get(1).and_then(sql_text).unwrap_or_else(|| "true".to_string());
                table.constraints.push(Constraint::check(name, condition));
            }
            "foreignKey" => apply_foreign_key(table, args, &methods),
            _ => {}
        }
    }
}

/// `foreignKey({ columns: [t.a], foreignColumns: [other.id] }).onDelete('cascade')`
fn apply_foreign_key(table: &mut TableDef, args: &[Expr], methods: &[MethodCall<'_>]) {
    let Some(config) = args.first() else {
        return;
    };
    let members = |key: &str| match config.get(key) {
        Some(Expr::Array(items)) => items.iter().filter_map(Expr::as_member_of_ident).collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    let (Some((_, column)), Some((target_table, target_column))) =
        (members("columns").first().copied(), members("foreignColumns").first().copied())
    else {
        return;
    };
    let action = |name: &str| {
        methods
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.args.first())
            .and_then(Expr::as_str)
            .map(str::to_string)
    };
    if let Some(def) = table.columns.get_mut(column) {
        def.references = Some(ReferenceDef {
            table: target_table.to_string(),
            column: target_column.to_string(),
            on_delete: action("onDelete"),
            on_update: action("onUpdate"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drizzle::parser::parse_module;
    use pretty_assertions::assert_eq;

    fn module(source: &str, dialect: Dialect) -> DrizzleModule {
        let output = parse_module(source);
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        extract(&output.statements, dialect)
    }

    #[test]
    fn extracts_mysql_table_with_comment_and_inline_enum() {
        let module = module(
            r#"
            export const users = mysqlTable('users', {
              id: int('id').primaryKey().autoincrement(),
              email: varchar('email', { length: 255 }).notNull().unique(),
              status: mysqlEnum('status', ['active', 'inactive']).default('active'),
              createdAt: timestamp('created_at').defaultNow(),
            }).comment('Registered users');
            "#,
            Dialect::MySql,
        );

        let users = &module.tables["users"];
        assert_eq!(users.comment.as_deref(), Some("Registered users"));
        let id = &users.columns["id"];
        assert!(id.primary_key && id.not_null);
        assert_eq!(id.default, Some(DefaultValue::String("autoincrement()".into())));
        assert_eq!(users.columns["createdAt"].name, "created_at");
        assert_eq!(users.columns["status"].type_name, "status");
        assert_eq!(module.enums["status"].values, vec!["active", "inactive"]);
    }

    #[test]
    fn extracts_postgres_schema_tables_and_enums() {
        let module = module(
            r#"
            export const auth = pgSchema('auth');
            export const roleEnum = pgEnum('role', ['admin', 'member']);
            export const accounts = auth.table('accounts', {
              id: serial('id').primaryKey(),
              role: roleEnum('role').notNull(),
            });
            "#,
            Dialect::Postgres,
        );

        let accounts = &module.tables["accounts"];
        assert_eq!(accounts.schema_name.as_deref(), Some("auth"));
        assert_eq!(accounts.columns["role"].type_name, "roleEnum");
        assert_eq!(module.enums["roleEnum"].name, "role");
        assert_eq!(accounts.columns["id"].default, Some(DefaultValue::String("autoincrement()".into())));
    }

    #[test]
    fn extracts_extensions_in_both_forms() {
        let module = module(
            r#"
            const posts = mysqlTable('posts', {
              id: int('id'),
              authorId: int('author_id').references(() => users.id, { onDelete: 'cascade' }),
              slug: varchar('slug', { length: 64 }),
              price: int('price'),
            }, (t) => ({
              pk: primaryKey({ columns: [t.id, t.authorId] }),
              slugIdx: uniqueIndex('posts_slug_idx').on(t.slug),
              authorIdx: index('posts_author_idx').using('btree', t.authorId),
              slugUnique: unique('posts_slug_unique').on(t.slug),
              positive: check('price_positive', sql`${t.price} > 0`),
            }));
            const tags = mysqlTable('tags', { id: int() }, (t) => [index('tags_id_idx').on(t.id)]);
            "#,
            Dialect::MySql,
        );

        let posts = &module.tables["posts"];
        assert_eq!(posts.composite_primary_key, Some(vec!["id".to_string(), "authorId".to_string()]));
        assert_eq!(
            posts.indexes,
            vec![
                IndexDef {
                    name: "posts_slug_idx".into(),
                    columns: vec!["slug".into()],
                    unique: true,
                    index_type: String::new(),
                },
                IndexDef {
                    name: "posts_author_idx".into(),
                    columns: vec!["authorId".into()],
                    unique: false,
                    index_type: "btree".into(),
                },
            ]
        );
        assert_eq!(
            posts.constraints,
            vec![
                Constraint::unique("posts_slug_unique", vec!["slug".into()]),
                Constraint::check("price_positive", "${t.price} > 0"),
            ]
        );
        let reference = posts.columns["authorId"].references.as_ref().unwrap();
        assert_eq!((reference.table.as_str(), reference.column.as_str()), ("users", "id"));
        assert_eq!(reference.on_delete.as_deref(), Some("cascade"));

        assert_eq!(module.tables["tags"].indexes[0].name, "tags_id_idx");
    }

    #[test]
    fn check_accepts_sql_call_form() {
        let module = module(
            r#"
            const products = pgTable('products', {
              price: integer('price'),
            }, (t) => [
              check('price_positive', sql('price > 0')),
              check('price_cap', sql`price < 1000`),
            ]);
            "#,
            Dialect::Postgres,
        );
        assert_eq!(
            module.tables["products"].constraints,
            vec![
                Constraint::check("price_positive", "price > 0"),
                Constraint::check("price_cap", "price < 1000"),
            ]
        );
    }

    #[test]
    fn extension_arguments_in_any_order() {
        let module = module(
            r#"
            const posts = pgTable('posts', {
              id: integer('id'),
              revision: integer('revision'),
              authorId: integer('author_id').references(() => users.id, { onUpdate: 'restrict', onDelete: 'set null' }),
              editorId: integer('editor_id'),
              email: varchar('email'),
            }, (t) => ({
              pk: primaryKey({ name: 'posts_pk', columns: [t.id, t.revision] }),
              emailIdx: uniqueIndex('posts_email_idx').using('hash').on(t.email),
              editorFk: foreignKey({ foreignColumns: [users.id], columns: [t.editorId], name: 'posts_editor_fk' })
                .onUpdate('cascade')
                .onDelete('restrict'),
            }));
            "#,
            Dialect::Postgres,
        );
        let posts = &module.tables["posts"];

        assert_eq!(posts.composite_primary_key, Some(vec!["id".to_string(), "revision".to_string()]));
        assert_eq!(
            posts.indexes,
            vec![IndexDef {
                name: "posts_email_idx".into(),
                columns: vec!["email".into()],
                unique: true,
                index_type: "hash".into(),
            }]
        );

        let author = posts.columns["authorId"].references.as_ref().unwrap();
        assert_eq!(author.on_update.as_deref(), Some("restrict"));
        assert_eq!(author.on_delete.as_deref(), Some("set null"));

        let editor = posts.columns["editorId"].references.as_ref().unwrap();
        assert_eq!((editor.table.as_str(), editor.column.as_str()), ("users", "id"));
        assert_eq!(editor.on_update.as_deref(), Some("cascade"));
        assert_eq!(editor.on_delete.as_deref(), Some("restrict"));
    }

    #[test]
    fn runtime_defaults() {
        let module = module(
            r#"
            const items = pgTable('items', {
              id: varchar('id').$defaultFn(() => createId()),
              at: timestamp('at', { withTimezone: true }).$defaultFn(() => new Date()),
              n: integer('n').default(-3),
              raw: text('raw').default(sql`'x'::text`),
            });
            "#,
            Dialect::Postgres,
        );
        let items = &module.tables["items"];
        assert_eq!(items.columns["id"].default, Some(DefaultValue::String("createId()".into())));
        assert_eq!(items.columns["at"].default, Some(DefaultValue::String("new Date()".into())));
        assert_eq!(items.columns["n"].default, Some(DefaultValue::Integer(-3)));
        assert_eq!(items.columns["raw"].default, Some(DefaultValue::String("'x'::text".into())));
    }
}
