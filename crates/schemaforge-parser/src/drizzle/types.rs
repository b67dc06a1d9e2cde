//! Drizzle column builder to SQL type names.

use schemaforge_core::ReferenceOption;

use super::ast::Expr;
use super::table::Dialect;

fn option_number(options: Option<&Expr>, key: &str) -> Option<i64> {
    match options?.get(key)? {
        Expr::Num(n) => Some(*n as i64),
        _ => None,
    }
}

fn with_length(base: &str, options: Option<&Expr>) -> String {
    match option_number(options, "length") {
        Some(length) => format!("{}({})", base, length),
        None => base.to_string(),
    }
}

fn with_precision(base: &str, options: Option<&Expr>) -> String {
    match (option_number(options, "precision"), option_number(options, "scale")) {
        (Some(precision), Some(scale)) => format!("{}({},{})", base, precision, scale),
        (Some(precision), None) => format!("{}({})", base, precision),
        _ => base.to_string(),
    }
}

/// SQL type for a Drizzle builder. Unknown builders pass through unchanged.
pub fn column_type(dialect: Dialect, builder: &str, options: Option<&Expr>) -> String {
    match dialect {
        Dialect::MySql => mysql_type(builder, options),
        Dialect::Postgres => postgres_type(builder, options),
    }
}

fn mysql_type(builder: &str, options: Option<&Expr>) -> String {
    match builder {
        "varchar" | "char" | "binary" | "varbinary" => with_length(builder, options),
        "decimal" => with_precision("decimal", options),
        other => other.to_string(),
    }
}

fn postgres_type(builder: &str, options: Option<&Expr>) -> String {
    match builder {
        "varchar" | "char" => with_length(builder, options),
        "numeric" | "decimal" => with_precision("numeric", options),
        "integer" | "int" => "integer".to_string(),
        "doublePrecision" => "double precision".to_string(),
        "timestamp" | "time" => {
            let base = match option_number(options, "precision") {
                Some(precision) => format!("{}({})", builder, precision),
                None => builder.to_string(),
            };
            let with_timezone = matches!(options.and_then(|o| o.get("withTimezone")), Some(Expr::Bool(true)));
            if with_timezone {
                format!("{} with time zone", base)
            } else {
                base
            }
        }
        other => other.to_string(),
    }
}

/// Drizzle's lowercase action names (`'cascade'`, `'set null'`, ...)
pub fn reference_option(action: Option<&str>) -> ReferenceOption {
    action.and_then(ReferenceOption::from_sql).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drizzle::parser::parse_expression;
    use pretty_assertions::assert_eq;

    fn options(source: &str) -> Expr {
        parse_expression(source).unwrap()
    }

    #[test]
    fn maps_mysql_types() {
        assert_eq!(column_type(Dialect::MySql, "varchar", Some(&options("{ length: 255 }"))), "varchar(255)");
        assert_eq!(column_type(Dialect::MySql, "varchar", None), "varchar");
        assert_eq!(
            column_type(Dialect::MySql, "decimal", Some(&options("{ precision: 10, scale: 2 }"))),
            "decimal(10,2)"
        );
        assert_eq!(column_type(Dialect::MySql, "int", None), "int");
    }

    #[test]
    fn maps_postgres_types() {
        assert_eq!(column_type(Dialect::Postgres, "integer", None), "integer");
        assert_eq!(column_type(Dialect::Postgres, "doublePrecision", None), "double precision");
        assert_eq!(
            column_type(Dialect::Postgres, "timestamp", Some(&options("{ withTimezone: true, mode: 'date' }"))),
            "timestamp with time zone"
        );
        assert_eq!(
            column_type(Dialect::Postgres, "numeric", Some(&options("{ precision: 8 }"))),
            "numeric(8)"
        );
    }

    #[test]
    fn maps_reference_actions() {
        assert_eq!(reference_option(Some("cascade")), ReferenceOption::Cascade);
        assert_eq!(reference_option(Some("set null")), ReferenceOption::SetNull);
        assert_eq!(reference_option(None), ReferenceOption::NoAction);
    }
}
