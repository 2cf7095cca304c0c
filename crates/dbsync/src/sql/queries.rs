//! Data-provider queries.
//!
//! Range queries bind the offset through named parameters; key-set queries
//! inline the key literals, since their size is bounded by the window.

use crate::core::key::KeyTuple;
use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::error::Result;

use super::condition::range_condition;
use super::params::BoundQuery;

/// Table alias used by key-set queries.
pub const ROW_ALIAS: &str = "a";

/// Alias of the derived table in the greatest-key query.
const WINDOW_ALIAS: &str = "w";

fn field_list(dialect: &dyn Dialect, fields: &[String], alias: Option<&str>) -> String {
    fields
        .iter()
        .map(|f| dialect.quote_field(f, alias))
        .collect::<Vec<_>>()
        .join(", ")
}

fn range_query(
    dialect: &dyn Dialect,
    key_fields: &[String],
    lower: Option<&KeyTuple>,
    upper: Option<&KeyTuple>,
) -> Result<(String, BoundQuery)> {
    let built = range_condition(key_fields, lower, upper, 0)?;
    let quote = |f: &str| dialect.quote_ident(f);
    let where_sql = built.condition.to_sql(&quote);
    Ok((where_sql, BoundQuery::new("", built.condition.params())))
}

/// `SELECT keys FROM t WHERE lower < key <= upper ORDER BY keys`
pub fn keys_in_range(
    dialect: &dyn Dialect,
    table: &str,
    key_fields: &[String],
    lower: Option<&KeyTuple>,
    upper: Option<&KeyTuple>,
) -> Result<BoundQuery> {
    let (where_sql, mut query) = range_query(dialect, key_fields, lower, upper)?;
    let fields = field_list(dialect, key_fields, None);
    query.sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        fields,
        dialect.quote_table(table),
        where_sql,
        fields
    );
    Ok(query)
}

/// `SELECT COUNT(*) FROM t WHERE lower < key <= upper`
pub fn row_count_in_range(
    dialect: &dyn Dialect,
    table: &str,
    key_fields: &[String],
    lower: Option<&KeyTuple>,
    upper: Option<&KeyTuple>,
) -> Result<BoundQuery> {
    let (where_sql, mut query) = range_query(dialect, key_fields, lower, upper)?;
    query.sql = format!(
        "SELECT COUNT(*) AS row_count FROM {} WHERE {}",
        dialect.quote_table(table),
        where_sql
    );
    Ok(query)
}

/// Key of the `limit`-th row after `offset`: the first `limit` keys in
/// ascending order, of which the greatest is returned.
pub fn greatest_key_at_limit(
    dialect: &dyn Dialect,
    table: &str,
    key_fields: &[String],
    limit: usize,
    offset: Option<&KeyTuple>,
) -> Result<BoundQuery> {
    let (where_sql, mut query) = range_query(dialect, key_fields, offset, None)?;
    let fields = field_list(dialect, key_fields, None);
    let outer = field_list(dialect, key_fields, Some(WINDOW_ALIAS));
    let outer_desc = key_fields
        .iter()
        .map(|f| format!("{} DESC", dialect.quote_field(f, Some(WINDOW_ALIAS))))
        .collect::<Vec<_>>()
        .join(", ");
    query.sql = format!(
        "SELECT {} FROM (SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT {}) AS {} ORDER BY {} LIMIT 1",
        outer,
        fields,
        dialect.quote_table(table),
        where_sql,
        fields,
        limit,
        dialect.quote_ident(WINDOW_ALIAS),
        outer_desc
    );
    Ok(query)
}

/// Condition matching exactly the given key tuples. `None` for an empty set.
pub fn key_set_condition(
    dialect: &dyn Dialect,
    key_fields: &[String],
    keys: &[KeyTuple],
    alias: Option<&str>,
) -> Option<String> {
    if keys.is_empty() || key_fields.is_empty() {
        return None;
    }

    if let [field] = key_fields {
        let values: Vec<String> = keys
            .iter()
            .filter_map(|k| k.get(field))
            .map(|v| dialect.quote_value(&v.to_sql()))
            .collect();
        if values.is_empty() {
            return None;
        }
        return Some(format!(
            "{} IN ({})",
            dialect.quote_field(field, alias),
            values.join(", ")
        ));
    }

    let terms: Vec<String> = keys
        .iter()
        .map(|k| format!("({})", dialect.key_equals(k, alias)))
        .collect();
    Some(terms.join(" OR "))
}

/// Keys plus fingerprint of the value fields, for the given key set.
pub fn hashed_values_for_keys(
    dialect: &dyn Dialect,
    table: &str,
    key_fields: &[String],
    value_fields: &[String],
    keys: &[KeyTuple],
) -> Option<String> {
    let condition = key_set_condition(dialect, key_fields, keys, Some(ROW_ALIAS))?;
    Some(format!(
        "SELECT {}, {} AS row_hash FROM {} AS {} WHERE {}",
        field_list(dialect, key_fields, Some(ROW_ALIAS)),
        dialect.fingerprint_expr(value_fields, Some(ROW_ALIAS)),
        dialect.quote_table(table),
        dialect.quote_ident(ROW_ALIAS),
        condition
    ))
}

/// Writable columns of `table` for the given key set, ordered by key.
pub fn rows_for_keys(dialect: &dyn Dialect, table: &Table, keys: &[KeyTuple]) -> Option<String> {
    let condition = key_set_condition(dialect, &table.primary_key, keys, Some(ROW_ALIAS))?;
    let columns = table
        .columns
        .iter()
        .filter(|c| !c.is_generated)
        .map(|c| dialect.select_column(c, Some(ROW_ALIAS)))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "SELECT {} FROM {} AS {} WHERE {} ORDER BY {}",
        columns,
        dialect.quote_table(&table.name),
        dialect.quote_ident(ROW_ALIAS),
        condition,
        field_list(dialect, &table.primary_key, Some(ROW_ALIAS))
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::KeyValue;
    use crate::core::schema::Column;
    use crate::drivers::mysql::MysqlDialect;
    use crate::drivers::postgres::PostgresDialect;

    fn key_fields() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn test_keys_in_range_open_bounds() {
        let q = keys_in_range(&MysqlDialect::mysql(), "t", &key_fields(), None, None).unwrap();
        assert_eq!(q.sql, "SELECT `a`, `b` FROM `t` WHERE 1=1 ORDER BY `a`, `b`");
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_count_with_both_bounds() {
        let lower = KeyTuple::from_pairs([("a", 1), ("b", 2)]);
        let upper = KeyTuple::from_pairs([("a", 3), ("b", 4)]);
        let q = row_count_in_range(
            &MysqlDialect::mysql(),
            "t",
            &key_fields(),
            Some(&lower),
            Some(&upper),
        )
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) AS row_count FROM `t` WHERE (`a` > :p0 OR `a` = :p0 AND (`b` > :p1)) \
             AND (`a` < :p2 OR `a` = :p2 AND (`b` <= :p3))"
        );
        assert_eq!(q.params.len(), 4);
    }

    #[test]
    fn test_greatest_key_query() {
        let offset = KeyTuple::from_pairs([("id", 10)]);
        let q = greatest_key_at_limit(
            &PostgresDialect::new("public"),
            "items",
            &["id".to_string()],
            1000,
            Some(&offset),
        )
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"w\".\"id\" FROM (SELECT \"id\" FROM \"public\".\"items\" WHERE \"id\" > :p0 \
             ORDER BY \"id\" LIMIT 1000) AS \"w\" ORDER BY \"w\".\"id\" DESC LIMIT 1"
        );
        assert_eq!(q.params, vec![("p0".to_string(), KeyValue::Int(10))]);
    }

    #[test]
    fn test_key_set_single_field_uses_in() {
        let keys = vec![
            KeyTuple::from_pairs([("id", 1)]),
            KeyTuple::from_pairs([("id", "x'y")]),
        ];
        let cond =
            key_set_condition(&MysqlDialect::mysql(), &["id".to_string()], &keys, Some("a"));
        assert_eq!(cond.as_deref(), Some("`a`.`id` IN (1, 'x\\'y')"));
    }

    #[test]
    fn test_key_set_composite_uses_or_of_ands() {
        let keys = vec![
            KeyTuple::from_pairs([("a", 1), ("b", 2)]),
            KeyTuple::from_pairs([("a", 1), ("b", 3)]),
        ];
        let cond = key_set_condition(&MysqlDialect::mysql(), &key_fields(), &keys, None);
        assert_eq!(
            cond.as_deref(),
            Some("(`a` = 1 AND `b` = 2) OR (`a` = 1 AND `b` = 3)")
        );
    }

    #[test]
    fn test_empty_key_set_issues_no_query() {
        let d = MysqlDialect::mysql();
        assert!(hashed_values_for_keys(&d, "t", &key_fields(), &["v".to_string()], &[]).is_none());
        let table = Table::new("db", "t")
            .with_column(Column::new("a", "int"))
            .with_column(Column::new("b", "int"))
            .with_primary_key(["a", "b"]);
        assert!(rows_for_keys(&d, &table, &[]).is_none());
    }

    #[test]
    fn test_rows_for_keys_selects_text_for_undecodable_columns() {
        let table = Table::new("public", "t")
            .with_column(Column::new("id", "integer"))
            .with_column(Column::new("mood", "USER-DEFINED"))
            .with_primary_key(["id"]);
        let keys = vec![KeyTuple::from_pairs([("id", 7)])];
        let sql = rows_for_keys(&PostgresDialect::new("public"), &table, &keys).unwrap();
        assert_eq!(
            sql,
            "SELECT \"a\".\"id\", CAST(\"a\".\"mood\" AS TEXT) AS \"mood\" \
             FROM \"public\".\"t\" AS \"a\" WHERE \"a\".\"id\" IN (7) ORDER BY \"a\".\"id\""
        );
    }
}
