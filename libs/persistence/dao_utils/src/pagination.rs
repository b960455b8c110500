use tokio_postgres::types::ToSql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub limit: u64,
    pub offset: u64,
}

/// Clamps to the `bigint` range instead of wrapping negative.
fn to_bigint(value: u64) -> i64 { i64::try_from(value).unwrap_or(i64::MAX) }

impl PaginationParams {
    pub fn new(limit: u64, offset: u64) -> Self { Self { limit, offset } }

    /// Appends `order_by` and a `LIMIT/OFFSET` pair numbered after
    /// `existing_param_count` placeholders already used by `base_query`.
    pub fn build_query_parts(
        &self, base_query: &str, order_by: &str, existing_param_count: usize,
    ) -> (String, Vec<i64>) {
        let limit_param = existing_param_count + 1;
        let offset_param = existing_param_count + 2;
        let query = format!(
            "{base_query} {order_by} LIMIT ${limit_param} OFFSET \
             ${offset_param}"
        );

        (query, vec![to_bigint(self.limit), to_bigint(self.offset)])
    }
}

/// `ORDER BY` over an allow-listed column with `tiebreak` as a stable
/// secondary key. Callers must only pass trusted column names.
pub fn order_by_clause(column: &str, descending: bool, tiebreak: &str) -> String {
    let direction = if descending { "DESC" } else { "ASC" };
    if column == tiebreak {
        format!("ORDER BY {column} {direction}")
    }
    else {
        format!("ORDER BY {column} {direction}, {tiebreak} {direction}")
    }
}

pub fn create_param_refs<T: ToSql + Sync>(
    params: &[T],
) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_parts() {
        let params = PaginationParams::new(5, 10);
        let (query, values) = params.build_query_parts(
            "SELECT * FROM users",
            "ORDER BY id ASC",
            0,
        );
        assert_eq!(query, "SELECT * FROM users ORDER BY id ASC LIMIT $1 OFFSET $2");
        assert_eq!(values, vec![5, 10]);

        let (query, _) = params.build_query_parts("SELECT 1 WHERE a = $1", "", 1);
        assert!(query.ends_with("LIMIT $2 OFFSET $3"));
    }

    #[test]
    fn test_bounds_never_go_negative() {
        let params = PaginationParams::new(u64::MAX, u64::MAX);
        let (_, values) = params.build_query_parts("SELECT 1", "", 0);
        assert_eq!(values, vec![i64::MAX, i64::MAX]);
    }

    #[test]
    fn test_order_by_clause() {
        assert_eq!(order_by_clause("u.id", true, "u.id"), "ORDER BY u.id DESC");
        assert_eq!(
            order_by_clause("u.email", false, "u.id"),
            "ORDER BY u.email ASC, u.id ASC"
        );
    }
}
