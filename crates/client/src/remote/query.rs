//! Row filters for the hosted REST layer, rendered as PostgREST query parameters.

use std::fmt::Display;

/// Collections exposed by the REST layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Companies,
    Clients,
    Prosthetists,
    Stages,
    Processes,
    ProcessStages,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Companies => "companies",
            Table::Clients => "clients",
            Table::Prosthetists => "prosthetists",
            Table::Stages => "stages",
            Table::Processes => "processes",
            Table::ProcessStages => "process_stages",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Lte(String, String),
    /// Case-insensitive substring match
    Contains(String, String),
    In(String, Vec<String>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Display) -> Self {
        Filter::Eq(column.to_string(), value.to_string())
    }

    pub fn lte(column: &str, value: impl Display) -> Self {
        Filter::Lte(column.to_string(), value.to_string())
    }

    pub fn contains(column: &str, term: &str) -> Self {
        Filter::Contains(column.to_string(), term.to_string())
    }

    pub fn any_of<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        Filter::In(
            column.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// `(name, value)` pair for use as a top-level query parameter
    fn to_param(&self) -> (String, String) {
        match self {
            Filter::Eq(col, v) => (col.clone(), format!("eq.{}", v)),
            Filter::Lte(col, v) => (col.clone(), format!("lte.{}", v)),
            Filter::Contains(col, term) => (col.clone(), format!("ilike.{}", pattern(term))),
            Filter::In(col, values) => (col.clone(), format!("in.({})", list(values))),
            Filter::Or(filters) => ("or".to_string(), format!("({})", nested(filters))),
        }
    }

    /// `column.op.value` form used inside `or=(...)`
    fn to_nested(&self) -> String {
        match self {
            Filter::Eq(col, v) => format!("{}.eq.{}", col, quote(v)),
            Filter::Lte(col, v) => format!("{}.lte.{}", col, quote(v)),
            Filter::Contains(col, term) => format!("{}.ilike.{}", col, quote(&pattern(term))),
            Filter::In(col, values) => format!("{}.in.({})", col, list(values)),
            Filter::Or(filters) => format!("or({})", nested(filters)),
        }
    }
}

fn nested(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(Filter::to_nested)
        .collect::<Vec<_>>()
        .join(",")
}

fn list(values: &[String]) -> String {
    values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(",")
}

// `*` is the URL-safe wildcard; literal ones in user input are dropped
fn pattern(term: &str) -> String {
    let cleaned: String = term.chars().filter(|c| *c != '*' && *c != '%').collect();
    format!("*{}*", cleaned)
}

// Values containing list/operator delimiters must be double-quoted
fn quote(value: &str) -> String {
    if value.contains([',', '.', ':', '(', ')', '"', '\\']) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A read/update/delete request against one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: Table,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Value of the first top-level `eq` filter on `column`
    pub fn eq_value(&self, column: &str) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            Filter::Eq(col, v) if col == column => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.iter().map(Filter::to_param));
        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn renders_tenant_filter_and_ordering() {
        let params = Query::from(Table::Clients)
            .eq("company_id", "co-1")
            .order("first_name", true)
            .to_params();

        assert_eq!(param(&params, "select"), Some("*"));
        assert_eq!(param(&params, "company_id"), Some("eq.co-1"));
        assert_eq!(param(&params, "order"), Some("first_name.asc"));
        assert_eq!(param(&params, "limit"), None);
    }

    #[test]
    fn renders_or_search_with_quoting() {
        let filter = Filter::or(vec![
            Filter::contains("first_name", "ana"),
            Filter::contains("cpf_cnpj", "123.456"),
        ]);
        let params = Query::from(Table::Clients).filter(filter).to_params();

        assert_eq!(
            param(&params, "or"),
            Some("(first_name.ilike.*ana*,cpf_cnpj.ilike.\"*123.456*\")")
        );
    }

    #[test]
    fn strips_wildcards_from_search_terms() {
        let params = Query::from(Table::Stages)
            .filter(Filter::contains("name", "pro*va%"))
            .to_params();
        assert_eq!(param(&params, "name"), Some("ilike.*prova*"));
    }

    #[test]
    fn renders_in_and_lte() {
        let params = Query::from(Table::ProcessStages)
            .filter(Filter::any_of("process_id", ["a", "b"]))
            .filter(Filter::lte("end_date", "2026-10-18"))
            .limit(10)
            .to_params();

        assert_eq!(param(&params, "process_id"), Some("in.(a,b)"));
        assert_eq!(param(&params, "end_date"), Some("lte.2026-10-18"));
        assert_eq!(param(&params, "limit"), Some("10"));
    }

    #[test]
    fn finds_eq_values() {
        let query = Query::from(Table::Stages).eq("id", 7).eq("company_id", "co-1");
        assert_eq!(query.eq_value("company_id"), Some("co-1"));
        assert_eq!(query.eq_value("id"), Some("7"));
        assert_eq!(query.eq_value("name"), None);
    }
}
