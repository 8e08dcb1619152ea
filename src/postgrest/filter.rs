//! Filter expressions for table queries

/// One predicate in a PostgREST query string
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Equal to
    Eq(String, String),

    /// Like (case insensitive), `%` is the wildcard
    ILike(String, String),

    /// Greater than or equal to
    Gte(String, String),

    /// Less than or equal to
    Lte(String, String),

    /// Any of the nested predicates
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq<T: ToString>(column: &str, value: T) -> Self {
        Filter::Eq(column.to_string(), value.to_string())
    }

    pub fn ilike(column: &str, pattern: &str) -> Self {
        Filter::ILike(column.to_string(), pattern.to_string())
    }

    pub fn gte<T: ToString>(column: &str, value: T) -> Self {
        Filter::Gte(column.to_string(), value.to_string())
    }

    pub fn lte<T: ToString>(column: &str, value: T) -> Self {
        Filter::Lte(column.to_string(), value.to_string())
    }

    /// The operator's string representation
    pub fn operator(&self) -> &'static str {
        match self {
            Filter::Eq(..) => "eq",
            Filter::ILike(..) => "ilike",
            Filter::Gte(..) => "gte",
            Filter::Lte(..) => "lte",
            Filter::Or(_) => "or",
        }
    }

    /// Encode as a top-level query pair, `column=op.value`
    pub fn to_pair(&self) -> (String, String) {
        match self {
            Filter::Eq(column, value)
            | Filter::ILike(column, value)
            | Filter::Gte(column, value)
            | Filter::Lte(column, value) => {
                (column.clone(), format!("{}.{}", self.operator(), value))
            }
            Filter::Or(filters) => ("or".to_string(), format!("({})", Self::join(filters))),
        }
    }

    /// Encode inside a logical group, `column.op.value`
    fn to_nested(&self) -> String {
        match self {
            Filter::Eq(column, value)
            | Filter::ILike(column, value)
            | Filter::Gte(column, value)
            | Filter::Lte(column, value) => {
                format!("{}.{}.{}", column, self.operator(), quote_reserved(value))
            }
            Filter::Or(filters) => format!("or({})", Self::join(filters)),
        }
    }

    fn join(filters: &[Filter]) -> String {
        filters
            .iter()
            .map(Filter::to_nested)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Values inside `or=(...)` must be double-quoted when they contain
/// PostgREST's reserved characters.
fn quote_reserved(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ':']) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
