//! Recognition of the textual queries adapters accept.
//!
//! The vocabulary is closed: a query either scans a whole table or it is
//! unsupported. There is no general SQL parsing here.

/// Shape of a textual query after structural matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryShape {
    /// `SELECT * FROM <table>`
    ScanAll { table: String },
    Unsupported,
}

impl QueryShape {
    /// Match `sql` against the recognized shapes.
    ///
    /// Keywords are case-insensitive, tokens are whitespace separated and one
    /// trailing `;` is tolerated.
    pub fn parse(sql: &str) -> Self {
        let trimmed = sql.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        match tokens.as_slice() {
            [select, "*", from, table]
                if select.eq_ignore_ascii_case("select")
                    && from.eq_ignore_ascii_case("from")
                    && is_identifier(table) =>
            {
                QueryShape::ScanAll {
                    table: (*table).to_string(),
                }
            }
            _ => QueryShape::Unsupported,
        }
    }
}

/// Table names are plain identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The scan query for `table`, as repositories issue it.
pub fn scan_all(table: &str) -> String {
    format!("SELECT * FROM {}", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(table: &str) -> QueryShape {
        QueryShape::ScanAll {
            table: table.to_string(),
        }
    }

    #[test]
    fn recognizes_select_star() {
        assert_eq!(QueryShape::parse("SELECT * FROM users"), scan("users"));
        assert_eq!(QueryShape::parse("  select *  from   api_keys ; "), scan("api_keys"));
        assert_eq!(QueryShape::parse(&scan_all("projects")), scan("projects"));
    }

    #[test]
    fn everything_else_is_unsupported() {
        for sql in [
            "DROP TABLE users",
            "SELECT id FROM users",
            "SELECT * FROM users WHERE id = 1",
            "SELECT * FROM users; DROP TABLE users",
            "SELECT * FROM 1users",
            "SELECT * FROM public.users",
            "",
        ] {
            assert_eq!(QueryShape::parse(sql), QueryShape::Unsupported, "{sql}");
        }
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("users"));
        assert!(is_identifier("_tmp2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("users;"));
        assert!(!is_identifier("a-b"));
    }
}
