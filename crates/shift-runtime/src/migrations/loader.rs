//! SQL-file migrations.
//!
//! Migrations are files named like `0001_create_users.sql`, sorted by name.
//! A line reading `-- @down` starts the revert section; everything before
//! it (after an optional `-- @up` line) is the apply section. A file with no
//! down section cannot be reverted.

use std::path::Path;

use shift_core::{Result, ShiftError};
use tracing::debug;

const UP_MARKER: &str = "-- @up";
const DOWN_MARKER: &str = "-- @down";

/// A migration read from a `.sql` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    /// File stem, e.g. `0001_create_users`.
    pub name: String,
    pub up: String,
    /// `None` when the file has no `-- @down` section.
    pub down: Option<String>,
}

impl SqlMigration {
    /// Parse the contents of one migration file.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let mut up = String::new();
        let mut down: Option<String> = None;

        for line in content.lines() {
            let marker = line.trim();
            if marker.eq_ignore_ascii_case(UP_MARKER) {
                continue;
            }
            if marker.eq_ignore_ascii_case(DOWN_MARKER) {
                down.get_or_insert_with(String::new);
                continue;
            }

            let section = match down.as_mut() {
                Some(down) => down,
                None => &mut up,
            };
            section.push_str(line);
            section.push('\n');
        }

        Self {
            name: name.into(),
            up: up.trim().to_string(),
            down: down.map(|d| d.trim().to_string()),
        }
    }
}

/// Load migrations from a directory, sorted by name.
///
/// A missing directory holds no migrations.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<SqlMigration>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "Migrations directory does not exist");
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().map_or(true, |e| e != "sql") {
            continue;
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ShiftError::Config(format!("Invalid migration filename: {}", path.display()))
            })?
            .to_string();

        let content = std::fs::read_to_string(&path)?;
        migrations.push(SqlMigration::parse(name, &content));
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(count = migrations.len(), dir = %dir.display(), "Loaded SQL migrations");
    Ok(migrations)
}

/// Split a script into statements on `;`.
///
/// Semicolons inside quoted strings, dollar-quoted bodies and comments do
/// not split. Statements holding only comments are dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut rest = sql;

    while let Some(c) = rest.chars().next() {
        let skip = if c == '$' {
            dollar_tag(rest).map(|tag| {
                has_code = true;
                tag.len() + rest[tag.len()..].find(tag).map_or(rest.len() - tag.len(), |end| end + tag.len())
            })
        } else if c == '\'' || c == '"' {
            has_code = true;
            Some(1 + rest[1..].find(c).map_or(rest.len() - 1, |end| end + 1))
        } else if rest.starts_with("--") {
            Some(rest.find('\n').map_or(rest.len(), |end| end + 1))
        } else if rest.starts_with("/*") {
            Some(2 + rest[2..].find("*/").map_or(rest.len() - 2, |end| end + 2))
        } else {
            None
        };

        if let Some(len) = skip {
            current.push_str(&rest[..len]);
            rest = &rest[len..];
            continue;
        }

        rest = &rest[c.len_utf8()..];
        if c == ';' {
            if has_code {
                statements.push(current.trim().to_string());
            }
            current.clear();
            has_code = false;
            continue;
        }

        has_code |= !c.is_whitespace();
        current.push(c);
    }

    if has_code {
        statements.push(current.trim().to_string());
    }

    statements
}

/// The dollar-quote delimiter at the start of `s` (`$$` or `$tag$`), if any.
fn dollar_tag(s: &str) -> Option<&str> {
    let body = s.strip_prefix('$')?;
    let end = body.find('$')?;
    let tag = &body[..end];

    let valid = tag.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !tag.starts_with(|c: char| c.is_ascii_digit());
    valid.then(|| &s[..end + 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_migrations_from_empty_dir() {
        let dir = TempDir::new().unwrap();
        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_from_nonexistent_dir() {
        let migrations = load_migrations_from_dir(Path::new("/nonexistent/path")).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_sorted() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("0002_second.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("0001_first.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("0003_third.sql"), "SELECT 3;").unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        let names: Vec<_> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["0001_first", "0002_second", "0003_third"]);
    }

    #[test]
    fn test_load_migrations_ignores_non_sql() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("0001_migration.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("readme.txt"), "Not a migration").unwrap();
        fs::write(dir.path().join("backup.sql.bak"), "Backup").unwrap();
        fs::create_dir(dir.path().join("0002_dir.sql")).unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].name, "0001_migration");
    }

    #[test]
    fn test_parse_up_and_down() {
        let m = SqlMigration::parse(
            "0001_users",
            "-- @up\nCREATE TABLE users (id INT);\n\n-- @down\nDROP TABLE users;\n",
        );
        assert_eq!(m.up, "CREATE TABLE users (id INT);");
        assert_eq!(m.down.as_deref(), Some("DROP TABLE users;"));
    }

    #[test]
    fn test_parse_without_down_is_irreversible() {
        let m = SqlMigration::parse("0001_users", "CREATE TABLE users (id INT);");
        assert_eq!(m.up, "CREATE TABLE users (id INT);");
        assert!(m.down.is_none());
    }

    #[test]
    fn test_parse_empty_down_is_reversible() {
        let m = SqlMigration::parse("0001_noop", "SELECT 1;\n-- @DOWN\n");
        assert_eq!(m.down.as_deref(), Some(""));
    }

    #[test]
    fn test_split_simple_statements() {
        let stmts = split_sql_statements("SELECT 1; SELECT 2; SELECT 3;");
        assert_eq!(stmts, ["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_last_statement_without_semicolon() {
        let stmts = split_sql_statements("SELECT 1;\nSELECT 2");
        assert_eq!(stmts, ["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_split_with_dollar_quoted_function() {
        let sql = r#"
CREATE FUNCTION test() RETURNS void AS $$
BEGIN
    SELECT 1;
    SELECT 2;
END;
$$ LANGUAGE plpgsql;

SELECT 3;
"#;
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("CREATE FUNCTION"));
        assert!(stmts[0].contains("$$ LANGUAGE plpgsql"));
        assert_eq!(stmts[1], "SELECT 3");
    }

    #[test]
    fn test_split_with_tagged_dollar_quote() {
        let sql = "DO $body$ BEGIN PERFORM 1; END $body$; SELECT $1::int;";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts, ["DO $body$ BEGIN PERFORM 1; END $body$", "SELECT $1::int"]);
    }

    #[test]
    fn test_split_ignores_semicolons_in_strings_and_comments() {
        let sql = "INSERT INTO t VALUES ('a;b', 'it''s');\n-- trailing; comment\nSELECT 1 /* x; y */;";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t VALUES ('a;b', 'it''s')");
        assert!(stmts[1].ends_with("SELECT 1 /* x; y */"));
    }

    #[test]
    fn test_split_drops_comment_only_statements() {
        let stmts = split_sql_statements("-- nothing here;\n;\n  ;SELECT 1;");
        assert_eq!(stmts, ["SELECT 1"]);
    }
}
