use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlSafetyError;

const FENCE: &str = "```";

static MUTATING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|TRUNCATE)\b")
        .expect("keyword pattern is valid")
});

/// Removes one leading fence (with an optional `sql` tag).
fn strip_leading_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };
    match rest.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") => {
            let after = &rest[3..];
            match after.chars().next() {
                Some(c) if c.is_alphanumeric() || c == '_' => rest,
                _ => after,
            }
        }
        _ => rest,
    }
}

fn strip_trailing_fence(text: &str) -> &str {
    text.strip_suffix(FENCE).unwrap_or(text)
}

/// Cleans model output down to a statement and refuses mutating keywords.
pub fn sanitize(text: &str) -> Result<String, SqlSafetyError> {
    let statement = strip_leading_fence(text.trim());
    let statement = strip_trailing_fence(statement.trim_end()).trim();

    if statement.is_empty() {
        return Err(SqlSafetyError::EmptyStatement);
    }

    if let Some(found) = MUTATING_KEYWORD.find(statement) {
        return Err(SqlSafetyError::MutatingKeyword {
            keyword: found.as_str().to_ascii_uppercase(),
        });
    }

    Ok(statement.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sql_fence() {
        let cleaned = sanitize("```sql\nSELECT COUNT(*) AS n FROM data_table\n```").unwrap();
        assert_eq!(cleaned, "SELECT COUNT(*) AS n FROM data_table");
    }

    #[test]
    fn strips_bare_and_uppercase_fences() {
        assert_eq!(sanitize("```\nSELECT 1\n```").unwrap(), "SELECT 1");
        assert_eq!(sanitize("  ```SQL SELECT 1```  ").unwrap(), "SELECT 1");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(
            sanitize("  SELECT a FROM data_table  \n").unwrap(),
            "SELECT a FROM data_table"
        );
    }

    #[test]
    fn strips_only_one_fence_on_each_side() {
        let cleaned = sanitize("```sql\n```sql\nSELECT 1\n```\n```").unwrap();
        assert_eq!(cleaned, "```sql\nSELECT 1\n```");
    }

    #[test]
    fn does_not_eat_identifiers_starting_with_sql() {
        assert_eq!(
            sanitize("```sqlite_rows\n```").unwrap(),
            "sqlite_rows"
        );
    }

    #[test]
    fn rejects_drop_table_in_any_case() {
        for text in [
            "DROP TABLE data_table",
            "  drop table data_table;  ",
            "```sql\n\tDrOp\n   TaBlE data_table\n```",
            "SELECT 1; DROP TABLE data_table",
        ] {
            assert_eq!(
                sanitize(text),
                Err(SqlSafetyError::MutatingKeyword {
                    keyword: "DROP".to_string()
                })
            );
        }
    }

    #[test]
    fn rejects_every_mutating_keyword() {
        for keyword in ["insert", "Update", "DELETE", "alter", "create", "truncate"] {
            let text = format!("{} something", keyword);
            assert!(matches!(
                sanitize(&text),
                Err(SqlSafetyError::MutatingKeyword { .. })
            ));
        }
    }

    #[test]
    fn keywords_must_be_whole_tokens() {
        let sql = "SELECT created_at, updated_by, dropout FROM data_table";
        assert_eq!(sanitize(sql).unwrap(), sql);
    }

    #[test]
    fn empty_after_cleanup_is_refused() {
        assert_eq!(sanitize("```sql\n```"), Err(SqlSafetyError::EmptyStatement));
        assert_eq!(sanitize("   "), Err(SqlSafetyError::EmptyStatement));
    }
}
