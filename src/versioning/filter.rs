//! Inclusion filter for raw DDL events
//!
//! Only interactive edits of code objects become versions. The same rules
//! are rendered as T-SQL predicates for the log query and evaluated in
//! process for each returned row.

use crate::config::IngestionConfig;
use crate::db::queries::SqlBuilder;
use crate::versioning::model::RawChangeEvent;
use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct IngestionFilter {
    object_kinds: Vec<String>,
    program_pattern: String,
    temp_name_patterns: Vec<String>,
    excluded_events: Vec<String>,
    /// `program_pattern` compiled for in-process checks
    program: Option<LikePattern>,
    temp_names: Vec<LikePattern>,
}

/// Why an event was left out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ObjectKind,
    Program,
    TempName,
    ExcludedEvent,
}

impl IngestionFilter {
    pub fn from_config(config: &IngestionConfig) -> Self {
        let program = if config.program_pattern.is_empty() {
            None
        } else {
            compile_like(&config.program_pattern)
        };

        Self {
            object_kinds: config.object_kinds.iter().map(|k| k.to_ascii_uppercase()).collect(),
            program_pattern: config.program_pattern.clone(),
            temp_name_patterns: config.temp_name_patterns.clone(),
            excluded_events: config
                .excluded_events
                .iter()
                .map(|e| e.to_ascii_uppercase())
                .collect(),
            program,
            temp_names: config
                .temp_name_patterns
                .iter()
                .filter_map(|p| compile_like(p))
                .collect(),
        }
    }

    pub fn check(&self, event: &RawChangeEvent) -> Result<(), Rejection> {
        if !self.object_kinds.is_empty()
            && !self
                .object_kinds
                .iter()
                .any(|k| k.eq_ignore_ascii_case(event.object_kind.trim()))
        {
            return Err(Rejection::ObjectKind);
        }

        if !self.program_pattern.is_empty() {
            let program = event.actor.program.as_deref().unwrap_or("");
            let matched = self.program.as_ref().map_or(true, |p| p.is_match(program));
            if event.actor.program.is_none() || !matched {
                return Err(Rejection::Program);
            }
        }

        if self.temp_names.iter().any(|p| p.is_match(&event.object_name)) {
            return Err(Rejection::TempName);
        }

        if self
            .excluded_events
            .iter()
            .any(|e| e.eq_ignore_ascii_case(event.event_kind.trim()))
        {
            return Err(Rejection::ExcludedEvent);
        }

        Ok(())
    }

    pub fn accepts(&self, event: &RawChangeEvent) -> bool {
        self.check(event).is_ok()
    }

    /// T-SQL predicates appended to the audit log query, each prefixed with `AND`
    pub fn sql_predicates(&self) -> String {
        let mut sql = String::new();

        if !self.object_kinds.is_empty() {
            sql.push_str(&format!(
                " AND ObjectType IN ({})",
                SqlBuilder::literal_list(&self.object_kinds)
            ));
        }
        if !self.program_pattern.is_empty() {
            sql.push_str(&format!(
                " AND ProgramName LIKE {}",
                SqlBuilder::quote_literal(&self.program_pattern)
            ));
        }
        for pattern in &self.temp_name_patterns {
            sql.push_str(&format!(
                " AND ObjectName NOT LIKE {}",
                SqlBuilder::quote_literal(pattern)
            ));
        }
        if !self.excluded_events.is_empty() {
            sql.push_str(&format!(
                " AND EventType NOT IN ({})",
                SqlBuilder::literal_list(&self.excluded_events)
            ));
        }

        sql
    }
}

/// Case-insensitive SQL `LIKE` pattern: `%` any run, `_` one character,
/// `[abc]` / `[a-z]` / `[^abc]` character sets.
///
/// Translated once into an anchored regex, so matching is linear in the
/// length of the value.
#[derive(Debug, Clone)]
pub struct LikePattern {
    regex: Regex,
}

impl LikePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&like_to_regex(pattern))?,
        })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// A pattern that fails to compile is still applied by the log query
fn compile_like(pattern: &str) -> Option<LikePattern> {
    match LikePattern::new(pattern) {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            warn!("LIKE pattern '{}' is only applied server side: {}", pattern, e);
            None
        }
    }
}

fn like_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?is)^");
    let mut buf = [0u8; 4];

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(len) if len > 0 => {
                    out.push('[');
                    for (n, &c) in chars[i + 1..i + 1 + len].iter().enumerate() {
                        match c {
                            '^' if n == 0 => out.push('^'),
                            '-' => out.push('-'),
                            c => out.push_str(&regex::escape(c.encode_utf8(&mut buf))),
                        }
                    }
                    out.push(']');
                    i += len + 2;
                    continue;
                }
                _ => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
        i += 1;
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::model::Actor;
    use chrono::Utc;

    fn event(kind: &str, name: &str, program: Option<&str>, event_kind: &str) -> RawChangeEvent {
        RawChangeEvent {
            sequence_id: 1,
            environment: "Sales".into(),
            event_kind: event_kind.into(),
            object_kind: kind.into(),
            schema: "dbo".into(),
            object_name: name.into(),
            command_text: String::new(),
            actor: Actor {
                login: "jdoe".into(),
                host: "WS042".into(),
                ip: None,
                program: program.map(String::from),
            },
            occurred_at: Utc::now(),
        }
    }

    const SSMS: Option<&str> = Some("Microsoft SQL Server Management Studio - Query");

    fn like_match(pattern: &str, value: &str) -> bool {
        LikePattern::new(pattern).unwrap().is_match(value)
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like_match("%Management Studio%", "Microsoft SQL Server Management Studio"));
        assert!(like_match("tmp_%", "tmp_orders"));
        assert!(like_match("tmp_%", "tmpX"));
        assert!(!like_match("tmp_%", "tmp"));
        assert!(like_match("#%", "#scratch"));
        assert!(like_match("T_FT_%", "t_ft_orders"));
        assert!(like_match("[a-c]x", "bx"));
        assert!(!like_match("[^a-c]x", "bx"));
        assert!(!like_match("abc", "abcd"));
    }

    #[test]
    fn test_like_regex_metacharacters_are_literal() {
        assert!(like_match("a.b", "A.B"));
        assert!(!like_match("a.b", "axb"));
        assert!(like_match("(tmp)+%", "(tmp)+orders"));
        assert!(like_match("[%]%", "%done"));
        assert!(!like_match("[%]%", "done"));
        assert!(like_match("[]x", "[]x"));
        assert!(like_match("50$", "50$"));
    }

    #[test]
    fn test_like_many_wildcards_on_long_value() {
        let pattern = LikePattern::new("%a%a%a%a%a%a%b").unwrap();
        assert!(!pattern.is_match(&"a".repeat(40)));
        assert!(!pattern.is_match(&"a".repeat(20_000)));
        assert!(pattern.is_match(&format!("{}b", "a".repeat(20_000))));
    }

    #[test]
    fn test_uncompilable_pattern_is_skipped_in_process() {
        let config = IngestionConfig {
            temp_name_patterns: vec!["[z-a]%".to_string(), "tmp%".to_string()],
            ..IngestionConfig::default()
        };
        let filter = IngestionFilter::from_config(&config);
        assert_eq!(filter.temp_names.len(), 1);
        assert_eq!(
            filter.check(&event("VIEW", "tmp_orders", SSMS, "CREATE_VIEW")),
            Err(Rejection::TempName)
        );
        assert!(filter.sql_predicates().contains("ObjectName NOT LIKE N'[z-a]%'"));
    }

    #[test]
    fn test_default_filter_accepts_interactive_procedure_edit() {
        let filter = IngestionFilter::from_config(&IngestionConfig::default());
        assert!(filter.accepts(&event("PROCEDURE", "get_order_total", SSMS, "ALTER_PROCEDURE")));
        assert!(filter.accepts(&event("SQL_TRIGGER", "trg_audit", SSMS, "CREATE_TRIGGER")));
    }

    #[test]
    fn test_default_filter_rejections() {
        let filter = IngestionFilter::from_config(&IngestionConfig::default());
        assert_eq!(
            filter.check(&event("TABLE", "orders", SSMS, "ALTER_TABLE")),
            Err(Rejection::ObjectKind)
        );
        assert_eq!(
            filter.check(&event("PROCEDURE", "p", Some("SQLAgent - Job Manager"), "ALTER_PROCEDURE")),
            Err(Rejection::Program)
        );
        assert_eq!(
            filter.check(&event("PROCEDURE", "p", None, "ALTER_PROCEDURE")),
            Err(Rejection::Program)
        );
        assert_eq!(
            filter.check(&event("VIEW", "t_temp_x", SSMS, "CREATE_VIEW")),
            Err(Rejection::TempName)
        );
        assert_eq!(
            filter.check(&event("VIEW", "v", SSMS, "UPDATE_STATISTICS")),
            Err(Rejection::ExcludedEvent)
        );
    }

    #[test]
    fn test_sql_predicates() {
        let filter = IngestionFilter::from_config(&IngestionConfig::default());
        let sql = filter.sql_predicates();
        assert!(sql.contains("ObjectType IN (N'PROCEDURE'"));
        assert!(sql.contains("ProgramName LIKE N'%Management Studio%'"));
        assert!(sql.contains("ObjectName NOT LIKE N'#%'"));
        assert!(sql.contains("EventType NOT IN (N'UPDATE_STATISTICS')"));
    }
}
