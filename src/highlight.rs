//! T-SQL tokenizer for syntax highlighting
//!
//! Each token class has its own pattern and all of them run over the whole
//! text. Overlapping candidates are resolved by class priority, then the
//! kept spans are sorted and the gaps filled with plain text, so the
//! segments always cover the input exactly once.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Plain,
    Keyword,
    String,
    Comment,
    Number,
    Variable,
    SystemVariable,
    Identifier,
}

impl TokenKind {
    /// Lower wins when candidates overlap
    fn priority(&self) -> u8 {
        match self {
            TokenKind::Comment => 0,
            TokenKind::String => 1,
            TokenKind::SystemVariable => 2,
            TokenKind::Variable => 3,
            TokenKind::Identifier => 4,
            TokenKind::Keyword => 5,
            TokenKind::Number => 6,
            TokenKind::Plain => 7,
        }
    }
}

/// A typed span of the input; `start..end` are byte offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightedSegment {
    pub start: usize,
    pub end: usize,
    pub kind: TokenKind,
    pub text: String,
}

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // DDL
        "CREATE", "ALTER", "DROP", "TRUNCATE", "TABLE", "VIEW", "INDEX", "PROCEDURE", "PROC",
        "FUNCTION", "TRIGGER", "SCHEMA", "DATABASE", "CONSTRAINT", "PRIMARY", "FOREIGN", "KEY",
        "REFERENCES", "UNIQUE", "CHECK", "DEFAULT", "IDENTITY", "CLUSTERED", "NONCLUSTERED",
        // DML
        "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "INTO", "VALUES", "FROM", "WHERE", "SET",
        "OUTPUT", "INSERTED", "DELETED",
        // Clauses
        "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "ON", "AND", "OR", "NOT", "IN",
        "EXISTS", "BETWEEN", "LIKE", "IS", "NULL", "AS", "CASE", "WHEN", "THEN", "ELSE", "END",
        "GROUP", "BY", "HAVING", "ORDER", "ASC", "DESC", "TOP", "DISTINCT", "ALL", "UNION",
        "INTERSECT", "EXCEPT", "WITH", "OVER", "PARTITION", "ROW_NUMBER", "RANK", "DENSE_RANK",
        // Control flow
        "IF", "BEGIN", "WHILE", "BREAK", "CONTINUE", "RETURN", "GOTO", "WAITFOR", "TRY", "CATCH",
        "THROW", "RAISERROR",
        // Transactions
        "TRANSACTION", "TRAN", "COMMIT", "ROLLBACK", "SAVE", "SAVEPOINT",
        // Statements
        "DECLARE", "EXEC", "EXECUTE", "PRINT", "USE", "GO",
        // Types
        "INT", "BIGINT", "SMALLINT", "TINYINT", "BIT", "DECIMAL", "NUMERIC", "MONEY", "SMALLMONEY",
        "FLOAT", "REAL", "DATETIME", "DATETIME2", "DATE", "TIME", "SMALLDATETIME", "DATETIMEOFFSET",
        "CHAR", "VARCHAR", "TEXT", "NCHAR", "NVARCHAR", "NTEXT", "BINARY", "VARBINARY", "IMAGE",
        "UNIQUEIDENTIFIER", "XML", "CURSOR", "SQL_VARIANT", "TIMESTAMP", "ROWVERSION",
        // Hints and cursors
        "NOCOUNT", "NOLOCK", "ROWLOCK", "TABLOCK", "HOLDLOCK", "UPDLOCK", "XLOCK", "FETCH", "NEXT",
        "PRIOR", "FIRST", "LAST", "ABSOLUTE", "RELATIVE", "OPEN", "CLOSE", "DEALLOCATE", "FOR",
        "READONLY", "OUT", "MAX",
    ]
    .into_iter()
    .collect()
});

struct Matcher {
    kind: TokenKind,
    regex: Regex,
}

static MATCHERS: Lazy<Vec<Matcher>> = Lazy::new(|| {
    [
        (TokenKind::Comment, r"(?s)/\*.*?\*/"),
        (TokenKind::Comment, r"(?m)--.*$"),
        (TokenKind::String, r"(?:\bN)?'(?:[^']|'')*'"),
        (TokenKind::SystemVariable, r"@@[A-Za-z_][A-Za-z0-9_]*"),
        (TokenKind::Variable, r"@[A-Za-z_][A-Za-z0-9_]*"),
        (TokenKind::Identifier, r#"\[[^\]\r\n]+\]|"[^"\r\n]*""#),
        (TokenKind::Number, r"\b\d+\.?\d*\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| Matcher {
        kind,
        regex: Regex::new(pattern).expect("valid token pattern"),
    })
    .collect()
});

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("valid word pattern"));

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(word.to_ascii_uppercase().as_str())
}

fn candidates(text: &str) -> Vec<(usize, usize, TokenKind)> {
    let mut found: Vec<(usize, usize, TokenKind)> = MATCHERS
        .iter()
        .flat_map(|m| m.regex.find_iter(text).map(move |hit| (hit.start(), hit.end(), m.kind)))
        .collect();

    found.extend(WORD.find_iter(text).map(|hit| {
        let kind = if is_keyword(hit.as_str()) {
            TokenKind::Keyword
        } else {
            TokenKind::Plain
        };
        (hit.start(), hit.end(), kind)
    }));

    found
}

/// Split `text` into ordered, gap-free, non-overlapping segments
pub fn tokenize(text: &str) -> Vec<HighlightedSegment> {
    if text.is_empty() {
        return vec![HighlightedSegment {
            start: 0,
            end: 0,
            kind: TokenKind::Plain,
            text: String::new(),
        }];
    }

    let mut found = candidates(text);
    found.sort_by_key(|&(start, _, kind)| (kind.priority(), start));

    // start -> (end, kind) of accepted spans
    let mut kept: BTreeMap<usize, (usize, TokenKind)> = BTreeMap::new();
    for (start, end, kind) in found {
        let blocked = kept
            .range(..end)
            .next_back()
            .is_some_and(|(_, &(kept_end, _))| kept_end > start);
        if !blocked {
            kept.insert(start, (end, kind));
        }
    }

    let mut segments = Vec::with_capacity(kept.len() * 2 + 1);
    let mut pos = 0;
    let mut push = |start: usize, end: usize, kind: TokenKind| {
        segments.push(HighlightedSegment {
            start,
            end,
            kind,
            text: text[start..end].to_string(),
        });
    };

    for (start, (end, kind)) in kept {
        if start > pos {
            push(pos, start, TokenKind::Plain);
        }
        push(start, end, kind);
        pos = end;
    }
    if pos < text.len() {
        push(pos, text.len(), TokenKind::Plain);
    }

    segments
}
