//! Idempotent apply transform
//!
//! Rewrites the first `CREATE <kind>` of a definition into
//! `CREATE OR ALTER <kind>` so the script succeeds whether or not the object
//! already exists.

use once_cell::sync::Lazy;
use regex::Regex;

static CREATE_OR_ALTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bCREATE\s+OR\s+ALTER\b").expect("valid regex"));

static CREATE_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bCREATE\s+(PROCEDURE|PROC|FUNCTION|VIEW|TRIGGER)\b").expect("valid regex")
});

pub fn prepare_for_idempotent_apply(definition: &str) -> String {
    if CREATE_OR_ALTER.is_match(definition) {
        return definition.to_string();
    }
    CREATE_OBJECT
        .replacen(definition, 1, "CREATE OR ALTER ${1}")
        .into_owned()
}
