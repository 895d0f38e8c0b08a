//! Object list search

use crate::compare::reconcile::ReconciledObject;

fn fold(text: &str) -> String {
    text.replace('_', " ").to_lowercase()
}

/// Every whitespace-separated term of `query` must occur in the schema or
/// the name. Underscores count as spaces on both sides.
pub fn matches_search(query: &str, schema: &str, name: &str) -> bool {
    let schema = fold(schema);
    let name = fold(name);
    fold(query)
        .split_whitespace()
        .all(|term| schema.contains(term) || name.contains(term))
}

pub fn is_visible(object: &ReconciledObject, query: &str, differences_only: bool) -> bool {
    (!differences_only || object.status.is_difference())
        && matches_search(query, &object.schema, &object.name)
}

/// "Showing N of M objects"
pub fn showing_label(visible: usize, total: usize) -> String {
    format!("Showing {} of {} objects", visible, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::reconcile::merge_catalogs;
    use crate::environment::catalog::CatalogEntry;

    #[test]
    fn test_get_order_query() {
        assert!(matches_search("get order", "dbo", "get_order_total"));
        assert!(!matches_search("get order", "dbo", "list_orders"));
    }

    #[test]
    fn test_terms_match_schema_or_name() {
        assert!(matches_search("sales total", "sales", "get_order_total"));
        assert!(matches_search("ORDER_TOTAL", "dbo", "get_order_total"));
        assert!(matches_search("", "dbo", "anything"));
        assert!(matches_search("   ", "dbo", "anything"));
    }

    #[test]
    fn test_differences_only() {
        let merged = merge_catalogs(
            &[
                CatalogEntry::new("dbo", "a", "VIEW"),
                CatalogEntry::new("dbo", "b", "VIEW"),
            ],
            &[CatalogEntry::new("dbo", "b", "VIEW")],
        );
        let visible: Vec<_> = merged.iter().filter(|o| is_visible(o, "", true)).collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "a");
        assert_eq!(showing_label(visible.len(), merged.len()), "Showing 1 of 2 objects");
    }
}
