//! Category tree and categorization records

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A spending category; one level of nesting via `parent_category_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    /// Globally unique. Subcategories are stored as "{parent}: {name}".
    pub category_name: String,
    pub parent_category_id: Option<i64>,
    pub description: Option<String>,
}

impl Category {
    pub fn is_top_level(&self) -> bool {
        self.parent_category_id.is_none()
    }

    /// Name without the "{parent}: " prefix
    pub fn short_name(&self) -> &str {
        match (self.parent_category_id, self.category_name.split_once(": ")) {
            (Some(_), Some((_, short))) => short,
            _ => &self.category_name,
        }
    }
}

/// Stored name of a subcategory, keeping names globally unique
pub fn subcategory_display_name(parent_name: &str, subcategory_name: &str) -> String {
    format!("{}: {}", parent_name.trim(), subcategory_name.trim())
}

/// A top-level category together with its children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub category: Category,
    pub subcategories: Vec<Category>,
}

impl CategoryNode {
    /// Categories a transaction can be assigned to: the subcategories, or the
    /// top-level category itself when it has none
    pub fn leaves(&self) -> Vec<&Category> {
        if self.subcategories.is_empty() {
            vec![&self.category]
        } else {
            self.subcategories.iter().collect()
        }
    }
}

/// Flatten a tree into its assignable leaves, in tree order
pub fn leaf_categories(tree: &[CategoryNode]) -> Vec<Category> {
    tree.iter()
        .flat_map(|node| node.leaves().into_iter().cloned())
        .collect()
}

/// What a categorizer sees of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxDescriptor {
    pub id: Uuid,
    pub description: String,
    pub normalized_description: String,
    pub amount: rust_decimal::Decimal,
}

/// Outcome of one strategy for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub id: Uuid,
    /// Assigned leaf category (subcategory or childless top-level category)
    pub category_id: Option<i64>,
    /// Strategy-reported certainty in [0, 1]
    pub confidence: f64,
}

impl CategorizationResult {
    pub fn matched(id: Uuid, category_id: i64, confidence: f64) -> Self {
        Self {
            id,
            category_id: Some(category_id),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unmatched(id: Uuid) -> Self {
        Self {
            id,
            category_id: None,
            confidence: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.category_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, name: &str, parent: Option<i64>) -> Category {
        Category {
            id,
            category_name: name.into(),
            parent_category_id: parent,
            description: None,
        }
    }

    #[test]
    fn test_subcategory_name() {
        assert_eq!(subcategory_display_name("Food ", " Groceries"), "Food: Groceries");
        let sub = cat(2, "Food: Groceries", Some(1));
        assert_eq!(sub.short_name(), "Groceries");
        assert_eq!(cat(1, "Food", None).short_name(), "Food");
    }

    #[test]
    fn test_leaves() {
        let tree = vec![
            CategoryNode {
                category: cat(1, "Food", None),
                subcategories: vec![cat(2, "Food: Groceries", Some(1)), cat(3, "Food: Dining", Some(1))],
            },
            CategoryNode {
                category: cat(4, "Income", None),
                subcategories: vec![],
            },
        ];
        let ids: Vec<i64> = leaf_categories(&tree).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_confidence_clamped() {
        let r = CategorizationResult::matched(Uuid::new_v4(), 1, 1.7);
        assert_eq!(r.confidence, 1.0);
        assert!(!CategorizationResult::unmatched(Uuid::new_v4()).is_match());
    }
}
