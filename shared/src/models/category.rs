//! Category Model
//!
//! 分类树：只存 parent_id 单向引用，子节点列表通过索引查询派生，
//! 不在实体间保存双向引用。

use serde::{Deserialize, Serialize};

/// Category entity — a node in the catalog tree addressed by `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCreate {
    pub name: String,
    pub parent_id: Option<i64>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
}

/// Tree view assembled in memory from a flat category list.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// Build the forest from a flat list (arena-style: index by id, attach
    /// children to parents, roots are nodes whose parent is absent).
    pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
        use std::collections::HashMap;

        let ids: std::collections::HashSet<i64> = categories.iter().map(|c| c.id).collect();
        let mut children_of: HashMap<Option<i64>, Vec<Category>> = HashMap::new();
        for c in categories {
            // Orphans (parent deleted) surface as roots instead of vanishing
            let key = match c.parent_id {
                Some(p) if ids.contains(&p) => Some(p),
                _ => None,
            };
            children_of.entry(key).or_default().push(c);
        }
        for list in children_of.values_mut() {
            list.sort_by_key(|c| (c.sort_order, c.id));
        }

        fn attach(
            parent: Option<i64>,
            children_of: &mut HashMap<Option<i64>, Vec<Category>>,
        ) -> Vec<CategoryNode> {
            children_of
                .remove(&parent)
                .unwrap_or_default()
                .into_iter()
                .map(|c| {
                    let id = c.id;
                    CategoryNode {
                        category: c,
                        children: attach(Some(id), children_of),
                    }
                })
                .collect()
        }

        attach(None, &mut children_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, parent: Option<i64>, sort: i64) -> Category {
        Category {
            id,
            name: format!("c{id}"),
            parent_id: parent,
            sort_order: sort,
            is_active: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn builds_nested_tree() {
        let tree = CategoryNode::build_tree(vec![
            cat(1, None, 0),
            cat(2, Some(1), 0),
            cat(3, Some(1), 1),
            cat(4, Some(2), 0),
        ]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].category.id, 2);
        assert_eq!(tree[0].children[0].children[0].category.id, 4);
    }

    #[test]
    fn orphans_become_roots() {
        let tree = CategoryNode::build_tree(vec![cat(1, None, 0), cat(5, Some(99), 0)]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn siblings_sorted_by_sort_order() {
        let tree = CategoryNode::build_tree(vec![
            cat(1, None, 0),
            cat(2, Some(1), 2),
            cat(3, Some(1), 1),
        ]);
        let ids: Vec<i64> = tree[0].children.iter().map(|n| n.category.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
