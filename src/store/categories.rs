//! Category tree store: path allocation, visibility propagation and the
//! cached full-slug lookups.

use std::collections::HashMap;

use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::category::{
    self, child_path, full_slug, step, Category,
};
use crate::error::{Result, ShopError};
use crate::slug::slugify;

pub struct NewCategory {
    pub name: String,
    pub slug: Option<String>,
    pub description: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub image: Option<String>,
    pub is_public: bool,
}

/// URL slugs cached by (locale, id). Populated lazily, never expired;
/// renames and moves do not invalidate entries unless callers do so
/// explicitly, so stale slugs are possible by design.
#[derive(Default)]
pub struct UrlCache {
    entries: RwLock<HashMap<(String, Uuid), String>>,
}

impl UrlCache {
    pub fn get(&self, locale: &str, id: Uuid) -> Option<String> {
        self.entries.read().get(&(locale.to_string(), id)).cloned()
    }

    pub fn insert(&self, locale: &str, id: Uuid, slug: String) {
        self.entries.write().insert((locale.to_string(), id), slug);
    }

    pub fn invalidate(&self, id: Uuid) {
        self.entries.write().retain(|(_, key_id), _| *key_id != id);
    }
}

pub struct CategoryStore {
    pool: PgPool,
    url_cache: UrlCache,
}

impl CategoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            url_cache: UrlCache::default(),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ShopError::NotFound("category"))
    }

    pub async fn list(&self) -> Result<Vec<Category>> {
        Ok(
            sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY path")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Inserts a node under `parent` (or as a new root). The next free
    /// step comes from the highest existing sibling path, not the child
    /// count: deleting a middle sibling leaves a gap in `numchild` that
    /// must never be re-issued while a later sibling still holds its
    /// step. The parent row lock serializes concurrent sibling inserts.
    pub async fn insert(&self, new: NewCategory, parent: Option<Uuid>) -> Result<Category> {
        let mut tx = self.pool.begin().await?;

        let (path, depth, ancestors_are_public) = match parent {
            Some(parent_id) => {
                let parent: Category =
                    sqlx::query_as("SELECT * FROM categories WHERE id = $1 FOR UPDATE")
                        .bind(parent_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .ok_or(ShopError::NotFound("parent category"))?;
                let last: Option<(String,)> = sqlx::query_as(
                    "SELECT path FROM categories WHERE path LIKE $1 || '%' AND depth = $2 \
                     ORDER BY path DESC LIMIT 1",
                )
                .bind(&parent.path)
                .bind(parent.depth + 1)
                .fetch_optional(&mut *tx)
                .await?;
                let position = category::next_position(last.as_ref().map(|(p,)| p.as_str()))
                    .ok_or_else(|| {
                        ShopError::Conflict(format!("corrupt child path under {:?}", parent.path))
                    })?;
                sqlx::query("UPDATE categories SET numchild = numchild + 1 WHERE id = $1")
                    .bind(parent_id)
                    .execute(&mut *tx)
                    .await?;
                (
                    child_path(&parent.path, position),
                    parent.depth + 1,
                    parent.ancestors_are_public && parent.is_public,
                )
            }
            None => {
                // Serialized by the unique path index; last root step + 1.
                let last: Option<(String,)> = sqlx::query_as(
                    "SELECT path FROM categories WHERE depth = 1 ORDER BY path DESC LIMIT 1 FOR UPDATE",
                )
                .fetch_optional(&mut *tx)
                .await?;
                let position = category::next_position(last.as_ref().map(|(p,)| p.as_str()))
                    .ok_or_else(|| ShopError::Conflict("corrupt root path".to_string()))?;
                (step(position), 1, true)
            }
        };

        let slug = match new.slug {
            Some(s) if !s.is_empty() => s,
            _ => slugify(&new.name),
        };
        let created: Category = sqlx::query_as(
            "INSERT INTO categories \
             (id, path, depth, numchild, name, slug, description, meta_title, meta_description, image, is_public, ancestors_are_public) \
             VALUES ($1, $2, $3, 0, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&path)
        .bind(depth)
        .bind(&new.name)
        .bind(&slug)
        .bind(&new.description)
        .bind(&new.meta_title)
        .bind(&new.meta_description)
        .bind(&new.image)
        .bind(new.is_public)
        .bind(ancestors_are_public)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Sets the node's own flag and recomputes `ancestors_are_public` for
    /// the node and its whole descendant subtree in one pre-order pass.
    pub async fn set_public(&self, id: Uuid, value: bool) -> Result<Category> {
        let mut tx = self.pool.begin().await?;
        let node: Category = sqlx::query_as("SELECT * FROM categories WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ShopError::NotFound("category"))?;

        sqlx::query("UPDATE categories SET is_public = $2 WHERE id = $1")
            .bind(id)
            .bind(value)
            .execute(&mut *tx)
            .await?;

        // Whether everything strictly above the subtree root is public.
        // Root nodes are publicly reachable by definition.
        let above_is_public: (bool,) = sqlx::query_as(
            "SELECT COALESCE(BOOL_AND(is_public), TRUE) FROM categories \
             WHERE $1 LIKE path || '%' AND depth < $2",
        )
        .bind(&node.path)
        .bind(node.depth)
        .fetch_one(&mut *tx)
        .await?;

        let mut subtree: Vec<Category> = sqlx::query_as(
            "SELECT * FROM categories WHERE path LIKE $1 || '%' ORDER BY path",
        )
        .bind(&node.path)
        .fetch_all(&mut *tx)
        .await?;
        if let Some(root) = subtree.first_mut() {
            root.is_public = value;
        }
        let changed = category::propagate_visibility(&mut subtree, above_is_public.0);
        for changed_id in &changed {
            let flag = subtree
                .iter()
                .find(|c| c.id == *changed_id)
                .map(|c| c.ancestors_are_public)
                .unwrap_or(true);
            sqlx::query("UPDATE categories SET ancestors_are_public = $2 WHERE id = $1")
                .bind(changed_id)
                .bind(flag)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::debug!(category = %id, value, updated = changed.len(), "visibility propagated");
        self.get(id).await
    }

    /// Maintenance pass over the whole table: repairs paths, depths and
    /// child counts, then re-establishes visibility per root. Meant to run
    /// out-of-band, not per request.
    pub async fn fix_tree(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut nodes: Vec<Category> =
            sqlx::query_as("SELECT * FROM categories ORDER BY path FOR UPDATE")
                .fetch_all(&mut *tx)
                .await?;
        let before: HashMap<Uuid, (String, i32, i32, bool)> = nodes
            .iter()
            .map(|n| {
                (
                    n.id,
                    (n.path.clone(), n.depth, n.numchild, n.ancestors_are_public),
                )
            })
            .collect();

        category::rebuild_tree(&mut nodes);

        // Two-phase path swap keeps the unique index happy mid-repair.
        let mut repaired = 0u64;
        let dirty: Vec<&Category> = nodes
            .iter()
            .filter(|n| {
                before.get(&n.id).map(|(p, d, c, a)| {
                    (p.as_str(), *d, *c, *a)
                        != (n.path.as_str(), n.depth, n.numchild, n.ancestors_are_public)
                }) == Some(true)
            })
            .collect();
        for node in &dirty {
            sqlx::query("UPDATE categories SET path = '*' || $2 WHERE id = $1")
                .bind(node.id)
                .bind(&node.path)
                .execute(&mut *tx)
                .await?;
        }
        for node in &dirty {
            sqlx::query(
                "UPDATE categories SET path = $2, depth = $3, numchild = $4, ancestors_are_public = $5 \
                 WHERE id = $1",
            )
            .bind(node.id)
            .bind(&node.path)
            .bind(node.depth)
            .bind(node.numchild)
            .bind(node.ancestors_are_public)
            .execute(&mut *tx)
            .await?;
            repaired += 1;
        }
        tx.commit().await?;
        if repaired > 0 {
            tracing::warn!(repaired, "fix_tree repaired category rows");
        }
        Ok(repaired)
    }

    /// Root-to-self ancestor chain (or root-to-parent without self).
    pub async fn ancestors(&self, id: Uuid, include_self: bool) -> Result<Vec<Category>> {
        let node = self.get(id).await?;
        let max_depth = if include_self {
            node.depth
        } else {
            node.depth - 1
        };
        Ok(sqlx::query_as(
            "SELECT * FROM categories WHERE $1 LIKE path || '%' AND depth <= $2 ORDER BY path",
        )
        .bind(&node.path)
        .bind(max_depth)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Subtree in path order, i.e. pre-order.
    pub async fn descendants(&self, id: Uuid, include_self: bool) -> Result<Vec<Category>> {
        let node = self.get(id).await?;
        let min_depth = if include_self {
            node.depth
        } else {
            node.depth + 1
        };
        Ok(sqlx::query_as(
            "SELECT * FROM categories WHERE path LIKE $1 || '%' AND depth >= $2 ORDER BY path",
        )
        .bind(&node.path)
        .bind(min_depth)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Slash-joined ancestor slugs plus the node's own, cached per
    /// (locale, id). Cache hits skip the ancestor lookup entirely, so a
    /// renamed ancestor may yield a stale slug until the entry is
    /// explicitly invalidated.
    pub async fn full_slug(&self, id: Uuid, locale: &str) -> Result<String> {
        if let Some(cached) = self.url_cache.get(locale, id) {
            return Ok(cached);
        }
        let chain = self.ancestors(id, true).await?;
        if chain.is_empty() {
            return Err(ShopError::NotFound("category"));
        }
        let slug = full_slug(&chain);
        self.url_cache.insert(locale, id, slug.clone());
        Ok(slug)
    }

    pub fn invalidate_url_cache(&self, id: Uuid) {
        self.url_cache.invalidate(id);
    }

    /// Removes the node and its whole subtree, releasing the parent's
    /// child count.
    pub async fn delete(&self, id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let node: Category = sqlx::query_as("SELECT * FROM categories WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ShopError::NotFound("category"))?;
        let removed = sqlx::query("DELETE FROM categories WHERE path LIKE $1 || '%'")
            .bind(&node.path)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if let Some(parent) = category::parent_path(&node.path) {
            sqlx::query("UPDATE categories SET numchild = numchild - 1 WHERE path = $1")
                .bind(parent)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        self.invalidate_url_cache(id);
        Ok(removed)
    }

    /// Products attached to the category, public ones only, newest first.
    /// Queried per request; no process-start snapshot.
    pub async fn products(&self, id: Uuid) -> Result<Vec<crate::domain::Product>> {
        Ok(sqlx::query_as(
            "SELECT p.* FROM products p \
             JOIN product_categories pc ON pc.product_id = p.id \
             WHERE pc.category_id = $1 AND p.is_public \
             ORDER BY p.date_created DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category::tests::node;

    #[test]
    fn url_cache_hits_skip_recomputation() {
        let cache = UrlCache::default();
        let chain = vec![
            node("0001", "a", true),
            node("00010001", "b", true),
            node("000100010001", "c", true),
        ];
        let leaf = chain[2].id;
        assert!(cache.get("en", leaf).is_none());
        cache.insert("en", leaf, full_slug(&chain));
        assert_eq!(cache.get("en", leaf).as_deref(), Some("a/b/c"));

        // Renaming the root does not touch the cache: the stale slug is
        // served until the entry is explicitly invalidated.
        assert_eq!(cache.get("en", leaf).as_deref(), Some("a/b/c"));
        cache.invalidate(leaf);
        assert!(cache.get("en", leaf).is_none());
    }

    #[test]
    fn url_cache_is_keyed_by_locale() {
        let cache = UrlCache::default();
        let id = uuid::Uuid::new_v4();
        cache.insert("en", id, "books".to_string());
        assert!(cache.get("de", id).is_none());
        assert_eq!(cache.get("en", id).as_deref(), Some("books"));
    }

    #[test]
    fn invalidate_clears_every_locale() {
        let cache = UrlCache::default();
        let id = uuid::Uuid::new_v4();
        cache.insert("en", id, "books".to_string());
        cache.insert("de", id, "buecher".to_string());
        cache.invalidate(id);
        assert!(cache.get("en", id).is_none());
        assert!(cache.get("de", id).is_none());
    }
}
