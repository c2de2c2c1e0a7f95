//! Catalogue store: product lookups, ordered images, ranked
//! recommendations and rating recomputation.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::product::{self, Product, ProductImage};
use crate::error::{Result, ShopError};
use crate::reviews::ReviewsProvider;
use crate::slug::slugify;

pub struct NewProduct {
    pub name: String,
    pub slug: Option<String>,
    pub price: i64,
    pub description: String,
    pub sku: String,
    pub tags: String,
    pub is_public: bool,
    pub is_discountable: bool,
}

pub struct ProductStore {
    pool: PgPool,
}

impl ProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ShopError::NotFound("product"))
    }

    /// Slugs are not unique; duplicates tie-break on id ascending, which
    /// for v7 ids means the earliest-created product wins.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Product> {
        sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE slug = $1 ORDER BY id ASC LIMIT 1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ShopError::NotFound("product"))
    }

    pub async fn list_public(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, i64)> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_public ORDER BY date_created DESC LIMIT $1 OFFSET $2",
        )
        .bind(per_page as i64)
        .bind(((page - 1) * per_page) as i64)
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE is_public")
            .fetch_one(&self.pool)
            .await?;
        Ok((products, total.0))
    }

    pub async fn create(&self, new: NewProduct) -> Result<Product> {
        let slug = match new.slug {
            Some(s) if !s.is_empty() => s,
            _ => slugify(&new.name),
        };
        Ok(sqlx::query_as(
            "INSERT INTO products \
             (id, name, slug, price, description, sku, tags, is_public, is_discountable, date_created, date_updated) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(&slug)
        .bind(new.price)
        .bind(&new.description)
        .bind(&new.sku)
        .bind(&new.tags)
        .bind(new.is_public)
        .bind(new.is_discountable)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update(&self, id: Uuid, new: NewProduct) -> Result<Product> {
        let slug = match new.slug {
            Some(s) if !s.is_empty() => s,
            _ => slugify(&new.name),
        };
        sqlx::query_as(
            "UPDATE products SET name = $2, slug = $3, price = $4, description = $5, sku = $6, \
             tags = $7, is_public = $8, is_discountable = $9, date_updated = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&new.name)
        .bind(&slug)
        .bind(new.price)
        .bind(&new.description)
        .bind(&new.sku)
        .bind(&new.tags)
        .bind(new.is_public)
        .bind(new.is_discountable)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ShopError::NotFound("product"))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(ShopError::NotFound("product"));
        }
        Ok(())
    }

    pub async fn attach_category(&self, product_id: Uuid, category_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO product_categories (product_id, category_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(product_id)
        .bind(category_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Ascending display order; index zero is the primary image.
    pub async fn images(&self, product_id: Uuid) -> Result<Vec<ProductImage>> {
        Ok(sqlx::query_as(
            "SELECT * FROM product_images WHERE product_id = $1 ORDER BY display_order",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn primary_image(&self, product_id: Uuid) -> Result<Option<ProductImage>> {
        Ok(sqlx::query_as(
            "SELECT * FROM product_images WHERE product_id = $1 ORDER BY display_order LIMIT 1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// New images land at the end of the sequence.
    pub async fn add_image(
        &self,
        product_id: Uuid,
        original: &str,
        caption: &str,
    ) -> Result<ProductImage> {
        let mut tx = self.pool.begin().await?;
        let next: (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(display_order) + 1, 0)::BIGINT FROM product_images WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
        let image: ProductImage = sqlx::query_as(
            "INSERT INTO product_images (id, product_id, original, caption, display_order, date_created) \
             VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(product_id)
        .bind(original)
        .bind(caption)
        .bind(next.0 as i32)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(image)
    }

    /// Deletes an image and renumbers the survivors to a gap-free 0..n-1
    /// sequence, atomically with respect to concurrent readers.
    pub async fn delete_image(&self, image_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let deleted: Option<(Uuid,)> = sqlx::query_as(
            "DELETE FROM product_images WHERE id = $1 RETURNING product_id",
        )
        .bind(image_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (product_id,) = deleted.ok_or(ShopError::NotFound("image"))?;
        let remaining: Vec<ProductImage> = sqlx::query_as(
            "SELECT * FROM product_images WHERE product_id = $1 ORDER BY display_order FOR UPDATE",
        )
        .bind(product_id)
        .fetch_all(&mut *tx)
        .await?;
        for (id, order) in product::renumber_images(&remaining) {
            sqlx::query("UPDATE product_images SET display_order = $2 WHERE id = $1")
                .bind(id)
                .bind(order)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Ranked "related products": higher ranking first, id as a stable
    /// tie-break. Self-links are rejected by the schema.
    pub async fn recommendations(&self, product_id: Uuid) -> Result<Vec<Product>> {
        Ok(sqlx::query_as(
            "SELECT p.* FROM products p \
             JOIN product_recommendations r ON r.recommendation_id = p.id \
             WHERE r.primary_id = $1 \
             ORDER BY r.ranking DESC, p.id ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn recommend(
        &self,
        primary_id: Uuid,
        recommendation_id: Uuid,
        ranking: i16,
    ) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO product_recommendations (primary_id, recommendation_id, ranking) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (primary_id, recommendation_id) DO UPDATE SET ranking = EXCLUDED.ranking",
        )
        .bind(primary_id)
        .bind(recommendation_id)
        .bind(ranking)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23514") => Err(
                ShopError::Conflict("a product cannot recommend itself".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Recomputes and persists the rating from the reviews collaborator;
    /// zero approved reviews yields NULL, not an error.
    pub async fn update_rating(
        &self,
        product_id: Uuid,
        reviews: &dyn ReviewsProvider,
    ) -> Result<Option<f64>> {
        let scores = reviews.approved_scores(product_id).await?;
        let rating = product::calculate_rating(&scores);
        let done = sqlx::query("UPDATE products SET rating = $2, date_updated = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(rating)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(ShopError::NotFound("product"));
        }
        Ok(rating)
    }
}
