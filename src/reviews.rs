//! Reviews collaborator seam: the catalogue only ever needs the approved
//! scores for a product to recompute its rating.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[async_trait]
pub trait ReviewsProvider: Send + Sync {
    async fn approved_scores(&self, product_id: Uuid) -> Result<Vec<i32>>;
}

/// Reads the reviews table the collaborator writes to.
pub struct PgReviews {
    pool: PgPool,
}

impl PgReviews {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewsProvider for PgReviews {
    async fn approved_scores(&self, product_id: Uuid) -> Result<Vec<i32>> {
        let scores: Vec<(i32,)> = sqlx::query_as(
            "SELECT score FROM product_reviews WHERE product_id = $1 AND status = 'approved'",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(scores.into_iter().map(|(s,)| s).collect())
    }
}
