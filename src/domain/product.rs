//! Catalogue products, their ordered images and ranked recommendations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    /// Smallest currency unit. No tax or discount arithmetic happens here.
    pub price: i64,
    pub description: String,
    pub sku: String,
    pub tags: String,
    pub is_public: bool,
    pub is_discountable: bool,
    pub rating: Option<f64>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub original: String,
    pub caption: String,
    pub display_order: i32,
    pub date_created: DateTime<Utc>,
}

impl ProductImage {
    /// Display order zero marks the primary image.
    pub fn is_primary(&self) -> bool {
        self.display_order == 0
    }
}

/// Renumbers images to a gap-free 0..n-1 sequence, keeping their relative
/// order. Runs after every deletion; returns (id, new_order) for the rows
/// that actually moved.
pub fn renumber_images(images: &[ProductImage]) -> Vec<(Uuid, i32)> {
    images
        .iter()
        .enumerate()
        .filter(|(idx, img)| img.display_order != *idx as i32)
        .map(|(idx, img)| (img.id, idx as i32))
        .collect()
}

/// Average score over approved reviews; `None` when there are none.
pub fn calculate_rating(scores: &[i32]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let sum: i64 = scores.iter().map(|&s| s as i64).sum();
    Some(sum as f64 / scores.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(order: i32) -> ProductImage {
        ProductImage {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            original: format!("product/{order}.jpg"),
            caption: String::new(),
            display_order: order,
            date_created: Utc::now(),
        }
    }

    #[test]
    fn renumber_closes_gaps() {
        // A,B,C at 0,1,2; B deleted leaves 0,2.
        let remaining = vec![image(0), image(2)];
        let moves = renumber_images(&remaining);
        assert_eq!(moves, vec![(remaining[1].id, 1)]);
    }

    #[test]
    fn renumber_is_noop_when_contiguous() {
        let imgs = vec![image(0), image(1), image(2)];
        assert!(renumber_images(&imgs).is_empty());
    }

    #[test]
    fn renumber_preserves_relative_order() {
        let remaining = vec![image(3), image(7), image(9)];
        let moves = renumber_images(&remaining);
        assert_eq!(
            moves,
            vec![
                (remaining[0].id, 0),
                (remaining[1].id, 1),
                (remaining[2].id, 2)
            ]
        );
    }

    #[test]
    fn rating_is_mean_of_scores() {
        assert_eq!(calculate_rating(&[4, 5, 3]), Some(4.0));
        assert_eq!(calculate_rating(&[2]), Some(2.0));
    }

    #[test]
    fn rating_is_none_without_reviews() {
        assert_eq!(calculate_rating(&[]), None);
    }

    #[test]
    fn primary_image_is_order_zero() {
        assert!(image(0).is_primary());
        assert!(!image(1).is_primary());
    }
}
