//! # Recipe Repository
//!
//! Products and recipe templates. Authoring happens elsewhere; the engine
//! only reads through `get_product` and `get_template`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use larder_core::validation::{validate_item_name, validate_template};
use larder_core::{IngredientRequirement, Product, RecipeTemplate};

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    category: Option<String>,
}

/// Repository for the recipe catalog.
#[derive(Debug, Clone)]
pub struct RecipeRepository {
    pool: SqlitePool,
}

impl RecipeRepository {
    /// Creates a new RecipeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecipeRepository { pool }
    }

    /// Stores a template and its requirements in one transaction.
    ///
    /// The template is validated first: choice requirements need a group,
    /// bases must not have one, portions must be exact.
    pub async fn insert_template(&self, template: &RecipeTemplate) -> DbResult<()> {
        validate_template(template)?;

        debug!(id = %template.id, name = %template.name, "Inserting recipe template");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO recipe_templates (id, name, category, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.category)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        for req in &template.ingredients {
            sqlx::query(
                r#"
                INSERT INTO recipe_template_ingredients (
                    id, template_id, ingredient_name, unit, position,
                    base_quantity, role, choice_group, portion_multiplier_bps
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&req.id)
            .bind(&template.id)
            .bind(&req.ingredient_name)
            .bind(&req.unit)
            .bind(req.position)
            .bind(req.base_quantity)
            .bind(req.role)
            .bind(&req.choice_group)
            .bind(req.portion_multiplier)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Loads a template with its requirements in declared order.
    pub async fn get_template(&self, id: &str) -> DbResult<Option<RecipeTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, name, category FROM recipe_templates WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let ingredients = sqlx::query_as::<_, IngredientRequirement>(
            r#"
            SELECT
                id, ingredient_name, unit, position, base_quantity,
                role, choice_group,
                portion_multiplier_bps AS portion_multiplier
            FROM recipe_template_ingredients
            WHERE template_id = ?1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(RecipeTemplate {
            id: row.id,
            name: row.name,
            category: row.category,
            ingredients,
        }))
    }

    /// Inserts a product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        validate_item_name(&product.name)?;
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            "INSERT INTO products (id, name, recipe_template_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.recipe_template_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by id.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, name, recipe_template_id FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Counts products (the seed binary uses this to avoid reseeding).
    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
