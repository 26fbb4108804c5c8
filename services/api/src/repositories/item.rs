//! Item repository for database operations

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Row};
use tracing::debug;

use crate::{
    models::{Filters, Item, Metadata},
    repositories::{ItemRepository, RepositoryError, RepositoryResult, with_deadline},
};

/// Item repository
#[derive(Clone)]
pub struct ItemModel {
    pool: PgPool,
}

impl ItemModel {
    /// Create a new item repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for ItemModel {
    async fn insert(&self, item: &mut Item) -> RepositoryResult<()> {
        let row = with_deadline(
            sqlx::query(
                r#"
                INSERT INTO items (name, model, supplier, price, currency, image_file, notes, tags)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, created_at, updated_at
                "#,
            )
            .bind(&item.name)
            .bind(&item.model)
            .bind(item.supplier)
            .bind(item.price)
            .bind(item.currency)
            .bind(&item.image)
            .bind(&item.notes)
            .bind(&item.tags)
            .fetch_one(&self.pool),
        )
        .await?;

        item.id = row.get("id");
        item.created_at = row.get("created_at");
        item.updated_at = row.get("updated_at");

        Ok(())
    }

    async fn get(&self, id: i64) -> RepositoryResult<Item> {
        if id < 1 {
            return Err(RepositoryError::NoRecord);
        }

        with_deadline(
            sqlx::query_as::<_, Item>(
                r#"
                SELECT id, name, model, supplier, price, currency, image_file, notes, tags,
                       created_at, updated_at, archived
                FROM items
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(RepositoryError::NoRecord)
    }

    async fn update(&self, item: &mut Item) -> RepositoryResult<()> {
        let row = with_deadline(
            sqlx::query(
                r#"
                UPDATE items
                SET name = $1, model = $2, supplier = $3, price = $4, currency = $5,
                    image_file = $6, notes = $7, tags = $8, archived = $9,
                    updated_at = clock_timestamp()
                WHERE id = $10 AND updated_at = $11
                RETURNING updated_at
                "#,
            )
            .bind(&item.name)
            .bind(&item.model)
            .bind(item.supplier)
            .bind(item.price)
            .bind(item.currency)
            .bind(&item.image)
            .bind(&item.notes)
            .bind(&item.tags)
            .bind(item.archived)
            .bind(item.id)
            .bind(item.updated_at)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(RepositoryError::EditConflict)?;

        item.updated_at = row.get("updated_at");
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepositoryResult<()> {
        if id < 1 {
            return Err(RepositoryError::NoRecord);
        }

        let result = with_deadline(
            sqlx::query("DELETE FROM items WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NoRecord);
        }
        Ok(())
    }

    async fn get_all(
        &self,
        name: &str,
        supplier: i64,
        tags: &[String],
        filters: &Filters,
    ) -> RepositoryResult<(Vec<Item>, Metadata)> {
        let column = filters.sort_column().ok_or_else(|| {
            RepositoryError::Internal(format!("unsafe sort parameter: {}", filters.sort))
        })?;

        let query = format!(
            r#"
            SELECT count(*) OVER() AS total_records,
                   id, name, model, supplier, price, currency, image_file, notes, tags,
                   created_at, updated_at, archived
            FROM items
            WHERE (to_tsvector('simple', name) @@ plainto_tsquery('simple', $1) OR $1 = '')
            AND (supplier = $2 OR $2 = 0)
            AND (tags @> $3 OR $3 = '{{}}')
            ORDER BY {column} {direction}, id ASC
            LIMIT $4 OFFSET $5
            "#,
            direction = filters.sort_direction(),
        );
        debug!(sort = %filters.sort, page = filters.page, "listing items");

        let rows = with_deadline(
            sqlx::query(&query)
                .bind(name)
                .bind(supplier)
                .bind(tags)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool),
        )
        .await?;

        let mut total_records = 0;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            total_records = row.try_get("total_records")?;
            items.push(Item::from_row(&row)?);
        }

        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
        Ok((items, metadata))
    }
}
