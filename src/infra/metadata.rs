use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::app::query::{FilterClause, FilterValue, QueryPlan};
use crate::domain::resource::{ContentType, NewResource, Resource, ResourceChanges};
use crate::infra::db::Db;
use crate::infra::error::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Enforce field constraints on the written values.
    pub validate: bool,
}

/// The authoritative record store for resource metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Resource>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Resource>, StoreError>;

    /// Fails with [`StoreError::Validation`] on a constraint violation.
    async fn create(&self, resource: NewResource) -> Result<Resource, StoreError>;

    /// Bumps `updated_at` even when `changes` is empty.
    async fn update_by_id(
        &self,
        id: Uuid,
        changes: ResourceChanges,
        options: UpdateOptions,
    ) -> Result<(), StoreError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

const SELECT_RESOURCE: &str = "SELECT id, image_url, content_type, description, author, resource_id, \
                               created_at, updated_at FROM resources";

#[derive(Clone)]
pub struct PgMetadataStore {
    db: Db,
}

impl PgMetadataStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Resource>, StoreError> {
        let mut query = find_query(plan);
        let rows = query
            .build()
            .fetch_all(self.db.pool())
            .await
            .context("failed to list resources")?;

        rows.iter().map(row_to_resource).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Resource>, StoreError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_RESOURCE))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .with_context(|| format!("failed to load resource {}", id))?;

        row.as_ref().map(row_to_resource).transpose()
    }

    async fn create(&self, resource: NewResource) -> Result<Resource, StoreError> {
        let valid = resource.validate().map_err(StoreError::Validation)?;

        let row = sqlx::query(
            "INSERT INTO resources (image_url, content_type, description, author, resource_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, image_url, content_type, description, author, resource_id, created_at, updated_at",
        )
        .bind(&valid.image_url)
        .bind(valid.content_type.as_str())
        .bind(&valid.description)
        .bind(&valid.author)
        .bind(&valid.resource_id)
        .fetch_one(self.db.pool())
        .await
        .context("failed to insert resource")?;

        row_to_resource(&row)
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        changes: ResourceChanges,
        options: UpdateOptions,
    ) -> Result<(), StoreError> {
        let changes = changes
            .validate(options.validate)
            .map_err(StoreError::Validation)?;

        let mut query = QueryBuilder::<Postgres>::new("UPDATE resources SET updated_at = now()");
        if let Some(content_type) = changes.content_type {
            query
                .push(", content_type = ")
                .push_bind(content_type.as_str());
        }
        if let Some(description) = changes.description {
            query.push(", description = ").push_bind(description);
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query
            .build()
            .execute(self.db.pool())
            .await
            .with_context(|| format!("failed to update resource {}", id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await
            .with_context(|| format!("failed to delete resource {}", id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await.map_err(StoreError::Backend)
    }
}

fn find_query(plan: &QueryPlan) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new(SELECT_RESOURCE);
    query.push(" WHERE author = ").push_bind(plan.author.clone());

    for clause in &plan.filter {
        let FilterClause::Equals { field, value } = clause else {
            query.push(" AND FALSE");
            continue;
        };
        query.push(" AND ").push(field.column()).push(" = ");
        match value {
            FilterValue::Text(text) => query.push_bind(text.clone()),
            FilterValue::Id(id) => query.push_bind(*id),
            FilterValue::Timestamp(at) => query.push_bind(*at),
        };
    }

    query.push(" ORDER BY ");
    let mut order = query.separated(", ");
    for key in plan.ordering() {
        order.push(format!("{} {}", key.field.column(), key.direction.as_sql()));
    }

    if let Some(limit) = plan.limit {
        query.push(" LIMIT ").push_bind(clamp_i64(limit));
    }
    if let Some(skip) = plan.skip {
        query.push(" OFFSET ").push_bind(clamp_i64(skip));
    }
    query
}

fn row_to_resource(row: &PgRow) -> Result<Resource, StoreError> {
    let content_type: String = row.get("content_type");
    let content_type = ContentType::parse(&content_type)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown content type: {}", content_type)))?;

    Ok(Resource {
        id: row.get("id"),
        image_url: row.get("image_url"),
        content_type,
        description: row.get("description"),
        author: row.get("author"),
        resource_id: row.get("resource_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
