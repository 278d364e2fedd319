use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::app::query::QueryPlan;
use crate::domain::resource::{ContentType, NewResource, Resource, ResourceChanges};
use crate::infra::error::StoreError;
use crate::infra::images::{decode_image, ImageFields, ImagePayload, ImageStore, StoredImage};
use crate::infra::metadata::{MetadataStore, UpdateOptions};

/// Process-local metadata store. Used by the test suite and for running the
/// service without Postgres.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    records: Arc<RwLock<HashMap<Uuid, Resource>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Resource>, StoreError> {
        let records = self.records.read().await;
        let mut found: Vec<Resource> = records
            .values()
            .filter(|resource| plan.matches(resource))
            .cloned()
            .collect();
        drop(records);

        let ordering = plan.ordering();
        found.sort_by(|left, right| {
            ordering
                .iter()
                .map(|key| key.compare(left, right))
                .find(|order| order.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let skip = plan.skip.map_or(0, |skip| usize::try_from(skip).unwrap_or(usize::MAX));
        let limit = plan
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Resource>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn create(&self, resource: NewResource) -> Result<Resource, StoreError> {
        let valid = resource.validate().map_err(StoreError::Validation)?;
        let now = OffsetDateTime::now_utc();
        let resource = Resource {
            id: Uuid::new_v4(),
            image_url: valid.image_url,
            content_type: valid.content_type,
            description: valid.description,
            author: valid.author,
            resource_id: valid.resource_id,
            created_at: now,
            updated_at: now,
        };

        self.records
            .write()
            .await
            .insert(resource.id, resource.clone());
        Ok(resource)
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

        let mut records = self.records.write().await;
        let resource = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(content_type) = changes.content_type {
            resource.content_type = content_type;
        }
        if let Some(description) = changes.description {
            resource.description = description;
        }
        resource.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        match self.records.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub content_type: ContentType,
    pub bytes: Bytes,
}

/// Process-local image store keyed by a generated id.
#[derive(Clone)]
pub struct MemoryImageStore {
    public_url: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryImageStore {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into().trim_end_matches('/').to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, external_id: &str) -> Option<StoredObject> {
        self.objects.read().await.get(external_id).cloned()
    }

    pub async fn contains(&self, external_id: &str) -> bool {
        self.objects.read().await.contains_key(external_id)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn decode(payload: &ImagePayload) -> Result<StoredObject, StoreError> {
        let (content_type, bytes) = decode_image(payload)?;
        Ok(StoredObject {
            content_type,
            bytes: Bytes::from(bytes),
        })
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn create(&self, payload: &ImagePayload) -> Result<StoredImage, StoreError> {
        let object = Self::decode(payload)?;
        let external_id = Uuid::new_v4().to_string();
        let image_url = format!(
            "{}/images/{}.{}",
            self.public_url,
            external_id,
            object.content_type.extension()
        );

        self.objects
            .write()
            .await
            .insert(external_id.clone(), object);
        Ok(StoredImage {
            image_url,
            external_id,
        })
    }

    async fn replace(&self, external_id: &str, payload: &ImagePayload) -> Result<(), StoreError> {
        let object = Self::decode(payload)?;
        let mut objects = self.objects.write().await;
        let slot = objects.get_mut(external_id).ok_or(StoreError::NotFound)?;
        *slot = object;
        Ok(())
    }

    async fn patch(&self, external_id: &str, fields: &ImageFields) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let slot = objects.get_mut(external_id).ok_or(StoreError::NotFound)?;

        match (&fields.data, &fields.content_type) {
            (Some(data), content_type) => {
                let payload = ImagePayload {
                    data: data.clone(),
                    content_type: content_type
                        .clone()
                        .unwrap_or_else(|| slot.content_type.as_str().to_string()),
                };
                *slot = Self::decode(&payload)?;
            }
            (None, Some(content_type)) => {
                slot.content_type = ContentType::parse(content_type).ok_or_else(|| {
                    StoreError::validation(format!(
                        "`{}` is not a valid content type, expected one of image/gif, image/jpeg, image/png.",
                        content_type
                    ))
                })?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    async fn delete(&self, external_id: &str) -> Result<(), StoreError> {
        match self.objects.write().await.remove(external_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn png() -> ImagePayload {
        ImagePayload {
            data: PNG.to_string(),
            content_type: "image/png".to_string(),
        }
    }

    #[tokio::test]
    async fn create_rejects_mismatched_bytes() {
        let store = MemoryImageStore::new("http://images.test");
        let payload = ImagePayload {
            data: PNG.to_string(),
            content_type: "image/gif".to_string(),
        };

        let result = store.create(&payload).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn content_type_only_patch_keeps_bytes() {
        let store = MemoryImageStore::new("http://images.test/");
        let stored = store.create(&png()).await.unwrap();
        assert!(stored.image_url.starts_with("http://images.test/images/"));

        let before = store.get(&stored.external_id).await.unwrap();
        store
            .patch(
                &stored.external_id,
                &ImageFields {
                    data: None,
                    content_type: Some("image/jpeg".to_string()),
                },
            )
            .await
            .unwrap();

        let after = store.get(&stored.external_id).await.unwrap();
        assert_eq!(after.bytes, before.bytes);
        assert_eq!(after.content_type, ContentType::Jpeg);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let store = MemoryImageStore::new("http://images.test");
        assert!(matches!(store.delete("nope").await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.replace("nope", &png()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_bumps_timestamp_without_changes() {
        let store = MemoryMetadataStore::new();
        let created = store
            .create(NewResource {
                image_url: "http://images.test/a.png".to_string(),
                content_type: "image/png".to_string(),
                description: None,
                author: "user-1".to_string(),
                resource_id: "ext-1".to_string(),
            })
            .await
            .unwrap();

        store
            .update_by_id(
                created.id,
                ResourceChanges::default(),
                UpdateOptions { validate: true },
            )
            .await
            .unwrap();

        let updated = store.find_by_id(created.id).await.unwrap().unwrap();
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }
}
