use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join;

use crate::app::authorization::AuthorizedResource;
use crate::app::error::ResourceError;
use crate::app::query::QueryPlan;
use crate::domain::identity::Identity;
use crate::domain::resource::{NewResource, ResourceChanges, ResourceView};
use crate::infra::error::StoreError;
use crate::infra::images::{ImageFields, ImagePayload, ImageStore};
use crate::infra::metadata::{MetadataStore, UpdateOptions};

/// A complete image body: encoded bytes, their type and an optional description.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: String,
    pub content_type: String,
    pub description: Option<String>,
}

/// Any subset of [`ImageUpload`]'s fields.
#[derive(Debug, Clone, Default)]
pub struct ImagePatch {
    pub data: Option<String>,
    pub content_type: Option<String>,
    pub description: Option<String>,
}

impl ImagePatch {
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.content_type.is_none() && self.description.is_none()
    }
}

/// Coordinates the image store and the metadata store.
///
/// Writes go to both stores without a shared transaction. When one side
/// fails the other is left as it is and the failure is returned.
#[derive(Clone)]
pub struct ResourceGateway {
    metadata: Arc<dyn MetadataStore>,
    images: Arc<dyn ImageStore>,
}

impl ResourceGateway {
    pub fn new(metadata: Arc<dyn MetadataStore>, images: Arc<dyn ImageStore>) -> Self {
        Self { metadata, images }
    }

    pub async fn list(
        &self,
        identity: &Identity,
        params: BTreeMap<String, String>,
    ) -> Result<Vec<ResourceView>, ResourceError> {
        let plan = QueryPlan::build(identity, params)?;
        let projection = plan.projection();

        let resources = self.metadata.find(&plan).await?;
        tracing::debug!(caller = %identity.id, count = resources.len(), "listed resources");

        Ok(resources
            .iter()
            .map(|resource| ResourceView::project(resource, &projection))
            .collect())
    }

    pub async fn create(
        &self,
        identity: &Identity,
        upload: ImageUpload,
    ) -> Result<ResourceView, ResourceError> {
        let stored = self
            .images
            .create(&ImagePayload {
                data: upload.data,
                content_type: upload.content_type.clone(),
            })
            .await?;

        let created = self
            .metadata
            .create(NewResource {
                image_url: stored.image_url.clone(),
                content_type: upload.content_type,
                description: upload.description,
                author: identity.id.clone(),
                resource_id: stored.external_id.clone(),
            })
            .await;

        match created {
            Ok(resource) => {
                tracing::info!(resource_id = %resource.id, caller = %identity.id, "resource created");
                Ok(ResourceView::from(&resource))
            }
            Err(err) => {
                tracing::warn!(
                    external_id = %stored.external_id,
                    image_url = %stored.image_url,
                    error = %err,
                    "metadata write failed after image upload, image left orphaned"
                );
                Err(err.into())
            }
        }
    }

    pub fn read(&self, authorized: &AuthorizedResource) -> ResourceView {
        ResourceView::from(authorized.resource())
    }

    /// Replaces the image and every mutable metadata field. An absent
    /// description clears the stored one.
    pub async fn replace(
        &self,
        authorized: &AuthorizedResource,
        upload: ImageUpload,
    ) -> Result<(), ResourceError> {
        let resource = authorized.resource();
        let payload = ImagePayload {
            data: upload.data,
            content_type: upload.content_type.clone(),
        };
        let changes = ResourceChanges {
            content_type: Some(upload.content_type),
            description: Some(upload.description),
        };

        let (image, metadata) = join(
            self.images.replace(&resource.resource_id, &payload),
            self.metadata
                .update_by_id(resource.id, changes, UpdateOptions { validate: true }),
        )
        .await;

        settle("replace", authorized, image, metadata)
    }

    /// Sends only the supplied fields to each store. The image store is left
    /// alone when neither the bytes nor the type change.
    pub async fn patch(
        &self,
        authorized: &AuthorizedResource,
        patch: ImagePatch,
    ) -> Result<(), ResourceError> {
        if patch.is_empty() {
            return Err(ResourceError::validation(
                "Provide at least one of data, contentType or description.",
            ));
        }

        let resource = authorized.resource();
        let fields = ImageFields {
            data: patch.data,
            content_type: patch.content_type.clone(),
        };
        let changes = ResourceChanges {
            content_type: patch.content_type,
            description: patch.description.map(Some),
        };

        let image_write = async {
            if fields.is_empty() {
                Ok(())
            } else {
                self.images.patch(&resource.resource_id, &fields).await
            }
        };
        let (image, metadata) = join(
            image_write,
            self.metadata
                .update_by_id(resource.id, changes, UpdateOptions { validate: true }),
        )
        .await;

        settle("patch", authorized, image, metadata)
    }

    pub async fn delete(&self, authorized: &AuthorizedResource) -> Result<(), ResourceError> {
        let resource = authorized.resource();
        let (image, metadata) = join(
            self.images.delete(&resource.resource_id),
            self.metadata.delete_by_id(resource.id),
        )
        .await;

        settle("delete", authorized, image, metadata)
    }
}

/// Folds the two halves of a dual write into one outcome. A validation
/// failure wins over any other error.
fn settle(
    action: &str,
    authorized: &AuthorizedResource,
    image: Result<(), StoreError>,
    metadata: Result<(), StoreError>,
) -> Result<(), ResourceError> {
    let resource_id = authorized.resource().id;
    if let Err(err) = &image {
        tracing::error!(action = action, resource_id = %resource_id, error = ?err, "image store write failed");
    }
    if let Err(err) = &metadata {
        tracing::error!(action = action, resource_id = %resource_id, error = ?err, "metadata store write failed");
    }

    match (image, metadata) {
        (Ok(()), Ok(())) => {
            tracing::info!(action = action, resource_id = %resource_id, caller = %authorized.identity().id, "resource write completed");
            Ok(())
        }
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err.into()),
        (Err(_), Err(metadata @ StoreError::Validation(_))) => Err(metadata.into()),
        (Err(image), Err(_)) => Err(image.into()),
    }
}
