use std::sync::Arc;

use uuid::Uuid;

use crate::app::error::ResourceError;
use crate::domain::identity::Identity;
use crate::domain::resource::Resource;
use crate::infra::metadata::MetadataStore;

/// A resource the caller has been checked to own. Only [`AuthorizationGate`]
/// builds one.
#[derive(Debug, Clone)]
pub struct AuthorizedResource {
    identity: Identity,
    resource: Resource,
}

impl AuthorizedResource {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[derive(Clone)]
pub struct AuthorizationGate {
    metadata: Arc<dyn MetadataStore>,
}

impl AuthorizationGate {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Loads the resource named by `raw_id` and checks that `identity` owns it.
    pub async fn authorize(
        &self,
        identity: Identity,
        raw_id: &str,
    ) -> Result<AuthorizedResource, ResourceError> {
        // Ids the store could never have issued are treated as absent.
        let id = Uuid::parse_str(raw_id).map_err(|_| ResourceError::NotFound)?;

        let resource = self
            .metadata
            .find_by_id(id)
            .await?
            .ok_or(ResourceError::NotFound)?;

        if !identity.owns(&resource.author) {
            tracing::warn!(
                resource_id = %id,
                caller = %identity.id,
                "rejected access to another user's resource"
            );
            return Err(ResourceError::Forbidden);
        }

        Ok(AuthorizedResource { identity, resource })
    }
}
