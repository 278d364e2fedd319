use image::ImageFormat;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

pub const DESCRIPTION_MIN_CHARS: usize = 1;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
}

impl ContentType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "image/gif" => Some(Self::Gif),
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gif => "image/gif",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Gif => ImageFormat::Gif,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

/// Authoritative metadata for one stored image. Leaves the service only as a
/// [`ResourceView`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: Uuid,
    pub image_url: String,
    pub content_type: ContentType,
    pub description: Option<String>,
    pub author: String,
    pub resource_id: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields a query can address. `Author` and `ResourceId` can be filtered on
/// but never sorted on or projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceField {
    Id,
    ImageUrl,
    ContentType,
    Description,
    CreatedAt,
    UpdatedAt,
    Author,
    ResourceId,
}

impl ResourceField {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "id" => Some(Self::Id),
            "imageUrl" => Some(Self::ImageUrl),
            "contentType" => Some(Self::ContentType),
            "description" => Some(Self::Description),
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            "author" => Some(Self::Author),
            "resourceId" => Some(Self::ResourceId),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ImageUrl => "imageUrl",
            Self::ContentType => "contentType",
            Self::Description => "description",
            Self::CreatedAt => "createdAt",
            Self::UpdatedAt => "updatedAt",
            Self::Author => "author",
            Self::ResourceId => "resourceId",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ImageUrl => "image_url",
            Self::ContentType => "content_type",
            Self::Description => "description",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Author => "author",
            Self::ResourceId => "resource_id",
        }
    }

    pub fn is_public(&self) -> bool {
        !matches!(self, Self::Author | Self::ResourceId)
    }
}

/// The externally visible representation of a [`Resource`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
    pub id: Uuid,
}

impl ResourceView {
    /// Keeps only the requested fields. `id` is always present.
    pub fn project(resource: &Resource, fields: &[ResourceField]) -> Self {
        let wants = |field: ResourceField| fields.contains(&field);
        Self {
            image_url: wants(ResourceField::ImageUrl).then(|| resource.image_url.clone()),
            description: if wants(ResourceField::Description) {
                resource.description.clone()
            } else {
                None
            },
            content_type: wants(ResourceField::ContentType).then_some(resource.content_type),
            created_at: wants(ResourceField::CreatedAt).then_some(resource.created_at),
            updated_at: wants(ResourceField::UpdatedAt).then_some(resource.updated_at),
            id: resource.id,
        }
    }
}

impl From<&Resource> for ResourceView {
    fn from(resource: &Resource) -> Self {
        Self {
            image_url: Some(resource.image_url.clone()),
            description: resource.description.clone(),
            content_type: Some(resource.content_type),
            created_at: Some(resource.created_at),
            updated_at: Some(resource.updated_at),
            id: resource.id,
        }
    }
}

/// Unvalidated input for a new metadata record, as handed to a store.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub image_url: String,
    pub content_type: String,
    pub description: Option<String>,
    pub author: String,
    pub resource_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidResource {
    pub image_url: String,
    pub content_type: ContentType,
    pub description: Option<String>,
    pub author: String,
    pub resource_id: String,
}

impl NewResource {
    pub fn validate(self) -> Result<ValidResource, Vec<String>> {
        let mut errors = Vec::new();

        let image_url = self.image_url.trim().to_string();
        if !is_valid_url(&image_url) {
            errors.push("Please provide a valid image-url.".to_string());
        }

        let content_type = ContentType::parse(&self.content_type);
        if content_type.is_none() {
            errors.push(invalid_content_type(&self.content_type));
        }

        let description = match self.description {
            Some(description) => match check_description(&description) {
                Ok(trimmed) => Some(trimmed),
                Err(message) => {
                    errors.push(message);
                    None
                }
            },
            None => None,
        };

        let author = self.author.trim().to_string();
        if author.is_empty() {
            errors.push("Path `author` is required.".to_string());
        }
        let resource_id = self.resource_id.trim().to_string();
        if resource_id.is_empty() {
            errors.push("Path `resourceId` is required.".to_string());
        }

        match content_type {
            Some(content_type) if errors.is_empty() => Ok(ValidResource {
                image_url,
                content_type,
                description,
                author,
                resource_id,
            }),
            _ => Err(errors),
        }
    }
}

/// A write against the mutable fields of an existing record.
///
/// `description: Some(None)` clears the description, `None` leaves it alone.
#[derive(Debug, Clone, Default)]
pub struct ResourceChanges {
    pub content_type: Option<String>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidChanges {
    pub content_type: Option<ContentType>,
    pub description: Option<Option<String>>,
}

impl ResourceChanges {
    /// The content type is always type-checked since the store cannot hold an
    /// unknown one; `enforce_constraints` toggles the description bounds.
    pub fn validate(self, enforce_constraints: bool) -> Result<ValidChanges, Vec<String>> {
        let mut errors = Vec::new();

        let content_type = match self.content_type {
            Some(raw) => match ContentType::parse(&raw) {
                Some(content_type) => Some(content_type),
                None => {
                    errors.push(invalid_content_type(&raw));
                    None
                }
            },
            None => None,
        };

        let description = match self.description {
            Some(Some(description)) if enforce_constraints => {
                match check_description(&description) {
                    Ok(trimmed) => Some(Some(trimmed)),
                    Err(message) => {
                        errors.push(message);
                        None
                    }
                }
            }
            Some(Some(description)) => Some(Some(description.trim().to_string())),
            Some(None) => Some(None),
            None => None,
        };

        if errors.is_empty() {
            Ok(ValidChanges {
                content_type,
                description,
            })
        } else {
            Err(errors)
        }
    }
}

fn check_description(description: &str) -> Result<String, String> {
    let trimmed = description.trim();
    let length = trimmed.chars().count();
    if length < DESCRIPTION_MIN_CHARS {
        return Err(format!(
            "The description must be of minimum length {} characters.",
            DESCRIPTION_MIN_CHARS
        ));
    }
    if length > DESCRIPTION_MAX_CHARS {
        return Err(format!(
            "The description must be of maximum length {} characters.",
            DESCRIPTION_MAX_CHARS
        ));
    }
    Ok(trimmed.to_string())
}

fn invalid_content_type(raw: &str) -> String {
    format!(
        "`{}` is not a valid content type, expected one of image/gif, image/jpeg, image/png.",
        raw
    )
}

fn is_valid_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}
