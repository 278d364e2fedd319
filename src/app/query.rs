use std::cmp::Ordering;
use std::collections::BTreeMap;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::ResourceError;
use crate::domain::identity::Identity;
use crate::domain::resource::{Resource, ResourceField};

const FIELDS_KEY: &str = "fields";
const SORT_KEY: &str = "sort";
const SKIP_KEY: &str = "skip";
const LIMIT_KEY: &str = "limit";
const PAGE_KEY: &str = "page";

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Id(Uuid),
    Timestamp(OffsetDateTime),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Equals {
        field: ResourceField,
        value: FilterValue,
    },
    /// A key that names no stored field. No record carries it, so nothing matches.
    Unmatched { key: String },
}

impl FilterClause {
    pub fn matches(&self, resource: &Resource) -> bool {
        let Self::Equals { field, value } = self else {
            return false;
        };
        match (value, field) {
            (FilterValue::Id(id), ResourceField::Id) => resource.id == *id,
            (FilterValue::Timestamp(at), ResourceField::CreatedAt) => resource.created_at == *at,
            (FilterValue::Timestamp(at), ResourceField::UpdatedAt) => resource.updated_at == *at,
            (FilterValue::Text(text), ResourceField::ImageUrl) => resource.image_url == *text,
            (FilterValue::Text(text), ResourceField::ContentType) => {
                resource.content_type.as_str() == text
            }
            (FilterValue::Text(text), ResourceField::Description) => {
                resource.description.as_deref() == Some(text.as_str())
            }
            (FilterValue::Text(text), ResourceField::Author) => resource.author == *text,
            (FilterValue::Text(text), ResourceField::ResourceId) => resource.resource_id == *text,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Nulls sort after every value, matching [`SortKey::compare`].
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC NULLS LAST",
            Self::Descending => "DESC NULLS FIRST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: ResourceField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn compare(&self, left: &Resource, right: &Resource) -> Ordering {
        let ordering = match self.field {
            ResourceField::Id => left.id.cmp(&right.id),
            ResourceField::ImageUrl => left.image_url.cmp(&right.image_url),
            ResourceField::ContentType => left.content_type.as_str().cmp(right.content_type.as_str()),
            ResourceField::Description => match (&left.description, &right.description) {
                (Some(left), Some(right)) => left.cmp(right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            ResourceField::CreatedAt => left.created_at.cmp(&right.created_at),
            ResourceField::UpdatedAt => left.updated_at.cmp(&right.updated_at),
            ResourceField::Author => left.author.cmp(&right.author),
            ResourceField::ResourceId => left.resource_id.cmp(&right.resource_id),
        };
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// What a list request asks of the metadata store. Building one performs no I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Always applied by the store, independent of `filter`.
    pub author: String,
    pub filter: Vec<FilterClause>,
    pub sort: Vec<SortKey>,
    /// `None` projects every public field.
    pub fields: Option<Vec<ResourceField>>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl QueryPlan {
    pub fn build(
        identity: &Identity,
        mut params: BTreeMap<String, String>,
    ) -> Result<Self, ResourceError> {
        let fields = params.remove(FIELDS_KEY);
        let sort = params.remove(SORT_KEY);
        let skip = params.remove(SKIP_KEY);
        let limit = params.remove(LIMIT_KEY);
        let page = params.remove(PAGE_KEY);

        let mut filter = Vec::with_capacity(params.len());
        for (key, value) in params {
            filter.push(parse_filter(key, value)?);
        }

        let limit = parse_count(LIMIT_KEY, limit)?.filter(|limit| *limit > 0);
        let mut skip = parse_count(SKIP_KEY, skip)?;
        let page = parse_count(PAGE_KEY, page)?;
        if let Some(page) = page {
            if page == 0 {
                return Err(ResourceError::validation("page must be 1 or greater."));
            }
            if let (None, Some(limit)) = (skip, limit) {
                skip = Some((page - 1).saturating_mul(limit));
            }
        }

        Ok(Self {
            author: identity.id.clone(),
            filter,
            sort: parse_sort(sort.as_deref())?,
            fields: parse_fields(fields.as_deref())?,
            skip,
            limit,
        })
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        resource.author == self.author && self.filter.iter().all(|clause| clause.matches(resource))
    }

    /// Sort keys followed by the `id` tie-breaker, unless `id` is already sorted on.
    pub fn ordering(&self) -> Vec<SortKey> {
        let mut keys = self.sort.clone();
        if !keys.iter().any(|key| key.field == ResourceField::Id) {
            keys.push(SortKey {
                field: ResourceField::Id,
                direction: SortDirection::Ascending,
            });
        }
        keys
    }

    pub fn projection(&self) -> Vec<ResourceField> {
        match &self.fields {
            Some(fields) => fields.clone(),
            None => vec![
                ResourceField::ImageUrl,
                ResourceField::Description,
                ResourceField::ContentType,
                ResourceField::CreatedAt,
                ResourceField::UpdatedAt,
                ResourceField::Id,
            ],
        }
    }
}

pub fn default_sort() -> Vec<SortKey> {
    vec![SortKey {
        field: ResourceField::CreatedAt,
        direction: SortDirection::Descending,
    }]
}

fn parse_filter(key: String, value: String) -> Result<FilterClause, ResourceError> {
    let Some(field) = ResourceField::from_key(&key) else {
        return Ok(FilterClause::Unmatched { key });
    };

    let value = match field {
        ResourceField::Id => Uuid::parse_str(value.trim())
            .map(FilterValue::Id)
            .map_err(|_| ResourceError::validation(format!("`{}` is not a valid id.", value)))?,
        ResourceField::CreatedAt | ResourceField::UpdatedAt => {
            OffsetDateTime::parse(value.trim(), &Rfc3339)
                .map(FilterValue::Timestamp)
                .map_err(|_| {
                    ResourceError::validation(format!(
                        "`{}` must be an RFC 3339 timestamp.",
                        field.key()
                    ))
                })?
        }
        _ => FilterValue::Text(value),
    };

    Ok(FilterClause::Equals { field, value })
}

fn parse_sort(raw: Option<&str>) -> Result<Vec<SortKey>, ResourceError> {
    let mut keys = Vec::new();
    for part in split_list(raw) {
        let (direction, name) = match part.strip_prefix('-') {
            Some(name) => (SortDirection::Descending, name),
            None => (SortDirection::Ascending, part.strip_prefix('+').unwrap_or(part)),
        };
        let field = public_field(name, "sortable")?;
        if !keys.iter().any(|key: &SortKey| key.field == field) {
            keys.push(SortKey { field, direction });
        }
    }

    if keys.is_empty() {
        Ok(default_sort())
    } else {
        Ok(keys)
    }
}

fn parse_fields(raw: Option<&str>) -> Result<Option<Vec<ResourceField>>, ResourceError> {
    let mut fields = Vec::new();
    for part in split_list(raw) {
        let field = public_field(part, "selectable")?;
        if !fields.contains(&field) {
            fields.push(field);
        }
    }

    if fields.is_empty() {
        return Ok(None);
    }
    if !fields.contains(&ResourceField::Id) {
        fields.push(ResourceField::Id);
    }
    Ok(Some(fields))
}

fn public_field(name: &str, what: &str) -> Result<ResourceField, ResourceError> {
    ResourceField::from_key(name)
        .filter(ResourceField::is_public)
        .ok_or_else(|| ResourceError::validation(format!("`{}` is not a {} field.", name, what)))
}

fn parse_count(key: &str, raw: Option<String>) -> Result<Option<u64>, ResourceError> {
    match raw {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            ResourceError::validation(format!("{} must be a non-negative integer.", key))
        }),
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|part| !part.is_empty())
}
