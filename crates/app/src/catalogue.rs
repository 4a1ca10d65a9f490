//! Template Catalogue
//!
//! Read-only access to published templates.

use std::{fs, path::Path};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use coupons::templates::{CouponTemplate, TemplateId, expire_if_due};

/// Catalogue errors.
#[derive(Debug, Error)]
pub enum CatalogueError {
    /// IO error reading a catalogue file
    #[error("failed to read catalogue file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("failed to parse catalogue: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Template not present in the catalogue
    #[error("template not found: {0}")]
    NotFound(TemplateId),

    /// Two templates share an id
    #[error("duplicate template id: {0}")]
    DuplicateTemplate(TemplateId),
}

/// Published templates.
#[automock]
#[async_trait]
pub trait TemplateCatalogue: Send + Sync {
    /// Templates whose codes are stocked and that have not been retired.
    async fn find_usable_templates(&self) -> Result<Vec<CouponTemplate>, CatalogueError>;

    /// Templates by id. Unknown ids are absent from the map.
    async fn find_templates_by_ids(
        &self,
        ids: &[TemplateId],
    ) -> Result<FxHashMap<TemplateId, CouponTemplate>, CatalogueError>;
}

/// Catalogue loaded once from a YAML list of templates.
#[derive(Debug, Clone, Default)]
pub struct YamlCatalogue {
    templates: FxHashMap<TemplateId, CouponTemplate>,
}

impl YamlCatalogue {
    /// Creates a catalogue from templates.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogueError::DuplicateTemplate`] if two templates share an id.
    pub fn new(templates: impl IntoIterator<Item = CouponTemplate>) -> Result<Self, CatalogueError> {
        let mut by_id = FxHashMap::default();

        for template in templates {
            let id = template.id;

            if by_id.insert(id, template).is_some() {
                return Err(CatalogueError::DuplicateTemplate(id));
            }
        }

        Ok(Self { templates: by_id })
    }

    /// Parse a catalogue from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or ids repeat.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogueError> {
        let templates: Vec<CouponTemplate> = serde_norway::from_str(yaml)?;

        Self::new(templates)
    }

    /// Load a catalogue file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogueError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Every template, ordered by id.
    pub fn templates(&self) -> Vec<&CouponTemplate> {
        let mut templates: Vec<&CouponTemplate> = self.templates.values().collect();

        templates.sort_by_key(|template| template.id);

        templates
    }

    /// Look up one template.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogueError::NotFound`] if the id is unknown.
    pub fn get(&self, id: TemplateId) -> Result<&CouponTemplate, CatalogueError> {
        self.templates.get(&id).ok_or(CatalogueError::NotFound(id))
    }

    /// Templates the expiry sweep would retire at `now`, ordered by id.
    pub fn due_for_expiry(&self, now: Timestamp) -> Vec<CouponTemplate> {
        let templates: Vec<CouponTemplate> = self.templates().into_iter().cloned().collect();

        expire_if_due(&templates, now).into_iter().cloned().collect()
    }
}

#[async_trait]
impl TemplateCatalogue for YamlCatalogue {
    async fn find_usable_templates(&self) -> Result<Vec<CouponTemplate>, CatalogueError> {
        Ok(self
            .templates()
            .into_iter()
            .filter(|template| template.available && !template.expired)
            .cloned()
            .collect())
    }

    async fn find_templates_by_ids(
        &self,
        ids: &[TemplateId],
    ) -> Result<FxHashMap<TemplateId, CouponTemplate>, CatalogueError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.templates.get(id).map(|template| (*id, template.clone())))
            .collect())
    }
}
