use crate::error::{Result, SynrouteError};
use crate::types::TemplateId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTemplate {
    pub name: String,
    /// Number of reactants, 1 or 2.
    pub arity: usize,
}

impl ReactionTemplate {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self { name: name.into(), arity }
    }
}

/// The fixed reaction vocabulary; a template's id is its position here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSet {
    templates: Vec<ReactionTemplate>,
}

impl TemplateSet {
    pub fn new(templates: Vec<ReactionTemplate>) -> Result<Self> {
        if let Some((id, t)) = templates
            .iter()
            .enumerate()
            .find(|(_, t)| t.arity == 0 || t.arity > 2)
        {
            return Err(SynrouteError::Validation(format!(
                "Template {} ('{}') has unsupported arity {}",
                id, t.name, t.arity
            )));
        }
        Ok(Self { templates })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: TemplateId) -> Option<&ReactionTemplate> {
        self.templates.get(id)
    }

    pub fn arity(&self, id: TemplateId) -> Option<usize> {
        self.templates.get(id).map(|t| t.arity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TemplateId, &ReactionTemplate)> {
        self.templates.iter().enumerate()
    }

    pub fn with_arity(&self, arity: usize) -> Vec<TemplateId> {
        self.iter()
            .filter(|(_, t)| t.arity == arity)
            .map(|(id, _)| id)
            .collect()
    }
}
