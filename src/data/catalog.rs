use crate::error::{Result, SynrouteError};
use crate::types::CatalogIndex;
use std::collections::HashMap;

/// Ordered building-block catalog. Order is significant: ties in nearest
/// neighbour search resolve to the lower index.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    molecules: Vec<String>,
    index: HashMap<String, CatalogIndex>,
}

impl Catalog {
    pub fn new<I, S>(molecules: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::default();
        for molecule in molecules {
            let molecule = molecule.into();
            if catalog.index.contains_key(&molecule) {
                return Err(SynrouteError::Validation(format!(
                    "Duplicate catalog entry '{}'",
                    molecule
                )));
            }
            catalog.index.insert(molecule.clone(), catalog.molecules.len());
            catalog.molecules.push(molecule);
        }
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    pub fn get(&self, index: CatalogIndex) -> Option<&str> {
        self.molecules.get(index).map(String::as_str)
    }

    pub fn index_of(&self, molecule: &str) -> Option<CatalogIndex> {
        self.index.get(molecule).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CatalogIndex, &str)> {
        self.molecules.iter().enumerate().map(|(i, m)| (i, m.as_str()))
    }
}
