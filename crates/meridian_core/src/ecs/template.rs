//! Entity templates: named bundles of default component data.

use meridian_shared::{Data, Params, StrId};

/// Default component data keyed by component name.
///
/// Templates only ever add components; a void entry is ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityTemplate {
    desc: Params,
}

impl EntityTemplate {
    /// Creates a template from its description.
    #[must_use]
    pub fn new(desc: Params) -> Self {
        Self { desc }
    }

    /// Parses a template from a JSON document.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        Params::from_json_str(text).map(Self::new)
    }

    /// Raw description.
    #[must_use]
    pub const fn desc(&self) -> &Params {
        &self.desc
    }

    /// Data declared for `component`, if any.
    #[must_use]
    pub fn component(&self, component: StrId) -> Option<&Data> {
        self.desc.get(component).filter(|d| !d.is_void())
    }

    /// Declared components and their data, void entries skipped.
    pub fn components(&self) -> impl Iterator<Item = (StrId, &Data)> + '_ {
        self.desc
            .iter()
            .filter(|(_, data)| !data.is_void())
            .map(|(name, data)| (*name, data))
    }
}
