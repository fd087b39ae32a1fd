use indexmap::IndexMap;

use crate::connection::{IngestionConnection, ProviderRegistration};
use crate::{DataPlatformError, Result};

/// Accumulates provider identity before registration.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistrarBuilder {
    name: String,
    attributes: IndexMap<String, String>,
}

impl ProviderRegistrarBuilder {
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes(
        mut self,
        attributes: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn build(self) -> Result<ProviderRegistrar> {
        if self.name.is_empty() {
            return Err(DataPlatformError::Input(
                "provider registrar: empty provider name".to_string(),
            ));
        }
        Ok(ProviderRegistrar {
            name: self.name,
            attributes: self.attributes,
        })
    }
}

/// An immutable provider identity. Registration consumes the registrar and
/// yields the provider uid to stamp on ingestion requests.
#[derive(Debug, Clone)]
pub struct ProviderRegistrar {
    name: String,
    attributes: IndexMap<String, String>,
}

impl ProviderRegistrar {
    pub fn builder(name: impl Into<String>) -> ProviderRegistrarBuilder {
        ProviderRegistrarBuilder {
            name: name.into(),
            attributes: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub async fn register<C: IngestionConnection>(
        self,
        connection: &C,
    ) -> Result<ProviderRegistration> {
        connection.register_provider(&self.name, &self.attributes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_name() {
        assert!(ProviderRegistrar::builder("").build().is_err());
    }

    #[test]
    fn builder_accumulates_attributes() {
        let registrar = ProviderRegistrar::builder("beamline-7")
            .attribute("facility", "ring-1")
            .attribute("rack", "c04")
            .build()
            .unwrap();
        assert_eq!(registrar.name(), "beamline-7");
        assert_eq!(registrar.attributes().len(), 2);
        assert_eq!(
            registrar.attributes().get("facility").map(String::as_str),
            Some("ring-1")
        );
    }
}
