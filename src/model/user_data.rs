use std::collections::BTreeMap;

use crate::pixel::rgba_a;
use crate::variant::Variant;

/// Named property values of one extension.
pub type Properties = BTreeMap<String, Variant>;

/// Extension id (empty string for built-in properties) to its properties.
pub type PropertiesMaps = BTreeMap<String, Properties>;

/// Free text, a color and typed properties attached to any sprite object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
    pub text: String,
    pub color: u32,
    pub properties: PropertiesMaps,
}

impl UserData {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }

    /// Built-in (extension-less) properties, created on demand.
    pub fn properties_mut(&mut self, extension: &str) -> &mut Properties {
        self.properties.entry(extension.to_string()).or_default()
    }

    /// Maps that hold at least one property.
    pub fn nonempty_maps(&self) -> impl Iterator<Item = (&String, &Properties)> {
        self.properties.iter().filter(|(_, p)| !p.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && rgba_a(self.color) == 0 && self.nonempty_maps().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::rgba;

    #[test]
    fn test_empty_user_data() {
        let mut ud = UserData::default();
        assert!(ud.is_empty());

        ud.properties_mut("");
        assert!(ud.is_empty());

        ud.color = rgba(10, 20, 30, 0);
        assert!(ud.is_empty());

        ud.color = rgba(10, 20, 30, 255);
        assert!(!ud.is_empty());
    }

    #[test]
    fn test_text_makes_nonempty() {
        assert!(!UserData::with_text("note").is_empty());
    }
}
