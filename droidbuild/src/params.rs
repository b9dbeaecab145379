//! Resolution of goal settings.
//!
//! Every goal declares its settings as [`Param`]s. A value is taken from the
//! goal's section in `android.yaml`, replaced by the property
//! `android.<group>.<name>` when one is set, and otherwise filled from the
//! declared default.
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required parameter {property} has no value. Please supply with -D{property}=value on the command line or as property or plugin configuration in android.yaml.")]
    Missing { property: String },
    #[error("invalid value `{value}` for {property}: {reason}")]
    Conversion {
        property: String,
        value: String,
        reason: String,
    },
    #[error("unknown expression ${{{0}}}")]
    UnknownExpression(String),
    #[error("failed to compute a default for {property}: {reason}")]
    Provider { property: String, reason: String },
}

/// A setting type that can be read from yaml or from a property string.
pub trait ConfigValue: Sized {
    fn from_text(text: &str) -> Result<Self, String>;

    fn from_yaml(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Self::from_text(s),
            Value::Bool(b) => Self::from_text(&b.to_string()),
            Value::Number(n) => Self::from_text(&n.to_string()),
            other => Err(format!("unexpected value {:?}", other)),
        }
    }

    /// Empty lists count as no value.
    fn is_unset(&self) -> bool {
        false
    }
}

impl ConfigValue for String {
    fn from_text(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }
}

impl ConfigValue for bool {
    fn from_text(text: &str) -> Result<Self, String> {
        text.trim().parse().map_err(|err| format!("{}", err))
    }
}

impl ConfigValue for u32 {
    fn from_text(text: &str) -> Result<Self, String> {
        text.trim().parse().map_err(|err| format!("{}", err))
    }
}

impl ConfigValue for PathBuf {
    fn from_text(text: &str) -> Result<Self, String> {
        Ok(PathBuf::from(text))
    }
}

impl<T: ConfigValue> ConfigValue for Vec<T> {
    fn from_text(text: &str) -> Result<Self, String> {
        text.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(T::from_text)
            .collect()
    }

    fn from_yaml(value: &Value) -> Result<Self, String> {
        match value {
            Value::Sequence(items) => items.iter().map(T::from_yaml).collect(),
            other => match other.as_str() {
                Some(text) => Self::from_text(text),
                None => Ok(vec![T::from_yaml(other)?]),
            },
        }
    }

    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

pub type Provider<C, T> = fn(&C) -> anyhow::Result<Option<T>>;

enum Fallback<C, T> {
    None,
    Literal(&'static str),
    Provider(Provider<C, T>),
}

/// A named setting of a goal. `C` is the object provider functions are
/// called with.
pub struct Param<C, T> {
    name: &'static str,
    fallback: Fallback<C, T>,
    required: bool,
}

impl<C, T> Param<C, T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fallback: Fallback::None,
            required: false,
        }
    }

    /// Default expression, interpolated and converted when nothing is set.
    pub fn literal(mut self, literal: &'static str) -> Self {
        self.fallback = Fallback::Literal(literal);
        self
    }

    pub fn provider(mut self, provider: Provider<C, T>) -> Self {
        self.fallback = Fallback::Provider(provider);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Host properties: the project's `properties:`, `-D` definitions and the
/// built in `project.*` expressions.
#[derive(Clone, Debug, Default)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up a property. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn is_true(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// Replaces every `${name}` in `text` with the property `name`.
    pub fn interpolate(&self, text: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let expr = &rest[start + 2..];
            let Some(end) = expr.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &expr[..end];
            let value = self
                .0
                .get(name)
                .ok_or_else(|| ConfigError::UnknownExpression(name.to_string()))?;
            out.push_str(value);
            rest = &expr[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Resolves the settings of one goal group.
pub struct ConfigHandler<'a> {
    group: &'a str,
    pojo: Option<&'a Mapping>,
    properties: &'a Properties,
}

impl<'a> ConfigHandler<'a> {
    pub fn new(group: &'a str, pojo: Option<&'a Mapping>, properties: &'a Properties) -> Self {
        Self {
            group,
            pojo,
            properties,
        }
    }

    /// The property that overrides `name`, e.g. `android.dex.coreLibrary`.
    pub fn property_name(&self, name: &str) -> String {
        format!("android.{}.{}", self.group, name)
    }

    pub fn resolve<C, T: ConfigValue>(
        &self,
        param: &Param<C, T>,
        target: &C,
    ) -> Result<Option<T>, ConfigError> {
        let property = self.property_name(param.name);
        let convert = |value: &str, reason: String| ConfigError::Conversion {
            property: property.clone(),
            value: value.to_string(),
            reason,
        };
        let mut value = None;
        if let Some(raw) = self.pojo.and_then(|pojo| pojo.get(param.name)) {
            if !raw.is_null() {
                let parsed = T::from_yaml(raw).map_err(|reason| convert(&format!("{:?}", raw), reason))?;
                if !parsed.is_unset() {
                    value = Some(parsed);
                }
            }
        }
        if let Some(text) = self.properties.get(&property) {
            let parsed = T::from_text(text).map_err(|reason| convert(text, reason))?;
            if !parsed.is_unset() {
                value = Some(parsed);
            }
        }
        if value.is_none() {
            value = match &param.fallback {
                Fallback::Literal(literal) => {
                    let text = self.properties.interpolate(literal)?;
                    Some(T::from_text(&text).map_err(|reason| convert(&text, reason))?)
                }
                Fallback::Provider(provider) => {
                    provider(target).map_err(|err| ConfigError::Provider {
                        property: property.clone(),
                        reason: format!("{:#}", err),
                    })?
                }
                Fallback::None => None,
            };
        }
        if value.is_none() && param.required {
            return Err(ConfigError::Missing { property });
        }
        Ok(value)
    }

    /// Like [`Self::resolve`], but a missing value is an error.
    pub fn get<C, T: ConfigValue>(&self, param: &Param<C, T>, target: &C) -> Result<T, ConfigError> {
        self.resolve(param, target)?
            .ok_or_else(|| ConfigError::Missing {
                property: self.property_name(param.name),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Goal {
        letters: Vec<String>,
    }

    fn letters(goal: &Goal) -> anyhow::Result<Option<Vec<String>>> {
        Ok(Some(goal.letters.clone()))
    }

    fn nothing(_: &Goal) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn goal() -> Goal {
        Goal {
            letters: vec!["a".into(), "b".into()],
        }
    }

    fn pojo(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn literal_default() {
        let props = Properties::new();
        let handler = ConfigHandler::new("test", None, &props);
        let param = Param::<Goal, bool>::new("booleanValue").literal("true");
        assert!(handler.get(&param, &goal()).unwrap());
    }

    #[test]
    fn pojo_value_without_property() {
        let props = Properties::new();
        let section = pojo("stringValue: from config pojo\n");
        let handler = ConfigHandler::new("test", Some(&section), &props);
        let param = Param::<Goal, String>::new("stringValue").literal("from default");
        assert_eq!(handler.get(&param, &goal()).unwrap(), "from config pojo");
    }

    #[test]
    fn property_overrides_pojo_and_default() {
        let mut props = Properties::new();
        props.set("android.test.stringValue", "maven value");
        let section = pojo("stringValue: from config pojo\n");
        let handler = ConfigHandler::new("test", Some(&section), &props);
        let param = Param::<Goal, String>::new("stringValue").literal("from default");
        assert_eq!(handler.get(&param, &goal()).unwrap(), "maven value");
    }

    #[test]
    fn provider_default() {
        let props = Properties::new();
        let handler = ConfigHandler::new("test", None, &props);
        let param = Param::<Goal, Vec<String>>::new("letters").provider(letters);
        assert_eq!(handler.get(&param, &goal()).unwrap(), ["a", "b"]);
    }

    #[test]
    fn empty_values_do_not_override() {
        let mut props = Properties::new();
        props.set("android.test.letters", " , ");
        props.set("android.test.name", "");
        let section = pojo("letters: [x]\nname: kept\n");
        let handler = ConfigHandler::new("test", Some(&section), &props);
        let list = Param::<Goal, Vec<String>>::new("letters").provider(letters);
        assert_eq!(handler.get(&list, &goal()).unwrap(), ["x"]);
        let name = Param::<Goal, String>::new("name");
        assert_eq!(handler.get(&name, &goal()).unwrap(), "kept");
    }

    #[test]
    fn empty_pojo_list_falls_back_to_default() {
        let props = Properties::new();
        let section = pojo("letters: []\n");
        let handler = ConfigHandler::new("test", Some(&section), &props);
        let list = Param::<Goal, Vec<String>>::new("letters").provider(letters);
        assert_eq!(handler.get(&list, &goal()).unwrap(), ["a", "b"]);
    }

    #[test]
    fn required_without_value_names_the_property() {
        let props = Properties::new();
        let handler = ConfigHandler::new("push", None, &props);
        let param = Param::<Goal, String>::new("source").required();
        let err = handler.resolve(&param, &goal()).unwrap_err();
        assert!(matches!(&err, ConfigError::Missing { property } if property == "android.push.source"));
        assert!(err
            .to_string()
            .contains("-Dandroid.push.source=value on the command line"));
        let provided = Param::<Goal, String>::new("source").provider(nothing).required();
        assert!(handler.resolve(&provided, &goal()).is_err());
    }

    #[test]
    fn optional_without_value_is_none() {
        let props = Properties::new();
        let handler = ConfigHandler::new("test", None, &props);
        let param = Param::<Goal, String>::new("filters");
        assert_eq!(handler.resolve(&param, &goal()).unwrap(), None);
        assert!(handler.get(&param, &goal()).is_err());
    }

    #[test]
    fn unconvertible_default_is_fatal() {
        let props = Properties::new();
        let handler = ConfigHandler::new("test", None, &props);
        let param = Param::<Goal, bool>::new("flag").literal("maybe");
        assert!(matches!(
            handler.resolve(&param, &goal()),
            Err(ConfigError::Conversion { .. })
        ));
        let mut props = Properties::new();
        props.set("android.test.count", "many");
        let handler = ConfigHandler::new("test", None, &props);
        let param = Param::<Goal, u32>::new("count").literal("1");
        assert!(handler.resolve(&param, &goal()).is_err());
    }

    #[test]
    fn literal_defaults_are_interpolated() {
        let mut props = Properties::new();
        props.set("project.build.directory", "/work/target");
        let handler = ConfigHandler::new("dex", None, &props);
        let param = Param::<Goal, PathBuf>::new("preDexLibLocation")
            .literal("${project.build.directory}/dexedLibs");
        assert_eq!(
            handler.get(&param, &goal()).unwrap(),
            PathBuf::from("/work/target/dexedLibs")
        );
        let unknown = Param::<Goal, String>::new("x").literal("${nope}");
        assert!(matches!(
            handler.resolve(&unknown, &goal()),
            Err(ConfigError::UnknownExpression(name)) if name == "nope"
        ));
    }

    #[test]
    fn interpolation_keeps_unterminated_text() {
        let props = Properties::new();
        assert_eq!(props.interpolate("plain").unwrap(), "plain");
        assert_eq!(props.interpolate("a ${b").unwrap(), "a ${b");
    }
}
