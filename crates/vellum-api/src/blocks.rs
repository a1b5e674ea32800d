use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Template side - Configuration, Block, BlockParameter, BlockRelation
// =============================================================================

/// A configuration: a reusable world-building template set.
///
/// It owns block definitions, their parameters, the relations between them,
/// and the notes written against it. Books reference a configuration and
/// instantiate its blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub uuid: String,
    pub title: String,
    pub description: String,
}

impl Configuration {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// A block definition: a template for one kind of story element
/// (character, location, artefact, ...) within a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub uuid: String,
    pub configuration_uuid: String,
    pub title: String,
    pub description: String,
}

impl Block {
    pub fn new(
        configuration_uuid: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            configuration_uuid: configuration_uuid.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Data shape of a block parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKind {
    Text,
    MultilineText,
    Number,
    Checkbox,
    Date,
    Select,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Text => "text",
            ParameterKind::MultilineText => "multilineText",
            ParameterKind::Number => "number",
            ParameterKind::Checkbox => "checkbox",
            ParameterKind::Date => "date",
            ParameterKind::Select => "select",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ParameterKind::Text),
            "multilineText" => Some(ParameterKind::MultilineText),
            "number" => Some(ParameterKind::Number),
            "checkbox" => Some(ParameterKind::Checkbox),
            "date" => Some(ParameterKind::Date),
            "select" => Some(ParameterKind::Select),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parameter (field) declared on a block definition.
///
/// `options` carries the choices of a `Select` parameter and stays empty for
/// the other kinds. `position` orders parameters within their block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockParameter {
    pub uuid: String,
    pub block_uuid: String,
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub position: u32,
}

impl BlockParameter {
    pub fn new(block_uuid: impl Into<String>, name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            block_uuid: block_uuid.into(),
            name: name.into(),
            kind,
            options: Vec::new(),
            position: 0,
        }
    }

    /// Builder: set the in-block ordering position
    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Builder: set the choices of a `Select` parameter
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

/// A typed, named edge between two block definitions of one configuration
/// (e.g. character "lives in" location).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRelation {
    pub uuid: String,
    pub configuration_uuid: String,
    pub name: String,
    pub source_block_uuid: String,
    pub target_block_uuid: String,
}

impl BlockRelation {
    pub fn new(
        configuration_uuid: impl Into<String>,
        name: impl Into<String>,
        source_block_uuid: impl Into<String>,
        target_block_uuid: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            configuration_uuid: configuration_uuid.into(),
            name: name.into(),
            source_block_uuid: source_block_uuid.into(),
            target_block_uuid: target_block_uuid.into(),
        }
    }
}

// =============================================================================
// Instance side - per-book materializations of the templates
// =============================================================================

/// One concrete story element in one book, created from a block definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInstance {
    pub uuid: String,
    pub block_uuid: String,
    pub book_uuid: String,
    pub title: String,
}

impl BlockInstance {
    pub fn new(
        block_uuid: impl Into<String>,
        book_uuid: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            block_uuid: block_uuid.into(),
            book_uuid: book_uuid.into(),
            title: title.into(),
        }
    }
}

/// The value an instance holds for one of its block's parameters.
///
/// At most one row exists per `(instance_uuid, parameter_uuid)` pair; the
/// storage layer enforces this with a compound unique index. Values are
/// stored as strings regardless of the parameter kind, matching what the
/// editing surface reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockParameterInstance {
    pub uuid: String,
    pub instance_uuid: String,
    pub parameter_uuid: String,
    pub value: String,
}

impl BlockParameterInstance {
    pub fn new(
        instance_uuid: impl Into<String>,
        parameter_uuid: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            instance_uuid: instance_uuid.into(),
            parameter_uuid: parameter_uuid.into(),
            value: value.into(),
        }
    }
}

/// A concrete edge between two block instances, realizing a declared
/// relation (e.g. this character lives in that location).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRelationInstance {
    pub uuid: String,
    pub relation_uuid: String,
    pub source_instance_uuid: String,
    pub target_instance_uuid: String,
}

impl BlockRelationInstance {
    pub fn new(
        relation_uuid: impl Into<String>,
        source_instance_uuid: impl Into<String>,
        target_instance_uuid: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            relation_uuid: relation_uuid.into(),
            source_instance_uuid: source_instance_uuid.into(),
            target_instance_uuid: target_instance_uuid.into(),
        }
    }
}

/// A parameter definition paired with the value a related instance holds for
/// it. Returned by reverse-reference queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterWithValue {
    pub parameter: BlockParameter,
    pub value: BlockParameterInstance,
}

// =============================================================================
// Patches
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockParameterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParameterKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRelationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInstancePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_kind_round_trip() {
        for kind in [
            ParameterKind::Text,
            ParameterKind::MultilineText,
            ParameterKind::Number,
            ParameterKind::Checkbox,
            ParameterKind::Date,
            ParameterKind::Select,
        ] {
            assert_eq!(ParameterKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ParameterKind::from_str("dropdown"), None);
    }

    #[test]
    fn test_parameter_kind_serde_matches_as_str() {
        let json = serde_json::to_value(ParameterKind::MultilineText).unwrap();
        assert_eq!(json, serde_json::json!("multilineText"));
    }

    #[test]
    fn test_parameter_builder() {
        let param = BlockParameter::new("blk-1", "Mood", ParameterKind::Select)
            .with_position(2)
            .with_options(vec!["red".to_string(), "blue".to_string()]);
        assert_eq!(param.position, 2);
        assert_eq!(param.options, vec!["red", "blue"]);
    }

    #[test]
    fn test_select_options_absent_when_empty() {
        let param = BlockParameter::new("blk-1", "Name", ParameterKind::Text);
        let value = serde_json::to_value(&param).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("options"));
        assert!(obj.contains_key("blockUuid"));
    }
}
