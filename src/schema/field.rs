//! The closed field set every routed fact carries
//!
//! `Field` is the tag set; `FieldValues` is the positional tuple a substrate
//! delivers; `FactFields` is the typed record nodes work with. Converting
//! between the latter two goes through `Field::ALL`, so adding a field is a
//! compile error everywhere it is not handled.

use crate::fact::{Action, GraphFragment, TimestampSeq};
use crate::routing::RouteError;
use serde::{Deserialize, Serialize};

/// Names of the fields on every emitted fact, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Action,
    IsAssertion,
    GraphFragment,
    Timestamp,
}

impl Field {
    /// Every field, in the order they are declared and emitted.
    pub const ALL: [Field; 4] = [
        Field::Action,
        Field::IsAssertion,
        Field::GraphFragment,
        Field::Timestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::IsAssertion => "isAssertion",
            Self::GraphFragment => "graphFragment",
            Self::Timestamp => "timestamp",
        }
    }

    /// The declared names of `Field::ALL`.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Field::as_str).collect()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value carried in one field of a delivered tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Action(Action),
    Bool(bool),
    Fragment(GraphFragment),
    Timestamps(TimestampSeq),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::Bool(_) => "bool",
            Self::Fragment(_) => "fragment",
            Self::Timestamps(_) => "timestamps",
        }
    }
}

/// The positional tuple handed over by the substrate, addressable by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValues {
    values: Vec<(Field, FieldValue)>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: FieldValue) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field, replacing any earlier value for it.
    pub fn insert(&mut self, field: Field, value: FieldValue) {
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.iter().find(|(f, _)| *f == field).map(|(_, v)| v)
    }

    /// Fields present, in tuple order
    pub fn fields(&self) -> Vec<Field> {
        self.values.iter().map(|(f, _)| *f).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The typed record of a fact's schema fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactFields {
    #[serde(default)]
    pub action: Action,
    pub is_assertion: bool,
    pub graph_fragment: GraphFragment,
    pub timestamp: TimestampSeq,
}

impl FactFields {
    pub fn new(
        action: Action,
        is_assertion: bool,
        graph_fragment: GraphFragment,
        timestamp: TimestampSeq,
    ) -> Self {
        Self {
            action,
            is_assertion,
            graph_fragment,
            timestamp,
        }
    }

    /// Fields for a fact leaving a matcher: the action defaults to probe.
    pub fn probe(is_assertion: bool, graph_fragment: GraphFragment, timestamp: TimestampSeq) -> Self {
        Self::new(Action::Probe, is_assertion, graph_fragment, timestamp)
    }

    /// Extract every schema field from a delivered tuple.
    pub fn from_values(values: &FieldValues) -> Result<Self, RouteError> {
        let action = match require(values, Field::Action)? {
            FieldValue::Action(a) => *a,
            other => return Err(wrong_type(Field::Action, "action", other)),
        };
        let is_assertion = match require(values, Field::IsAssertion)? {
            FieldValue::Bool(b) => *b,
            other => return Err(wrong_type(Field::IsAssertion, "bool", other)),
        };
        let graph_fragment = match require(values, Field::GraphFragment)? {
            FieldValue::Fragment(g) => g.clone(),
            other => return Err(wrong_type(Field::GraphFragment, "fragment", other)),
        };
        let timestamp = match require(values, Field::Timestamp)? {
            FieldValue::Timestamps(t) => t.clone(),
            other => return Err(wrong_type(Field::Timestamp, "timestamps", other)),
        };
        Ok(Self::new(action, is_assertion, graph_fragment, timestamp))
    }

    /// Lay the record out as a tuple in `Field::ALL` order.
    pub fn to_values(&self) -> FieldValues {
        let mut values = FieldValues::new();
        for field in Field::ALL {
            let value = match field {
                Field::Action => FieldValue::Action(self.action),
                Field::IsAssertion => FieldValue::Bool(self.is_assertion),
                Field::GraphFragment => FieldValue::Fragment(self.graph_fragment.clone()),
                Field::Timestamp => FieldValue::Timestamps(self.timestamp.clone()),
            };
            values.insert(field, value);
        }
        values
    }
}

fn require(values: &FieldValues, field: Field) -> Result<&FieldValue, RouteError> {
    values.get(field).ok_or(RouteError::MissingField(field))
}

fn wrong_type(field: Field, expected: &'static str, found: &FieldValue) -> RouteError {
    RouteError::WrongFieldType {
        field,
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::Statement;

    fn fields() -> FactFields {
        FactFields::new(
            Action::Build,
            true,
            GraphFragment::new(vec![Statement::new("ex:a", "rdf:type", "ex:Person")]),
            TimestampSeq::new(vec![4, 2]),
        )
    }

    #[test]
    fn field_names_are_declared_in_order() {
        assert_eq!(
            Field::names(),
            vec!["action", "isAssertion", "graphFragment", "timestamp"]
        );
    }

    #[test]
    fn field_from_name_inverts_as_str() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.as_str()), Some(field));
        }
        assert_eq!(Field::from_name("isAdd"), None);
    }

    #[test]
    fn to_values_emits_every_field_in_order() {
        let values = fields().to_values();
        assert_eq!(values.fields(), Field::ALL.to_vec());
    }

    #[test]
    fn from_values_reads_back_record() {
        let record = fields();
        assert_eq!(FactFields::from_values(&record.to_values()).unwrap(), record);
    }

    #[test]
    fn from_values_reports_wrong_type() {
        let values = fields()
            .to_values()
            .with(Field::IsAssertion, FieldValue::Action(Action::Probe));
        match FactFields::from_values(&values) {
            Err(RouteError::WrongFieldType { field, expected, found }) => {
                assert_eq!(field, Field::IsAssertion);
                assert_eq!(expected, "bool");
                assert_eq!(found, "action");
            }
            other => panic!("expected WrongFieldType, got {:?}", other),
        }
    }

    #[test]
    fn insert_replaces_existing_value() {
        let mut values = FieldValues::new().with(Field::IsAssertion, FieldValue::Bool(true));
        values.insert(Field::IsAssertion, FieldValue::Bool(false));
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(Field::IsAssertion), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn serialized_record_is_keyed_by_field_names() {
        let json = serde_json::to_value(fields()).unwrap();
        let object = json.as_object().unwrap();
        for name in Field::names() {
            assert!(object.contains_key(name), "missing {}", name);
        }
        assert_eq!(json["action"], "build");
    }

    #[test]
    fn deserialized_record_defaults_action_to_probe() {
        let json = serde_json::json!({
            "isAssertion": true,
            "graphFragment": [],
            "timestamp": [1]
        });
        let record: FactFields = serde_json::from_value(json).unwrap();
        assert_eq!(record.action, Action::Probe);
    }
}
