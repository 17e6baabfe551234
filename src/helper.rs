use serde_json::{Map, Value};

/// The shape of a JSON-LD value, as far as the expansion rules care.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Null,
    Scalar,
    Array,
    ValueObject,
    ListObject,
    SetObject,
    /// A map with `@graph` and nothing but `@id`, `@index` or `@context`.
    GraphObject,
    /// A map with only `@id`.
    NodeReference,
    NodeObject,
}

impl NodeKind {
    pub fn of(value: &Value) -> NodeKind {
        match value {
            Value::Null => NodeKind::Null,
            Value::Array(_) => NodeKind::Array,
            Value::Object(map) => NodeKind::of_map(map),
            _ => NodeKind::Scalar,
        }
    }

    pub fn of_map(map: &Map<String, Value>) -> NodeKind {
        if map.contains_key("@value") {
            NodeKind::ValueObject
        } else if map.contains_key("@list") {
            NodeKind::ListObject
        } else if map.contains_key("@set") {
            NodeKind::SetObject
        } else if map.contains_key("@graph")
            && map
                .keys()
                .all(|k| matches!(k.as_str(), "@graph" | "@id" | "@index" | "@context"))
        {
            NodeKind::GraphObject
        } else if map.len() == 1 && map.contains_key("@id") {
            NodeKind::NodeReference
        } else {
            NodeKind::NodeObject
        }
    }

    /// Node objects in the wide sense: anything describing a node, graph
    /// objects and bare references included.
    pub fn is_node(self) -> bool {
        matches!(
            self,
            NodeKind::NodeObject | NodeKind::NodeReference | NodeKind::GraphObject
        )
    }
}

/// Views a value as a list of values without copying.
pub(crate) fn as_values(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

/// Turns an expanded value into an array. Null becomes the empty array.
pub(crate) fn into_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => vec![],
        other => vec![other],
    }
}

/// Appends `value` to the array stored under `key`, creating it if needed.
/// Arrays are appended item by item.
pub(crate) fn add_value(map: &mut Map<String, Value>, key: &str, value: Value) {
    let entry = map
        .entry(key.to_owned())
        .or_insert_with(|| Value::Array(vec![]));

    if !entry.is_array() {
        let single = entry.take();
        *entry = Value::Array(vec![single]);
    }

    if let Value::Array(items) = entry {
        match value {
            Value::Array(values) => items.extend(values),
            other => items.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_shapes() {
        assert_eq!(NodeKind::of(&json!(null)), NodeKind::Null);
        assert_eq!(NodeKind::of(&json!("a")), NodeKind::Scalar);
        assert_eq!(NodeKind::of(&json!([1])), NodeKind::Array);
        assert_eq!(NodeKind::of(&json!({"@value": 1, "@type": "x:y"})), NodeKind::ValueObject);
        assert_eq!(NodeKind::of(&json!({"@list": []})), NodeKind::ListObject);
        assert_eq!(NodeKind::of(&json!({"@set": [], "@index": "a"})), NodeKind::SetObject);
        assert_eq!(NodeKind::of(&json!({"@graph": [], "@id": "_:g"})), NodeKind::GraphObject);
        assert_eq!(NodeKind::of(&json!({"@id": "_:b"})), NodeKind::NodeReference);
        assert_eq!(
            NodeKind::of(&json!({"@graph": [], "http://ex/p": []})),
            NodeKind::NodeObject
        );
    }

    #[test]
    fn add_value_appends() {
        let mut map = Map::new();
        add_value(&mut map, "p", json!("a"));
        add_value(&mut map, "p", json!(["b", "c"]));
        add_value(&mut map, "p", json!({"@list": []}));
        assert_eq!(map["p"], json!(["a", "b", "c", {"@list": []}]));
    }

    #[test]
    fn array_views() {
        assert_eq!(as_values(&json!("x")), &[json!("x")][..]);
        assert_eq!(into_array(json!(null)), Vec::<Value>::new());
        assert_eq!(into_array(json!([1, 2])), vec![json!(1), json!(2)]);
    }
}
