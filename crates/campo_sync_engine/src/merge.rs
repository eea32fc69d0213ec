//! Deep merge of server and client payloads.

use campo_sync_protocol::Payload;
use serde_json::Value;
use std::collections::HashSet;

/// Merges `client` over `server`.
///
/// Keys only on one side are kept, nested objects are merged recursively,
/// two arrays become their union (server elements first, then client
/// elements not already present), and any other pair takes the client
/// value. The result does not depend on the order keys were inserted,
/// but merging is not commutative.
pub fn merge(server: &Payload, client: &Payload) -> Payload {
    let mut merged = server.clone();
    for (key, client_value) in client {
        let value = match merged.get(key) {
            Some(server_value) => merge_value(server_value, client_value),
            None => client_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

fn merge_value(server: &Value, client: &Value) -> Value {
    match (server, client) {
        (Value::Object(s), Value::Object(c)) => Value::Object(merge(s, c)),
        (Value::Array(s), Value::Array(c)) => Value::Array(union(s, c)),
        _ => client.clone(),
    }
}

fn union(server: &[Value], client: &[Value]) -> Vec<Value> {
    // serde_json::Value is not Hash; its canonical text form is.
    let mut seen = HashSet::new();
    server
        .iter()
        .chain(client)
        .filter(|v| seen.insert(v.to_string()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    #[test]
    fn documented_example() {
        let server = payload(json!({
            "a": 1,
            "b": {"x": 1, "y": 2},
            "c": [1, 2, 3],
            "d": "server"
        }));
        let client = payload(json!({
            "a": 2,
            "b": {"y": 3, "z": 4},
            "c": [3, 4, 5],
            "e": "client"
        }));

        let merged = merge(&server, &client);
        assert_eq!(merged["a"], json!(2));
        assert_eq!(merged["b"], json!({"x": 1, "y": 3, "z": 4}));
        assert_eq!(merged["c"], json!([1, 2, 3, 4, 5]));
        assert_eq!(merged["d"], json!("server"));
        assert_eq!(merged["e"], json!("client"));
    }

    #[test]
    fn type_mismatch_takes_client() {
        let server = payload(json!({"tags": ["a"], "meta": {"k": 1}}));
        let client = payload(json!({"tags": "a", "meta": null}));
        let merged = merge(&server, &client);
        assert_eq!(merged["tags"], json!("a"));
        assert_eq!(merged["meta"], json!(null));
    }

    #[test]
    fn union_deduplicates_structured_values() {
        let server = payload(json!({"fotos": [{"id": 1}, {"id": 2}]}));
        let client = payload(json!({"fotos": [{"id": 2}, {"id": 3}, {"id": 3}]}));
        let merged = merge(&server, &client);
        assert_eq!(merged["fotos"], json!([{"id": 1}, {"id": 2}, {"id": 3}]));
    }

    #[test]
    fn empty_sides() {
        let data = payload(json!({"status": "CONCLUIDA"}));
        assert_eq!(merge(&Payload::new(), &data), data);
        assert_eq!(merge(&data, &Payload::new()), data);
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            (-100i64..100).prop_map(Value::from),
            "[a-z]{0,4}".prop_map(Value::from),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-d]", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn json_payload() -> impl Strategy<Value = Payload> {
        prop::collection::btree_map("[a-f]", json_value(), 0..6)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn server_only_keys_survive(server in json_payload(), client in json_payload()) {
            let merged = merge(&server, &client);
            for (key, value) in &server {
                if !client.contains_key(key) {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
        }

        #[test]
        fn client_keys_present(server in json_payload(), client in json_payload()) {
            let merged = merge(&server, &client);
            for key in client.keys() {
                prop_assert!(merged.contains_key(key));
            }
            prop_assert!(merged.len() <= server.len() + client.len());
        }

        #[test]
        fn client_scalars_win(server in json_payload(), client in json_payload()) {
            let merged = merge(&server, &client);
            for (key, value) in &client {
                let structured = value.is_object() || value.is_array();
                if !structured {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
        }

        #[test]
        fn deterministic(server in json_payload(), client in json_payload()) {
            prop_assert_eq!(merge(&server, &client), merge(&server, &client));
        }

        #[test]
        fn merge_with_self_is_idempotent(data in json_payload()) {
            let once = merge(&data, &data);
            prop_assert_eq!(merge(&once, &data), once);
        }
    }
}
