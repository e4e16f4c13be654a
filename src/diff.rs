use serde_json::Value;

/// Collects `(path, old, new)` for every leaf that differs between two JSON
/// documents. Objects are walked by key and arrays by index, so a changed
/// zone temperature shows up as `ZoneStatus.2.temperature`.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = join(path_prefix, key);
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => added(curr_val, &path, changes),
                }
            }
            for (key, prev_val) in prev_map {
                if !curr_map.contains_key(key) {
                    changes.push((join(path_prefix, key), prev_val.clone(), Value::Null));
                }
            }
        }
        (Value::Array(prev_items), Value::Array(curr_items)) => {
            for (i, curr_val) in curr_items.iter().enumerate() {
                let path = join(path_prefix, &i.to_string());
                match prev_items.get(i) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => added(curr_val, &path, changes),
                }
            }
            for (i, prev_val) in prev_items.iter().enumerate().skip(curr_items.len()) {
                changes.push((join(path_prefix, &i.to_string()), prev_val.clone(), Value::Null));
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

fn added(value: &Value, path: &str, changes: &mut Vec<(String, Value, Value)>) {
    match value {
        Value::Object(_) => diff_json(&Value::Object(serde_json::Map::new()), value, path, changes),
        Value::Array(_) => diff_json(&Value::Array(Vec::new()), value, path, changes),
        _ => changes.push((path.to_string(), Value::Null, value.clone())),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_detects_leaf_change() {
        let prev = json!({"ZoneStatus": [{"zone_number": 0, "temperature": 21.5}]});
        let curr = json!({"ZoneStatus": [{"zone_number": 0, "temperature": 22.0}]});
        let mut changes = vec![];
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "ZoneStatus.0.temperature");
        assert_eq!(changes[0].1, json!(21.5));
        assert_eq!(changes[0].2, json!(22.0));
    }

    #[test]
    fn diff_ignores_unchanged() {
        let val = json!({"AcStatus": [{"ac_number": 0, "setpoint": 22, "power": "On"}]});
        let mut changes = vec![];
        diff_json(&val, &val, "", &mut changes);
        assert!(changes.is_empty());
    }

    #[test]
    fn diff_reports_added_and_removed_records() {
        let prev = json!({"ZoneStatus": [{"zone_number": 0}, {"zone_number": 1}]});
        let curr = json!({"ZoneStatus": [{"zone_number": 0}, {"zone_number": 1}, {"zone_number": 2}]});
        let mut changes = vec![];
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes, vec![("ZoneStatus.2.zone_number".to_string(), json!(null), json!(2))]);

        let mut changes = vec![];
        diff_json(&curr, &prev, "", &mut changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "ZoneStatus.2");
        assert_eq!(changes[0].2, json!(null));
    }

    #[test]
    fn diff_detects_new_key() {
        let prev = json!({"status": {}});
        let curr = json!({"status": {"temperature": 22.5}});
        let mut changes = vec![];
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "status.temperature");
    }
}
