//! Deep merge of configuration trees

use serde_yaml::Value;

/// Merges `overlay` into `base`.
///
/// Mappings merge key-wise and recursively; any other value in the overlay
/// replaces the base value outright. Sequences are not concatenated.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_mappings_merge_recursively() {
        let mut base = yaml("job:\n  stage: test\n  script: [a]");
        deep_merge(&mut base, yaml("job:\n  stage: deploy"));

        assert_eq!(base["job"]["stage"], yaml("deploy"));
        assert_eq!(base["job"]["script"], yaml("[a]"));
    }

    #[test]
    fn test_scalars_and_sequences_replace() {
        let mut base = yaml("stages: [build, test]");
        deep_merge(&mut base, yaml("stages: [deploy]"));

        assert_eq!(base["stages"], yaml("[deploy]"));
    }

    #[test]
    fn test_new_keys_inserted() {
        let mut base = yaml("a: 1");
        deep_merge(&mut base, yaml("b: 2"));

        assert_eq!(base["a"], yaml("1"));
        assert_eq!(base["b"], yaml("2"));
    }
}
