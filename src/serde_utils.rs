use serde::{Deserialize, Deserializer, de::Error};
use std::time::Duration;

pub fn deserialize_humantime<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    value
        .map(|s| humantime::parse_duration(s.trim()).map_err(D::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestStruct {
        #[serde(default, deserialize_with = "deserialize_humantime")]
        backoff: Option<Duration>,
    }

    #[test]
    fn test_deserialize_humantime() {
        let json = r#"{"backoff": "1s 500ms"}"#;
        let result: TestStruct = serde_json::from_str(json).unwrap();

        assert_eq!(result.backoff, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_deserialize_humantime_missing() {
        let result: TestStruct = serde_json::from_str("{}").unwrap();
        assert_eq!(result.backoff, None);
    }

    #[test]
    fn test_deserialize_humantime_rejects_garbage() {
        let json = r#"{"backoff": "soon"}"#;
        assert!(serde_json::from_str::<TestStruct>(json).is_err());
    }
}
