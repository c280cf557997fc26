use serde::de::DeserializeOwned;

use crate::error::ParseError;

fn with_path<'de, D, T>(de: D) -> Result<T, ParseError>
where
    D: serde::Deserializer<'de>,
    D::Error: std::fmt::Display,
    T: DeserializeOwned,
{
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| ParseError {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, ParseError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    with_path(de)
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ParseError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    with_path(de)
}

pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ParseError> {
    with_path(value)
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Outer {
        #[allow(dead_code)]
        items: Vec<Inner>,
    }

    #[derive(Debug, Deserialize)]
    struct Inner {
        #[allow(dead_code)]
        id: u32,
    }

    #[test]
    fn errors_carry_the_json_path() {
        let err = from_str_with_path::<Outer>(r#"{"items": [{"id": 1}, {"id": "x"}]}"#).unwrap_err();
        assert_eq!(err.path, "items[1].id");

        let err = from_value_with_path::<Outer>(json!({"items": [{}]})).unwrap_err();
        assert_eq!(err.path, "items[0]");
        assert!(err.message.contains("id"), "{}", err.message);
    }
}
