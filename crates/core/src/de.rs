use serde::{Deserialize, Deserializer};

/// Catalog fields that arrive as numbers or strings depending on the endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Unsigned(n)) => Some(n),
        Some(Loose::Signed(n)) => u64::try_from(n).ok(),
        Some(Loose::Float(f)) if f.is_finite() && f >= 0.0 => Some(f.round() as u64),
        Some(Loose::Float(_)) => None,
        Some(Loose::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Unsigned(n)) => Some(n.to_string()),
        Some(Loose::Signed(n)) => Some(n.to_string()),
        Some(Loose::Float(f)) => Some(f.to_string()),
        Some(Loose::Text(s)) => Some(s),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::{lenient_string, lenient_u64};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient_u64")]
        count: Option<u64>,
        #[serde(default, deserialize_with = "lenient_string")]
        year: Option<String>,
    }

    fn sample(raw: &str) -> Sample {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn accepts_numbers_strings_and_nulls() {
        let p = sample(r#"{"count":"42","year":1999}"#);
        assert_eq!(p.count, Some(42));
        assert_eq!(p.year.as_deref(), Some("1999"));

        let p = sample(r#"{"count":-1,"year":null}"#);
        assert_eq!(p.count, None);
        assert_eq!(p.year, None);

        let p = sample(r#"{"count":"n/a"}"#);
        assert_eq!(p.count, None);
    }
}
