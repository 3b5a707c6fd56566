// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Accepts the container library as a single string or a non-empty list.

use nonempty::NonEmpty;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LibraryEntry {
    Single(String),
    Many(Vec<String>),
}

pub fn deserialize_library_option<'de, D>(
    deserializer: D,
) -> Result<Option<NonEmpty<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entry: Option<LibraryEntry> = Option::deserialize(deserializer)?;
    let libraries = match entry {
        None => return Ok(None),
        Some(LibraryEntry::Single(library)) => vec![library],
        Some(LibraryEntry::Many(libraries)) => libraries,
    };
    let libraries: Vec<String> = libraries
        .into_iter()
        .map(|library| library.trim().to_string())
        .filter(|library| !library.is_empty())
        .collect();

    NonEmpty::from_vec(libraries)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("container_library cannot be empty"))
}
