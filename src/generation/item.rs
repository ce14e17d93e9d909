use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// An encoded raster image travelling through the pipeline: the uploaded
/// source photo, a generated result, or the composed page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImageData {
    /// Declared media type, e.g. `image/jpeg`.
    pub media_type: String,
    /// Raw image bytes; base64 on the wire.
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String)]
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }
}

/// Lifecycle state of one archetype within a run. The result and the error
/// message live inside their matching variants, so exactly one of them can
/// exist at a time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase", tag = "status", content = "data")]
pub enum ItemStatus {
    Pending,
    InFlight,
    Done(ImageData),
    Error(String),
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Done(_) | ItemStatus::Error(_))
    }

    /// Copy of the status with any image payload removed, for status
    /// endpoints that should not ship megabytes of pixels.
    pub fn without_payload(&self) -> ItemStatus {
        match self {
            ItemStatus::Done(image) => {
                ItemStatus::Done(ImageData::new(image.media_type.clone(), vec![]))
            }
            other => other.clone(),
        }
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_data_round_trips_as_base64() {
        let image = ImageData::new("image/png", vec![1, 2, 3, 250]);
        let json = serde_json::to_string(&image).unwrap();
        assert!(json.contains("\"media_type\":\"image/png\""));
        let back: ImageData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn status_serializes_with_tag_and_content() {
        let status = ItemStatus::Error("backend refused".into());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["data"], "backend refused");

        let pending = serde_json::to_value(ItemStatus::Pending).unwrap();
        assert_eq!(pending["status"], "pending");
    }

    #[test]
    fn without_payload_strips_done_bytes_only() {
        let done = ItemStatus::Done(ImageData::new("image/png", vec![9; 64]));
        match done.without_payload() {
            ItemStatus::Done(image) => {
                assert_eq!(image.media_type, "image/png");
                assert!(image.data.is_empty());
            }
            other => panic!("unexpected status: {other:?}"),
        }

        let err = ItemStatus::Error("boom".into());
        assert_eq!(err.without_payload(), err);
    }
}
