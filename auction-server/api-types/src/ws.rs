use {
    serde::{
        Deserialize,
        Serialize,
    },
    utoipa::ToSchema,
};

/// Bid prices are accepted as decimal strings. Plain JSON numbers are accepted too and are
/// converted to their shortest decimal representation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum PriceValue {
    Text(String),
    Number(serde_json::Number),
}

impl PriceValue {
    pub fn into_string(self) -> String {
        match self {
            PriceValue::Text(text) => text,
            PriceValue::Number(number) => number.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, ToSchema, Debug, PartialEq)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "place_bid")]
    PlaceBid {
        /// The price of the bid. A missing price is reported as an invalid price.
        #[serde(default)]
        #[schema(example = "150.00", value_type = Option<String>)]
        price: Option<PriceValue>,
    },
}

/// Result of a client request. It is only sent to the client that issued the request.
#[derive(Serialize, Deserialize, Clone, ToSchema, Debug, PartialEq)]
#[serde(untagged)]
pub enum ServerResultMessage {
    Success { success: String },
    Error { error: String },
}

impl ServerResultMessage {
    pub fn success(message: impl Into<String>) -> Self {
        ServerResultMessage::Success {
            success: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerResultMessage::Error {
            error: message.into(),
        }
    }
}
