use serde_json::Value;

/// Request body for write operations.
///
/// `Empty` sends no body at all, while `Json(Value::Null)` sends the
/// literal `null`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    /// URL-encoded `key=value` pairs.
    Form(Vec<(String, String)>),
}

impl Payload {
    pub fn json(value: impl Into<Value>) -> Self {
        Self::Json(value.into())
    }

    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Option<Value>> for Payload {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Empty, Self::Json)
    }
}
