use serde::Deserialize;
use serde_json::Value as JsonValue;
use validator::Validate;

/// Posted by the external CV analyzer once scoring is done.
#[derive(Debug, Deserialize, Validate)]
pub struct AnalysisResultRequest {
    #[validate(range(min = 0, max = 100))]
    pub score: i32,
    /// Opaque payload (strengths, improvements, section completeness);
    /// carried through to the candidate email untouched.
    pub results: JsonValue,
    #[validate(range(min = 0))]
    pub send_delay_seconds: Option<i64>,
}
